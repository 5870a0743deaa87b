pub mod audit;
pub mod search;
