use thiserror::Error;

/// Errors raised while decoding a dump stream.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("IO error while reading dump: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}, column {column}: invalid integer '{value}'")]
    InvalidInteger {
        line: usize,
        column: usize,
        value: String,
    },

    #[error("Line {line}, column {column}: malformed field data '{value}'")]
    MalformedFields {
        line: usize,
        column: usize,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, DumpError>;
