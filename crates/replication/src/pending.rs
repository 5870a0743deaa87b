//! Reconstruction of upstream transactions from the two pending dumps.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use mbmirror_dump::{ColumnType, DumpReader, Fields, Value};

use crate::error::{ReplicationError, Result};

const OPERATION_COLUMNS: &[ColumnType] = &[
    ColumnType::Int,
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::Int,
];

const DATA_COLUMNS: &[ColumnType] = &[ColumnType::Int, ColumnType::Bool, ColumnType::Fields];

/// Kind of a recorded row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    /// Decode the single-letter operation code of the dump.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(OpKind::Insert),
            "u" => Some(OpKind::Update),
            "d" => Some(OpKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

/// One row change recorded upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub row_id: i64,
    /// Raw table reference as written by the producer.
    pub table_ref: String,
    pub kind: OpKind,
    pub xid: i64,
}

/// A reconstructed upstream transaction, operations in `row_id` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub xid: i64,
    pub operations: Vec<PendingOperation>,
}

/// All pending operations and row payloads of one packet.
///
/// Both dumps may be loaded in either order; nothing is cross-checked until
/// replay. An operation without payload simply sees empty keys and values.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    transactions: HashMap<i64, Vec<PendingOperation>>,
    data: HashMap<(i64, bool), Fields>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the pending operations dump (`row_id, table, op, xid`).
    pub fn load_operations<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut count = 0;
        for row in DumpReader::new(reader, OPERATION_COLUMNS) {
            let op = operation_from_row(row?)?;
            self.push_operation(op);
            count += 1;
        }
        tracing::debug!("Loaded {count} pending operations");
        Ok(count)
    }

    /// Load the pending data dump (`row_id, is_key, payload`).
    pub fn load_operation_data<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut count = 0;
        for row in DumpReader::new(reader, DATA_COLUMNS) {
            let mut row = row?.into_iter();
            let row_id = row
                .next()
                .and_then(|v| v.as_int())
                .ok_or_else(|| invalid(0, "pending data row without row id"))?;
            let is_key = row.next().and_then(|v| v.as_bool()).unwrap_or(false);
            let fields = row.next().and_then(Value::into_fields).unwrap_or_default();
            self.insert_data(row_id, is_key, fields);
            count += 1;
        }
        tracing::debug!("Loaded {count} pending data rows");
        Ok(count)
    }

    pub fn push_operation(&mut self, op: PendingOperation) {
        self.transactions.entry(op.xid).or_default().push(op);
    }

    pub fn insert_data(&mut self, row_id: i64, is_key: bool, fields: Fields) {
        self.data.insert((row_id, is_key), fields);
    }

    /// Transactions ascending by `xid`, each with operations ascending by `row_id`.
    pub fn transactions(&self) -> Vec<Transaction> {
        let ordered: BTreeMap<i64, &Vec<PendingOperation>> =
            self.transactions.iter().map(|(xid, ops)| (*xid, ops)).collect();

        ordered
            .into_iter()
            .map(|(xid, ops)| {
                let mut operations = ops.clone();
                operations.sort_by_key(|op| op.row_id);
                Transaction { xid, operations }
            })
            .collect()
    }

    /// Key columns of a row; empty if the payload is absent.
    pub fn keys(&self, row_id: i64) -> Fields {
        self.data.get(&(row_id, true)).cloned().unwrap_or_default()
    }

    /// Value columns of a row; empty if the payload is absent.
    pub fn values(&self, row_id: i64) -> Fields {
        self.data.get(&(row_id, false)).cloned().unwrap_or_default()
    }

    pub fn operation_count(&self) -> usize {
        self.transactions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

fn operation_from_row(row: Vec<Value>) -> Result<PendingOperation> {
    let mut row = row.into_iter();
    let row_id = row
        .next()
        .and_then(|v| v.as_int())
        .ok_or_else(|| invalid(0, "pending operation without row id"))?;
    let table_ref = match row.next() {
        Some(Value::Text(table)) => table,
        _ => return Err(invalid(row_id, "missing table reference")),
    };
    let kind = match row.next() {
        Some(Value::Text(code)) => OpKind::from_code(&code)
            .ok_or_else(|| invalid(row_id, format!("unknown operation code {code:?}")))?,
        _ => return Err(invalid(row_id, "missing operation code")),
    };
    let xid = row
        .next()
        .and_then(|v| v.as_int())
        .ok_or_else(|| invalid(row_id, "missing transaction id"))?;

    Ok(PendingOperation {
        row_id,
        table_ref,
        kind,
        xid,
    })
}

fn invalid(row_id: i64, reason: impl Into<String>) -> ReplicationError {
    ReplicationError::InvalidPending {
        row_id,
        reason: reason.into(),
    }
}

/// A decoded replication packet, ready for replay.
#[derive(Debug, Clone, Default)]
pub struct ReplicationPacket {
    /// Replication sequence this packet advances the database to.
    pub sequence: i64,
    /// Schema version the packet was produced against.
    pub schema_sequence: Option<i64>,
    /// Producer timestamp, informational only.
    pub timestamp: Option<String>,
    pub pending: PendingSet,
}

impl ReplicationPacket {
    pub fn new(sequence: i64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPERATIONS: &str = "\
3\t\"musicbrainz\".\"artist\"\tu\t20\n\
1\t\"musicbrainz\".\"artist\"\ti\t10\n\
4\t\"musicbrainz\".\"label\"\td\t10\n\
2\t\"musicbrainz\".\"artist\"\ti\t20\n";

    const DATA: &str = "\
1\tf\t\"id\"='1' \"name\"='Foo' \n\
3\tt\t\"id\"='1' \n\
3\tf\t\"name\"='Bar' \n\
4\tt\t\\N\n";

    fn loaded() -> PendingSet {
        let mut set = PendingSet::new();
        set.load_operation_data(DATA.as_bytes()).unwrap();
        set.load_operations(OPERATIONS.as_bytes()).unwrap();
        set
    }

    #[test]
    fn test_transactions_ordered_by_xid_then_row_id() {
        let order: Vec<(i64, i64)> = loaded()
            .transactions()
            .iter()
            .flat_map(|tx| tx.operations.iter().map(|op| (op.xid, op.row_id)))
            .collect();
        assert_eq!(order, vec![(10, 1), (10, 4), (20, 2), (20, 3)]);
    }

    #[test]
    fn test_keys_and_values_lookup() {
        let set = loaded();
        assert_eq!(set.keys(3).value("id"), Some("1"));
        assert_eq!(set.values(3).value("name"), Some("Bar"));
        assert_eq!(set.values(1).value("name"), Some("Foo"));
    }

    #[test]
    fn test_missing_payload_is_empty() {
        let set = loaded();
        assert!(set.keys(2).is_empty());
        assert!(set.values(2).is_empty());
        // NULL payload column decodes to an empty map.
        assert!(set.keys(4).is_empty());
    }

    #[test]
    fn test_operation_kinds() {
        let set = loaded();
        let kinds: Vec<OpKind> = set
            .transactions()
            .into_iter()
            .flat_map(|tx| tx.operations.into_iter().map(|op| op.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![OpKind::Insert, OpKind::Delete, OpKind::Insert, OpKind::Update]
        );
        assert_eq!(set.operation_count(), 4);
    }

    #[test]
    fn test_unknown_operation_code() {
        let mut set = PendingSet::new();
        let err = set
            .load_operations("7\tartist\tx\t1\n".as_bytes())
            .unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::InvalidPending { row_id: 7, .. }
        ));
    }

    #[test]
    fn test_malformed_line_is_dump_error() {
        let mut set = PendingSet::new();
        let err = set.load_operations("7\tartist\ti\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ReplicationError::Dump(_)));
    }

    #[test]
    fn test_duplicate_payload_last_wins() {
        let mut set = PendingSet::new();
        set.load_operation_data("1\tf\t\"a\"='x' \n1\tf\t\"a\"='y' \n".as_bytes())
            .unwrap();
        assert_eq!(set.values(1).value("a"), Some("y"));
    }
}
