//! Flat entry records for external persistence.
//!
//! Entries reference each other by address only, so every field maps onto a
//! plain key/value record without cycles. Records are keyed by
//! `(execution, address, name)`.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::OracleResult;
use crate::repository::{ChildRef, Entry, EntryStatus, Shape};
use crate::types::{Address, FrameId, Kind, Relation, TypeDescriptor};

/// Serializable snapshot of one [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord
{
    pub execution: String,
    pub address: Address,
    pub name: String,
    pub kind: Kind,
    pub names: Vec<String>,
    pub types: Vec<TypeDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(i64, i64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    pub children: Vec<ChildRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shapes: BTreeMap<String, Shape>,
    pub parents: BTreeMap<Relation, Vec<Address>>,
    pub frames: Vec<FrameId>,
    pub status: EntryStatus,
    pub opaque: bool,
}

impl EntryRecord
{
    pub fn from_entry(execution: &str, entry: &Entry) -> Self
    {
        Self {
            execution: execution.to_string(),
            address: entry.address,
            name: entry.name.clone(),
            kind: entry.kind,
            names: entry.names.iter().cloned().collect(),
            types: entry.types.iter().cloned().collect(),
            value: entry.value.clone(),
            range: entry.range,
            target_type: entry.target_type.clone(),
            children: entry.children.clone(),
            shapes: entry.shapes.clone(),
            parents: entry
                .parents
                .iter()
                .map(|(relation, parents)| (*relation, parents.iter().copied().collect()))
                .collect(),
            frames: entry.frames.iter().copied().collect(),
            status: entry.status.clone(),
            opaque: entry.opaque,
        }
    }

    /// Storage key of the record.
    #[must_use]
    pub fn key(&self) -> (&str, Address, &str)
    {
        (&self.execution, self.address, &self.name)
    }
}

/// Consumer of completed entries.
pub trait EntrySink
{
    /// Store one record.
    ///
    /// ## Errors
    ///
    /// Backend specific; I/O and serialization failures for the built-in sinks.
    fn accept(&mut self, record: &EntryRecord) -> OracleResult<()>;

    /// Called once after the last record of an export.
    ///
    /// ## Errors
    ///
    /// Backend specific.
    fn finish(&mut self) -> OracleResult<()>
    {
        Ok(())
    }
}

impl EntrySink for Vec<EntryRecord>
{
    fn accept(&mut self, record: &EntryRecord) -> OracleResult<()>
    {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write>
{
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W>
{
    pub fn new(writer: W) -> Self
    {
        Self { writer, written: 0 }
    }

    /// Records written so far.
    #[must_use]
    pub fn written(&self) -> usize
    {
        self.written
    }

    pub fn into_inner(self) -> W
    {
        self.writer
    }
}

impl<W: Write> EntrySink for JsonLinesSink<W>
{
    fn accept(&mut self, record: &EntryRecord) -> OracleResult<()>
    {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> OracleResult<()>
    {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::repository::ChildLabel;

    fn record() -> EntryRecord
    {
        EntryRecord {
            execution: "run-1".to_string(),
            address: Address::new(0x1000),
            name: "arr".to_string(),
            kind: Kind::Array,
            names: vec!["arr".to_string()],
            types: vec![TypeDescriptor::new(Kind::Array, "int[2]")],
            value: None,
            range: Some((0, 1)),
            target_type: Some("int".to_string()),
            children: vec![ChildRef::new(ChildLabel::Index(0), Some(Address::new(0x1000)))],
            shapes: BTreeMap::new(),
            parents: BTreeMap::new(),
            frames: vec![FrameId::from_raw(7)],
            status: EntryStatus::Valid,
            opaque: false,
        }
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_record()
    {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.accept(&record()).unwrap();
        sink.accept(&record()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.written(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""address":"0x1000""#));
        assert!(lines[0].contains(r#""target_type":"int""#));
        assert!(!lines[0].contains(r#""value""#));
    }

    #[test]
    fn test_record_key()
    {
        let record = record();
        assert_eq!(record.key(), ("run-1", Address::new(0x1000), "arr"));
    }
}
