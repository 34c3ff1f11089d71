//! JSON fixtures describing a stopped process.
//!
//! A fixture lays out types, globals, heap objects and a call stack, then
//! applies initial writes. Every object carries a label that writes refer
//! to; globals, functions and locals default to their own name.
//!
//! ```json
//! {
//!   "structs": [{ "name": "node", "fields": [["value", "int"], ["next", "node *"]] }],
//!   "heap": [{ "label": "n1", "type": "node" }],
//!   "frames": [{ "function": "main", "locals": [{ "name": "head", "type": "node *" }] }],
//!   "writes": [
//!     { "at": "head", "pointer": "n1" },
//!     { "at": "n1", "int": 7, "size": 4 }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use memoracle_core::prelude::*;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Fixture
{
    pub structs: Vec<Aggregate>,
    pub unions: Vec<Aggregate>,
    pub typedefs: Vec<Typedef>,
    pub functions: Vec<Function>,
    pub globals: Vec<Variable>,
    pub heap: Vec<HeapObject>,
    /// Oldest frame first.
    pub frames: Vec<Frame>,
    pub writes: Vec<Write>,
    /// Limit on hardware-style watch slots; unlimited when absent.
    pub watch_slots: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Aggregate
{
    pub name: String,
    /// `(field name, spelled type)` in declaration order.
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Typedef
{
    pub name: String,
    pub target: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Function
{
    pub name: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variable
{
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Real type known only to the value printer.
    #[serde(default)]
    pub actual: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeapObject
{
    pub label: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Frame
{
    pub function: String,
    #[serde(default)]
    pub locals: Vec<Variable>,
}

#[derive(Debug, Deserialize)]
pub struct Write
{
    /// Label of the object written to.
    pub at: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(flatten)]
    pub value: WriteValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WriteValue
{
    Int
    {
        int: i64, size: usize
    },
    Float
    {
        float: f64, size: usize
    },
    /// Label of the target, `null`, or a literal address.
    Pointer
    {
        pointer: String
    },
}

/// A process built from a fixture.
pub struct Loaded
{
    pub process: SimProcess,
    /// Frames pushed, oldest first.
    pub frames: Vec<FrameId>,
    pub labels: HashMap<String, Address>,
}

impl Loaded
{
    /// Frame `depth` counted from the newest frame.
    pub fn frame(&self, depth: usize) -> OracleResult<FrameId>
    {
        self.frames
            .iter()
            .rev()
            .nth(depth)
            .copied()
            .ok_or_else(|| OracleError::InvalidArgument(format!("fixture has no frame at depth {depth}")))
    }
}

impl Fixture
{
    pub fn from_file(path: impl AsRef<Path>) -> OracleResult<Self>
    {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Build the simulated process, consuming the fixture.
    pub fn load(self) -> OracleResult<Loaded>
    {
        let mut process = SimProcess::new();
        process.set_watch_slots(self.watch_slots);
        let mut labels = HashMap::new();

        for aggregate in &self.structs {
            process.define_struct(&aggregate.name, &fields(aggregate))?;
        }
        for aggregate in &self.unions {
            process.define_union(&aggregate.name, &fields(aggregate))?;
        }
        for typedef in &self.typedefs {
            process.define_typedef(&typedef.name, &typedef.target)?;
        }
        for function in &self.functions {
            let address = process.add_function(&function.name, &function.signature)?;
            labels.insert(function.name.clone(), address);
        }
        for global in &self.globals {
            let declared = process.parse_type(&global.ty)?;
            let address = match &global.actual {
                Some(actual) => {
                    let actual = process.parse_type(actual)?;
                    process.add_disguised_global(&global.name, declared, actual)?
                }
                None => process.add_global(&global.name, declared)?,
            };
            labels.insert(label_of(global), address);
        }
        for object in &self.heap {
            let ty = process.parse_type(&object.ty)?;
            let address = process.alloc(&ty)?;
            labels.insert(object.label.clone(), address);
        }

        let mut frames = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let id = process.push_frame(&frame.function);
            for local in &frame.locals {
                let declared = process.parse_type(&local.ty)?;
                let address = match &local.actual {
                    Some(actual) => {
                        let actual = process.parse_type(actual)?;
                        process.add_disguised_local(id, &local.name, declared, actual)?
                    }
                    None => process.add_local(id, &local.name, declared)?,
                };
                labels.insert(label_of(local), address);
            }
            frames.push(id);
        }

        for write in &self.writes {
            let base = resolve(&labels, &write.at)?;
            let address = base + write.offset;
            match &write.value {
                WriteValue::Int { int, size } => process.write_int(address, *int, *size)?,
                WriteValue::Float { float, size } => process.write_float(address, *float, *size)?,
                WriteValue::Pointer { pointer } => {
                    let target = if pointer == "null" {
                        Address::ZERO
                    } else {
                        resolve(&labels, pointer).or_else(|_| Address::parse(pointer))?
                    };
                    process.write_pointer(address, target)?;
                }
            }
            debug!(at = %write.at, %address, "applied fixture write");
        }

        Ok(Loaded { process, frames, labels })
    }
}

fn fields(aggregate: &Aggregate) -> Vec<(&str, &str)>
{
    aggregate
        .fields
        .iter()
        .map(|(name, ty)| (name.as_str(), ty.as_str()))
        .collect()
}

fn label_of(variable: &Variable) -> String
{
    variable.label.clone().unwrap_or_else(|| variable.name.clone())
}

fn resolve(labels: &HashMap<String, Address>, label: &str) -> OracleResult<Address>
{
    labels
        .get(label)
        .copied()
        .ok_or_else(|| OracleError::InvalidArgument(format!("unknown fixture label `{label}`")))
}

#[cfg(test)]
mod tests
{
    use pretty_assertions::assert_eq;

    use super::*;

    const LIST: &str = r#"{
        "structs": [{ "name": "node", "fields": [["value", "int"], ["next", "node *"]] }],
        "heap": [{ "label": "n1", "type": "node" }],
        "frames": [
            { "function": "main", "locals": [{ "name": "head", "type": "node *" }] },
            { "function": "helper", "locals": [{ "name": "count", "type": "int" }] }
        ],
        "writes": [
            { "at": "head", "pointer": "n1" },
            { "at": "n1", "int": 7, "size": 4 },
            { "at": "n1", "offset": 8, "pointer": "null" }
        ]
    }"#;

    #[test]
    fn test_load_list_fixture()
    {
        let fixture: Fixture = serde_json::from_str(LIST).unwrap();
        let loaded = fixture.load().unwrap();
        let main = loaded.frame(1).unwrap();
        assert_eq!(loaded.frame(0).unwrap(), loaded.frames[1]);
        assert!(loaded.frame(2).is_err());

        let mut session = Session::new(loaded.process, TraversalConfig::default());
        session.serialize_locals(main).unwrap();
        let node = session.repository().get(Kind::Struct, loaded.labels["n1"]).unwrap();
        assert_eq!(node.name, "(*head)");
        assert_eq!(node.value.as_deref(), Some("{value = 7, next = 0x0}"));
    }

    #[test]
    fn test_unknown_label_is_rejected()
    {
        let fixture: Fixture = serde_json::from_str(r#"{ "writes": [{ "at": "nowhere", "int": 1, "size": 4 }] }"#).unwrap();
        assert!(matches!(fixture.load(), Err(OracleError::InvalidArgument(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected()
    {
        assert!(serde_json::from_str::<Fixture>(r#"{ "stack": [] }"#).is_err());
    }
}
