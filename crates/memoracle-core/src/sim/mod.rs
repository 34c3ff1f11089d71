//! # Simulated Debuggee
//!
//! An in-memory stand-in for a stopped process, implementing every debuggee
//! trait. It backs the CLI's fixture mode and the test suite.
//!
//! The simulation models what the traversal core relies on:
//!
//! - little-endian memory in mapped segments (text, globals, heap, stack);
//!   reads outside them fail with `Memory`
//! - base types, naturally aligned struct and union layouts, typedefs
//! - a call stack of frames with locals, plus a global block
//! - *disguised* symbols whose declared type is an integer while the printer
//!   knows the real type, the way stripped builds look in a real debugger
//! - write observers with an optional slot limit
//!
//! Values print in the usual C debugger style: `5`, `65 'A'`,
//! `(node *) 0x601040 <head>`, `{value = 1, next = 0x0}`, `{1, 2, 3}`.
//!
//! ## Example
//!
//! ```rust
//! use memoracle_core::sim::SimProcess;
//! use memoracle_core::ValueAccessor;
//!
//! let mut process = SimProcess::new();
//! process.define_struct("node", &[("value", "int"), ("next", "node *")])?;
//! let node = process.parse_type("node")?;
//! let head = process.add_global("head", node)?;
//! process.write_int(head, 7, 4)?;
//! process.write_pointer(head + 8, head)?;
//!
//! let main = process.push_frame("main");
//! let value = process.evaluate("head.next")?;
//! assert_eq!(process.printed(&value)?, format!("(node *) {head} <head>"));
//! # let _ = main;
//! # Ok::<(), memoracle_core::OracleError>(())
//! ```

pub mod expr;
pub mod layout;
pub mod memory;

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::debuggee::{FrameProvider, MutationNotifier, ValueAccessor};
use crate::error::{OracleError, OracleResult};
use crate::events::{MutationEvent, MutationSender, WatchHandle};
use crate::types::{Address, FrameId, RawType, SymbolInfo, TypeCode};

use self::expr::Expr;
use self::layout::{TypeTable, POINTER_SIZE};
use self::memory::Memory;

/// Start of the segment holding functions.
pub const TEXT_BASE: u64 = 0x40_0000;
/// Start of the segment holding globals.
pub const GLOBAL_BASE: u64 = 0x60_1000;
/// Start of the heap.
pub const HEAP_BASE: u64 = 0x100_0000;
/// Lowest stack address; the stack grows down from `STACK_BASE + STACK_SIZE`.
pub const STACK_BASE: u64 = 0x7ff0_0000;

const TEXT_SIZE: usize = 0x1_0000;
const GLOBAL_SIZE: usize = 0x1_0000;
const HEAP_SIZE: usize = 0x4_0000;
const STACK_SIZE: usize = 0x4_0000;
const FRAME_HEADER: u64 = 16;
const MAX_PRINTED_ELEMENTS: usize = 200;

/// A typed location in the simulated process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimValue
{
    pub address: Address,
    /// What the debug information claims.
    pub ty: RawType,
    /// What the memory really holds; drives printing and navigation.
    pub actual: RawType,
}

impl SimValue
{
    fn typed(address: Address, ty: RawType) -> Self
    {
        Self {
            address,
            actual: ty.clone(),
            ty,
        }
    }
}

#[derive(Debug, Clone)]
struct Symbol
{
    name: String,
    declared: RawType,
    actual: RawType,
    address: Address,
    constant: bool,
}

impl Symbol
{
    fn value(&self) -> SimValue
    {
        SimValue {
            address: self.address,
            ty: self.declared.clone(),
            actual: self.actual.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Frame
{
    id: FrameId,
    function: String,
    locals: Vec<Symbol>,
}

#[derive(Debug)]
struct Watchpoint
{
    address: Address,
    length: usize,
    events: MutationSender,
}

/// A stopped process held entirely in memory.
#[derive(Debug)]
pub struct SimProcess
{
    memory: Memory,
    types: TypeTable,
    globals: Vec<Symbol>,
    /// Oldest first.
    frames: Vec<Frame>,
    selected: Option<FrameId>,
    dynamic_types: HashMap<Address, RawType>,
    watchpoints: BTreeMap<WatchHandle, Watchpoint>,
    next_handle: u64,
    watch_slots: Option<usize>,
}

impl Default for SimProcess
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl SimProcess
{
    #[must_use]
    pub fn new() -> Self
    {
        let mut memory = Memory::new();
        memory.map(TEXT_BASE, TEXT_SIZE, false);
        memory.map(GLOBAL_BASE, GLOBAL_SIZE, false);
        memory.map(HEAP_BASE, HEAP_SIZE, false);
        memory.map(STACK_BASE, STACK_SIZE, true);
        Self {
            memory,
            types: TypeTable::new(),
            globals: Vec::new(),
            frames: Vec::new(),
            selected: None,
            dynamic_types: HashMap::new(),
            watchpoints: BTreeMap::new(),
            next_handle: 0,
            watch_slots: None,
        }
    }

    /// Limit the number of simultaneously installed observers, like the
    /// handful of debug registers real hardware offers.
    pub fn set_watch_slots(&mut self, slots: Option<usize>)
    {
        self.watch_slots = slots;
    }

    #[must_use]
    pub fn watchpoint_count(&self) -> usize
    {
        self.watchpoints.len()
    }

    #[must_use]
    pub fn types(&self) -> &TypeTable
    {
        &self.types
    }

    /// Parse a C type string against the known types.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: unknown base type
    pub fn parse_type(&self, spelled: &str) -> OracleResult<RawType>
    {
        self.types.parse(spelled)
    }

    /// Define a struct from `(field, type string)` pairs.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: a field type is unknown or has no size yet
    pub fn define_struct(&mut self, name: &str, fields: &[(&str, &str)]) -> OracleResult<()>
    {
        let fields = self.parse_fields(fields)?;
        self.types.define_struct(name, fields)
    }

    /// Define a union from `(member, type string)` pairs.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: a member type is unknown or has no size yet
    pub fn define_union(&mut self, name: &str, fields: &[(&str, &str)]) -> OracleResult<()>
    {
        let fields = self.parse_fields(fields)?;
        self.types.define_union(name, fields)
    }

    /// ## Errors
    ///
    /// - `Resolution`: the target type is unknown
    pub fn define_typedef(&mut self, name: &str, target: &str) -> OracleResult<()>
    {
        let target = self.types.parse(target)?;
        self.types.define_typedef(name, target);
        Ok(())
    }

    fn parse_fields(&self, fields: &[(&str, &str)]) -> OracleResult<Vec<(String, RawType)>>
    {
        fields
            .iter()
            .map(|(field, spelled)| Ok(((*field).to_string(), self.types.parse(spelled)?)))
            .collect()
    }

    /// ## Errors
    ///
    /// - `Resolution`: `ty` has no size
    pub fn size_of(&self, ty: &RawType) -> OracleResult<u64>
    {
        self.types.size_of(ty)
    }

    /// Push a new innermost frame and select it.
    pub fn push_frame(&mut self, function: &str) -> FrameId
    {
        let depth = u32::try_from(self.frames.len()).unwrap_or(u32::MAX);
        // Every frame reserves a header, so frame bases never repeat
        let base = self
            .memory
            .allocate(STACK_BASE, FRAME_HEADER, FRAME_HEADER)
            .unwrap_or(Address::new(STACK_BASE));
        let id = FrameId::from_parts(function, depth, base);
        self.frames.push(Frame {
            id,
            function: function.to_string(),
            locals: Vec::new(),
        });
        self.selected = None;
        trace!(%function, frame = %id, "pushed frame");
        id
    }

    /// Return from the innermost frame. Its memory stays mapped, but the
    /// frame id becomes stale.
    pub fn pop_frame(&mut self) -> Option<FrameId>
    {
        let frame = self.frames.pop()?;
        if self.selected == Some(frame.id) {
            self.selected = None;
        }
        Some(frame.id)
    }

    /// Function name of a live frame.
    #[must_use]
    pub fn function_of(&self, frame: FrameId) -> Option<&str>
    {
        self.frame(frame).map(|frame| frame.function.as_str())
    }

    fn frame(&self, id: FrameId) -> Option<&Frame>
    {
        self.frames.iter().find(|frame| frame.id == id)
    }

    /// Allocate a zeroed local of type `ty` in `frame`.
    ///
    /// ## Errors
    ///
    /// - `StaleFrame`: the frame is gone
    /// - `Resolution`: `ty` has no size
    /// - `ResourceExhausted`: the stack is full
    pub fn add_local(&mut self, frame: FrameId, name: &str, ty: RawType) -> OracleResult<Address>
    {
        self.add_disguised_local(frame, name, ty.clone(), ty)
    }

    /// Allocate a local whose debug information claims `declared` while the
    /// memory holds an `actual`.
    ///
    /// ## Errors
    ///
    /// See [`SimProcess::add_local`].
    pub fn add_disguised_local(&mut self, frame: FrameId, name: &str, declared: RawType, actual: RawType) -> OracleResult<Address>
    {
        if self.frame(frame).is_none() {
            return Err(OracleError::StaleFrame(frame));
        }
        let address = self.allocate(STACK_BASE, &actual)?;
        let symbol = Symbol {
            name: name.to_string(),
            declared,
            actual,
            address,
            constant: false,
        };
        if let Some(owner) = self.frames.iter_mut().find(|owner| owner.id == frame) {
            owner.locals.push(symbol);
        }
        Ok(address)
    }

    /// Allocate a zeroed global.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: `ty` has no size
    /// - `ResourceExhausted`: the global segment is full
    pub fn add_global(&mut self, name: &str, ty: RawType) -> OracleResult<Address>
    {
        self.add_disguised_global(name, ty.clone(), ty)
    }

    /// Global counterpart of [`SimProcess::add_disguised_local`].
    ///
    /// ## Errors
    ///
    /// See [`SimProcess::add_global`].
    pub fn add_disguised_global(&mut self, name: &str, declared: RawType, actual: RawType) -> OracleResult<Address>
    {
        let address = self.allocate(GLOBAL_BASE, &actual)?;
        self.globals.push(Symbol {
            name: name.to_string(),
            declared,
            actual,
            address,
            constant: false,
        });
        Ok(address)
    }

    /// A function symbol. Functions are constants of the global block and
    /// are never traversal roots, but pointers to them print with its name.
    ///
    /// ## Errors
    ///
    /// - `ResourceExhausted`: the text segment is full
    pub fn add_function(&mut self, name: &str, signature: &str) -> OracleResult<Address>
    {
        let ty = RawType::named(TypeCode::Function, signature);
        let address = self.allocate(TEXT_BASE, &ty)?;
        self.globals.push(Symbol {
            name: name.to_string(),
            declared: ty.clone(),
            actual: ty,
            address,
            constant: true,
        });
        Ok(address)
    }

    /// Allocate a zeroed heap object.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: `ty` has no size
    /// - `ResourceExhausted`: the heap is full
    pub fn alloc(&mut self, ty: &RawType) -> OracleResult<Address>
    {
        self.allocate(HEAP_BASE, ty)
    }

    fn allocate(&mut self, segment: u64, ty: &RawType) -> OracleResult<Address>
    {
        let size = self.types.size_of(ty)?;
        let align = self.types.align_of(ty)?;
        self.memory.allocate(segment, size, align)
    }

    /// Report `ty` as the runtime type of the struct at `address`.
    pub fn set_dynamic_type(&mut self, address: Address, ty: RawType)
    {
        self.dynamic_types.insert(address, ty);
    }

    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn read_bytes(&self, address: Address, length: usize) -> OracleResult<Vec<u8>>
    {
        Ok(self.memory.read(address, length)?.to_vec())
    }

    /// Write raw bytes and fire every observer overlapping the range.
    ///
    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn write_bytes(&mut self, address: Address, bytes: &[u8]) -> OracleResult<()>
    {
        self.memory.write(address, bytes)?;

        let start = address.value();
        let end = start + bytes.len() as u64;
        for (handle, watchpoint) in &self.watchpoints {
            let watch_start = watchpoint.address.value();
            let watch_end = watch_start + watchpoint.length as u64;
            if start < watch_end && watch_start < end {
                let event = MutationEvent {
                    handle: *handle,
                    address: watchpoint.address,
                };
                if watchpoint.events.send(event).is_err() {
                    trace!(%handle, "observer channel closed");
                }
            }
        }
        Ok(())
    }

    /// Write the low `size` bytes of `value`.
    ///
    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn write_int(&mut self, address: Address, value: i64, size: usize) -> OracleResult<()>
    {
        let bytes = value.to_le_bytes();
        self.write_bytes(address, &bytes[..size.clamp(1, 8)])
    }

    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn write_pointer(&mut self, address: Address, target: Address) -> OracleResult<()>
    {
        self.write_bytes(address, &target.value().to_le_bytes())
    }

    /// Write a `float` (4 bytes) or `double` (8 bytes).
    ///
    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn write_float(&mut self, address: Address, value: f64, size: usize) -> OracleResult<()>
    {
        if size == 4 {
            #[allow(clippy::cast_possible_truncation)]
            let single = value as f32;
            self.write_bytes(address, &single.to_le_bytes())
        } else {
            self.write_bytes(address, &value.to_le_bytes())
        }
    }

    fn lookup_symbol(&self, frame: FrameId, name: &str) -> Option<&Symbol>
    {
        self.frame(frame)
            .and_then(|frame| frame.locals.iter().find(|symbol| symbol.name == name))
            .or_else(|| self.globals.iter().find(|symbol| symbol.name == name))
    }

    fn eval(&self, source: &str, frame: FrameId, expr: &Expr) -> OracleResult<SimValue>
    {
        match expr {
            Expr::Symbol(name) => self
                .lookup_symbol(frame, name)
                .map(Symbol::value)
                .ok_or_else(|| OracleError::resolution(source, format!("no symbol \"{name}\" in current context"))),
            Expr::Deref(inner) => self.dereference(&self.eval(source, frame, inner)?),
            Expr::Member(inner, field) => self.member(source, &self.eval(source, frame, inner)?, field),
            Expr::Arrow(inner, field) => {
                let target = self.dereference(&self.eval(source, frame, inner)?)?;
                self.member(source, &target, field)
            }
            Expr::Index(inner, index) => {
                let base = self.eval(source, frame, inner)?;
                match base.actual.strip_typedefs().code {
                    TypeCode::Pointer | TypeCode::Reference => {
                        let target = self.dereference(&base)?;
                        let size = self.types.size_of(&target.actual)?;
                        let offset = index.unsigned_abs() * size;
                        let address = if *index < 0 {
                            target.address.value().checked_sub(offset)
                        } else {
                            target.address.value().checked_add(offset)
                        }
                        .map(Address::new)
                        .ok_or(OracleError::Memory {
                            address: target.address,
                        })?;
                        self.value_at(address, &target.actual)
                    }
                    _ => self.element(&base, *index),
                }
            }
        }
    }

    fn member(&self, source: &str, value: &SimValue, field: &str) -> OracleResult<SimValue>
    {
        self.fields(value)?
            .into_iter()
            .find_map(|(name, member)| (name == field).then_some(member))
            .ok_or_else(|| OracleError::resolution(source, format!("there is no member named {field}")))
    }

    fn symbol_at(&self, address: Address) -> Option<&str>
    {
        self.globals
            .iter()
            .find(|symbol| symbol.address == address)
            .map(|symbol| symbol.name.as_str())
    }

    fn format(&self, ty: &RawType, address: Address, top: bool) -> OracleResult<String>
    {
        let ty = ty.strip_typedefs();
        let size = self.types.size_of(ty).map_or(0, |size| usize::try_from(size).unwrap_or(usize::MAX));
        let unsigned = ty.name.as_deref().is_some_and(|name| name.contains("unsigned"));
        match ty.code {
            TypeCode::Int | TypeCode::Enum if unsigned => Ok(self.memory.read_unsigned(address, size)?.to_string()),
            TypeCode::Int | TypeCode::Enum => Ok(self.memory.read_signed(address, size)?.to_string()),
            TypeCode::Char => {
                let byte = self.memory.read_unsigned(address, 1)?;
                let number = if unsigned {
                    byte.to_string()
                } else {
                    self.memory.read_signed(address, 1)?.to_string()
                };
                Ok(format!("{number} {}", char_literal(byte)))
            }
            TypeCode::Bool => Ok((self.memory.read_unsigned(address, 1)? != 0).to_string()),
            TypeCode::Float if size == 4 => {
                let bits = u32::try_from(self.memory.read_unsigned(address, 4)?).unwrap_or_default();
                Ok(f32::from_bits(bits).to_string())
            }
            TypeCode::Float => Ok(f64::from_bits(self.memory.read_unsigned(address, 8)?).to_string()),
            TypeCode::Pointer | TypeCode::Reference => {
                let target = Address::new(self.memory.read_unsigned(address, POINTER_SIZE as usize)?);
                let suffix = self.symbol_at(target).map(|name| format!(" <{name}>")).unwrap_or_default();
                if top {
                    Ok(format!("({ty}) {target}{suffix}"))
                } else {
                    Ok(format!("{target}{suffix}"))
                }
            }
            TypeCode::Array => {
                let element = ty.target().cloned().unwrap_or_else(RawType::int);
                let step = self.types.size_of(&element)?;
                let count = usize::try_from(ty.element_count().unwrap_or(0)).unwrap_or(0);
                let mut parts = Vec::with_capacity(count.min(MAX_PRINTED_ELEMENTS));
                for index in 0..count.min(MAX_PRINTED_ELEMENTS) {
                    let offset = step * index as u64;
                    parts.push(self.format(&element, address + offset, false)?);
                }
                if count > MAX_PRINTED_ELEMENTS {
                    parts.push("...".to_string());
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            TypeCode::Struct | TypeCode::Union => {
                let Some(layout) = self.types.aggregate(ty.name.as_deref().unwrap_or_default()) else {
                    return Ok("<incomplete type>".to_string());
                };
                let mut parts = Vec::with_capacity(layout.fields.len());
                for field in &layout.fields {
                    let value = self.format(&field.ty, address + field.offset, false)?;
                    parts.push(format!("{} = {value}", field.name));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            TypeCode::Function | TypeCode::Method => {
                let name = ty.name.as_deref().unwrap_or("void (void)");
                let suffix = self.symbol_at(address).map(|symbol| format!(" <{symbol}>")).unwrap_or_default();
                Ok(format!("{{{name}}} {address}{suffix}"))
            }
            TypeCode::Void => Ok("void".to_string()),
            TypeCode::Typedef | TypeCode::Error => Ok("<error type>".to_string()),
        }
    }
}

fn char_literal(byte: u64) -> String
{
    match u8::try_from(byte).unwrap_or_default() {
        b'\'' => "'\\''".to_string(),
        b'\\' => "'\\\\'".to_string(),
        printable @ 0x20..=0x7e => format!("'{}'", char::from(printable)),
        other => format!("'\\{other:03o}'"),
    }
}

impl ValueAccessor for SimProcess
{
    type Value = SimValue;

    fn evaluate(&self, expression: &str) -> OracleResult<SimValue>
    {
        let frame = self.selected_frame()?;
        if !self.is_valid_frame(frame) {
            return Err(OracleError::StaleFrame(frame));
        }
        let expr = expr::parse(expression)?;
        self.eval(expression, frame, &expr)
    }

    fn value_at(&self, address: Address, ty: &RawType) -> OracleResult<SimValue>
    {
        let size = usize::try_from(self.types.size_of(ty).unwrap_or(1)).unwrap_or(1);
        if !self.memory.is_mapped(address, size) {
            return Err(OracleError::Memory { address });
        }
        Ok(SimValue::typed(address, ty.clone()))
    }

    fn address_of(&self, value: &SimValue) -> Option<Address>
    {
        Some(value.address)
    }

    fn type_of(&self, value: &SimValue) -> RawType
    {
        value.ty.clone()
    }

    fn dynamic_type_of(&self, value: &SimValue) -> Option<RawType>
    {
        if !matches!(value.actual.strip_typedefs().code, TypeCode::Struct | TypeCode::Union) {
            return None;
        }
        self.dynamic_types.get(&value.address).cloned()
    }

    fn dereference(&self, value: &SimValue) -> OracleResult<SimValue>
    {
        let actual = value.actual.strip_typedefs();
        match actual.code {
            TypeCode::Pointer | TypeCode::Reference => {
                let target_type = actual
                    .target()
                    .cloned()
                    .unwrap_or_else(|| RawType::named(TypeCode::Void, "void"));
                let target = Address::new(self.memory.read_unsigned(value.address, POINTER_SIZE as usize)?);
                self.value_at(target, &target_type)
            }
            TypeCode::Array => {
                let low = actual.bounds.map_or(0, |(low, _)| low);
                self.element(value, low)
            }
            _ => Err(OracleError::resolution(
                format!("*{}", value.address),
                format!("attempt to take contents of a non-pointer value of type {actual}"),
            )),
        }
    }

    fn fields(&self, value: &SimValue) -> OracleResult<Vec<(String, SimValue)>>
    {
        let actual = value.actual.strip_typedefs();
        if !matches!(actual.code, TypeCode::Struct | TypeCode::Union) {
            return Err(OracleError::resolution(
                value.address.to_string(),
                format!("type {actual} has no fields"),
            ));
        }
        let layout = self
            .types
            .aggregate(actual.name.as_deref().unwrap_or_default())
            .ok_or_else(|| OracleError::resolution(actual.to_string(), "incomplete type"))?;
        Ok(layout
            .fields
            .iter()
            .map(|field| (field.name.clone(), SimValue::typed(value.address + field.offset, field.ty.clone())))
            .collect())
    }

    fn element(&self, value: &SimValue, index: i64) -> OracleResult<SimValue>
    {
        let actual = value.actual.strip_typedefs();
        let (Some((low, high)), Some(element)) = (actual.bounds, actual.target()) else {
            return Err(OracleError::resolution(
                value.address.to_string(),
                format!("cannot subscript something of type {actual}"),
            ));
        };
        if index < low || index > high {
            return Err(OracleError::resolution(
                format!("[{index}]"),
                format!("index outside {low}..={high}"),
            ));
        }
        let step = self.types.size_of(element)?;
        let offset = u64::try_from(index - low).unwrap_or_default() * step;
        self.value_at(value.address + offset, element)
    }

    fn cast(&self, value: &SimValue, ty: &RawType) -> OracleResult<SimValue>
    {
        self.value_at(value.address, ty)
    }

    fn printed(&self, value: &SimValue) -> OracleResult<String>
    {
        self.format(&value.actual, value.address, true)
    }

    fn lookup_type(&self, name: &str) -> OracleResult<RawType>
    {
        self.types.lookup(name)
    }
}

impl FrameProvider for SimProcess
{
    fn selected_frame(&self) -> OracleResult<FrameId>
    {
        match self.selected {
            Some(frame) if self.is_valid_frame(frame) => Ok(frame),
            _ => self.newest_frame(),
        }
    }

    fn newest_frame(&self) -> OracleResult<FrameId>
    {
        self.frames
            .last()
            .map(|frame| frame.id)
            .ok_or_else(|| OracleError::InvalidArgument("no frames on the stack".to_string()))
    }

    fn select_frame(&mut self, frame: FrameId) -> OracleResult<()>
    {
        if !self.is_valid_frame(frame) {
            return Err(OracleError::StaleFrame(frame));
        }
        self.selected = Some(frame);
        Ok(())
    }

    fn older_frame(&self, frame: FrameId) -> Option<FrameId>
    {
        let position = self.frames.iter().position(|candidate| candidate.id == frame)?;
        position.checked_sub(1).map(|older| self.frames[older].id)
    }

    fn is_valid_frame(&self, frame: FrameId) -> bool
    {
        self.frame(frame).is_some()
    }

    fn frame_symbols(&self, frame: FrameId) -> OracleResult<Vec<SymbolInfo>>
    {
        let frame = self.frame(frame).ok_or(OracleError::StaleFrame(frame))?;
        Ok(frame
            .locals
            .iter()
            .map(|symbol| SymbolInfo {
                name: symbol.name.clone(),
                constant: symbol.constant,
            })
            .collect())
    }

    fn global_symbols(&self, frame: FrameId) -> OracleResult<Vec<SymbolInfo>>
    {
        if !self.is_valid_frame(frame) {
            return Err(OracleError::StaleFrame(frame));
        }
        Ok(self
            .globals
            .iter()
            .map(|symbol| SymbolInfo {
                name: symbol.name.clone(),
                constant: symbol.constant,
            })
            .collect())
    }
}

impl MutationNotifier for SimProcess
{
    fn install_observer(&mut self, address: Address, length: usize, events: MutationSender) -> OracleResult<WatchHandle>
    {
        if self.watch_slots.is_some_and(|slots| self.watchpoints.len() >= slots) {
            return Err(OracleError::ResourceExhausted(format!(
                "all {} watchpoint slots in use",
                self.watchpoints.len()
            )));
        }
        if !self.memory.is_mapped(address, 1) {
            return Err(OracleError::Memory { address });
        }
        self.next_handle += 1;
        let handle = WatchHandle::from_raw(self.next_handle);
        self.watchpoints.insert(
            handle,
            Watchpoint {
                address,
                length: length.max(1),
                events,
            },
        );
        Ok(handle)
    }

    fn remove_observer(&mut self, handle: WatchHandle) -> OracleResult<()>
    {
        self.watchpoints
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| OracleError::InvalidArgument(format!("unknown observer {handle}")))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::events::event_channel;

    #[test]
    fn test_locals_shadow_globals()
    {
        let mut process = SimProcess::new();
        let global = process.add_global("x", RawType::int()).unwrap();
        let main = process.push_frame("main");
        let local = process.add_local(main, "x", RawType::int()).unwrap();
        process.write_int(local, -3, 4).unwrap();

        let value = process.evaluate("x").unwrap();
        assert_eq!(value.address, local);
        assert_ne!(value.address, global);
        assert_eq!(process.printed(&value).unwrap(), "-3");
    }

    #[test]
    fn test_char_and_pointer_printing()
    {
        let mut process = SimProcess::new();
        let letter = process.add_global("letter", process.parse_type("char").unwrap()).unwrap();
        process.write_int(letter, 65, 1).unwrap();
        let pointer = process.add_global("cursor", process.parse_type("char *").unwrap()).unwrap();
        process.write_pointer(pointer, letter).unwrap();
        let null = process.add_global("nothing", process.parse_type("int *").unwrap()).unwrap();
        process.push_frame("main");

        assert_eq!(process.printed(&process.evaluate("letter").unwrap()).unwrap(), "65 'A'");
        assert_eq!(
            process.printed(&process.evaluate("cursor").unwrap()).unwrap(),
            format!("(char *) {letter} <letter>")
        );
        let nothing = process.evaluate("nothing").unwrap();
        assert_eq!(nothing.address, null);
        assert_eq!(process.printed(&nothing).unwrap(), "(int *) 0x0");
        assert!(matches!(
            process.dereference(&nothing),
            Err(OracleError::Memory { address }) if address.is_null()
        ));
    }

    #[test]
    fn test_popped_frame_is_stale()
    {
        let mut process = SimProcess::new();
        let main = process.push_frame("main");
        let helper = process.push_frame("helper");
        assert_eq!(process.older_frame(helper), Some(main));
        assert_eq!(process.pop_frame(), Some(helper));
        assert!(!process.is_valid_frame(helper));
        assert!(matches!(process.select_frame(helper), Err(OracleError::StaleFrame(_))));
        assert_eq!(process.selected_frame().unwrap(), main);
    }

    #[test]
    fn test_writes_fire_overlapping_observers()
    {
        let mut process = SimProcess::new();
        let counter = process.add_global("counter", RawType::int()).unwrap();
        let other = process.add_global("other", RawType::int()).unwrap();
        let (sender, receiver) = event_channel();
        let handle = process.install_observer(counter, 4, sender).unwrap();

        process.write_int(other, 1, 4).unwrap();
        assert!(receiver.try_recv().is_err());
        process.write_int(counter, 1, 4).unwrap();
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.handle, handle);
        assert_eq!(event.address, counter);
    }

    #[test]
    fn test_watch_slot_limit()
    {
        let mut process = SimProcess::new();
        let counter = process.add_global("counter", RawType::int()).unwrap();
        process.set_watch_slots(Some(1));
        let (sender, _receiver) = event_channel();
        let handle = process.install_observer(counter, 4, sender.clone()).unwrap();
        assert!(matches!(
            process.install_observer(counter, 4, sender.clone()),
            Err(OracleError::ResourceExhausted(_))
        ));
        process.remove_observer(handle).unwrap();
        assert!(process.install_observer(counter, 4, sender).is_ok());
    }
}
