//! # Debuggee Traits
//!
//! The interfaces the traversal core consumes from the host debugger.
//!
//! The core never talks to a process directly. Everything it knows about the
//! stopped debuggee arrives through three collaborators:
//!
//! - [`ValueAccessor`]: evaluates names into typed values, dereferences
//!   pointers, indexes arrays, enumerates struct fields, prints values
//! - [`FrameProvider`]: enumerates and selects stack frames and their symbols
//! - [`MutationNotifier`]: installs and removes write observers on memory
//!
//! [`Debuggee`] bundles the three. A backend implements each trait using its
//! own facilities (a scripting API of a native debugger, a core dump reader,
//! or the in-tree [`crate::sim`] process used by the tests and the CLI).
//!
//! ## Thread Safety
//!
//! Implementations are not required to be thread-safe. The debuggee is
//! stopped for the whole duration of a pass and every pass runs on one
//! thread.

use std::fmt;

use crate::error::OracleResult;
use crate::events::{MutationSender, WatchHandle};
use crate::types::{Address, FrameId, RawType, SymbolInfo};

/// Typed access to values in the stopped debuggee.
///
/// Expressions are evaluated in the currently selected frame (see
/// [`FrameProvider::select_frame`] and [`crate::guards::FrameGuard`]).
pub trait ValueAccessor
{
    /// Backend handle for one typed value.
    type Value: Clone + fmt::Debug;

    /// Evaluate an expression (`p`, `(*p).next`, `arr[2]`) in the selected frame.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: unknown symbol or malformed expression
    /// - `StaleFrame`: the selected frame is gone
    fn evaluate(&self, expression: &str) -> OracleResult<Self::Value>;

    /// Reinterpret the memory at `address` as `ty` (a `(TYPE) *ADDR` expression).
    ///
    /// ## Errors
    ///
    /// - `Memory`: the address is not mapped
    fn value_at(&self, address: Address, ty: &RawType) -> OracleResult<Self::Value>;

    /// Address of the value, if it is an lvalue.
    fn address_of(&self, value: &Self::Value) -> Option<Address>;

    /// Static type the debugger reports for the value.
    fn type_of(&self, value: &Self::Value) -> RawType;

    /// Runtime type for polymorphic values, when the backend knows it.
    fn dynamic_type_of(&self, _value: &Self::Value) -> Option<RawType>
    {
        None
    }

    /// Follow a pointer.
    ///
    /// ## Errors
    ///
    /// - `Memory`: null, dangling or unmapped target
    /// - `Resolution`: the value is not a pointer
    fn dereference(&self, value: &Self::Value) -> OracleResult<Self::Value>;

    /// Declared fields of a struct or union, in declaration order.
    fn fields(&self, value: &Self::Value) -> OracleResult<Vec<(String, Self::Value)>>;

    /// Element `index` of an array.
    fn element(&self, value: &Self::Value, index: i64) -> OracleResult<Self::Value>;

    /// Reinterpret the value as another type without moving it.
    fn cast(&self, value: &Self::Value, ty: &RawType) -> OracleResult<Self::Value>;

    /// The debugger's printed representation (`5`, `(node *) 0x601040 <head>`).
    fn printed(&self, value: &Self::Value) -> OracleResult<String>;

    /// Look a type up by name (`int`, `node`).
    fn lookup_type(&self, name: &str) -> OracleResult<RawType>;
}

/// Stack frame enumeration and selection.
///
/// Selecting a frame is process-wide state in the host debugger: every caller
/// that selects a non-default frame must restore the previous selection on all
/// exit paths. Use [`crate::guards::FrameGuard`] rather than calling
/// [`FrameProvider::select_frame`] directly.
pub trait FrameProvider
{
    /// Currently selected frame.
    fn selected_frame(&self) -> OracleResult<FrameId>;

    /// Innermost frame of the stopped thread.
    fn newest_frame(&self) -> OracleResult<FrameId>;

    /// Make `frame` the evaluation context.
    ///
    /// ## Errors
    ///
    /// - `StaleFrame`: the frame is no longer on the stack
    fn select_frame(&mut self, frame: FrameId) -> OracleResult<()>;

    /// Caller of `frame`, if any.
    fn older_frame(&self, frame: FrameId) -> Option<FrameId>;

    /// Whether `frame` is still on the stack.
    fn is_valid_frame(&self, frame: FrameId) -> bool;

    /// Symbols declared in the frame's block.
    fn frame_symbols(&self, frame: FrameId) -> OracleResult<Vec<SymbolInfo>>;

    /// Symbols of the global block visible from `frame`.
    fn global_symbols(&self, frame: FrameId) -> OracleResult<Vec<SymbolInfo>>;
}

/// The host debugger's memory write observers (hardware watchpoints).
pub trait MutationNotifier
{
    /// Observe writes to `length` bytes at `address`, reporting them on `events`.
    ///
    /// ## Errors
    ///
    /// - `ResourceExhausted`: no observer slot left
    /// - `Memory`: the address cannot be watched
    fn install_observer(&mut self, address: Address, length: usize, events: MutationSender) -> OracleResult<WatchHandle>;

    /// Remove a previously installed observer.
    fn remove_observer(&mut self, handle: WatchHandle) -> OracleResult<()>;
}

/// Everything the traversal core needs from the host debugger.
pub trait Debuggee: ValueAccessor + FrameProvider + MutationNotifier {}

impl<T> Debuggee for T where T: ValueAccessor + FrameProvider + MutationNotifier {}
