//! # Types
//!
//! Shared vocabulary of the memory graph.
//!
//! These types sit between the host debugger (which reports [`RawType`]s and
//! addresses) and the traversal engine (which records [`Kind`]s and
//! [`TypeDescriptor`]s), so that neither side needs to know the other's
//! representation.

pub mod address;
pub mod frame;
pub mod kind;
pub mod raw;

// Re-export all public types
pub use address::Address;
pub use frame::{FrameId, SymbolInfo};
pub use kind::{Kind, Relation, TypeDescriptor};
pub use raw::{RawType, TypeCode};
