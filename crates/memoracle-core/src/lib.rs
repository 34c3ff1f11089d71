//! # memoracle-core
//!
//! Memory-graph snapshots of a stopped debuggee.
//!
//! Starting from the variables visible in a stack frame, the traversal engine
//! follows pointers, array elements and struct fields, and records every
//! reached location in a [`Repository`] keyed by `(kind, address)`. Aliases
//! and cycles collapse into single entries with parent/child links, so the
//! result is a graph rather than a tree. Optional write observers keep the
//! snapshot current: when observed memory changes, only the affected names
//! are walked again.
//!
//! This crate provides:
//! - The debuggee interface ([`ValueAccessor`], [`FrameProvider`],
//!   [`MutationNotifier`])
//! - Type classification and true-type recovery for disguised pointers and
//!   arrays
//! - The deduplicating entry repository and its JSON-lines export
//! - The traversal engine and the per-execution [`Session`]
//! - An in-memory simulated process ([`sim::SimProcess`])
//!
//! ## Usage
//!
//! ```rust
//! use memoracle_core::prelude::*;
//!
//! let mut process = SimProcess::new();
//! process.define_struct("node", &[("value", "int"), ("next", "node *")])?;
//! let main = process.push_frame("main");
//! let head = process.add_local(main, "head", process.parse_type("node")?)?;
//! process.write_pointer(head + 8, head)?;
//!
//! let mut session = Session::new(process, TraversalConfig::default());
//! session.serialize_locals(main)?;
//!
//! let node = session.repository().get(Kind::Struct, head)?;
//! assert!(node.has_parent(Relation::Pointer, head + 8));
//! # Ok::<(), OracleError>(())
//! ```

pub mod classify;
pub mod config;
pub mod debuggee;
pub mod error;
pub mod events;
pub mod guards;
pub mod prelude;
pub mod repository;
pub mod session;
pub mod sim;
pub mod sink;
pub mod traversal;
pub mod types;
pub mod visit;
pub mod watch;

pub use config::{ConflictPolicy, ParentHistory, TraversalConfig};
pub use debuggee::{Debuggee, FrameProvider, MutationNotifier, ValueAccessor};
// Re-export commonly used types
pub use error::{OracleError, OracleResult};
pub use repository::{Entry, EntryStatus, Repository};
pub use session::{FrameRelease, Session};
pub use sink::{EntryRecord, EntrySink, JsonLinesSink};
pub use traversal::{PassKind, PassReport};
