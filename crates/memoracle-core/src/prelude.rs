//! Common module for library exports

pub use crate::config::{ConflictPolicy, ParentHistory, TraversalConfig};
pub use crate::debuggee::{Debuggee, FrameProvider, MutationNotifier, ValueAccessor};
pub use crate::error::{OracleError, OracleResult};
pub use crate::events::{MutationEvent, WatchHandle};
pub use crate::repository::{ChildLabel, ChildRef, Entry, EntryStatus, Repository, Shape};
pub use crate::session::{FrameRelease, Session};
pub use crate::sim::{SimProcess, SimValue};
pub use crate::sink::{EntryRecord, EntrySink, JsonLinesSink};
pub use crate::traversal::{PassKind, PassReport};
pub use crate::types::{Address, FrameId, Kind, RawType, Relation, TypeCode, TypeDescriptor};
