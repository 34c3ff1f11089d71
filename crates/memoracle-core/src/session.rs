//! # Snapshot Session
//!
//! A [`Session`] owns everything that lives as long as one execution of the
//! debuggee: the debuggee handle, the [`Repository`], the visitation
//! tracker and the watch registry. Each `serialize_*` call is one pass:
//!
//! - select the target frame (restored afterwards by [`FrameGuard`])
//! - clear the visitation tracker
//! - enumerate the root symbols of the block
//! - run the traversal engine once per root
//!
//! Mutation events reported by the host are handled between passes with
//! [`Session::process_mutations`]; each event re-walks only the names
//! recorded at the written address.
//!
//! ## Example
//!
//! ```rust
//! use memoracle_core::sim::SimProcess;
//! use memoracle_core::types::{Kind, RawType};
//! use memoracle_core::{Session, TraversalConfig};
//!
//! let mut process = SimProcess::new();
//! let main = process.push_frame("main");
//! let x = process.add_local(main, "x", RawType::int())?;
//!
//! let mut session = Session::new(process, TraversalConfig::default());
//! let report = session.serialize_locals(main)?;
//! assert!(report.is_clean());
//! assert_eq!(session.repository().get(Kind::Primitive, x)?.value.as_deref(), Some("0"));
//! # Ok::<(), memoracle_core::OracleError>(())
//! ```

use std::collections::HashSet;

use tracing::{debug, info, info_span, warn};

use crate::config::{ParentHistory, TraversalConfig};
use crate::debuggee::Debuggee;
use crate::error::{OracleError, OracleResult};
use crate::events::MutationEvent;
use crate::guards::FrameGuard;
use crate::repository::Repository;
use crate::sink::EntrySink;
use crate::traversal::{BranchFailure, PassKind, PassReport, Traversal};
use crate::types::{FrameId, SymbolInfo};
use crate::visit::VisitationTracker;
use crate::watch::{Observer, WatchRegistry, WatchRoot};

/// What [`Session::frame_exited`] released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRelease
{
    /// Observers torn down because all their roots lived in the frame.
    pub observers: usize,
    /// Entries dropped because they were only observed in the frame.
    pub entries: usize,
}

/// Snapshot state of one execution.
#[derive(Debug)]
pub struct Session<D: Debuggee>
{
    debuggee: D,
    execution: String,
    config: TraversalConfig,
    repository: Repository,
    tracker: VisitationTracker,
    watches: WatchRegistry,
}

impl<D: Debuggee> Session<D>
{
    pub fn new(debuggee: D, config: TraversalConfig) -> Self
    {
        Self {
            debuggee,
            execution: "execution".to_string(),
            repository: Repository::with_conflict_policy(config.conflict_policy),
            config,
            tracker: VisitationTracker::new(),
            watches: WatchRegistry::new(),
        }
    }

    /// Tag exported records with `execution`.
    #[must_use]
    pub fn with_execution(mut self, execution: impl Into<String>) -> Self
    {
        self.execution = execution.into();
        self
    }

    /// Snapshot every local of `frame`.
    ///
    /// ## Errors
    ///
    /// - `StaleFrame`: `frame` is not on the stack
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn serialize_locals(&mut self, frame: FrameId) -> OracleResult<PassReport>
    {
        let span = info_span!("serialize_locals", %frame);
        let _enter = span.enter();

        let before = self.repository.created();
        self.tracker.begin_pass(self.resets_parents());
        let mut report = PassReport::new(PassKind::Locals);
        let symbols = self.debuggee.frame_symbols(frame)?;
        self.run_block(&mut report, frame, &symbols)?;
        Ok(self.finish(report, before))
    }

    /// Snapshot the global block visible from `frame`.
    ///
    /// ## Errors
    ///
    /// - `StaleFrame`: `frame` is not on the stack
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn serialize_globals(&mut self, frame: FrameId) -> OracleResult<PassReport>
    {
        let span = info_span!("serialize_globals", %frame);
        let _enter = span.enter();

        let before = self.repository.created();
        self.tracker.begin_pass(self.resets_parents());
        let mut report = PassReport::new(PassKind::Globals);
        let symbols = self.debuggee.global_symbols(frame)?;
        self.run_block(&mut report, frame, &symbols)?;
        Ok(self.finish(report, before))
    }

    /// Snapshot the locals of `frame` and of every older frame.
    ///
    /// All frames accumulate into the same repository, so an address reached
    /// from several frames (a global, a caller's buffer) is one entry.
    ///
    /// ## Errors
    ///
    /// - `StaleFrame`: `frame` is not on the stack
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn serialize_upward(&mut self, frame: FrameId) -> OracleResult<PassReport>
    {
        let span = info_span!("serialize_upward", %frame);
        let _enter = span.enter();

        let before = self.repository.created();
        self.tracker.begin_pass(self.resets_parents());
        let mut report = PassReport::new(PassKind::Upward);
        if !self.debuggee.is_valid_frame(frame) {
            return Err(OracleError::StaleFrame(frame));
        }

        let mut current = Some(frame);
        while let Some(frame) = current {
            self.tracker.begin_frame();
            match self.debuggee.frame_symbols(frame) {
                Ok(symbols) => self.run_block(&mut report, frame, &symbols)?,
                Err(err) if err.is_recoverable() => warn!(%frame, error = %err, "skipping frame"),
                Err(err) => return Err(err),
            }
            current = self.debuggee.older_frame(frame);
        }
        Ok(self.finish(report, before))
    }

    fn run_block(&mut self, report: &mut PassReport, frame: FrameId, symbols: &[SymbolInfo]) -> OracleResult<()>
    {
        report.frames.push(frame);
        let mut guard = FrameGuard::new(&mut self.debuggee, frame)?;
        let mut traversal = Traversal::new(
            &mut *guard,
            &mut self.repository,
            &mut self.tracker,
            &mut self.watches,
            &self.config,
            frame,
            report,
        );
        for symbol in symbols.iter().filter(|symbol| !symbol.constant) {
            traversal.traverse_root(&symbol.name)?;
        }
        guard.restore()
    }

    fn finish(&self, mut report: PassReport, before: usize) -> PassReport
    {
        report.created = self.repository.created() - before;
        info!(
            kind = ?report.kind,
            roots = report.roots.len(),
            created = report.created,
            expanded = report.expanded,
            failures = report.failures.len(),
            "pass complete"
        );
        report
    }

    const fn resets_parents(&self) -> bool
    {
        matches!(self.config.parent_history, ParentHistory::PerPass)
    }

    /// Re-walk the names recorded at the address an event reports.
    ///
    /// Each root is re-evaluated in its own frame; when that fails the
    /// address is re-read with the observed type. A root that can no longer
    /// be resolved either way is removed, and the observer is torn down with
    /// its last root. The entries themselves keep their last known values.
    ///
    /// ## Errors
    ///
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn handle_mutation(&mut self, event: MutationEvent) -> OracleResult<PassReport>
    {
        let span = info_span!("handle_mutation", address = %event.address, handle = %event.handle);
        let _enter = span.enter();

        let before = self.repository.created();
        let mut report = PassReport::new(PassKind::Mutation);
        let Some(observer) = self.watches.record_hit(&event) else {
            debug!("event for a removed observer ignored");
            return Ok(report);
        };

        for root in &observer.roots {
            // Incremental passes keep parents recorded from outside the subtree
            self.tracker.begin_pass(false);
            if !report.frames.contains(&root.frame) {
                report.frames.push(root.frame);
            }
            match self.retraverse(&mut report, &observer, root) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(name = %root.name, frame = %root.frame, error = %err, "root no longer resolves, dropping it");
                    report.failures.push(BranchFailure {
                        frame: root.frame,
                        name: root.name.clone(),
                        error: err.to_string(),
                    });
                    if let Err(err) = self.watches.remove_root(&mut self.debuggee, observer.address, root) {
                        warn!(address = %observer.address, error = %err, "failed to remove observer");
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(self.finish(report, before))
    }

    fn retraverse(&mut self, report: &mut PassReport, observer: &Observer, root: &WatchRoot) -> OracleResult<()>
    {
        let mut guard = FrameGuard::new(&mut self.debuggee, root.frame)?;
        let value = match guard.evaluate(&root.name) {
            Ok(value) => value,
            Err(err) => {
                debug!(name = %root.name, error = %err, "falling back to typed read of the address");
                guard.value_at(observer.address, &observer.ty)?
            }
        };

        report.roots.push(root.name.clone());
        let mut traversal = Traversal::new(
            &mut *guard,
            &mut self.repository,
            &mut self.tracker,
            &mut self.watches,
            &self.config,
            root.frame,
            report,
        );
        traversal.visit(&root.name, value, None)?;
        guard.restore()
    }

    /// Handle every event the host reported since the last call.
    ///
    /// Repeated writes to the same observer collapse into one pass.
    ///
    /// ## Errors
    ///
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn process_mutations(&mut self) -> OracleResult<Vec<PassReport>>
    {
        let mut seen = HashSet::new();
        let events = self
            .watches
            .drain_events()
            .into_iter()
            .filter(|event| seen.insert(event.handle))
            .collect::<Vec<_>>();

        let mut reports = Vec::with_capacity(events.len());
        for event in events {
            reports.push(self.handle_mutation(event)?);
        }
        Ok(reports)
    }

    /// Cleanup hook for a frame that went out of scope.
    ///
    /// Tears down observers rooted only in `frame` and releases the entries
    /// that were only observed there.
    ///
    /// ## Errors
    ///
    /// The first error the host reports while removing observers. The
    /// repository is released regardless.
    pub fn frame_exited(&mut self, frame: FrameId) -> OracleResult<FrameRelease>
    {
        let observers = self.watches.teardown_frame(&mut self.debuggee, frame);
        let entries = self.repository.release_frame(frame);
        info!(%frame, entries, "frame exited");
        Ok(FrameRelease {
            observers: observers?,
            entries,
        })
    }

    /// Stream every entry to `sink`. Returns the number of records.
    ///
    /// ## Errors
    ///
    /// Whatever the sink reports.
    pub fn export<S: EntrySink + ?Sized>(&self, sink: &mut S) -> OracleResult<usize>
    {
        let records = self.repository.records(&self.execution);
        for record in &records {
            sink.accept(record)?;
        }
        sink.finish()?;
        Ok(records.len())
    }

    #[must_use]
    pub fn repository(&self) -> &Repository
    {
        &self.repository
    }

    #[must_use]
    pub fn watches(&self) -> &WatchRegistry
    {
        &self.watches
    }

    #[must_use]
    pub fn config(&self) -> &TraversalConfig
    {
        &self.config
    }

    #[must_use]
    pub fn execution(&self) -> &str
    {
        &self.execution
    }

    #[must_use]
    pub fn debuggee(&self) -> &D
    {
        &self.debuggee
    }

    /// Mutable access for driving the debuggee between passes.
    pub fn debuggee_mut(&mut self) -> &mut D
    {
        &mut self.debuggee
    }

    pub fn into_debuggee(self) -> D
    {
        self.debuggee
    }
}
