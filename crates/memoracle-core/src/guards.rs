//! # RAII Frame Selection Guard
//!
//! Selecting a stack frame changes the host debugger's evaluation context for
//! everyone. [`FrameGuard`] selects a frame and puts the previous selection
//! back when dropped, so the restoration happens on success, on `?` early
//! returns, and during unwinding alike.
//!
//! ## Example
//!
//! ```rust
//! use memoracle_core::guards::FrameGuard;
//! use memoracle_core::sim::SimProcess;
//! use memoracle_core::types::RawType;
//! use memoracle_core::{FrameProvider, ValueAccessor};
//!
//! let mut process = SimProcess::new();
//! let main = process.push_frame("main");
//! process.add_local(main, "x", RawType::int()).unwrap();
//! let helper = process.push_frame("helper");
//! {
//!     let guard = FrameGuard::new(&mut process, main)?;
//!     // `x` is only visible while `main` is selected
//!     guard.evaluate("x")?;
//! }
//! assert_eq!(process.selected_frame()?, helper);
//! # Ok::<(), memoracle_core::OracleError>(())
//! ```

use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::debuggee::FrameProvider;
use crate::error::{OracleError, OracleResult};
use crate::types::FrameId;

/// RAII guard that selects a frame and restores the previous one when dropped.
pub struct FrameGuard<'a, D: FrameProvider + ?Sized>
{
    debuggee: &'a mut D,
    previous: Option<FrameId>,
    active: bool,
}

impl<'a, D: FrameProvider + ?Sized> FrameGuard<'a, D>
{
    /// Select `frame`, remembering the current selection.
    ///
    /// ## Errors
    ///
    /// - `StaleFrame`: `frame` is no longer on the stack
    pub fn new(debuggee: &'a mut D, frame: FrameId) -> OracleResult<Self>
    {
        if !debuggee.is_valid_frame(frame) {
            return Err(OracleError::StaleFrame(frame));
        }
        let previous = debuggee.selected_frame().ok();
        if previous != Some(frame) {
            debuggee.select_frame(frame)?;
        }

        Ok(Self {
            debuggee,
            previous,
            active: true,
        })
    }

    /// Restore the previous selection before the guard is dropped.
    ///
    /// After calling this method, dropping the guard is a no-op.
    pub fn restore(mut self) -> OracleResult<()>
    {
        self.active = false;
        self.reselect()
    }

    fn reselect(&mut self) -> OracleResult<()>
    {
        match self.previous {
            Some(previous) if self.debuggee.is_valid_frame(previous) => self.debuggee.select_frame(previous),
            _ => Ok(()),
        }
    }
}

impl<D: FrameProvider + ?Sized> Deref for FrameGuard<'_, D>
{
    type Target = D;

    fn deref(&self) -> &Self::Target
    {
        self.debuggee
    }
}

impl<D: FrameProvider + ?Sized> DerefMut for FrameGuard<'_, D>
{
    fn deref_mut(&mut self) -> &mut Self::Target
    {
        self.debuggee
    }
}

impl<D: FrameProvider + ?Sized> Drop for FrameGuard<'_, D>
{
    fn drop(&mut self)
    {
        if self.active {
            // Best effort restore - the previous frame may have been popped
            if let Err(err) = self.reselect() {
                debug!(error = %err, "failed to restore previously selected frame");
            }
        }
    }
}
