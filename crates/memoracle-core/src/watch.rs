//! Mutation observer bookkeeping.
//!
//! This module tracks which addresses are observed, under which host handle,
//! and which `(frame, name)` roots must be re-traversed when the memory is
//! written. The host debugger's [`MutationNotifier`] does the actual
//! installing; the registry only keeps ids, roots and hit counts so the
//! session can map an incoming [`MutationEvent`] back to the names to walk.
//!
//! One observer exists per address. A struct and its first field, or an
//! array and its first row, share the observer and simply contribute several
//! roots.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::debuggee::MutationNotifier;
use crate::error::{OracleError, OracleResult};
use crate::events::{event_channel, MutationEvent, MutationReceiver, MutationSender, WatchHandle};
use crate::types::{Address, FrameId, RawType};

/// A name to re-evaluate, and the frame it must be evaluated in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchRoot
{
    pub frame: FrameId,
    pub name: String,
}

impl WatchRoot
{
    pub fn new(frame: FrameId, name: impl Into<String>) -> Self
    {
        Self {
            frame,
            name: name.into(),
        }
    }
}

/// One installed observer.
#[derive(Debug, Clone)]
pub struct Observer
{
    pub handle: WatchHandle,
    pub address: Address,
    pub length: usize,
    /// Names recorded at this address.
    pub roots: BTreeSet<WatchRoot>,
    /// Type used to re-read the address when no root name evaluates any more.
    pub ty: RawType,
    pub hit_count: u64,
}

/// Observers keyed by address, plus the channel the host reports writes on.
#[derive(Debug)]
pub struct WatchRegistry
{
    by_address: HashMap<Address, Observer>,
    by_handle: HashMap<WatchHandle, Address>,
    sender: MutationSender,
    receiver: MutationReceiver,
}

impl Default for WatchRegistry
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl WatchRegistry
{
    #[must_use]
    pub fn new() -> Self
    {
        let (sender, receiver) = event_channel();
        Self {
            by_address: HashMap::new(),
            by_handle: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Observe `address` on behalf of `root`.
    ///
    /// If the address is already observed the root is added to the existing
    /// observer and no new host resource is used.
    ///
    /// ## Errors
    ///
    /// Whatever the notifier reports (`ResourceExhausted`, `Memory`).
    pub fn install<N: MutationNotifier + ?Sized>(
        &mut self,
        notifier: &mut N,
        address: Address,
        root: WatchRoot,
        ty: &RawType,
        length: usize,
    ) -> OracleResult<WatchHandle>
    {
        if let Some(observer) = self.by_address.get_mut(&address) {
            observer.roots.insert(root);
            return Ok(observer.handle);
        }

        let handle = notifier.install_observer(address, length, self.sender.clone())?;
        trace!(%address, %handle, name = %root.name, "installed observer");
        self.by_handle.insert(handle, address);
        self.by_address.insert(
            address,
            Observer {
                handle,
                address,
                length,
                roots: BTreeSet::from([root]),
                ty: ty.clone(),
                hit_count: 0,
            },
        );
        Ok(handle)
    }

    #[must_use]
    pub fn observer(&self, address: Address) -> Option<&Observer>
    {
        self.by_address.get(&address)
    }

    #[must_use]
    pub fn observer_for(&self, handle: WatchHandle) -> Option<&Observer>
    {
        self.by_handle.get(&handle).and_then(|address| self.by_address.get(address))
    }

    /// Count a hit and return a copy of the observer that fired.
    ///
    /// Events for handles that were torn down in the meantime are ignored.
    pub fn record_hit(&mut self, event: &MutationEvent) -> Option<Observer>
    {
        let address = *self.by_handle.get(&event.handle)?;
        let observer = self.by_address.get_mut(&address)?;
        observer.hit_count = observer.hit_count.saturating_add(1);
        Some(observer.clone())
    }

    /// Remove the observer at `address` and release its host handle.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: nothing observes `address`
    /// - whatever the notifier reports while removing
    pub fn teardown<N: MutationNotifier + ?Sized>(&mut self, notifier: &mut N, address: Address) -> OracleResult<Observer>
    {
        let observer = self
            .by_address
            .remove(&address)
            .ok_or_else(|| OracleError::InvalidArgument(format!("no observer at {address}")))?;
        self.by_handle.remove(&observer.handle);
        debug!(%address, handle = %observer.handle, "tearing down observer");
        notifier.remove_observer(observer.handle)?;
        Ok(observer)
    }

    /// Drop `root` from the observer at `address`, tearing the observer down
    /// once no roots remain. Returns whether the observer was torn down.
    ///
    /// ## Errors
    ///
    /// Whatever the notifier reports while removing.
    pub fn remove_root<N: MutationNotifier + ?Sized>(
        &mut self,
        notifier: &mut N,
        address: Address,
        root: &WatchRoot,
    ) -> OracleResult<bool>
    {
        let Some(observer) = self.by_address.get_mut(&address) else {
            return Ok(false);
        };
        observer.roots.remove(root);
        if observer.roots.is_empty() {
            self.teardown(notifier, address)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove every root evaluated in `frame`; observers left without roots
    /// are torn down. Returns the number of observers removed.
    ///
    /// ## Errors
    ///
    /// The first error the notifier reports; remaining observers are still
    /// processed.
    pub fn teardown_frame<N: MutationNotifier + ?Sized>(&mut self, notifier: &mut N, frame: FrameId) -> OracleResult<usize>
    {
        let mut emptied = Vec::new();
        for observer in self.by_address.values_mut() {
            observer.roots.retain(|root| root.frame != frame);
            if observer.roots.is_empty() {
                emptied.push(observer.address);
            }
        }

        let mut first_error = None;
        let removed = emptied.len();
        for address in emptied {
            if let Err(err) = self.teardown(notifier, address) {
                first_error.get_or_insert(err);
            }
        }
        debug!(%frame, removed, "frame observers torn down");

        match first_error {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Events the host reported since the last drain, in arrival order.
    pub fn drain_events(&self) -> Vec<MutationEvent>
    {
        self.receiver.try_iter().collect()
    }

    /// Sender handed to the host with every installed observer.
    #[must_use]
    pub fn sender(&self) -> MutationSender
    {
        self.sender.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_address.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_address.is_empty()
    }

    /// Observed addresses in ascending order.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address>
    {
        let mut addresses = self.by_address.keys().copied().collect::<Vec<_>>();
        addresses.sort_unstable();
        addresses
    }
}
