//! Double-buffered publication of chart geometry.
//!
//! Recomputation happens off the consumer thread on a scratch buffer;
//! the consumer keeps rendering the last committed snapshot until a new
//! one swaps in atomically. An epoch counter detects updates that were
//! invalidated mid-flight (comparison changed, security removed): a
//! stale scratch fails to commit and its work is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::elements::Snapshot;

#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    current: RwLock<Option<Arc<Snapshot>>>,
    epoch: AtomicU64,
}

/// Token tying an in-progress recompute to the epoch it started under.
#[derive(Debug, Clone, Copy)]
pub struct Scratch {
    epoch: u64,
}

impl Scratch {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current epoch before starting a recompute.
    pub fn begin_update(&self) -> Scratch {
        Scratch {
            epoch: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Invalidate every in-flight update. Their commits will be refused
    /// and the previously published snapshot stays visible.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Publish `snapshot` if no invalidation happened since `scratch` was
    /// taken. Returns false when the update lost the race; the caller
    /// drops its work.
    pub fn commit(&self, scratch: Scratch, mut snapshot: Snapshot) -> bool {
        if self.epoch.load(Ordering::Acquire) != scratch.epoch {
            debug!(epoch = scratch.epoch, "discarding stale snapshot");
            return false;
        }
        snapshot.epoch = scratch.epoch;
        let shared = snapshot.into_shared();
        let mut slot = match self.current.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Re-check under the lock so an invalidate between the load and
        // the write cannot publish a stale frame
        if self.epoch.load(Ordering::Acquire) != scratch.epoch {
            return false;
        }
        *slot = Some(shared);
        true
    }

    /// Last committed snapshot, or None before the first commit. The
    /// returned Arc stays valid while newer snapshots replace it.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        let slot = match self.current.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone()
    }
}
