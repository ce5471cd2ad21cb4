//! # Buffer Pool
//!
//! Arena of fixed-capacity byte buffers that stage overlapped writes.
//!
//! Every slot is in exactly one of three states:
//!
//! - **free**: no outstanding operation references it; its storage is
//!   uniquely owned by the pool
//! - **pending**: submitted to the device, waiting for every descriptor to
//!   report completion
//! - **active**: handed out by [`BufferPool::acquire`] and being filled
//!
//! Two failure states sit outside that cycle. A pending slot whose
//! descriptor failed while sibling chunks were still in flight is
//! **orphaned**: it is not reused until those chunks finish, and
//! [`BufferPool::drain`] waits on them. A slot whose storage is still shared
//! when it would be freed is **abandoned** and never handed out again.
//!
//! Free, pending and orphaned membership are index lists. Slots are addressed through
//! generation-checked [`BufferId`]s; a slot's generation advances every time
//! it returns to the free list, so a handle kept past that point is rejected.
//!
//! Storage is an `Arc<Vec<u8>>`. Submissions hand the device
//! [`SharedRegion`] clones, and the pool only writes through the storage when
//! `Arc::get_mut` proves no region is still alive.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use bridge_traits::{Completion, PendingWrite, SharedRegion};
use tracing::{debug, trace, warn};

use crate::buffer::allocate;
use crate::error::{Result, StreamError};

/// Generation-checked handle to a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Pending,
    Active,
    Orphaned,
    Abandoned,
}

struct Slot {
    generation: u32,
    state: SlotState,
    storage: Arc<Vec<u8>>,
    ops: Vec<Box<dyn PendingWrite>>,
}

impl Slot {
    fn capacity(&self) -> usize {
        self.storage.len()
    }
}

/// Pool of reusable buffers for one asynchronous writer
pub struct BufferPool {
    slots: Vec<Slot>,
    free: VecDeque<usize>,
    // Most recently submitted first
    pending: VecDeque<usize>,
    orphaned: Vec<usize>,
    max_transfer: usize,
}

impl BufferPool {
    /// Creates an empty pool for a device whose descriptors carry at most
    /// `max_transfer` bytes each.
    pub fn new(max_transfer: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            pending: VecDeque::new(),
            orphaned: Vec::new(),
            max_transfer: max_transfer.max(1),
        }
    }

    /// Descriptors needed to express an operation over `capacity` bytes
    pub fn descriptor_slots(&self, capacity: usize) -> usize {
        capacity.div_ceil(self.max_transfer).max(1)
    }

    pub fn max_transfer(&self) -> usize {
        self.max_transfer
    }

    /// Detach a buffer of at least `min_capacity` bytes.
    ///
    /// Completed pending buffers are reclaimed first (without blocking) and
    /// moved to the front of the free list, then the free list is searched
    /// first-fit. A new buffer of exactly `min_capacity` bytes is allocated
    /// when nothing fits.
    pub fn acquire(&mut self, min_capacity: usize) -> Result<BufferId> {
        if min_capacity == 0 {
            return Err(StreamError::Misuse(
                "cannot acquire a zero-capacity buffer".to_string(),
            ));
        }

        self.sweep_completed(false)?;

        let fit = self
            .free
            .iter()
            .position(|&index| self.slots[index].capacity() >= min_capacity);
        if let Some(position) = fit {
            if let Some(index) = self.free.remove(position) {
                let slot = &mut self.slots[index];
                slot.state = SlotState::Active;
                trace!(index, capacity = slot.capacity(), "Reused pooled buffer");
                return Ok(BufferId {
                    index,
                    generation: slot.generation,
                });
            }
        }

        let storage = Arc::new(allocate::<u8>(min_capacity)?);
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Active,
            storage,
            ops: Vec::with_capacity(self.descriptor_slots(min_capacity)),
        });
        debug!(index, capacity = min_capacity, "Allocated pooled buffer");
        Ok(BufferId {
            index,
            generation: 0,
        })
    }

    /// Add caller-provided storage to the free list.
    pub fn adopt(&mut self, storage: Vec<u8>) -> Result<()> {
        if storage.is_empty() {
            return Err(StreamError::Misuse(
                "provided buffer must not be empty".to_string(),
            ));
        }
        let index = self.slots.len();
        let capacity = storage.len();
        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Free,
            storage: Arc::new(storage),
            ops: Vec::with_capacity(self.descriptor_slots(capacity)),
        });
        self.free.push_front(index);
        debug!(index, capacity, "Adopted provided buffer");
        Ok(())
    }

    fn active_slot(&self, id: BufferId) -> Result<&Slot> {
        match self.slots.get(id.index) {
            Some(slot) if slot.generation == id.generation && slot.state == SlotState::Active => {
                Ok(slot)
            }
            _ => Err(StreamError::Misuse(format!("stale buffer handle {:?}", id))),
        }
    }

    fn active_slot_mut(&mut self, id: BufferId) -> Result<&mut Slot> {
        match self.slots.get_mut(id.index) {
            Some(slot) if slot.generation == id.generation && slot.state == SlotState::Active => {
                Ok(slot)
            }
            _ => Err(StreamError::Misuse(format!("stale buffer handle {:?}", id))),
        }
    }

    pub fn capacity(&self, id: BufferId) -> Result<usize> {
        Ok(self.active_slot(id)?.capacity())
    }

    /// Writable view of an active buffer
    pub fn storage_mut(&mut self, id: BufferId) -> Result<&mut [u8]> {
        let slot = self.active_slot_mut(id)?;
        Arc::get_mut(&mut slot.storage)
            .map(|storage| storage.as_mut_slice())
            .ok_or_else(|| {
                StreamError::Internal(format!(
                    "buffer {} is still referenced by a device operation",
                    id.index
                ))
            })
    }

    /// Read-only region of an active buffer to hand to the device
    pub fn region(&self, id: BufferId, range: Range<usize>) -> Result<SharedRegion> {
        let slot = self.active_slot(id)?;
        Ok(SharedRegion::new(Arc::clone(&slot.storage), range))
    }

    /// Move an active buffer to the head of the pending list.
    ///
    /// `descriptors` are the operations just submitted over its contents.
    /// With no descriptors the buffer goes straight back to the free list.
    pub fn release_to_pending(
        &mut self,
        id: BufferId,
        descriptors: Vec<Box<dyn PendingWrite>>,
    ) -> Result<()> {
        if descriptors.is_empty() {
            return self.release_to_free(id);
        }

        let slot = self.active_slot_mut(id)?;
        slot.ops = descriptors;
        slot.state = SlotState::Pending;
        self.pending.push_front(id.index);
        trace!(index = id.index, "Buffer pending");
        Ok(())
    }

    /// Return an active buffer that was never submitted.
    pub fn release_to_free(&mut self, id: BufferId) -> Result<()> {
        self.active_slot(id)?;
        self.retire(id.index);
        Ok(())
    }

    /// Make slot `index` free, invalidating outstanding handles.
    ///
    /// Callers only retire slots with no descriptors left. Storage that is
    /// still shared cannot be written again, so such a slot is abandoned.
    fn retire(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        if Arc::get_mut(&mut slot.storage).is_none() {
            warn!(index, "Abandoning buffer still referenced by the platform");
            slot.state = SlotState::Abandoned;
            return;
        }
        slot.state = SlotState::Free;
        self.free.push_front(index);
    }

    /// Poll the descriptors of one pending slot in order.
    ///
    /// Returns `Ok(true)` once every descriptor has completed. A failed
    /// descriptor is dropped before its error is returned; later descriptors
    /// stay on the slot.
    fn poll_slot(&mut self, index: usize, wait: bool) -> Result<bool> {
        let slot = &mut self.slots[index];
        while let Some(op) = slot.ops.first_mut() {
            match op.poll(wait) {
                Ok(Completion::Complete) => {
                    slot.ops.remove(0);
                }
                Ok(Completion::Incomplete) => return Ok(false),
                Err(err) => {
                    slot.ops.remove(0);
                    return Err(StreamError::device("overlapped write")(err));
                }
            }
        }

        if Arc::get_mut(&mut slot.storage).is_none() {
            return Err(StreamError::Internal(format!(
                "platform retained buffer {} after completion",
                index
            )));
        }
        Ok(true)
    }

    /// Settle slot `index` after one of its descriptors failed.
    fn fail_slot(&mut self, index: usize) {
        if self.slots[index].ops.is_empty() {
            self.retire(index);
        } else {
            let slot = &mut self.slots[index];
            slot.state = SlotState::Orphaned;
            debug!(index, in_flight = slot.ops.len(), "Orphaned failed buffer");
            self.orphaned.push(index);
        }
    }

    /// Advance orphaned slots, retiring those with nothing left in flight.
    ///
    /// Their failure was already reported, so further errors are only
    /// logged. Returns how many slots were retired.
    fn sweep_orphans(&mut self, wait: bool) -> usize {
        let orphaned = std::mem::take(&mut self.orphaned);
        let mut settled = 0;
        for index in orphaned {
            let slot = &mut self.slots[index];
            while let Some(op) = slot.ops.first_mut() {
                match op.poll(wait) {
                    Ok(Completion::Complete) => {
                        slot.ops.remove(0);
                    }
                    Ok(Completion::Incomplete) => break,
                    Err(err) => {
                        warn!(index, error = %err, "Orphaned write failed");
                        slot.ops.remove(0);
                    }
                }
            }
            if slot.ops.is_empty() {
                self.retire(index);
                settled += 1;
            } else {
                self.orphaned.push(index);
            }
        }
        settled
    }

    /// Walk the pending list once, moving fully completed buffers to the
    /// front of the free list. Returns how many buffers were reclaimed.
    ///
    /// With `wait` every descriptor is waited on, so the pending list is
    /// empty afterwards unless an error is returned. A failed buffer leaves
    /// the pending list before its error is returned: it is freed when
    /// nothing else of it is in flight, orphaned otherwise.
    pub fn sweep_completed(&mut self, wait: bool) -> Result<usize> {
        let settled = self.sweep_orphans(wait);
        let pending = std::mem::take(&mut self.pending);
        let mut still_pending = VecDeque::with_capacity(pending.len());
        let mut completed = Vec::new();
        let mut remaining = pending.into_iter();

        while let Some(index) = remaining.next() {
            match self.poll_slot(index, wait) {
                Ok(true) => completed.push(index),
                Ok(false) => still_pending.push_back(index),
                Err(err) => {
                    still_pending.extend(remaining);
                    self.pending = still_pending;
                    for index in completed {
                        self.retire(index);
                    }
                    self.fail_slot(index);
                    return Err(err);
                }
            }
        }

        self.pending = still_pending;
        let reclaimed = completed.len() + settled;
        for index in completed {
            self.retire(index);
        }
        if reclaimed > 0 {
            trace!(reclaimed, pending = self.pending.len(), "Swept completed buffers");
        }
        Ok(reclaimed)
    }

    /// Block until no buffer is pending or orphaned.
    pub fn drain(&mut self) -> Result<()> {
        while !self.pending.is_empty() || !self.orphaned.is_empty() {
            self.sweep_completed(true)?;
        }
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Failed buffers whose sibling chunks are still in flight
    pub fn orphaned_count(&self) -> usize {
        self.orphaned.len()
    }

    /// Total slots ever created
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True while `id` refers to a buffer waiting on the device
    pub fn is_pending(&self, id: BufferId) -> bool {
        matches!(
            self.slots.get(id.index),
            Some(slot) if slot.generation == id.generation && slot.state == SlotState::Pending
        )
    }

    /// Verify list membership against slot state.
    ///
    /// Every slot must appear exactly once in the list matching its state
    /// (active and abandoned slots in none), and free slots must own their
    /// storage.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = vec![0usize; self.slots.len()];
        for &index in self
            .free
            .iter()
            .chain(self.pending.iter())
            .chain(self.orphaned.iter())
        {
            match seen.get_mut(index) {
                Some(count) => *count += 1,
                None => return Err(format!("index {} out of range", index)),
            }
        }

        for (index, slot) in self.slots.iter().enumerate() {
            let in_free = self.free.contains(&index);
            let in_pending = self.pending.contains(&index);
            let in_orphaned = self.orphaned.contains(&index);
            let expected = match slot.state {
                SlotState::Free => in_free,
                SlotState::Pending => in_pending,
                SlotState::Orphaned => in_orphaned,
                SlotState::Active | SlotState::Abandoned => seen[index] == 0,
            };
            if !expected || seen[index] > 1 {
                return Err(format!(
                    "slot {} in state {:?} has wrong membership (free: {}, pending: {}, orphaned: {})",
                    index, slot.state, in_free, in_pending, in_orphaned
                ));
            }
            if slot.state == SlotState::Free
                && (Arc::strong_count(&slot.storage) != 1 || !slot.ops.is_empty())
            {
                return Err(format!("free slot {} is still referenced", index));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("slots", &self.slots.len())
            .field("free", &self.free)
            .field("pending", &self.pending)
            .field("orphaned", &self.orphaned)
            .field("max_transfer", &self.max_transfer)
            .finish()
    }
}
