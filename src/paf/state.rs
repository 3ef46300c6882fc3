//! Per-direction PAF state
//!
//! One `PafState` exists for each half of a session. It is owned by the
//! session and only touched by the flow processing that session.

use std::any::Any;

use super::PafStatus;

/// Maximum number of distinct scanners (one bit each)
pub const MAX_SCANNERS: usize = 8;

/// Bitmask of scanner ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScannerMask(u8);

impl ScannerMask {
    pub const EMPTY: Self = Self(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn single(id: usize) -> Self {
        debug_assert!(id < MAX_SCANNERS);
        Self(1 << id)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, id: usize) -> bool {
        id < MAX_SCANNERS && self.0 & (1 << id) != 0
    }

    pub fn insert(&mut self, id: usize) {
        if id < MAX_SCANNERS {
            self.0 |= 1 << id;
        }
    }

    pub fn remove(&mut self, id: usize) {
        if id < MAX_SCANNERS {
            self.0 &= !(1 << id);
        }
    }

    /// Enabled ids in increasing order
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_SCANNERS).filter(move |&i| self.0 & (1 << i) != 0)
    }
}

/// Scanner-owned private state, one typed slot per scanner id
///
/// Slots are created lazily by the scanner and dropped with the owning
/// `PafState`.
#[derive(Default)]
pub struct ScannerSlots {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl ScannerSlots {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Typed access to a scanner's slot, if it holds a `T`
    pub fn get<T: Any + Send>(&self, id: usize) -> Option<&T> {
        self.slots.get(id)?.as_ref()?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any + Send>(&mut self, id: usize) -> Option<&mut T> {
        self.slots.get_mut(id)?.as_mut()?.downcast_mut::<T>()
    }

    /// Get the slot's value, creating it with `init` when empty
    ///
    /// Returns `None` when the slot already holds a value of another type.
    pub fn get_or_insert_with<T, F>(&mut self, id: usize, init: F) -> Option<&mut T>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        if self.slots.len() <= id {
            self.slots.resize_with(id + 1, || None);
        }
        let slot = &mut self.slots[id];
        if slot.is_none() {
            *slot = Some(Box::new(init()));
        }
        slot.as_mut()?.downcast_mut::<T>()
    }

    /// First slot holding a `T`, regardless of scanner id
    pub fn find<T: Any + Send>(&self) -> Option<&T> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .find_map(|state| state.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Drop one scanner's state
    pub fn remove(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = None;
        }
    }

    /// Drop every scanner's state
    pub fn release(&mut self) {
        self.slots.clear();
    }
}

impl std::fmt::Debug for ScannerSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i)
            .collect();
        f.debug_struct("ScannerSlots").field("used", &used).finish()
    }
}

/// PAF state of one session direction
#[derive(Debug, Default)]
pub struct PafState {
    pub(crate) status: PafStatus,
    pub(crate) scanner_mask: ScannerMask,
    /// Next expected sequence number
    pub(crate) tracked_seq: u32,
    /// Sequence number of the current window origin
    pub(crate) window_start: u32,
    /// Cut offset relative to the window origin
    pub(crate) flush_target: u32,
    /// Bytes already flushed for the message in progress
    pub(crate) accumulated_len: u32,
    pub(crate) scanner_private: ScannerSlots,
}

impl PafState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PafStatus {
        self.status
    }

    pub fn scanner_mask(&self) -> ScannerMask {
        self.scanner_mask
    }

    pub fn tracked_seq(&self) -> u32 {
        self.tracked_seq
    }

    pub fn window_start(&self) -> u32 {
        self.window_start
    }

    pub fn flush_target(&self) -> u32 {
        self.flush_target
    }

    pub fn accumulated_len(&self) -> u32 {
        self.accumulated_len
    }

    pub fn scanner_private(&self) -> &ScannerSlots {
        &self.scanner_private
    }

    pub fn is_initialized(&self) -> bool {
        self.status != PafStatus::Start
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.status, PafStatus::Abort) && !self.scanner_mask.is_empty()
    }

    /// Reset to a fresh state bound to `mask`, dropping scanner state
    pub(crate) fn reset(&mut self, mask: ScannerMask) {
        *self = Self {
            scanner_mask: mask,
            ..Self::default()
        };
    }

    /// Permanently stop protocol awareness for this direction
    pub(crate) fn abort(&mut self) {
        self.scanner_private.release();
        self.scanner_mask = ScannerMask::EMPTY;
        self.status = PafStatus::Abort;
    }
}
