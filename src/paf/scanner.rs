//! Protocol scanner interface
//!
//! A scanner is registered once and shared by every session. It keeps no
//! per-flow data itself; the state it needs lives in the session and is
//! reached through [`ScanContext`].

use std::any::Any;

use super::state::ScannerSlots;
use super::PacketFlags;
use crate::telemetry::{AnomalyEvent, EventSink};

/// Index of a scanner in the registry (also its mask bit)
pub type ScannerId = usize;

/// Decision returned by a scanner for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No boundary yet, keep feeding bytes
    Search,
    /// Message ends at the flush point
    Flush,
    /// Skip up to the flush point without scanning
    Skip,
    /// Scanner gives up on this direction
    Abort,
}

/// Verdict plus its flush point (relative to the scanned window)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub verdict: Verdict,
    pub flush_point: u32,
}

impl ScanOutcome {
    pub fn search() -> Self {
        Self {
            verdict: Verdict::Search,
            flush_point: 0,
        }
    }

    pub fn abort() -> Self {
        Self {
            verdict: Verdict::Abort,
            flush_point: 0,
        }
    }

    pub fn flush(at: u32) -> Self {
        Self {
            verdict: Verdict::Flush,
            flush_point: at,
        }
    }

    pub fn skip(to: u32) -> Self {
        Self {
            verdict: Verdict::Skip,
            flush_point: to,
        }
    }
}

/// A pluggable per-protocol boundary scanner
pub trait ProtocolScanner: Send + Sync {
    /// Unique name; registering the same name twice reuses its id
    fn name(&self) -> &'static str;

    /// Inspect `data` (the unscanned part of the window) and decide
    fn scan(&self, ctx: &mut ScanContext<'_>, data: &[u8]) -> ScanOutcome;
}

/// Everything a scanner may touch while scanning one window
pub struct ScanContext<'a> {
    scanner: ScannerId,
    flags: PacketFlags,
    own: &'a mut ScannerSlots,
    peer: &'a mut ScannerSlots,
    events: &'a mut dyn EventSink,
}

impl<'a> ScanContext<'a> {
    pub fn new(
        scanner: ScannerId,
        flags: PacketFlags,
        own: &'a mut ScannerSlots,
        peer: &'a mut ScannerSlots,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            scanner,
            flags,
            own,
            peer,
            events,
        }
    }

    pub fn scanner_id(&self) -> ScannerId {
        self.scanner
    }

    /// Direction flags of the segment being scanned
    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    /// This scanner's state for the scanned direction, created on demand
    pub fn state_or_insert_with<T, F>(&mut self, init: F) -> Option<&mut T>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        self.own.get_or_insert_with(self.scanner, init)
    }

    pub fn state_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.own.get_mut(self.scanner)
    }

    /// This scanner's state for the opposite direction, created on demand
    pub fn peer_state_or_insert_with<T, F>(&mut self, init: F) -> Option<&mut T>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        self.peer.get_or_insert_with(self.scanner, init)
    }

    /// Raise an anomaly event (fire and forget)
    pub fn post(&mut self, event: AnomalyEvent) {
        event.emit();
        self.events.post(event);
    }
}
