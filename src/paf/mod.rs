//! Protocol-Aware Flushing
//!
//! Decides where one application message ends in a reassembled TCP
//! byte stream so inspection sees whole messages:
//! - Sequence tracking with gap / overlap handling
//! - Multiplexing of registered protocol scanners
//! - Size-bounded fallback when no boundary is found

pub mod engine;
pub mod registry;
pub mod scanner;
pub mod state;

#[cfg(test)]
pub(crate) mod harness;

pub use engine::{EngineStats, FlushPointEngine};
pub use registry::{PortBinding, RegistryBuilder, RegistryError, ScannerRegistry};
pub use scanner::{ProtocolScanner, ScanContext, ScanOutcome, ScannerId, Verdict};
pub use state::{PafState, ScannerMask, ScannerSlots};

use std::ops::{BitOr, BitOrAssign};

/// Default maximum flush point, kept below a 16-bit segment ceiling
pub const DEFAULT_MAX_FLUSH_POINT: u32 = 65_535 - 255;

/// Largest flush length handed back to the caller
pub const MAX_FLUSH_LEN: u32 = 0x7FFF_FFFF;

/// Status of one session direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PafStatus {
    /// Not yet seen any data
    #[default]
    Start,
    /// Scanning for a boundary
    Search,
    /// Boundary known, waiting for enough queued bytes
    Flush,
    /// Skipping bytes without scanning
    Skip,
    /// Protocol awareness lost for this direction (terminal)
    Abort,
}

/// Traffic direction of a session half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server (requests)
    ToServer,
    /// Server to client (responses)
    ToClient,
}

impl Direction {
    /// The opposite half of the session
    pub fn peer(self) -> Self {
        match self {
            Direction::ToServer => Direction::ToClient,
            Direction::ToClient => Direction::ToServer,
        }
    }

    /// Packet flags describing a segment travelling in this direction
    pub fn packet_flags(self) -> PacketFlags {
        match self {
            Direction::ToServer => PacketFlags::FROM_CLIENT,
            Direction::ToClient => PacketFlags::FROM_SERVER,
        }
    }
}

/// Per-segment flags exchanged with the reassembler
///
/// Direction bits go in, PDU boundary bits come out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u32);

impl PacketFlags {
    pub const EMPTY: Self = Self(0);
    pub const FROM_SERVER: Self = Self(0x0040);
    pub const FROM_CLIENT: Self = Self(0x0080);
    /// First piece of a message
    pub const PDU_HEAD: Self = Self(0x0100);
    /// Last piece of a message
    pub const PDU_TAIL: Self = Self(0x0200);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn is_from_client(self) -> bool {
        self.contains(Self::FROM_CLIENT)
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// 32-bit serial number comparisons (RFC 1982 style)

#[inline]
pub(crate) fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[inline]
pub(crate) fn seq_leq(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}

#[inline]
pub(crate) fn seq_gt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_wraparound() {
        assert!(seq_gt(5, u32::MAX - 5));
        assert!(seq_lt(u32::MAX - 5, 5));
        assert!(seq_leq(7, 7));
        assert!(!seq_gt(7, 7));
    }

    #[test]
    fn test_packet_flags() {
        let mut flags = Direction::ToServer.packet_flags();
        assert!(flags.is_from_client());

        flags |= PacketFlags::PDU_HEAD | PacketFlags::PDU_TAIL;
        assert!(flags.contains(PacketFlags::PDU_HEAD));

        flags.remove(PacketFlags::PDU_HEAD);
        assert!(!flags.contains(PacketFlags::PDU_HEAD));
        assert!(flags.contains(PacketFlags::PDU_TAIL));

        flags.clear();
        assert_eq!(flags, PacketFlags::EMPTY);
    }

    #[test]
    fn test_direction_peer() {
        assert_eq!(Direction::ToServer.peer(), Direction::ToClient);
        assert!(!Direction::ToClient.packet_flags().is_from_client());
    }
}
