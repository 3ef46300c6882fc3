//! Flush point engine
//!
//! Drives one session direction at a time:
//! - Tracks sequence numbers (gaps abort, overlaps are trimmed)
//! - Feeds unscanned bytes to the enabled scanners
//! - Turns the winning verdict into a flush length
//!
//! The caller (stream reassembly) passes each new segment together with
//! the number of bytes queued for the direction. A positive return value
//! is the number of queued bytes, counted from the window origin, that
//! make up one message. After cutting them the caller presents the
//! remaining queued bytes again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use super::registry::ScannerRegistry;
use super::scanner::{ScanContext, Verdict};
use super::state::{PafState, ScannerMask, ScannerSlots};
use super::{seq_gt, seq_leq, seq_lt, Direction, PacketFlags, PafStatus, MAX_FLUSH_LEN};
use crate::session::{SessionKey, StreamSession};
use crate::telemetry::EventSink;

/// Why a flush is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushType {
    /// PAF unusable, caller falls back
    Abort,
    /// Cut at the scanner's flush point
    Protocol,
    /// Cut everything queued (size bound reached)
    Max,
}

/// Outcome of one evaluation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Wait,
    Flush(FlushType),
}

/// Scan window of one `check` call
#[derive(Debug)]
struct Window {
    /// Total bytes queued for the direction
    total: u32,
    /// Offset of the next unscanned byte
    idx: u32,
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Evaluations that reached the scanners' state machine
    pub calls: u64,
    /// New bytes handed to evaluation
    pub bytes: u64,
}

/// Protocol-aware flush point engine
pub struct FlushPointEngine {
    registry: Arc<ScannerRegistry>,
    calls: AtomicU64,
    bytes: AtomicU64,
}

impl FlushPointEngine {
    pub fn new(registry: Arc<ScannerRegistry>) -> Self {
        Self {
            registry,
            calls: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &ScannerRegistry {
        &self.registry
    }

    /// Bind a fresh state to the scanners registered for (port, direction)
    pub fn setup(&self, state: &mut PafState, port: u16, direction: Direction) {
        state.reset(self.registry.binding(port, direction).mask);
    }

    /// Release scanner state and stop PAF for this direction
    pub fn clear(&self, state: &mut PafState) {
        state.scanner_private.release();
        state.status = PafStatus::Abort;
    }

    pub fn enabled(&self, port: u16, direction: Direction, flush: bool) -> bool {
        self.registry.is_enabled(port, direction, flush)
    }

    /// Create a session with both directions set up for `port`
    pub fn open_session(&self, key: SessionKey, port: u16) -> StreamSession {
        let mut session = StreamSession::new(key, port);
        self.reset_session(&mut session);
        session
    }

    /// Rebind both directions (connection reuse)
    pub fn reset_session(&self, session: &mut StreamSession) {
        let port = session.port();
        for direction in [Direction::ToServer, Direction::ToClient] {
            self.setup(session.state_mut(direction), port, direction);
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            calls: self.calls.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Evaluate a new segment and return the flush length (0 = buffer more)
    ///
    /// `total` counts every byte queued for the direction, `data` included.
    /// `flags` carries the direction in and PDU head/tail bits out.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &self,
        session: &mut StreamSession,
        direction: Direction,
        data: &[u8],
        total: u32,
        seq: u32,
        flags: &mut PacketFlags,
        fuzz: u32,
    ) -> u32 {
        let (state, peer, events) = session.parts_mut(direction);
        let mut data = data;
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);

        debug!(
            "paf check: len={}, total={}, seq={}, cur={}, pos={}, fpt={}, tot={}, status={:?}",
            len,
            total,
            seq,
            state.tracked_seq,
            state.window_start,
            state.flush_target,
            state.accumulated_len,
            state.status
        );

        if !state.is_initialized() {
            state.tracked_seq = seq;
            state.window_start = seq;
            state.status = PafStatus::Search;
        } else if seq_gt(seq, state.tracked_seq) {
            // a hole in the stream, can't find boundaries past it
            debug!("paf gap: seq={}, expected={}", seq, state.tracked_seq);
            flags.clear();
            state.abort();
            return 0;
        } else if seq_leq(seq.wrapping_add(len), state.tracked_seq) {
            return 0;
        } else if seq_lt(seq, state.tracked_seq) {
            let shift = state.tracked_seq.wrapping_sub(seq) as usize;
            data = &data[shift.min(data.len())..];
        }
        let len = data.len() as u32;
        state.tracked_seq = state.tracked_seq.wrapping_add(len);

        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(u64::from(len), Ordering::Relaxed);

        let mut win = Window {
            total,
            idx: total.saturating_sub(len),
        };
        let limit = self.registry.max_flush_point().saturating_add(fuzz);
        // scanners see the direction being checked, whatever the caller set
        let mut dir_flags = *flags;
        dir_flags.remove(PacketFlags::FROM_CLIENT | PacketFlags::FROM_SERVER);
        dir_flags.insert(direction.packet_flags());

        loop {
            let idx = win.idx;
            let prior = state.status;

            match self.eval(state, &mut peer.scanner_private, events, &mut win, dir_flags, limit, data) {
                Step::Flush(ft) => {
                    let fp = Self::flush(state, &win, ft, flags);
                    return Self::advance(state, fp);
                }
                Step::Wait => break,
                Step::Continue => {}
            }

            if win.idx > idx {
                let shift = (win.idx - idx).min(data.len() as u32);
                data = &data[shift as usize..];
            } else if prior == PafStatus::Skip && state.status == PafStatus::Skip {
                // a scanner that skips nothing would spin here
                break;
            }
        }

        if state.status != PafStatus::Flush && win.total > limit {
            let fp = Self::flush(state, &win, FlushType::Max, flags);
            return Self::advance(state, fp);
        }
        0
    }

    #[allow(clippy::too_many_arguments)]
    fn eval(
        &self,
        state: &mut PafState,
        peer: &mut ScannerSlots,
        events: &mut dyn EventSink,
        win: &mut Window,
        flags: PacketFlags,
        limit: u32,
        data: &[u8],
    ) -> Step {
        debug!(
            "paf eval: status={:?}, idx={}, total={}, fpt={}",
            state.status, win.idx, win.total, state.flush_target
        );

        match state.status {
            PafStatus::Search => {
                if win.total > win.idx {
                    return self.multiplex(state, peer, events, win, flags, data);
                }
                Step::Wait
            }
            PafStatus::Flush => {
                if win.total >= state.flush_target {
                    state.status = PafStatus::Search;
                    return Step::Flush(FlushType::Protocol);
                }
                if win.total >= limit {
                    return Step::Flush(FlushType::Max);
                }
                Step::Wait
            }
            PafStatus::Skip => {
                if win.total <= state.flush_target {
                    return Step::Wait;
                }
                let mut data = data;
                if state.flush_target > win.idx {
                    let delta = (state.flush_target - win.idx) as usize;
                    if delta > data.len() {
                        return Step::Wait;
                    }
                    data = &data[delta..];
                }
                win.idx = state.flush_target;
                self.multiplex(state, peer, events, win, flags, data)
            }
            PafStatus::Start | PafStatus::Abort => Step::Flush(FlushType::Abort),
        }
    }

    /// Offer the window to each enabled scanner; first decisive one wins
    fn multiplex(
        &self,
        state: &mut PafState,
        peer: &mut ScannerSlots,
        events: &mut dyn EventSink,
        win: &mut Window,
        flags: PacketFlags,
        data: &[u8],
    ) -> Step {
        let mut verdict = Verdict::Search;
        let mut update = false;

        for id in state.scanner_mask.iter() {
            let Some(scanner) = self.registry.scanner(id) else {
                state.scanner_mask.remove(id);
                state.scanner_private.remove(id);
                continue;
            };
            debug!("paf scan: mask={:#04x}, id={}", state.scanner_mask.bits(), id);

            let outcome = {
                let mut ctx = ScanContext::new(id, flags, &mut state.scanner_private, peer, events);
                scanner.scan(&mut ctx, data)
            };
            verdict = outcome.verdict;
            state.flush_target = outcome.flush_point;

            match verdict {
                Verdict::Abort => {
                    state.scanner_mask.remove(id);
                    state.scanner_private.remove(id);
                }
                Verdict::Search => {}
                Verdict::Flush | Verdict::Skip => {
                    state.scanner_mask = ScannerMask::single(id);
                    update = true;
                    break;
                }
            }
        }

        if state.scanner_mask.is_empty() {
            state.abort();
            update = true;
        } else {
            match verdict {
                Verdict::Search => state.status = PafStatus::Search,
                Verdict::Flush => state.status = PafStatus::Flush,
                Verdict::Skip => state.status = PafStatus::Skip,
                Verdict::Abort => {}
            }
        }

        if update {
            state.flush_target = state.flush_target.saturating_add(win.idx);
            if state.flush_target <= win.total {
                win.idx = state.flush_target;
                return Step::Continue;
            }
        }
        win.idx = win.total;
        Step::Wait
    }

    fn flush(state: &mut PafState, win: &Window, ft: FlushType, flags: &mut PacketFlags) -> u32 {
        flags.remove(PacketFlags::PDU_HEAD | PacketFlags::PDU_TAIL);

        debug!(
            "paf flush: type={:?}, fpt={}, len={}, tot={}",
            ft, state.flush_target, win.total, state.accumulated_len
        );

        let at = match ft {
            FlushType::Abort => {
                flags.clear();
                return 0;
            }
            FlushType::Protocol => {
                flags.insert(PacketFlags::PDU_TAIL);
                state.flush_target
            }
            // the caller may end up flushing less than total (e.g. when
            // capped by its own packet size) but fpt is reduced by the
            // requested amount
            FlushType::Max => {
                state.flush_target = state.flush_target.saturating_sub(win.total);
                win.total
            }
        };

        if at == 0 || win.total == 0 {
            return 0;
        }
        let at = at.min(MAX_FLUSH_LEN);

        if state.accumulated_len == 0 {
            flags.insert(PacketFlags::PDU_HEAD);
        }
        if flags.contains(PacketFlags::PDU_TAIL) {
            state.accumulated_len = 0;
        } else {
            state.accumulated_len = state.accumulated_len.saturating_add(at);
        }
        at
    }

    /// Move the window origin past a flush; bytes beyond it get re-presented
    fn advance(state: &mut PafState, fp: u32) -> u32 {
        if fp > 0 {
            state.window_start = state.window_start.wrapping_add(fp);
            state.tracked_seq = state.window_start;
        }
        fp
    }
}

impl std::fmt::Debug for FlushPointEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushPointEngine")
            .field("registry", &self.registry)
            .field("stats", &self.stats())
            .finish()
    }
}
