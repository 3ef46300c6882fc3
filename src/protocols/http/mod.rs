//! HTTP message boundary scanner
//!
//! Does the least HTTP parsing needed to find where a message ends:
//! - Tells requests from responses and notes the version
//! - Remembers HEAD requests so the matching response has no body
//! - Reads Content-Length, or follows chunked encoding chunk by chunk
//!
//! Scanning is two-step and byte-at-a-time. The line framer below finds
//! end-of-line and end-of-headers and unfolds continuation lines; the
//! token machine in [`fsm`] recognizes the few tokens that matter.
//! `\r` is ignored throughout.

pub mod fsm;

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use self::fsm::{
    Action, Fsm, FsmError, State, CHUNK_START, EOL, LWS, REQUEST_START, RESPONSE_START, SKIP_LINE,
};
use crate::paf::{Direction, ProtocolScanner, ScanContext, ScanOutcome, Verdict};
use crate::session::StreamSession;
use crate::telemetry::{self, AnomalyEvent};

/// Largest content length that can take another decimal digit
const MAX_DECIMAL_LEN: u32 = 429_496_728;
/// Chunk sizes with any of these bits set can't take another hex digit
const HEX_OVERFLOW_MASK: u32 = 0xF800_0000;

/// Per-message parse flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HttpFlags(u16);

impl HttpFlags {
    pub const REQUEST: Self = Self(0x0001);
    pub const RESPONSE: Self = Self(0x0002);
    /// Content-Length (or chunk size) known
    pub const HAS_LENGTH: Self = Self(0x0004);
    /// Transfer-Encoding: chunked
    pub const CHUNKED: Self = Self(0x0008);
    /// HEAD request, or response without body
    pub const NO_BODY: Self = Self(0x0010);
    /// Chunked body in progress, don't flush at eol
    pub const NO_FLUSH: Self = Self(0x0020);
    pub const HTTP_0_9: Self = Self(0x0040);
    pub const HTTP_1_0: Self = Self(0x0080);
    pub const HTTP_1_1: Self = Self(0x0100);
    /// Deferred abort (checked at end of headers)
    pub const ERROR: Self = Self(0x0200);
    pub const POST: Self = Self(0x0400);
    /// At least one end-of-line seen
    pub const SEEN_EOL: Self = Self(0x0800);

    pub fn bits(self) -> u16 {
        self.0
    }

    /// True if every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for HttpFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Where the line framer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Inside a line
    InLine,
    /// Just past an end-of-line; the next byte decides folding or end of headers
    AfterEol,
    /// Start of a trailer line after the last chunk
    TrailerStart,
    /// Inside a trailer line
    TrailerLine,
}

/// Scan state of one direction, kept in the session between segments
#[derive(Debug, Clone)]
pub struct HttpScanState {
    len: u32,
    flags: HttpFlags,
    fsm: State,
    line: LineState,
}

impl HttpScanState {
    pub fn new(from_client: bool) -> Self {
        let mut state = Self {
            len: 0,
            flags: HttpFlags::default(),
            fsm: REQUEST_START,
            line: LineState::InLine,
        };
        state.reset(from_client);
        state
    }

    /// Get ready for the next message
    fn reset(&mut self, from_client: bool) {
        self.len = 0;
        self.line = LineState::InLine;
        if from_client {
            self.fsm = REQUEST_START;
            self.flags = HttpFlags::REQUEST;
        } else {
            self.fsm = RESPONSE_START;
            self.flags = HttpFlags::RESPONSE;
        }
    }

    /// Content length or chunk size accumulated so far
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn flags(&self) -> HttpFlags {
        self.flags
    }

    pub fn line(&self) -> LineState {
        self.line
    }

    pub fn is_simple_request(&self) -> bool {
        self.flags.contains(HttpFlags::HTTP_0_9)
    }

    /// Enter chunk-size scanning after the headers
    fn start_chunks(&mut self) {
        self.flags.insert(HttpFlags::NO_FLUSH);
        self.flags.remove(HttpFlags::CHUNKED);
        self.fsm = CHUNK_START;
        self.len = 0;
    }
}

/// Snapshot of scanner counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScannerStats {
    pub calls: u64,
    pub bytes: u64,
}

/// Result of scanning one window
struct WindowScan {
    verdict: Verdict,
    flush_point: u32,
    consumed: usize,
    /// A HEAD request just completed
    head_done: bool,
}

/// HTTP boundary scanner, shared by all sessions
pub struct HttpScanner {
    fsm: Fsm,
    /// Stop scanning once this many bytes have been seen (0 = never)
    byte_cap: u64,
    calls: AtomicU64,
    bytes: AtomicU64,
}

impl HttpScanner {
    pub const NAME: &'static str = "http";

    pub fn new() -> Result<Self, FsmError> {
        Self::with_byte_cap(0)
    }

    pub fn with_byte_cap(cap: u32) -> Result<Self, FsmError> {
        Ok(Self {
            fsm: Fsm::new()?,
            byte_cap: u64::from(cap),
            calls: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> ScannerStats {
        ScannerStats {
            calls: self.calls.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Whether the client side of the session sent an HTTP/0.9 request
    pub fn is_simple_request(session: &StreamSession) -> bool {
        session
            .scanner_state::<HttpScanState>(Direction::ToServer)
            .map_or(false, HttpScanState::is_simple_request)
    }

    fn scan_window(
        &self,
        st: &mut HttpScanState,
        data: &[u8],
        from_client: bool,
        raised: &mut Vec<AnomalyEvent>,
    ) -> WindowScan {
        let mut scan = WindowScan {
            verdict: Verdict::Search,
            flush_point: 0,
            consumed: 0,
            head_done: false,
        };
        let mut n = 0;

        while n < data.len() {
            // jump to the next linefeed while skipping a line
            if st.line == LineState::InLine && st.fsm == SKIP_LINE {
                match data[n..].iter().position(|&b| b == b'\n') {
                    Some(i) => n += i,
                    None => {
                        n = data.len();
                        break;
                    }
                }
            }
            let c = data[n];
            n += 1;

            let verdict = self.scan_byte(st, c, raised);
            if verdict == Verdict::Search {
                continue;
            }
            scan.verdict = verdict;

            if st.flags.contains(HttpFlags::ERROR) {
                // flush everything; later calls abort
                scan.flush_point = u32::try_from(data.len()).unwrap_or(u32::MAX);
                break;
            }
            scan.flush_point = st.len.saturating_add(n as u32);
            scan.head_done = st.flags.contains(HttpFlags::NO_BODY | HttpFlags::REQUEST);

            if verdict != Verdict::Skip {
                st.reset(from_client);
            }
            break;
        }
        scan.consumed = n;
        scan
    }

    /// Line framing
    fn scan_byte(&self, st: &mut HttpScanState, c: u8, raised: &mut Vec<AnomalyEvent>) -> Verdict {
        if c == b'\r' {
            return Verdict::Search;
        }
        match st.line {
            LineState::InLine => {
                if c != b'\n' {
                    return self.step(st, c, raised);
                }
                if !st.flags.contains(HttpFlags::SEEN_EOL) {
                    // first line is decided right away (simple requests have no headers)
                    st.flags.insert(HttpFlags::SEEN_EOL);
                    let verdict = self.step(st, EOL, raised);
                    if st.flags.contains(HttpFlags::HTTP_0_9) {
                        return self.end_of_headers(st, raised);
                    }
                    st.line = LineState::AfterEol;
                    verdict
                } else if st.flags.contains(HttpFlags::NO_FLUSH) {
                    self.step(st, EOL, raised)
                } else {
                    st.line = LineState::AfterEol;
                    Verdict::Search
                }
            }
            LineState::AfterEol => {
                let verdict = match c {
                    b'\n' => {
                        self.step(st, EOL, raised);
                        self.end_of_headers(st, raised)
                    }
                    // folded header, the line goes on
                    b' ' | b'\t' => self.step(st, LWS, raised),
                    _ => match self.step(st, EOL, raised) {
                        Verdict::Search => self.step(st, c, raised),
                        verdict => verdict,
                    },
                };
                if st.line == LineState::AfterEol {
                    st.line = LineState::InLine;
                }
                verdict
            }
            LineState::TrailerStart => {
                if c == b'\n' {
                    return self.end_of_headers(st, raised);
                }
                st.line = LineState::TrailerLine;
                Verdict::Search
            }
            LineState::TrailerLine => {
                if c == b'\n' {
                    st.line = LineState::TrailerStart;
                }
                Verdict::Search
            }
        }
    }

    fn step(&self, st: &mut HttpScanState, c: u8, raised: &mut Vec<AnomalyEvent>) -> Verdict {
        let prev = st.fsm;
        let action = self.fsm.step(&mut st.fsm, c);
        trace!("http fsm: {:?} [{:#04x}] -> {:?}, {:?}", prev, c, st.fsm, action);
        Self::exec(st, action, fsm::normalize(c), raised)
    }

    fn exec(st: &mut HttpScanState, action: Action, c: u8, raised: &mut Vec<AnomalyEvent>) -> Verdict {
        match action {
            Action::Nop => {}
            Action::NoBody => st.flags.insert(HttpFlags::NO_BODY),
            Action::Post => st.flags.insert(HttpFlags::POST),
            Action::V09 => st.flags.insert(HttpFlags::HTTP_0_9 | HttpFlags::ERROR),
            Action::V10 => st.flags.insert(HttpFlags::HTTP_1_0),
            Action::V11 => st.flags.insert(HttpFlags::HTTP_1_1),
            Action::Response => st.flags.insert(HttpFlags::RESPONSE),
            Action::ShiftDecimal => {
                if st.flags.contains(HttpFlags::ERROR) {
                    return Verdict::Search;
                }
                if c.is_ascii_digit() && st.len < MAX_DECIMAL_LEN {
                    st.len = st.len * 10 + u32::from(c - b'0');
                } else {
                    raised.push(telemetry::message_size("invalid content-length"));
                    st.flags.insert(HttpFlags::ERROR);
                }
            }
            Action::ShiftHex => {
                if st.flags.contains(HttpFlags::ERROR) {
                    return Verdict::Search;
                }
                match (c as char).to_digit(16) {
                    Some(x) if st.len & HEX_OVERFLOW_MASK == 0 => {
                        st.len = (st.len << 4) + x;
                    }
                    _ => {
                        raised.push(telemetry::message_size("invalid chunk size"));
                        st.flags.insert(HttpFlags::ERROR);
                        return Verdict::Flush;
                    }
                }
            }
            Action::LengthBody => {
                st.flags.insert(HttpFlags::HAS_LENGTH);
                debug!("http paf: content length {}", st.len);
            }
            Action::LengthChunk => {
                st.flags.insert(HttpFlags::HAS_LENGTH);
                debug!("http paf: chunk length {}", st.len);
                if st.len == 0 {
                    // last chunk, only trailers left
                    st.flags.remove(HttpFlags::NO_FLUSH);
                    st.line = LineState::TrailerStart;
                }
                return Verdict::Skip;
            }
            Action::LengthZero => st.len = 0,
            Action::Chunked => st.flags.insert(HttpFlags::CHUNKED),
        }
        Verdict::Search
    }

    fn end_of_headers(&self, st: &mut HttpScanState, raised: &mut Vec<AnomalyEvent>) -> Verdict {
        debug!(
            "http paf: end of headers, flags={:#06x}, len={}",
            st.flags.bits(),
            st.len
        );
        let flags = st.flags;

        if flags.contains(HttpFlags::POST)
            && !flags.intersects(HttpFlags::CHUNKED | HttpFlags::HAS_LENGTH)
        {
            raised.push(telemetry::unbounded_post());
            st.flags.insert(HttpFlags::ERROR);
        }
        if st.flags.contains(HttpFlags::ERROR)
            || st.flags.contains(HttpFlags::NO_BODY | HttpFlags::RESPONSE)
        {
            if st.flags.contains(HttpFlags::HTTP_0_9) {
                raised.push(telemetry::simple_request());
            }
            st.len = 0;
            return Verdict::Flush;
        }
        if st.flags.contains(HttpFlags::CHUNKED) {
            st.start_chunks();
            return Verdict::Search;
        }
        if st.flags.intersects(HttpFlags::REQUEST | HttpFlags::HAS_LENGTH) {
            return Verdict::Flush;
        }
        if st.flags.contains(HttpFlags::HTTP_1_1 | HttpFlags::RESPONSE) {
            // no way to tell where the body ends; inspect the headers alone
            st.len = 0;
            raised.push(telemetry::message_size("response without length"));
            return Verdict::Flush;
        }
        Verdict::Abort
    }
}

impl ProtocolScanner for HttpScanner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn scan(&self, ctx: &mut ScanContext<'_>, data: &[u8]) -> ScanOutcome {
        let from_client = ctx.flags().is_from_client();
        let mut raised = Vec::new();

        let scan = {
            let Some(st) = ctx.state_or_insert_with(|| HttpScanState::new(from_client)) else {
                return ScanOutcome::abort();
            };
            if st.flags.contains(HttpFlags::ERROR) {
                return ScanOutcome::abort();
            }
            if self.byte_cap > 0 && self.bytes.load(Ordering::Relaxed) > self.byte_cap {
                return ScanOutcome::abort();
            }
            self.scan_window(st, data, from_client, &mut raised)
        };

        for event in raised {
            ctx.post(event);
        }
        if scan.head_done {
            // the response to a HEAD has no body
            if let Some(peer) = ctx.peer_state_or_insert_with(|| HttpScanState::new(false)) {
                peer.flags.insert(HttpFlags::NO_BODY);
            }
        }

        debug!(
            "http paf: verdict={:?}, fp={}, consumed={}",
            scan.verdict, scan.flush_point, scan.consumed
        );
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(scan.consumed as u64, Ordering::Relaxed);

        ScanOutcome {
            verdict: scan.verdict,
            flush_point: scan.flush_point,
        }
    }
}

impl std::fmt::Debug for HttpScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpScanner")
            .field("byte_cap", &self.byte_cap)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::PafSettings;
    use crate::paf::harness::{Host, Pdu};
    use crate::paf::{FlushPointEngine, PacketFlags, PafStatus, RegistryBuilder, ScannerRegistry};
    use crate::telemetry::AnomalyKind;

    fn engine() -> FlushPointEngine {
        let registry = ScannerRegistry::from_settings(&PafSettings::default()).unwrap();
        FlushPointEngine::new(Arc::new(registry))
    }

    fn send_in_pieces(
        host: &mut Host<'_>,
        direction: Direction,
        data: &[u8],
        piece: usize,
    ) -> Vec<Pdu> {
        let mut pdus = Vec::new();
        for chunk in data.chunks(piece) {
            pdus.extend(host.send(direction, chunk));
        }
        pdus
    }

    fn is_whole(pdu: &Pdu) -> bool {
        pdu.flags.contains(PacketFlags::PDU_HEAD | PacketFlags::PDU_TAIL)
    }

    const POST: &[u8] = b"POST /upload HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello";
    const GET: &[u8] = b"GET /next HTTP/1.1\r\nHost: a\r\n\r\n";

    #[test]
    fn test_content_length_any_split() {
        let engine = engine();
        let stream = [POST, GET].concat();

        for piece in [1, 2, 3, 7, 16, stream.len()] {
            let mut host = Host::new(&engine, 80);
            let pdus = send_in_pieces(&mut host, Direction::ToServer, &stream, piece);

            assert_eq!(pdus.len(), 2, "piece size {}", piece);
            assert_eq!(pdus[0].bytes, POST);
            assert_eq!(pdus[1].bytes, GET);
            assert!(pdus.iter().all(is_whole));
            assert!(host.session().events().is_empty());
        }
    }

    #[test]
    fn test_chunked_body() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let headers = b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";

        let mut first = headers.to_vec();
        first.extend_from_slice(b"5\r\n");
        assert!(host.send(Direction::ToServer, &first).is_empty());

        // exactly the chunk data is skipped
        let state = host.session().state(Direction::ToServer);
        assert_eq!(state.status(), PafStatus::Skip);
        assert_eq!(state.flush_target() as usize, first.len() + 5);

        assert!(host.send(Direction::ToServer, b"hel").is_empty());
        let pdus = host.send(Direction::ToServer, b"lo\r\n0\r\n\r\n");
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, [&first[..], b"hello\r\n0\r\n\r\n"].concat());
        assert!(is_whole(&pdus[0]));
    }

    #[test]
    fn test_chunk_data_is_not_scanned() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let msg = b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                    6\r\n\n\nGET \r\nA\r\n0123456789\r\n0\r\nX-Trailer: t\r\n\r\n";

        let pdus = host.send(Direction::ToServer, msg);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, msg);
        assert!(host.session().events().is_empty());
    }

    #[test]
    fn test_head_response_flushes_at_headers() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);

        let pdus = host.send(Direction::ToServer, b"HEAD /x HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(pdus.len(), 1);

        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n";
        let pdus = host.send(Direction::ToClient, response);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, response);

        // the next response has its body again
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
        let pdus = host.send(Direction::ToClient, response);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, response);
    }

    #[test]
    fn test_pipelined_responses() {
        let engine = engine();
        let mut host = Host::new(&engine, 8080);
        let one = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc";
        let two = b"HTTP/1.1 404 Not Found\r\ncontent-length:1\r\n\r\nx";

        let pdus = host.send(Direction::ToClient, &[&one[..], &two[..]].concat());
        assert_eq!(pdus.len(), 2);
        assert_eq!(pdus[0].bytes, one);
        assert_eq!(pdus[1].bytes, two);
    }

    #[test]
    fn test_content_length_overflow() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let msg = b"POST / HTTP/1.1\r\nContent-Length: 4294967296\r\n\r\nbody";

        let pdus = host.send(Direction::ToServer, msg);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, msg);

        let events = host.session().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnomalyKind::MessageSizeException);
        assert_eq!((events[0].generator_id, events[0].signature_id), (120, 8));

        // no more protocol awareness for this direction
        assert!(host.send(Direction::ToServer, b"GET / HTTP/1.1\r\n\r\n").is_empty());
        assert_eq!(
            host.session().state(Direction::ToServer).status(),
            PafStatus::Abort
        );
    }

    #[test]
    fn test_invalid_chunk_size() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let msg = b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n";

        let pdus = host.send(Direction::ToServer, msg);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, msg);
        assert_eq!(
            host.session().events()[0].kind,
            AnomalyKind::MessageSizeException
        );
    }

    #[test]
    fn test_unbounded_post() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let msg = b"POST /form HTTP/1.1\r\nHost: a\r\n\r\nname=value";

        let pdus = host.send(Direction::ToServer, msg);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, msg);

        let events = host.session().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnomalyKind::UnboundedPost);
        assert_eq!((events[0].generator_id, events[0].signature_id), (119, 35));
    }

    #[test]
    fn test_simple_request() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);

        assert!(!HttpScanner::is_simple_request(host.session()));
        let pdus = host.send(Direction::ToServer, b"GET /index.html\r\n");
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, b"GET /index.html\r\n");

        let events = host.session().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnomalyKind::SimpleRequest);
        assert!(HttpScanner::is_simple_request(host.session()));
    }

    #[test]
    fn test_bodiless_status_codes() {
        let engine = engine();
        for response in [
            &b"HTTP/1.1 204 No Content\r\nServer: s\r\n\r\n"[..],
            &b"HTTP/1.1 304 Not Modified\r\n\r\n"[..],
            &b"HTTP/1.1 100 Continue\r\n\r\n"[..],
        ] {
            let mut host = Host::new(&engine, 80);
            let pdus = host.send(Direction::ToClient, response);
            assert_eq!(pdus.len(), 1);
            assert_eq!(pdus[0].bytes, response);
            assert!(host.session().events().is_empty());
        }
    }

    #[test]
    fn test_http11_response_without_length() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let headers = b"HTTP/1.1 200 OK\r\nServer: s\r\n\r\n";

        let pdus = host.send(Direction::ToClient, &[&headers[..], b"some body"].concat());
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, headers);
        assert_eq!(
            host.session().events()[0].kind,
            AnomalyKind::MessageSizeException
        );
    }

    #[test]
    fn test_http10_response_without_length_aborts() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);

        let pdus = host.send(Direction::ToClient, b"HTTP/1.0 200 OK\r\n\r\nuntil close");
        assert!(pdus.is_empty());
        assert_eq!(
            host.session().state(Direction::ToClient).status(),
            PafStatus::Abort
        );
        assert!(host.session().events().is_empty());
    }

    #[test]
    fn test_folded_header() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let msg = b"POST / HTTP/1.1\r\nContent-Length:\r\n 3\r\n\r\nabc";

        let pdus = host.send(Direction::ToServer, msg);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, msg);
        assert!(host.session().events().is_empty());
    }

    #[test]
    fn test_leading_blank_line_before_response() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);
        let response = b"\r\nHTTP/1.1 204 No Content\r\n\r\n";

        let pdus = host.send(Direction::ToClient, response);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].bytes, response);
    }

    #[test]
    fn test_byte_cap() {
        let scanner = Arc::new(HttpScanner::with_byte_cap(10).unwrap());
        let mut builder = RegistryBuilder::new();
        builder
            .register(80, Direction::ToServer, scanner.clone(), true)
            .unwrap();
        let engine = FlushPointEngine::new(Arc::new(builder.build()));
        let mut host = Host::new(&engine, 80);

        assert!(host.send(Direction::ToServer, b"GET / HTTP/1.1\r\n").is_empty());
        assert!(host.send(Direction::ToServer, b"\r\n").is_empty());
        assert_eq!(
            host.session().state(Direction::ToServer).status(),
            PafStatus::Abort
        );
        assert_eq!(scanner.stats().calls, 1);
        assert_eq!(scanner.stats().bytes, 16);
    }

    #[test]
    fn test_scan_state_kept_per_direction() {
        let engine = engine();
        let mut host = Host::new(&engine, 80);

        host.send(Direction::ToServer, b"POST /a HTTP/1.1\r\n");
        let st = host
            .session()
            .scanner_state::<HttpScanState>(Direction::ToServer)
            .unwrap();
        assert!(st.flags().contains(HttpFlags::REQUEST | HttpFlags::POST));
        assert_eq!(st.line(), LineState::AfterEol);
        assert!(host
            .session()
            .scanner_state::<HttpScanState>(Direction::ToClient)
            .is_none());
    }
}
