//! Token state machine for HTTP message framing
//!
//! Table driven, one row per state. A row names the byte it expects; on
//! a match the machine moves to `next` and runs the row's action, on a
//! miss it retries the byte at `other`. Every miss chain ends in a row
//! that accepts anything, so each byte costs a bounded number of lookups
//! and no memory.
//!
//! Bytes are compared upper-cased with tab folded into space. End of line
//! is delivered by the line framer as `EOL`, never as raw input.

/// End of line as seen by the machine (`\r` never reaches it)
pub const EOL: u8 = b'\n';
/// Linear white space (space or tab)
pub const LWS: u8 = b' ';

/// Named groups of consecutive rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// `HTTP/1.x nnn` starting a response
    StatusLine,
    /// Method and token count of a request line
    RequestLine,
    /// `Content-Length:` header name
    ContentLength,
    /// `Transfer-Encoding:` header name
    TransferEncoding,
    /// `chunked` encoding value
    Chunked,
    /// Decimal content length
    LengthDigits,
    /// Hex chunk size
    ChunkSize,
    /// Rest of the line after chunk data
    ChunkDataEol,
    /// Empty lines before a status line
    LeadingBlank,
    /// Rest of an uninteresting line
    SkipLine,
}

impl Block {
    pub const ALL: [Block; 10] = [
        Block::StatusLine,
        Block::RequestLine,
        Block::ContentLength,
        Block::TransferEncoding,
        Block::Chunked,
        Block::LengthDigits,
        Block::ChunkSize,
        Block::ChunkDataEol,
        Block::LeadingBlank,
        Block::SkipLine,
    ];

    /// Number of rows in the block
    pub fn rows(self) -> usize {
        match self {
            Block::StatusLine => 18,
            Block::RequestLine => 18,
            Block::ContentLength => 17,
            Block::TransferEncoding => 20,
            Block::Chunked => 7,
            Block::LengthDigits
            | Block::ChunkSize
            | Block::ChunkDataEol
            | Block::LeadingBlank
            | Block::SkipLine => 2,
        }
    }
}

/// Position in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    pub block: Block,
    pub step: u8,
}

impl State {
    pub const fn new(block: Block, step: u8) -> Self {
        Self { block, step }
    }
}

pub const RESPONSE_START: State = State::new(Block::StatusLine, 0);
pub const REQUEST_START: State = State::new(Block::RequestLine, 0);
pub const CHUNK_START: State = State::new(Block::ChunkSize, 0);
pub const SKIP_LINE: State = State::new(Block::SkipLine, 0);

/// What a row accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Char(u8),
    Lws,
    Eol,
    Any,
}

impl Event {
    fn matches(self, c: u8) -> bool {
        match self {
            Event::Char(x) => c == x,
            Event::Lws => c == LWS,
            Event::Eol => c == EOL,
            Event::Any => true,
        }
    }
}

/// Side effect of taking a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nop,
    /// HEAD request, or a status that forbids a body
    NoBody,
    Post,
    /// Two-token request line
    V09,
    V10,
    V11,
    Response,
    /// Accumulate a decimal digit
    ShiftDecimal,
    /// Accumulate a hex digit
    ShiftHex,
    /// Content length complete
    LengthBody,
    /// Chunk size complete
    LengthChunk,
    LengthZero,
    Chunked,
}

#[derive(Debug, Clone, Copy)]
struct Row {
    at: State,
    event: Event,
    next: State,
    other: State,
    action: Action,
}

/// Table validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// Row stored where another state belongs
    Misplaced { index: usize, found: State },
    /// Block holds the wrong number of rows
    BlockSize { block: Block, rows: usize },
    /// Transition into a state past the end of its block
    BadTarget(State),
    /// Miss chain that loops without reaching a catch-all row
    Unterminated(State),
}

impl std::fmt::Display for FsmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsmError::Misplaced { index, found } => {
                write!(f, "row {} holds state {:?}", index, found)
            }
            FsmError::BlockSize { block, rows } => write!(
                f,
                "block {:?} has {} rows, expected {}",
                block,
                rows,
                block.rows()
            ),
            FsmError::BadTarget(s) => write!(f, "transition to missing state {:?}", s),
            FsmError::Unterminated(s) => write!(f, "miss chain from {:?} never matches", s),
        }
    }
}

impl std::error::Error for FsmError {}

/// Upper-case and fold tab into space
pub fn normalize(c: u8) -> u8 {
    if c == b'\t' {
        LWS
    } else {
        c.to_ascii_uppercase()
    }
}

/// Validated transition table
pub struct Fsm {
    rows: Vec<Row>,
    offsets: [usize; 10],
}

impl Fsm {
    pub fn new() -> Result<Self, FsmError> {
        let rows = table();

        let mut offsets = [0usize; 10];
        let mut total = 0;
        for (i, block) in Block::ALL.iter().enumerate() {
            offsets[i] = total;
            total += block.rows();
        }

        let fsm = Self { rows, offsets };
        fsm.validate()?;
        Ok(fsm)
    }

    /// Row count
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn index(&self, s: State) -> Option<usize> {
        if usize::from(s.step) >= s.block.rows() {
            return None;
        }
        Some(self.offsets[s.block as usize] + usize::from(s.step))
    }

    fn validate(&self) -> Result<(), FsmError> {
        for block in Block::ALL {
            let rows = self.rows.iter().filter(|r| r.at.block == block).count();
            if rows != block.rows() {
                return Err(FsmError::BlockSize { block, rows });
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if self.index(row.at) != Some(i) {
                return Err(FsmError::Misplaced {
                    index: i,
                    found: row.at,
                });
            }
            for target in [row.next, row.other] {
                if self.index(target).is_none() {
                    return Err(FsmError::BadTarget(target));
                }
            }
        }
        // every miss chain must end in a catch-all within one lap
        for row in &self.rows {
            let mut at = row.at;
            let mut hops = 0;
            loop {
                let r = &self.rows[self.index(at).ok_or(FsmError::BadTarget(at))?];
                if r.event == Event::Any {
                    break;
                }
                hops += 1;
                if hops > self.rows.len() {
                    return Err(FsmError::Unterminated(row.at));
                }
                at = r.other;
            }
        }
        Ok(())
    }

    /// Feed one byte, returning the action of the row that took it
    pub fn step(&self, state: &mut State, c: u8) -> Action {
        let c = normalize(c);
        let mut at = *state;

        for _ in 0..self.rows.len() {
            let Some(row) = self.index(at).and_then(|i| self.rows.get(i)) else {
                break;
            };
            if row.event.matches(c) {
                *state = row.next;
                return row.action;
            }
            at = row.other;
        }
        *state = at;
        Action::Nop
    }
}

impl std::fmt::Debug for Fsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm").field("rows", &self.rows.len()).finish()
    }
}

struct TableBuilder {
    rows: Vec<Row>,
}

impl TableBuilder {
    fn row(&mut self, at: State, event: Event, next: State, other: State, action: Action) {
        self.rows.push(Row {
            at,
            event,
            next,
            other,
            action,
        });
    }

    /// Consecutive rows matching `word`, each missing to `other`
    fn word(&mut self, block: Block, from: u8, word: &[u8], other: State) {
        for (i, &c) in word.iter().enumerate() {
            let step = from + i as u8;
            self.row(
                State::new(block, step),
                Event::Char(c),
                State::new(block, step + 1),
                other,
                Action::Nop,
            );
        }
    }
}

fn table() -> Vec<Row> {
    use Action::*;
    use Block::{
        ChunkDataEol, ChunkSize, ContentLength, LeadingBlank, LengthDigits, RequestLine,
        SkipLine, StatusLine, TransferEncoding,
    };
    use Event::{Any, Eol, Lws};

    let s = State::new;
    let c = Event::Char;
    let skip0 = s(SkipLine, 0);
    let mut t = TableBuilder {
        rows: Vec::with_capacity(90),
    };

    // http version starts a response; 1xx, 204 and 304 carry no body
    t.row(s(StatusLine, 0), c(b'H'), s(StatusLine, 1), s(LeadingBlank, 0), Nop);
    t.word(StatusLine, 1, b"TTP/1.", skip0);
    t.row(s(StatusLine, 7), c(b'0'), s(StatusLine, 9), s(StatusLine, 8), V10);
    t.row(s(StatusLine, 8), c(b'1'), s(StatusLine, 9), skip0, V11);
    t.row(s(StatusLine, 9), Lws, s(StatusLine, 10), skip0, Nop);
    t.row(s(StatusLine, 10), Lws, s(StatusLine, 10), s(StatusLine, 11), Nop);
    t.row(s(StatusLine, 11), c(b'1'), s(StatusLine, 16), s(StatusLine, 12), NoBody);
    t.row(s(StatusLine, 12), c(b'2'), s(StatusLine, 14), s(StatusLine, 13), Nop);
    t.row(s(StatusLine, 13), c(b'3'), s(StatusLine, 14), s(StatusLine, 16), Nop);
    t.row(s(StatusLine, 14), c(b'0'), s(StatusLine, 15), s(StatusLine, 16), Nop);
    t.row(s(StatusLine, 15), c(b'4'), s(StatusLine, 17), s(StatusLine, 16), NoBody);
    t.row(s(StatusLine, 16), Any, s(StatusLine, 17), s(StatusLine, 17), Nop);
    t.row(s(StatusLine, 17), Lws, skip0, s(StatusLine, 16), Response);

    // HEAD means no body in the response, POST needs a length.
    // otherwise count tokens: two before eol is a simple request
    let other = s(RequestLine, 10);
    t.row(s(RequestLine, 0), c(b'H'), s(RequestLine, 1), s(RequestLine, 5), Nop);
    t.word(RequestLine, 1, b"EAD", other);
    t.row(s(RequestLine, 4), Lws, s(RequestLine, 12), other, NoBody);
    t.word(RequestLine, 5, b"POST", other);
    t.row(s(RequestLine, 9), Lws, s(RequestLine, 12), other, Post);
    t.row(s(RequestLine, 10), Lws, s(RequestLine, 12), s(RequestLine, 11), Nop);
    t.row(s(RequestLine, 11), Any, other, other, Nop);
    t.row(s(RequestLine, 12), Lws, s(RequestLine, 12), s(RequestLine, 13), Nop);
    t.row(s(RequestLine, 13), Eol, skip0, s(RequestLine, 14), V09);
    t.row(s(RequestLine, 14), Lws, s(RequestLine, 16), s(RequestLine, 15), Nop);
    t.row(s(RequestLine, 15), Any, s(RequestLine, 13), s(RequestLine, 13), Nop);
    t.row(s(RequestLine, 16), Lws, s(RequestLine, 16), s(RequestLine, 17), Nop);
    t.row(s(RequestLine, 17), Eol, skip0, skip0, V09);

    // header names can be anywhere after the first line
    t.row(s(ContentLength, 0), c(b'C'), s(ContentLength, 1), s(TransferEncoding, 0), Nop);
    t.word(ContentLength, 1, b"ONTENT-LENGTH", skip0);
    t.row(s(ContentLength, 14), Lws, s(ContentLength, 14), s(ContentLength, 15), Nop);
    t.row(s(ContentLength, 15), c(b':'), s(ContentLength, 16), skip0, Nop);
    t.row(s(ContentLength, 16), Lws, s(ContentLength, 16), s(LengthDigits, 0), LengthZero);

    t.row(s(TransferEncoding, 0), c(b'T'), s(TransferEncoding, 1), skip0, Nop);
    t.word(TransferEncoding, 1, b"RANSFER-ENCODING", skip0);
    t.row(s(TransferEncoding, 17), Lws, s(TransferEncoding, 17), s(TransferEncoding, 18), Nop);
    t.row(s(TransferEncoding, 18), c(b':'), s(TransferEncoding, 19), skip0, Nop);
    t.row(s(TransferEncoding, 19), Lws, s(TransferEncoding, 19), s(Block::Chunked, 0), Nop);

    // the only encoding recognized
    t.word(Block::Chunked, 0, b"CHUNKE", skip0);
    t.row(s(Block::Chunked, 6), c(b'D'), skip0, skip0, Chunked);

    t.row(s(LengthDigits, 0), Eol, s(ContentLength, 0), s(LengthDigits, 1), LengthBody);
    t.row(s(LengthDigits, 1), Any, s(LengthDigits, 0), s(LengthDigits, 0), ShiftDecimal);

    t.row(s(ChunkSize, 0), Eol, s(ChunkDataEol, 0), s(ChunkSize, 1), LengthChunk);
    t.row(s(ChunkSize, 1), Any, s(ChunkSize, 0), s(ChunkSize, 0), ShiftHex);

    t.row(s(ChunkDataEol, 0), Eol, s(ChunkSize, 0), s(ChunkDataEol, 1), LengthZero);
    t.row(s(ChunkDataEol, 1), Any, s(ChunkDataEol, 0), s(ChunkDataEol, 0), Nop);

    t.row(s(LeadingBlank, 0), Lws, s(StatusLine, 0), s(LeadingBlank, 1), Nop);
    t.row(s(LeadingBlank, 1), Eol, s(StatusLine, 0), s(SkipLine, 1), Nop);

    t.row(s(SkipLine, 0), Eol, s(ContentLength, 0), s(SkipLine, 1), Nop);
    t.row(s(SkipLine, 1), Any, skip0, skip0, Nop);

    t.rows
}
