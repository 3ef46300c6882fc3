//! Minimal stream reassembler for tests
//!
//! Queues in-order segments per direction, asks the engine for flush
//! points and cuts the queue into PDUs the way a reassembler would,
//! re-presenting whatever remains after each cut.

use super::{Direction, FlushPointEngine, PacketFlags};
use crate::session::StreamSession;

/// One flushed message (or piece of one)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub bytes: Vec<u8>,
    pub flags: PacketFlags,
}

#[derive(Debug, Default)]
struct Queue {
    bytes: Vec<u8>,
    /// Sequence number of `bytes[0]`
    seq: u32,
}

pub struct Host<'e> {
    engine: &'e FlushPointEngine,
    session: StreamSession,
    to_server: Queue,
    to_client: Queue,
}

impl<'e> Host<'e> {
    pub fn new(engine: &'e FlushPointEngine, port: u16) -> Self {
        Self {
            engine,
            session: engine.open_session(1, port),
            to_server: Queue::default(),
            to_client: Queue::default(),
        }
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Bytes still waiting for a flush
    pub fn queued(&self, direction: Direction) -> &[u8] {
        match direction {
            Direction::ToServer => &self.to_server.bytes,
            Direction::ToClient => &self.to_client.bytes,
        }
    }

    /// Deliver the next in-order segment and collect every PDU it completes
    pub fn send(&mut self, direction: Direction, segment: &[u8]) -> Vec<Pdu> {
        let queue = match direction {
            Direction::ToServer => &mut self.to_server,
            Direction::ToClient => &mut self.to_client,
        };
        let mut seq = queue.seq.wrapping_add(queue.bytes.len() as u32);
        let mut start = queue.bytes.len();
        queue.bytes.extend_from_slice(segment);

        let mut pdus = Vec::new();
        while start < queue.bytes.len() {
            let mut flags = direction.packet_flags();
            let fp = self.engine.check(
                &mut self.session,
                direction,
                &queue.bytes[start..],
                queue.bytes.len() as u32,
                seq,
                &mut flags,
                0,
            );
            if fp == 0 {
                break;
            }
            let cut = (fp as usize).min(queue.bytes.len());
            let bytes: Vec<u8> = queue.bytes.drain(..cut).collect();
            queue.seq = queue.seq.wrapping_add(cut as u32);
            pdus.push(Pdu { bytes, flags });

            // the remainder is presented again from the new origin
            seq = queue.seq;
            start = 0;
        }
        pdus
    }
}
