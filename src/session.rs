//! Session storage
//!
//! A `StreamSession` owns the PAF state of both halves of one TCP
//! session, so a scanner working on one direction can reach the state it
//! keeps for the other. Dropping a session releases all scanner state.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::paf::{Direction, FlushPointEngine, PacketFlags, PafState};
use crate::telemetry::{AnomalyEvent, EventSink};

/// Identifier of a session in the host's flow table
pub type SessionKey = u64;

/// Both directions of one TCP session
#[derive(Debug)]
pub struct StreamSession {
    key: SessionKey,
    /// Server port the session was set up for
    port: u16,
    to_server: PafState,
    to_client: PafState,
    /// Anomalies raised while scanning, drained by the host
    events: Vec<AnomalyEvent>,
}

impl StreamSession {
    /// Create an unbound session (see [`FlushPointEngine::open_session`])
    pub fn new(key: SessionKey, port: u16) -> Self {
        Self {
            key,
            port,
            to_server: PafState::new(),
            to_client: PafState::new(),
            events: Vec::new(),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self, direction: Direction) -> &PafState {
        match direction {
            Direction::ToServer => &self.to_server,
            Direction::ToClient => &self.to_client,
        }
    }

    pub fn state_mut(&mut self, direction: Direction) -> &mut PafState {
        match direction {
            Direction::ToServer => &mut self.to_server,
            Direction::ToClient => &mut self.to_client,
        }
    }

    /// Split into (scanned direction, peer direction, event sink)
    pub(crate) fn parts_mut(
        &mut self,
        direction: Direction,
    ) -> (&mut PafState, &mut PafState, &mut dyn EventSink) {
        let events: &mut dyn EventSink = &mut self.events;
        match direction {
            Direction::ToServer => (&mut self.to_server, &mut self.to_client, events),
            Direction::ToClient => (&mut self.to_client, &mut self.to_server, events),
        }
    }

    /// Typed view of whatever scanner state of type `T` a direction holds
    pub fn scanner_state<T: Any + Send>(&self, direction: Direction) -> Option<&T> {
        self.state(direction).scanner_private().find::<T>()
    }

    pub fn events(&self) -> &[AnomalyEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<AnomalyEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Sessions keyed by id, sharing one engine
pub struct SessionTable {
    engine: Arc<FlushPointEngine>,
    sessions: HashMap<SessionKey, StreamSession>,
}

impl SessionTable {
    pub fn new(engine: Arc<FlushPointEngine>) -> Self {
        Self {
            engine,
            sessions: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &FlushPointEngine {
        &self.engine
    }

    /// Open a session; an existing session with the same key is replaced
    pub fn open(&mut self, key: SessionKey, port: u16) -> &mut StreamSession {
        debug!("session {} opened on port {}", key, port);
        let session = self.engine.open_session(key, port);
        match self.sessions.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                e.insert(session);
                e.into_mut()
            }
            std::collections::hash_map::Entry::Vacant(e) => e.insert(session),
        }
    }

    pub fn get(&self, key: SessionKey) -> Option<&StreamSession> {
        self.sessions.get(&key)
    }

    pub fn get_mut(&mut self, key: SessionKey) -> Option<&mut StreamSession> {
        self.sessions.get_mut(&key)
    }

    /// Evaluate a segment for a known session (0 if the key is unknown)
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &mut self,
        key: SessionKey,
        direction: Direction,
        data: &[u8],
        total: u32,
        seq: u32,
        flags: &mut PacketFlags,
        fuzz: u32,
    ) -> u32 {
        match self.sessions.get_mut(&key) {
            Some(session) => self
                .engine
                .check(session, direction, data, total, seq, flags, fuzz),
            None => 0,
        }
    }

    /// Rebind a reused connection, dropping its scanner state
    pub fn reset(&mut self, key: SessionKey) -> bool {
        match self.sessions.get_mut(&key) {
            Some(session) => {
                self.engine.reset_session(session);
                session.events.clear();
                true
            }
            None => false,
        }
    }

    /// Tear down a session; its scanner state is released on drop
    pub fn close(&mut self, key: SessionKey) -> Option<StreamSession> {
        let closed = self.sessions.remove(&key);
        if closed.is_some() {
            debug!("session {} closed", key);
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PafSettings;
    use crate::paf::{PafStatus, ScannerRegistry};
    use crate::protocols::http::HttpScanState;

    fn table() -> SessionTable {
        let registry = ScannerRegistry::from_settings(&PafSettings::default()).unwrap();
        SessionTable::new(Arc::new(FlushPointEngine::new(Arc::new(registry))))
    }

    fn request(table: &mut SessionTable, key: SessionKey, data: &[u8]) -> u32 {
        let mut flags = PacketFlags::FROM_CLIENT;
        table.check(key, Direction::ToServer, data, data.len() as u32, 1, &mut flags, 0)
    }

    #[test]
    fn test_open_binds_both_directions() {
        let mut table = table();
        let session = table.open(1, 80);
        assert_eq!(session.key(), 1);
        assert!(!session.state(Direction::ToServer).scanner_mask().is_empty());
        assert!(!session.state(Direction::ToClient).scanner_mask().is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_check_unknown_session() {
        let mut table = table();
        assert_eq!(request(&mut table, 42, b"GET / HTTP/1.0\r\n\r\n"), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_check_and_close_release_state() {
        let mut table = table();
        table.open(7, 80);

        let data = b"GET / HTTP/1.1\r\nHost: a\r\n";
        assert_eq!(request(&mut table, 7, data), 0);
        let session = table.get(7).unwrap();
        assert!(session.scanner_state::<HttpScanState>(Direction::ToServer).is_some());

        let closed = table.close(7).unwrap();
        assert_eq!(closed.key(), 7);
        assert!(table.get(7).is_none());
        assert!(table.close(7).is_none());
    }

    #[test]
    fn test_reset_for_reuse() {
        let mut table = table();
        table.open(3, 80);
        request(&mut table, 3, b"POST / HTTP/1.1\r\n");

        assert!(table.reset(3));
        let session = table.get(3).unwrap();
        assert_eq!(session.state(Direction::ToServer).status(), PafStatus::Start);
        assert!(session.state(Direction::ToServer).scanner_private().is_empty());
        assert!(!table.reset(4));
    }

    #[test]
    fn test_reopen_replaces_session() {
        let mut table = table();
        table.open(5, 80);
        request(&mut table, 5, b"GET /");
        let session = table.open(5, 8080);
        assert_eq!(session.port(), 8080);
        assert_eq!(session.state(Direction::ToServer).status(), PafStatus::Start);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_drain_events() {
        let mut table = table();
        table.open(9, 80);
        // simple request raises an anomaly
        assert!(request(&mut table, 9, b"GET /\n") > 0);

        let session = table.get_mut(9).unwrap();
        assert_eq!(session.events().len(), 1);
        assert_eq!(session.drain_events().len(), 1);
        assert!(session.events().is_empty());
    }
}
