//! Protocol-Aware Flushing for reassembled TCP streams
//!
//! Stream reassembly hands each in-order segment to the
//! [`FlushPointEngine`], which asks the protocol scanners registered for the
//! session's port where the current application message ends. The engine
//! answers with a flush length so inspection always sees whole messages
//! (or bounded pieces of very large ones).
//!
//! ```text
//! settings (JSON) -> ScannerRegistry -> FlushPointEngine -> SessionTable
//!                                             |
//!                         check(segment) -> flush length + PDU flags
//! ```

pub mod config;
pub mod paf;
pub mod protocols;
pub mod session;
pub mod telemetry;

use std::sync::Arc;

use log::info;

pub use config::{ConfigError, HttpPafSettings, PafSettings};
pub use paf::{
    Direction, FlushPointEngine, PacketFlags, PafState, PafStatus, ProtocolScanner,
    RegistryBuilder, RegistryError, ScanContext, ScanOutcome, ScannerRegistry, Verdict,
};
pub use protocols::{HttpScanState, HttpScanner};
pub use session::{SessionKey, SessionTable, StreamSession};
pub use telemetry::{AnomalyEvent, AnomalyKind, EventSink};

/// Startup failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    Config(ConfigError),
    Registry(RegistryError),
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupError::Config(e) => write!(f, "configuration: {}", e),
            SetupError::Registry(e) => write!(f, "registry: {}", e),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::Config(e)
    }
}

impl From<RegistryError> for SetupError {
    fn from(e: RegistryError) -> Self {
        SetupError::Registry(e)
    }
}

/// Build an engine from JSON settings
///
/// Empty input selects the defaults.
pub fn configure(config_bytes: &[u8]) -> Result<Arc<FlushPointEngine>, SetupError> {
    let settings = if config_bytes.is_empty() {
        PafSettings::default()
    } else {
        PafSettings::from_bytes(config_bytes)?
    };

    let registry = ScannerRegistry::from_settings(&settings)?;
    info!(
        "PAF configured: http={} on ports {:?}, mfp={}",
        settings.http.enabled,
        settings.http.ports,
        registry.max_flush_point()
    );

    Ok(Arc::new(FlushPointEngine::new(Arc::new(registry))))
}
