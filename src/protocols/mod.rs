//! Protocol scanners
//!
//! Each scanner finds message boundaries for one application protocol
//! and plugs into the engine through [`crate::paf::ProtocolScanner`].

pub mod http;

pub use http::{HttpScanState, HttpScanner, ScannerStats};
