//! Scanner registry
//!
//! Built once at startup with [`RegistryBuilder`] and shared read-only by
//! every session afterwards. Maps (port, direction) to the set of scanners
//! that apply there.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use super::scanner::{ProtocolScanner, ScannerId};
use super::state::{ScannerMask, MAX_SCANNERS};
use super::{Direction, DEFAULT_MAX_FLUSH_POINT};
use crate::config::{ConfigError, PafSettings};
use crate::protocols::HttpScanner;

/// Scanners bound to one (port, direction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortBinding {
    pub mask: ScannerMask,
    pub auto_activate: bool,
}

/// Registry construction errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// All scanner ids are taken
    TooManyScanners(&'static str),
    /// A scanner's internal tables failed validation
    InvalidScanner(String),
    /// Settings rejected before any scanner was bound
    Settings(ConfigError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::TooManyScanners(name) => write!(
                f,
                "Cannot register scanner '{}': limit of {} scanners reached",
                name, MAX_SCANNERS
            ),
            RegistryError::InvalidScanner(e) => write!(f, "Invalid scanner: {}", e),
            RegistryError::Settings(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Immutable scanner table
pub struct ScannerRegistry {
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    bindings: HashMap<(u16, Direction), PortBinding>,
    max_flush_point: u32,
}

impl ScannerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build the registry described by the settings
    pub fn from_settings(settings: &PafSettings) -> Result<Self, RegistryError> {
        settings.validate().map_err(RegistryError::Settings)?;
        let mut builder = RegistryBuilder::new().max_flush_point(settings.max_flush_point);

        if settings.http.enabled {
            let scanner: Arc<dyn ProtocolScanner> = Arc::new(
                HttpScanner::with_byte_cap(settings.http.byte_cap)
                    .map_err(|e| RegistryError::InvalidScanner(e.to_string()))?,
            );
            for &port in &settings.http.ports {
                if settings.http.client {
                    builder.register(
                        port,
                        Direction::ToServer,
                        Arc::clone(&scanner),
                        settings.http.auto_activate,
                    )?;
                }
                if settings.http.server {
                    builder.register(
                        port,
                        Direction::ToClient,
                        Arc::clone(&scanner),
                        settings.http.auto_activate,
                    )?;
                }
            }
        }

        Ok(builder.build())
    }

    pub fn binding(&self, port: u16, direction: Direction) -> PortBinding {
        self.bindings
            .get(&(port, direction))
            .copied()
            .unwrap_or_default()
    }

    /// Whether PAF should run for this port and direction
    ///
    /// Auto-activated bindings always run; otherwise only when the caller
    /// asks for flushing.
    pub fn is_enabled(&self, port: u16, direction: Direction, flush: bool) -> bool {
        let binding = self.binding(port, direction);
        if binding.mask.is_empty() {
            return false;
        }
        binding.auto_activate || flush
    }

    pub fn scanner(&self, id: ScannerId) -> Option<&dyn ProtocolScanner> {
        self.scanners.get(id).map(|s| s.as_ref())
    }

    pub fn scanner_count(&self) -> usize {
        self.scanners.len()
    }

    pub fn max_flush_point(&self) -> u32 {
        self.max_flush_point
    }
}

impl std::fmt::Debug for ScannerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.scanners.iter().map(|s| s.name()).collect();
        f.debug_struct("ScannerRegistry")
            .field("scanners", &names)
            .field("bindings", &self.bindings.len())
            .field("max_flush_point", &self.max_flush_point)
            .finish()
    }
}

/// Mutable registry under construction
pub struct RegistryBuilder {
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    bindings: HashMap<(u16, Direction), PortBinding>,
    max_flush_point: u32,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
            bindings: HashMap::new(),
            max_flush_point: DEFAULT_MAX_FLUSH_POINT,
        }
    }

    /// Set the size bound for forced flushing (0 selects the default)
    pub fn max_flush_point(mut self, mfp: u32) -> Self {
        self.max_flush_point = if mfp == 0 { DEFAULT_MAX_FLUSH_POINT } else { mfp };
        self
    }

    /// Bind a scanner to a port and direction
    ///
    /// Scanners are identified by name: registering one again reuses its
    /// id. `auto_activate` stays set once any registration asks for it.
    pub fn register(
        &mut self,
        port: u16,
        direction: Direction,
        scanner: Arc<dyn ProtocolScanner>,
        auto_activate: bool,
    ) -> Result<ScannerId, RegistryError> {
        let name = scanner.name();
        let id = match self.scanners.iter().position(|s| s.name() == name) {
            Some(id) => id,
            None => {
                if self.scanners.len() == MAX_SCANNERS {
                    return Err(RegistryError::TooManyScanners(name));
                }
                self.scanners.push(scanner);
                self.scanners.len() - 1
            }
        };

        let binding = self.bindings.entry((port, direction)).or_default();
        binding.mask.insert(id);
        binding.auto_activate |= auto_activate;

        debug!(
            "registered scanner '{}' (id {}) on port {} {:?}, auto={}",
            name, id, port, direction, binding.auto_activate
        );

        Ok(id)
    }

    pub fn build(self) -> ScannerRegistry {
        info!(
            "PAF registry built: {} scanners, {} port bindings, mfp={}",
            self.scanners.len(),
            self.bindings.len(),
            self.max_flush_point
        );
        ScannerRegistry {
            scanners: self.scanners,
            bindings: self.bindings,
            max_flush_point: self.max_flush_point,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
