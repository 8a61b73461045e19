//! Runtime configuration for the maintenance daemon.
//!
//! Config comes from an optional JSON file plus command line overrides.
//! Every field has a default so a bare `matmaintd` run works.

use crate::error::{MatError, MatResult};
use crate::table::TableGeometry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-switch MAC table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatConfig {
    /// MA table geometry.
    pub geometry: TableGeometry,
    /// Number of usable logical ports.
    pub num_ports: u16,
    /// Dynamic entry lifetime in milliseconds. Zero disables aging.
    pub aging_time_ms: u64,
    /// Upper bound on the idle wait between maintenance passes.
    pub maint_interval_ms: u64,
    /// Pause between switches on each worker wrap.
    pub worker_throttle_ms: u64,
    /// Run timed maintenance even when no work is signalled.
    pub periodic_maintenance: bool,
    /// Switch family learns by table scan instead of a learn FIFO.
    pub polling_required: bool,
    /// Report dynamic learns and ages on the update channel.
    pub notify_on_dynamic_learn: bool,
    /// Report static adds and deletes on the update channel.
    pub notify_on_static_learn: bool,
    /// Number of update event buffers in flight per switch.
    pub event_pool_size: usize,
    /// Records per update event buffer.
    pub burst_size: usize,
    /// Most learn FIFO entries drained in one service pass.
    pub fifo_batch_limit: usize,
}

impl Default for MatConfig {
    fn default() -> Self {
        MatConfig {
            geometry: TableGeometry::default(),
            num_ports: 48,
            aging_time_ms: 300_000,
            maint_interval_ms: 1_000,
            worker_throttle_ms: 10,
            periodic_maintenance: true,
            polling_required: false,
            notify_on_dynamic_learn: true,
            notify_on_static_learn: false,
            event_pool_size: 8,
            burst_size: 32,
            fifo_batch_limit: 64,
        }
    }
}

impl MatConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table geometry.
    pub fn with_geometry(mut self, geometry: TableGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Sets the dynamic entry lifetime.
    pub fn with_aging_time(mut self, aging_time: Duration) -> Self {
        self.aging_time_ms = aging_time.as_millis() as u64;
        self
    }

    /// Sets the records-per-buffer batch size.
    pub fn with_burst_size(mut self, burst_size: usize) -> Self {
        self.burst_size = burst_size;
        self
    }

    /// Sets the number of event buffers in flight.
    pub fn with_event_pool_size(mut self, event_pool_size: usize) -> Self {
        self.event_pool_size = event_pool_size;
        self
    }

    /// Enables or disables static add/delete reporting.
    pub fn with_notify_on_static_learn(mut self, notify: bool) -> Self {
        self.notify_on_static_learn = notify;
        self
    }

    /// Enables or disables dynamic learn/age reporting.
    pub fn with_notify_on_dynamic_learn(mut self, notify: bool) -> Self {
        self.notify_on_dynamic_learn = notify;
        self
    }

    /// Marks the switch family as scan-based rather than FIFO-based.
    pub fn with_polling_required(mut self, polling: bool) -> Self {
        self.polling_required = polling;
        self
    }

    /// Enables or disables timed maintenance passes.
    pub fn with_periodic_maintenance(mut self, periodic: bool) -> Self {
        self.periodic_maintenance = periodic;
        self
    }

    /// Dynamic entry lifetime as a Duration.
    pub fn aging_time(&self) -> Duration {
        Duration::from_millis(self.aging_time_ms)
    }

    /// Interval between aging sweeps.
    ///
    /// Entries advance one state per sweep, so an entry expires between
    /// one and two lifetimes after its last refresh.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.aging_time_ms / 2)
    }

    /// Upper bound on the idle wait between maintenance passes.
    pub fn maint_interval(&self) -> Duration {
        Duration::from_millis(self.maint_interval_ms)
    }

    /// Pause between switches on each worker wrap.
    pub fn worker_throttle(&self) -> Duration {
        Duration::from_millis(self.worker_throttle_ms)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> MatResult<()> {
        if self.geometry.banks == 0 || self.geometry.bins_per_bank == 0 {
            return Err(MatError::Config(
                "table geometry must have at least one bank and one bin".to_string(),
            ));
        }
        if self.num_ports == 0 || self.num_ports > PORT_LIMIT {
            return Err(MatError::Config(format!(
                "num_ports {} outside 1..={}",
                self.num_ports, PORT_LIMIT
            )));
        }
        if self.burst_size == 0 {
            return Err(MatError::Config("burst_size must be non-zero".to_string()));
        }
        if self.event_pool_size == 0 {
            return Err(MatError::Config(
                "event_pool_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Widest port range any supported family exposes.
const PORT_LIMIT: u16 = 64;

/// Daemon-level settings: slot table size plus the per-switch defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Number of switch slots the daemon manages.
    pub max_switches: u8,
    /// Default per-switch configuration for attached switches.
    pub mat: MatConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            max_switches: 4,
            mat: MatConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> MatResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MatError::Config(format!("read {}: {}", path.display(), e)))?;
        let config: DaemonConfig = serde_json::from_str(&raw)
            .map_err(|e| MatError::Config(format!("parse {}: {}", path.display(), e)))?;
        config.mat.validate()?;
        if config.max_switches == 0 {
            return Err(MatError::Config("max_switches must be non-zero".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MatConfig::default();
        assert_eq!(config.geometry.banks, 4);
        assert_eq!(config.geometry.bins_per_bank, 4096);
        assert_eq!(config.num_ports, 48);
        assert!(config.notify_on_dynamic_learn);
        assert!(!config.notify_on_static_learn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = MatConfig::new()
            .with_burst_size(4)
            .with_notify_on_static_learn(true)
            .with_aging_time(Duration::from_secs(10));
        assert_eq!(config.burst_size, 4);
        assert!(config.notify_on_static_learn);
        assert_eq!(config.aging_time(), Duration::from_secs(10));
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let config = MatConfig::new().with_burst_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_switches": 2, "mat": {{"burst_size": 8, "num_ports": 24}}}}"#
        )
        .unwrap();
        let config = DaemonConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_switches, 2);
        assert_eq!(config.mat.burst_size, 8);
        assert_eq!(config.mat.num_ports, 24);
        // Unspecified fields keep their defaults.
        assert_eq!(config.mat.geometry.banks, 4);
    }

    #[test]
    fn test_from_file_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(DaemonConfig::from_file(file.path()).is_err());
    }
}
