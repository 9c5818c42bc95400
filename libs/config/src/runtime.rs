//! Runtime Configuration Module
//!
//! Loads node settings from TOML with environment overrides.

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use types::ReactorDescriptor;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "NUCLEUS";

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub node: NodeSettings,
    pub reactor: ReactorSettings,
    pub router: RouterSettings,
    pub health: HealthSettings,
    pub pool: PoolSettings,
    pub mailbox: MailboxSettings,
    pub supervision: SupervisionSettings,
    /// Statically known reactors, including remote peers
    pub reactors: Vec<ReactorDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub id: String,
    pub name: String,
    /// Wire listener address
    pub listen: String,
    /// Numeric id stamped as `source_id` on outgoing frames
    pub wire_id: u16,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            id: "node-1".to_string(),
            name: "nucleus".to_string(),
            listen: "127.0.0.1:7400".to_string(),
            wire_id: 1,
        }
    }
}

/// What `process` does when every concurrency permit is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for a permit within the atom's deadline
    #[default]
    Block,
    /// Fail immediately with a retry hint
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorSettings {
    pub max_concurrent_packets: usize,
    pub overflow: OverflowPolicy,
    pub retry_after_ms: u64,
    pub max_frame_size: usize,
}

impl Default for ReactorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_packets: 256,
            overflow: OverflowPolicy::Block,
            retry_after_ms: 100,
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

impl ReactorSettings {
    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Load percentage at or above which a candidate is skipped while probing
    pub load_threshold: u8,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self { load_threshold: 80 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub check_interval_s: u64,
    pub timeout_s: u64,
    pub failure_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_s: 30,
            timeout_s: 5,
            failure_threshold: 3,
        }
    }
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_s)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_per_reactor: usize,
    pub idle_timeout_s: u64,
    pub connect_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_per_reactor: 8,
            idle_timeout_s: 300,
            connect_timeout_ms: 2000,
        }
    }
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_s)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Mailbox behaviour when the bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxOverflow {
    DropOldest,
    DropNewest,
    #[default]
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxSettings {
    /// 0 means unbounded
    pub capacity: usize,
    pub overflow: MailboxOverflow,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: MailboxOverflow::FailFast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionSettings {
    pub max_restarts: u32,
    pub restart_period_s: u64,
}

impl Default for SupervisionSettings {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_period_s: 5,
        }
    }
}

impl SupervisionSettings {
    pub fn restart_period(&self) -> Duration {
        Duration::from_secs(self.restart_period_s)
    }
}

impl RuntimeConfig {
    /// Load from an optional TOML file, then apply `NUCLEUS_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading runtime configuration");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        } else {
            debug!("No configuration file given, using defaults");
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(source).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.id.is_empty() {
            bail!("node.id must not be empty");
        }
        if self.reactor.max_concurrent_packets == 0 {
            bail!("reactor.max_concurrent_packets must be at least 1");
        }
        if self.reactor.max_frame_size == 0 {
            bail!("reactor.max_frame_size must be at least 1");
        }
        if self.router.load_threshold > 100 {
            bail!(
                "router.load_threshold {} exceeds 100",
                self.router.load_threshold
            );
        }
        if self.health.check_interval_s == 0 || self.health.timeout_s == 0 {
            bail!("health intervals must be non-zero");
        }
        if self.health.failure_threshold == 0 {
            bail!("health.failure_threshold must be at least 1");
        }
        if self.pool.max_per_reactor == 0 {
            bail!("pool.max_per_reactor must be at least 1");
        }
        if self.pool.idle_timeout_s == 0 || self.pool.connect_timeout_ms == 0 {
            bail!("pool timeouts must be non-zero");
        }
        if self.supervision.restart_period_s == 0 {
            bail!("supervision.restart_period_s must be non-zero");
        }

        let mut seen = HashSet::new();
        for reactor in &self.reactors {
            if !seen.insert(reactor.id.as_str()) {
                bail!("duplicate reactor id {}", reactor.id);
            }
        }
        Ok(())
    }

    /// Statically configured reactor by id
    pub fn reactor(&self, id: &str) -> Option<&ReactorDescriptor> {
        self.reactors.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use types::PacketGroup;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.reactor.max_concurrent_packets, 256);
        assert_eq!(config.reactor.overflow, OverflowPolicy::Block);
        assert_eq!(config.health.failure_threshold, 3);
        assert_eq!(config.mailbox.overflow, MailboxOverflow::FailFast);
        assert_eq!(config.supervision.restart_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_sections_and_reactors_parse() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [reactor]
            max_concurrent_packets = 4
            overflow = "reject"

            [mailbox]
            capacity = 0
            overflow = "drop_oldest"

            [[reactors]]
            id = "r1"
            endpoint = "10.0.0.1:7400"
            types = ["cf"]

            [[reactors]]
            id = "r2"
            endpoint = "10.0.0.2:7400"
            types = ["general"]
            capacity = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.reactor.overflow, OverflowPolicy::Reject);
        assert_eq!(config.mailbox.capacity, 0);
        assert_eq!(config.mailbox.overflow, MailboxOverflow::DropOldest);
        assert!(config.reactor("r1").unwrap().handles(PacketGroup::CF));
        assert!(config.reactor("r2").unwrap().is_general());
        assert_eq!(config.reactor("r2").unwrap().capacity, 50);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RuntimeConfig::from_toml_str("[router]\nload_threshold = 101").is_err());
        assert!(RuntimeConfig::from_toml_str("[reactor]\nmax_concurrent_packets = 0").is_err());
        assert!(RuntimeConfig::from_toml_str("[health]\ncheck_interval_s = 0").is_err());

        let duplicate = r#"
            [[reactors]]
            id = "r1"
            endpoint = "a:1"
            [[reactors]]
            id = "r1"
            endpoint = "b:2"
        "#;
        let err = RuntimeConfig::from_toml_str(duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate reactor id r1"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[node]\nid = \"from-file\"\nlisten = \"0.0.0.0:9000\"\n\n[pool]\nmax_per_reactor = 2"
        )
        .unwrap();

        let config = RuntimeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.node.id, "from-file");
        assert_eq!(config.node.listen, "0.0.0.0:9000");
        assert_eq!(config.pool.max_per_reactor, 2);
        assert_eq!(config.pool.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RuntimeConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
