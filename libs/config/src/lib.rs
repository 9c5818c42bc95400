//! # Nucleus Runtime Configuration
//!
//! One [`RuntimeConfig`] per node, assembled from a TOML file and
//! `NUCLEUS_`-prefixed environment variables (nested keys use `__`, so
//! `NUCLEUS_ROUTER__LOAD_THRESHOLD=60` overrides `[router] load_threshold`).
//!
//! Every section has defaults, so an empty file is a valid configuration.
//!
//! ## Usage
//!
//! ```rust
//! use config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(r#"
//!     [node]
//!     id = "node-a"
//!
//!     [[reactors]]
//!     id = "r1"
//!     endpoint = "127.0.0.1:7401"
//!     types = ["cf", "df"]
//! "#).unwrap();
//!
//! assert_eq!(config.node.id, "node-a");
//! assert_eq!(config.router.load_threshold, 80);
//! assert_eq!(config.reactors.len(), 1);
//! ```

pub mod runtime;

pub use runtime::{
    HealthSettings, MailboxOverflow, MailboxSettings, NodeSettings, OverflowPolicy,
    PoolSettings, ReactorSettings, RouterSettings, RuntimeConfig, SupervisionSettings,
    ENV_PREFIX,
};
