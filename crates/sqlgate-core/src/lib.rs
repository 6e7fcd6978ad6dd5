//! # sqlgate-core
//!
//! Types shared by every sqlgate crate:
//!
//! - [`GatewayConfig`] and its sections, loaded from `sqlgate.yaml`
//! - [`Caller`], the identity attached to each inbound request
//! - [`SqlEvent`], the immutable audit record of one statement attempt

// Configuration types shared across all sqlgate crates
pub mod config;
pub mod event;

pub use config::{
    AuditConfig, BlobConfig, ComponentSpec, ConfigError, DatabaseBackend, DatabaseConfig,
    ExtraRuleSpec, FirewallConfig, GatewayConfig, ServerConfig,
};
pub use event::{Caller, SqlEvent, SqlEventBuilder};
