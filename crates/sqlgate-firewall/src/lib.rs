//! # sqlgate-firewall
//!
//! Pluggable statement firewall for sqlgate.
//!
//! A [`FirewallChain`] holds the ordered [`FirewallManager`]s and
//! [`RefusalTrigger`]s of one database binding. Every statement is
//! evaluated against every manager until one denies; the first denial wins
//! and is reported in the [`FirewallVerdict`]. Triggers then run once via
//! [`FirewallChain::on_deny`].
//!
//! ## Built-in managers
//!
//! | Key | Denies |
//! |-----|--------|
//! | `allow_all` | nothing |
//! | `deny_database_write` | every write (write-gate) |
//! | `deny_ddl`, `deny_dcl`, `deny_tcl`, `deny_dml` | statements of those kinds |
//! | `deny_metadata_query` | metadata queries |
//! | `deny_statement_class` | plain (non-prepared) statements |
//! | `deny_on_blacklist` | statements listed in `options.file` |
//! | `deny_except_on_whitelist` | statements not listed in `options.file` |
//! | `deny_comments` | statements with comments |
//! | `deny_multiple_statements` | statements containing `;` |
//! | `csv_rules` | statements no row of `options.file` grants |
//! | `deny_sql_injection` | statements the local detector flags |
//! | `deny_sql_injection_remote` | statements a remote service flags |
//! | `deny_banned_user` | callers recorded by the `ban_user` trigger |
//!
//! ## Built-in triggers
//!
//! `log`, `audit` (JSON Lines file at `options.file`) and `ban_user`.

mod ban;
pub mod chain;
pub mod error;
pub mod manager;
pub mod managers;
pub mod registry;
pub mod trigger;

pub use ban::DEFAULT_BAN_TABLE;
pub use chain::{FirewallChain, FirewallVerdict, Gate};
pub use error::FirewallError;
pub use manager::{DeferredCheck, FirewallManager};
pub use registry::{BuildContext, FirewallRegistry};
pub use trigger::{AuditTrigger, BanUserTrigger, LogTrigger, Refusal, RefusalTrigger};
