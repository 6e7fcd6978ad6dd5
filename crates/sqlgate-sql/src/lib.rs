//! # sqlgate-sql
//!
//! SQL tokenizing and statement classification for sqlgate.
//!
//! This crate provides:
//! - A tokenizer that pads operators and punctuation so keyword matching is
//!   safe without a grammar ([`tokenizer`])
//! - A classifier producing a [`StatementShape`]: kind, referenced tables,
//!   comment and multi-statement flags ([`classifier`])
//! - Placeholder rewriting for drivers that need `$n` markers
//!   ([`placeholders`])
//!
//! ```
//! use sqlgate_sql::{classify, StatementKind};
//!
//! let shape = classify("INSERT INTO ORDERLOG VALUES (?,?,?)");
//! assert_eq!(shape.kind(), StatementKind::Insert);
//! assert_eq!(shape.tables(), ["orderlog"]);
//! ```

pub mod classifier;
pub mod error;
pub mod placeholders;
pub mod tokenizer;

pub use classifier::{classify, SqlDialect, StatementClassifier, StatementKind, StatementShape};
pub use error::SqlError;
pub use tokenizer::{canonical, normalize, split_on_single_quotes, tokenize};
