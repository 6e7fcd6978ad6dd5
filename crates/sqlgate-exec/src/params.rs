//! Rebuilds driver-native parameters from their wire form.
//!
//! The [`ParameterBuilder`] owns every file a request brings along: uploaded
//! large objects, their HTML-decoded siblings and batch files. It must be
//! [`close`](ParameterBuilder::close)d once the statement is finished,
//! whatever the outcome; dropping an unclosed builder removes the files
//! synchronously as a last resort.

use crate::blob::{decode_html_sibling, UploadDir};
use crate::error::ParameterError;
use crate::wire::{ParamSpec, NULL_SENTINEL};
use bigdecimal::BigDecimal;
use chrono::DateTime;
use sqlgate_core::{BlobConfig, Caller};
use sqlgate_db::{
    BindValue, DbError, ParameterDirection, PreparedStatement, SqlType, StatementMode,
    StatementParameter,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A parameter ready to be bound.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub index: usize,
    pub sql_type: SqlType,
    pub direction: ParameterDirection,
    /// Value as sent on the wire; `None` for pure OUT parameters.
    pub raw_value: Option<String>,
    pub value: BindValue,
    pub out_name: Option<String>,
}

impl BoundParameter {
    /// Wire value for audit records and denial envelopes.
    pub fn display_value(&self) -> String {
        self.raw_value
            .clone()
            .unwrap_or_else(|| NULL_SENTINEL.to_string())
    }
}

/// Parameter type tags, in order.
pub fn parameter_types(parameters: &[BoundParameter]) -> Vec<String> {
    parameters
        .iter()
        .map(|p| p.sql_type.as_str().to_string())
        .collect()
}

/// Parameter wire values, in order.
pub fn parameter_values(parameters: &[BoundParameter]) -> Vec<String> {
    parameters.iter().map(BoundParameter::display_value).collect()
}

/// Attach `parameters` to `statement`.
///
/// With `large_object_storage` set, binary large objects go through the
/// engine's large-object facility instead of a plain byte bind.
pub fn bind(
    statement: &mut PreparedStatement,
    parameters: Vec<BoundParameter>,
    large_object_storage: bool,
) -> Result<(), DbError> {
    for parameter in parameters {
        let value = match parameter.value {
            BindValue::Bytes(bytes) if large_object_storage && parameter.sql_type.is_binary_lob() => {
                BindValue::LargeObject(bytes)
            }
            other => other,
        };
        statement.bind(StatementParameter {
            index: parameter.index,
            sql_type: parameter.sql_type,
            direction: parameter.direction,
            value,
            out_name: parameter.out_name,
        })?;
    }
    Ok(())
}

/// Builds parameters for one request and owns its temporary files.
#[derive(Debug)]
pub struct ParameterBuilder {
    uploads: UploadDir,
    username: String,
    keep_files: bool,
    html_decode_clobs: bool,
    callable_supported: bool,
    owned_files: Vec<PathBuf>,
}

impl ParameterBuilder {
    pub fn new(config: &BlobConfig, caller: &Caller) -> Self {
        Self {
            uploads: UploadDir::new(&config.upload_root),
            username: caller.username.clone(),
            keep_files: config.keep_uploaded_files,
            html_decode_clobs: config.html_decode_clobs,
            callable_supported: true,
            owned_files: Vec::new(),
        }
    }

    /// Whether the target database runs callable statements. Without them,
    /// callable requests and OUT registrations are rejected while building.
    pub fn with_callable_support(mut self, supported: bool) -> Self {
        self.callable_supported = supported;
        self
    }

    /// Files that will be removed on close.
    pub fn owned_files(&self) -> &[PathBuf] {
        &self.owned_files
    }

    /// Take ownership of `path`; it is deleted on close.
    pub fn adopt(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.owned_files.contains(&path) {
            self.owned_files.push(path);
        }
    }

    /// Resolve an upload handle of this caller and take ownership of it.
    pub async fn open_upload(&mut self, handle: &str) -> Result<PathBuf, ParameterError> {
        let path = self.uploads.resolve(&self.username, handle).await?;
        self.adopt(path.clone());
        Ok(path)
    }

    /// Convert `specs` into bound parameters for a statement in `mode`.
    ///
    /// Fails on the first bad parameter; nothing touches the database.
    pub async fn build_parameters(
        &mut self,
        specs: &[ParamSpec],
        mode: StatementMode,
    ) -> Result<Vec<BoundParameter>, ParameterError> {
        if mode == StatementMode::Plain && !specs.is_empty() {
            return Err(ParameterError::PlainWithParameters { count: specs.len() });
        }

        let mut parameters = Vec::with_capacity(specs.len());
        for spec in specs {
            parameters.push(self.build_one(spec, mode).await?);
        }
        if mode == StatementMode::Callable && !self.callable_supported {
            return Err(ParameterError::CallableNotSupported);
        }
        Ok(parameters)
    }

    async fn build_one(
        &mut self,
        spec: &ParamSpec,
        mode: StatementMode,
    ) -> Result<BoundParameter, ParameterError> {
        let index = spec.index;
        let sql_type =
            SqlType::from_tag(&spec.type_tag).ok_or_else(|| ParameterError::UnknownType {
                index,
                tag: spec.type_tag.clone(),
            })?;
        let direction_tag = spec.direction_tag.as_deref().unwrap_or_default();
        let direction = ParameterDirection::from_tag(direction_tag).ok_or_else(|| {
            ParameterError::UnknownDirection {
                index,
                tag: direction_tag.to_string(),
            }
        })?;

        if direction.is_output() {
            if sql_type.is_large_object() {
                return Err(ParameterError::IllegalOutDirection { index, sql_type });
            }
            let reason = if mode != StatementMode::Callable {
                Some("the statement is not callable")
            } else if !self.callable_supported {
                Some("the database has no callable statements")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ParameterError::OutNotSupported {
                    index,
                    direction: direction.to_string(),
                    reason,
                });
            }
        }

        let (raw_value, value) = if direction.is_input() {
            let raw = spec
                .value
                .clone()
                .ok_or(ParameterError::MissingValue { index })?;
            let value = if raw == NULL_SENTINEL {
                BindValue::Null(sql_type)
            } else {
                self.convert(index, sql_type, &raw).await?
            };
            (Some(raw), value)
        } else {
            (None, BindValue::Null(sql_type))
        };

        tracing::trace!(
            index,
            sql_type = %sql_type,
            direction = %direction,
            "Built parameter"
        );

        Ok(BoundParameter {
            index,
            sql_type,
            direction,
            raw_value,
            value,
            out_name: spec.out_name.clone(),
        })
    }

    async fn convert(
        &mut self,
        index: usize,
        sql_type: SqlType,
        raw: &str,
    ) -> Result<BindValue, ParameterError> {
        let invalid = |message: String| ParameterError::InvalidValue {
            index,
            sql_type,
            value: raw.to_string(),
            message,
        };
        let trimmed = raw.trim();

        let value = match sql_type {
            SqlType::Char | SqlType::Varchar => BindValue::Text(raw.to_string()),
            SqlType::Numeric | SqlType::Decimal => BindValue::Decimal(
                BigDecimal::from_str(trimmed).map_err(|e| invalid(e.to_string()))?,
            ),
            SqlType::Bit => BindValue::Bool(parse_bit(trimmed).ok_or_else(|| {
                invalid("expected true, false, 1 or 0".to_string())
            })?),
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer => {
                BindValue::Int(trimmed.parse().map_err(|e: std::num::ParseIntError| {
                    invalid(e.to_string())
                })?)
            }
            SqlType::BigInt => BindValue::BigInt(
                trimmed
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?,
            ),
            SqlType::Real => BindValue::Real(
                trimmed
                    .parse()
                    .map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?,
            ),
            SqlType::Float | SqlType::Double => BindValue::Double(
                trimmed
                    .parse()
                    .map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?,
            ),
            SqlType::Date | SqlType::Time | SqlType::Timestamp => {
                let millis: i64 = trimmed
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
                let instant = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| invalid("epoch milliseconds out of range".to_string()))?;
                match sql_type {
                    SqlType::Date => BindValue::Date(instant.date_naive()),
                    SqlType::Time => BindValue::Time(instant.time()),
                    _ => BindValue::Timestamp(instant.naive_utc()),
                }
            }
            SqlType::Url => {
                url::Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
                BindValue::Text(trimmed.to_string())
            }
            SqlType::LongVarchar | SqlType::Clob => {
                let mut path = self.open_upload(raw).await?;
                if self.html_decode_clobs {
                    path = decode_html_sibling(&path).await?;
                    self.adopt(path.clone());
                }
                BindValue::Text(read_to_string(&path).await?)
            }
            SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob => {
                let path = self.open_upload(raw).await?;
                BindValue::Bytes(read(&path).await?)
            }
        };
        Ok(value)
    }

    /// Delete every owned file, or warn about each one when retention is
    /// configured. Safe to call more than once.
    pub async fn close(&mut self) {
        for path in std::mem::take(&mut self.owned_files) {
            if self.keep_files {
                tracing::warn!(path = %path.display(), "Keeping uploaded file for diagnostics");
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted uploaded file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete uploaded file")
                }
            }
        }
    }
}

impl Drop for ParameterBuilder {
    fn drop(&mut self) {
        if self.keep_files || self.owned_files.is_empty() {
            return;
        }
        tracing::warn!(
            files = self.owned_files.len(),
            "Parameter builder dropped without close"
        );
        for path in self.owned_files.drain(..) {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn parse_bit(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ParameterError> {
    tokio::fs::read(path).await.map_err(|source| ParameterError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_to_string(path: &Path) -> Result<String, ParameterError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ParameterError::Io {
            path: path.to_path_buf(),
            source,
        })
}
