//! Parameter SQL types and native bind values.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// SQL type tag of a positional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    Char,
    Varchar,
    Numeric,
    Decimal,
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Date,
    Time,
    Timestamp,
    LongVarchar,
    Clob,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Url,
}

impl SqlType {
    /// Parse a wire tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let ty = match tag.trim().to_ascii_uppercase().as_str() {
            "CHAR" => Self::Char,
            "VARCHAR" => Self::Varchar,
            "NUMERIC" => Self::Numeric,
            "DECIMAL" => Self::Decimal,
            "BIT" | "BOOLEAN" => Self::Bit,
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "INTEGER" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "REAL" => Self::Real,
            "FLOAT" => Self::Float,
            "DOUBLE" | "DOUBLE_PRECISION" => Self::Double,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" => Self::Timestamp,
            "LONGVARCHAR" => Self::LongVarchar,
            "CLOB" => Self::Clob,
            "BINARY" => Self::Binary,
            "VARBINARY" => Self::VarBinary,
            "LONGVARBINARY" => Self::LongVarBinary,
            "BLOB" => Self::Blob,
            "URL" => Self::Url,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Numeric => "NUMERIC",
            Self::Decimal => "DECIMAL",
            Self::Bit => "BIT",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::LongVarchar => "LONGVARCHAR",
            Self::Clob => "CLOB",
            Self::Binary => "BINARY",
            Self::VarBinary => "VARBINARY",
            Self::LongVarBinary => "LONGVARBINARY",
            Self::Blob => "BLOB",
            Self::Url => "URL",
        }
    }

    /// Character large object, sent as an upload handle.
    pub fn is_character_lob(&self) -> bool {
        matches!(self, Self::LongVarchar | Self::Clob)
    }

    /// Binary large object, sent as an upload handle.
    pub fn is_binary_lob(&self) -> bool {
        matches!(
            self,
            Self::Binary | Self::VarBinary | Self::LongVarBinary | Self::Blob
        )
    }

    pub fn is_large_object(&self) -> bool {
        self.is_character_lob() || self.is_binary_lob()
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a positional parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterDirection {
    #[default]
    In,
    Out,
    InOut,
}

impl ParameterDirection {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "inout" => Some(Self::InOut),
            _ => None,
        }
    }

    /// Whether a value is sent to the database.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Whether a value is read back from the database.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::InOut => "INOUT",
        }
    }
}

impl std::fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A driver-native parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// Typed null; the type picks the driver's null encoding.
    Null(SqlType),
    Text(String),
    Decimal(BigDecimal),
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
    /// Bytes stored through the engine's large-object facility and bound
    /// as an object identifier.
    LargeObject(Vec<u8>),
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }
}
