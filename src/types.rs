//! Logical type identities and the typed values they encode.

use bytes::{Bytes, BytesMut};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A PostgreSQL logical type, identified by its type OID.
///
/// `PgType` is the key the handler registry is indexed by. The associated
/// constants cover the types this crate encodes out of the box, but any
/// OID can be named, so callers can register handlers for types the crate
/// has never heard of.
///
/// OIDs are stable across Postgres versions; see `pg_type.dat` in the
/// Postgres source tree.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgType(u32);

impl PgType {
    pub const BOOL: Self = Self(16);
    pub const BYTEA: Self = Self(17);
    pub const CHAR: Self = Self(18);
    pub const INT8: Self = Self(20);
    pub const INT2: Self = Self(21);
    pub const INT4: Self = Self(23);
    pub const TEXT: Self = Self(25);
    pub const JSONB: Self = Self(3802);
    pub const FLOAT4: Self = Self(700);
    pub const FLOAT8: Self = Self(701);
    pub const VARCHAR: Self = Self(1043);
    pub const DATE: Self = Self(1082);
    pub const TIMESTAMP: Self = Self(1114);
    pub const NUMERIC: Self = Self(1700);
    pub const UUID: Self = Self(2950);

    /// The raw type OID.
    pub fn oid(self) -> u32 {
        self.0
    }
}

impl From<u32> for PgType {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<PgType> for u32 {
    fn from(value: PgType) -> Self {
        value.0
    }
}

impl PartialEq<u32> for PgType {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl PartialEq<PgType> for u32 {
    fn eq(&self, other: &PgType) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for PgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            PgType::BOOL => "bool",
            PgType::BYTEA => "bytea",
            PgType::CHAR => "\"char\"",
            PgType::INT8 => "int8",
            PgType::INT2 => "int2",
            PgType::INT4 => "int4",
            PgType::TEXT => "text",
            PgType::JSONB => "jsonb",
            PgType::FLOAT4 => "float4",
            PgType::FLOAT8 => "float8",
            PgType::VARCHAR => "varchar",
            PgType::DATE => "date",
            PgType::TIMESTAMP => "timestamp",
            PgType::NUMERIC => "numeric",
            PgType::UUID => "uuid",
            _ => "unknown",
        };
        write!(f, "{name}(oid {})", self.0)
    }
}

impl std::fmt::Debug for PgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PgType({})", self.0)
    }
}

/// A single field value destined for a COPY BINARY stream.
///
/// `Null` stands in for an absent value of any column type; it encodes as
/// the 4-byte `-1` sentinel with no payload. `Other` carries a payload the
/// caller has already encoded, tagged with its type, for use with
/// registered custom handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyValue {
    Null,
    Bool(bool),
    Char(i8),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Bytes),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Numeric(Decimal),
    Other(PgType, Bytes),
}

impl CopyValue {
    /// A short name for the variant, used in type mismatch errors.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            CopyValue::Null => "null",
            CopyValue::Bool(_) => "bool",
            CopyValue::Char(_) => "char",
            CopyValue::Int2(_) => "int2",
            CopyValue::Int4(_) => "int4",
            CopyValue::Int8(_) => "int8",
            CopyValue::Float4(_) => "float4",
            CopyValue::Float8(_) => "float8",
            CopyValue::Text(_) => "text",
            CopyValue::Bytea(_) => "bytea",
            CopyValue::Date(_) => "date",
            CopyValue::Timestamp(_) => "timestamp",
            CopyValue::Uuid(_) => "uuid",
            CopyValue::Numeric(_) => "numeric",
            CopyValue::Other(..) => "other",
        }
    }
}

impl From<bool> for CopyValue {
    fn from(v: bool) -> Self {
        CopyValue::Bool(v)
    }
}

impl From<i8> for CopyValue {
    fn from(v: i8) -> Self {
        CopyValue::Char(v)
    }
}

impl From<i16> for CopyValue {
    fn from(v: i16) -> Self {
        CopyValue::Int2(v)
    }
}

impl From<i32> for CopyValue {
    fn from(v: i32) -> Self {
        CopyValue::Int4(v)
    }
}

impl From<i64> for CopyValue {
    fn from(v: i64) -> Self {
        CopyValue::Int8(v)
    }
}

impl From<f32> for CopyValue {
    fn from(v: f32) -> Self {
        CopyValue::Float4(v)
    }
}

impl From<f64> for CopyValue {
    fn from(v: f64) -> Self {
        CopyValue::Float8(v)
    }
}

impl From<String> for CopyValue {
    fn from(v: String) -> Self {
        CopyValue::Text(v)
    }
}

impl From<&str> for CopyValue {
    fn from(v: &str) -> Self {
        CopyValue::Text(v.to_string())
    }
}

impl From<Bytes> for CopyValue {
    fn from(v: Bytes) -> Self {
        CopyValue::Bytea(v)
    }
}

impl From<BytesMut> for CopyValue {
    fn from(v: BytesMut) -> Self {
        CopyValue::Bytea(v.freeze())
    }
}

impl From<NaiveDate> for CopyValue {
    fn from(v: NaiveDate) -> Self {
        CopyValue::Date(v)
    }
}

impl From<NaiveDateTime> for CopyValue {
    fn from(v: NaiveDateTime) -> Self {
        CopyValue::Timestamp(v)
    }
}

impl From<Uuid> for CopyValue {
    fn from(v: Uuid) -> Self {
        CopyValue::Uuid(v)
    }
}

impl From<Decimal> for CopyValue {
    fn from(v: Decimal) -> Self {
        CopyValue::Numeric(v)
    }
}

impl<T: Into<CopyValue>> From<Option<T>> for CopyValue {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => CopyValue::Null,
        }
    }
}
