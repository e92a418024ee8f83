//! Value handlers: one encoder per logical type.
//!
//! A handler maps a nullable [`CopyValue`] to its length-prefixed wire
//! payload. Handlers hold no per-row state, so one instance serves every
//! row of every writer built from the same registry.
//!
//! The payload encodings match the corresponding Postgres `send`
//! functions bit-for-bit; a stream produced here is indistinguishable
//! from one produced by `COPY ... TO STDOUT (FORMAT binary)`.

use bytes::{BufMut, BytesMut};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::{
    error::{Error, Result},
    proto::{field, put_null},
    types::{CopyValue, PgType},
};

/// Encoder bound to one logical type.
///
/// `handle` writes either the 4-byte `-1` null sentinel or a 4-byte
/// length prefix followed by exactly that many payload bytes. Nothing is
/// written when an error is returned.
pub trait ValueHandler: Send + Sync {
    /// The logical type this handler encodes.
    fn pg_type(&self) -> PgType;

    /// Encodes one field into `buf`.
    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()>;
}

macro_rules! mismatch {
    ($handler:expr, $value:expr) => {
        Err(Error::TypeMismatch {
            expected: $handler.pg_type(),
            value: $value.kind(),
        })
    };
}

pub struct BoolHandler;

impl ValueHandler for BoolHandler {
    fn pg_type(&self) -> PgType {
        PgType::BOOL
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Bool(v) => field(buf, |b| b.put_u8(*v as u8)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for the single-byte `"char"` type (not `character(n)`).
pub struct CharHandler;

impl ValueHandler for CharHandler {
    fn pg_type(&self) -> PgType {
        PgType::CHAR
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Char(v) => field(buf, |b| b.put_i8(*v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

pub struct Int2Handler;

impl ValueHandler for Int2Handler {
    fn pg_type(&self) -> PgType {
        PgType::INT2
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Int2(v) => field(buf, |b| b.put_i16(*v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

pub struct Int4Handler;

impl ValueHandler for Int4Handler {
    fn pg_type(&self) -> PgType {
        PgType::INT4
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Int4(v) => field(buf, |b| b.put_i32(*v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

pub struct Int8Handler;

impl ValueHandler for Int8Handler {
    fn pg_type(&self) -> PgType {
        PgType::INT8
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Int8(v) => field(buf, |b| b.put_i64(*v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

pub struct Float4Handler;

impl ValueHandler for Float4Handler {
    fn pg_type(&self) -> PgType {
        PgType::FLOAT4
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Float4(v) => field(buf, |b| b.put_f32(*v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

pub struct Float8Handler;

impl ValueHandler for Float8Handler {
    fn pg_type(&self) -> PgType {
        PgType::FLOAT8
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Float8(v) => field(buf, |b| b.put_f64(*v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for `text` and `varchar`: the raw UTF-8 bytes, no terminator.
pub struct TextHandler;

impl ValueHandler for TextHandler {
    fn pg_type(&self) -> PgType {
        PgType::TEXT
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Text(v) => field(buf, |b| b.put_slice(v.as_bytes())),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

pub struct ByteaHandler;

impl ValueHandler for ByteaHandler {
    fn pg_type(&self) -> PgType {
        PgType::BYTEA
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Bytea(v) => field(buf, |b| b.put_slice(v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for `jsonb`: a 1-byte version tag (currently 1) followed by
/// the JSON text as UTF-8.
pub struct JsonbHandler;

impl ValueHandler for JsonbHandler {
    fn pg_type(&self) -> PgType {
        PgType::JSONB
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Text(v) => field(buf, |b| {
                b.put_u8(1);
                b.put_slice(v.as_bytes());
            }),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for `date`: a signed 32-bit day count relative to 2000-01-01,
/// negative for earlier dates. Note the Postgres epoch, not the Unix one.
pub struct DateHandler;

impl ValueHandler for DateHandler {
    fn pg_type(&self) -> PgType {
        PgType::DATE
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Date(v) => field(buf, |b| b.put_i32(pg_epoch_days(*v))),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for `timestamp` (without time zone): signed 64-bit microseconds
/// relative to 2000-01-01T00:00:00. Sub-microsecond input truncates
/// toward zero.
pub struct TimestampHandler;

impl ValueHandler for TimestampHandler {
    fn pg_type(&self) -> PgType {
        PgType::TIMESTAMP
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Timestamp(v) => {
                let micros = pg_epoch_micros(*v)?;
                field(buf, |b| b.put_i64(micros));
            }
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for `uuid`: the 16 bytes in network order.
pub struct UuidHandler;

impl ValueHandler for UuidHandler {
    fn pg_type(&self) -> PgType {
        PgType::UUID
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Uuid(v) => field(buf, |b| b.put_slice(v.as_bytes())),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Encoder for `numeric`: a header of base-10000 digit count, weight,
/// sign, and display scale, followed by the digit groups most significant
/// first.
pub struct NumericHandler;

impl ValueHandler for NumericHandler {
    fn pg_type(&self) -> PgType {
        PgType::NUMERIC
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Numeric(v) => field(buf, |b| put_numeric(b, v)),
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

/// Passthrough encoder for a caller-declared type whose payload is
/// already in wire form. Register one of these to stream types this
/// crate has no native encoder for.
pub struct RawHandler {
    ty: PgType,
}

impl RawHandler {
    pub fn new(ty: impl Into<PgType>) -> Self {
        RawHandler { ty: ty.into() }
    }
}

impl ValueHandler for RawHandler {
    fn pg_type(&self) -> PgType {
        self.ty
    }

    fn handle(&self, buf: &mut BytesMut, value: &CopyValue) -> Result<()> {
        match value {
            CopyValue::Null => put_null(buf),
            CopyValue::Other(ty, payload) if *ty == self.ty => {
                field(buf, |b| b.put_slice(payload));
            }
            other => return mismatch!(self, other),
        }
        Ok(())
    }
}

fn pg_date_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid epoch date")
}

fn pg_epoch_days(date: NaiveDate) -> i32 {
    // NaiveDate's range is ~±262000 years, so the day count fits an i32.
    date.signed_duration_since(pg_date_epoch()).num_days() as i32
}

fn pg_epoch_micros(ts: NaiveDateTime) -> Result<i64> {
    let epoch = pg_date_epoch().and_hms_opt(0, 0, 0).expect("valid epoch time");
    let delta = ts.signed_duration_since(epoch);

    // num_seconds and subsec_nanos both carry the sign of the delta, so
    // integer division truncates sub-microsecond input toward zero.
    let sub_micros = (delta.subsec_nanos() / 1_000) as i64;
    delta
        .num_seconds()
        .checked_mul(1_000_000)
        .and_then(|micros| micros.checked_add(sub_micros))
        .ok_or(Error::ValueOutOfRange("timestamp"))
}

const NUMERIC_NEG: u16 = 0x4000;

fn put_numeric(buf: &mut BytesMut, value: &Decimal) {
    let mantissa = value.mantissa();
    let scale = value.scale();
    let sign = if mantissa < 0 { NUMERIC_NEG } else { 0 };

    // Pad the fractional part out to a whole number of base-10000 groups.
    let mut n = mantissa.unsigned_abs();
    let padding = (4 - scale % 4) % 4;
    for _ in 0..padding {
        n *= 10;
    }
    let frac_groups = (scale + padding) / 4;

    // Base-10000 digits, least significant first. The loop stops at the
    // first nonzero group, so no leading zero groups are emitted.
    let mut digits = Vec::new();
    while n > 0 {
        digits.push((n % 10_000) as i16);
        n /= 10_000;
    }

    let weight = if digits.is_empty() {
        0
    } else {
        digits.len() as i16 - frac_groups as i16 - 1
    };

    buf.put_i16(digits.len() as i16);
    buf.put_i16(weight);
    buf.put_u16(sign);
    buf.put_i16(scale as i16);
    for digit in digits.iter().rev() {
        buf.put_i16(*digit);
    }
}
