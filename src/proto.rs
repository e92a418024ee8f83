//! Low-level framing for the COPY BINARY sub-protocol.
//!
//! Everything here appends big-endian bytes to a `BytesMut` buffer; the
//! buffer is only handed to the sink on `flush`. The framing is strictly
//! sequential with no backtracking, so callers must emit header, rows,
//! and trailer in order.
//!
//! For the wire layout, see the official Postgres docs:
//! <https://www.postgresql.org/docs/current/sql-copy.html#SQL-COPY-BINARY>

use std::io::Write;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The fixed COPY BINARY file signature: `PGCOPY\n\377\r\n\0`.
///
/// The non-ASCII byte and the embedded CR/LF/NUL catch file transfers
/// that mangle line endings or strip high bits.
pub const COPY_SIGNATURE: &[u8] = &[
    b'P', b'G', b'C', b'O', b'P', b'Y', // "PGCOPY"
    0x0A, 0xFF, 0x0D, 0x0A, 0x00, // \n \377 \r \n \0
];

/// Frames one non-null field: a 4-byte big-endian length prefix followed
/// by the payload bytes the closure appends. The length counts the payload
/// only, not the prefix itself, and is backpatched once the payload size
/// is known.
#[inline]
pub fn field(buf: &mut BytesMut, payload_fn: impl FnOnce(&mut BytesMut)) {
    let base = buf.len();
    buf.put_i32(0);

    payload_fn(buf);

    let payload_len = buf.len() - base - size_of::<i32>();
    debug_assert!(
        payload_len <= i32::MAX as usize,
        "field payload exceeds the i32 length prefix"
    );
    buf[base..base + size_of::<i32>()].copy_from_slice(&(payload_len as i32).to_be_bytes());
}

/// Emits the 4-byte null sentinel. No payload follows.
#[inline]
pub fn put_null(buf: &mut BytesMut) {
    buf.put_i32(-1);
}

/// Buffered byte emitter over an exclusively-owned sink.
///
/// `PgCopyProto` knows the shape of the COPY framing but nothing about
/// value semantics or protocol state; the writer layered on top owns
/// the sequencing rules.
pub struct PgCopyProto<S> {
    pub(crate) stream: S,
    pub(crate) buf: BytesMut,
}

impl<S> PgCopyProto<S> {
    pub fn from_stream(stream: S) -> Self {
        PgCopyProto {
            stream,
            buf: BytesMut::new(),
        }
    }

    /// Consumes the proto and returns the sink and any unflushed bytes.
    pub fn into_parts(self) -> (S, Vec<u8>) {
        (self.stream, self.buf.to_vec())
    }

    /// The number of bytes buffered but not yet flushed to the sink.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn put_bytes(&mut self, src: &[u8]) -> &mut Self {
        self.buf.put(src);
        self
    }

    /// Appends the 19-byte file header: signature, a zero flags field
    /// (no OIDs included), and a zero-length header extension area.
    pub fn put_header(&mut self) -> &mut Self {
        self.buf.put_slice(COPY_SIGNATURE);
        self.buf.put_u32(0);
        self.buf.put_u32(0);
        self
    }

    /// Appends the 16-bit column count that starts a row.
    pub fn put_row_header(&mut self, num_columns: i16) -> &mut Self {
        self.buf.put_i16(num_columns);
        self
    }

    /// Appends the 16-bit `-1` trailer that ends the data stream.
    pub fn put_trailer(&mut self) -> &mut Self {
        self.buf.put_i16(-1);
        self
    }
}

impl<S: Write> PgCopyProto<S> {
    pub fn flush_blocking(&mut self) -> std::io::Result<()> {
        self.stream.write_all(&self.buf)?;
        self.buf.clear();
        self.stream.flush()
    }
}

impl<S: AsyncWrite + Unpin> PgCopyProto<S> {
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.stream.write_all_buf(&mut self.buf).await?;
        self.stream.flush().await
    }
}
