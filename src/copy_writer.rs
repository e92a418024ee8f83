use std::io::Write;
use std::sync::Arc;

use tokio::io::AsyncWrite;

use crate::{
    error::{Error, Result},
    handlers::ValueHandler,
    proto::PgCopyProto,
    registry::HandlerRegistry,
    types::{CopyValue, PgType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Unopened,
    Open,
    Closed,
}

impl WriterState {
    fn name(self) -> &'static str {
        match self {
            WriterState::Unopened => "unopened",
            WriterState::Open => "open",
            WriterState::Closed => "closed",
        }
    }
}

/// Single-use writer for one COPY BINARY stream.
///
/// The writer owns its sink for the whole COPY session and walks a strict
/// `unopened -> open -> closed` lifecycle: [`open`](Self::open) emits the
/// 19-byte file header, each [`start_row`](Self::start_row) emits a
/// column-count row header that must be followed by exactly one
/// [`write`](Self::write) per column, and closing emits the end-of-data
/// trailer and flushes.
///
/// Handlers are resolved from the registry once, at construction, so the
/// per-field path is a plain indexed dispatch. Calls out of order fail
/// fast with a protocol misuse error instead of corrupting the stream;
/// any error leaves the writer unusable apart from
/// [`abort`](Self::abort), because a partially-emitted stream cannot be
/// resumed.
pub struct PgCopyWriter<S> {
    proto: PgCopyProto<S>,
    columns: Vec<Arc<dyn ValueHandler>>,
    state: WriterState,
    fields_remaining: usize,
}

impl<S> PgCopyWriter<S> {
    /// Builds a writer over `stream` for rows shaped like `column_types`.
    ///
    /// Resolves one handler per column up front; an unregistered type
    /// surfaces here as [`Error::UnsupportedType`], before any byte is
    /// written.
    ///
    /// The row header carries the column count as an `i16`, so more than
    /// [`i16::MAX`] columns is rejected with [`Error::ValueOutOfRange`].
    pub fn new(stream: S, registry: &HandlerRegistry, column_types: &[PgType]) -> Result<Self> {
        if i16::try_from(column_types.len()).is_err() {
            return Err(Error::ValueOutOfRange("column count"));
        }

        let columns = column_types
            .iter()
            .map(|ty| registry.resolve(*ty).cloned())
            .collect::<Result<Vec<_>>>()?;

        Ok(PgCopyWriter {
            proto: PgCopyProto::from_stream(stream),
            columns,
            state: WriterState::Unopened,
            fields_remaining: 0,
        })
    }

    /// The number of columns each row must carry.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// The number of bytes buffered but not yet flushed to the sink.
    pub fn buffered(&self) -> usize {
        self.proto.buffered()
    }

    /// Consumes the writer and returns the sink and any unflushed bytes.
    pub fn into_parts(self) -> (S, Vec<u8>) {
        self.proto.into_parts()
    }

    /// Emits the file header and transitions to the open state.
    pub fn open(&mut self) -> Result<()> {
        self.expect_state(WriterState::Unopened, "open the stream")?;
        self.proto.put_header();
        self.state = WriterState::Open;
        Ok(())
    }

    /// Emits the row header for the next row.
    ///
    /// The previous row must be complete; exactly
    /// [`num_columns`](Self::num_columns) calls to [`write`](Self::write)
    /// must follow before the next `start_row` or close.
    pub fn start_row(&mut self) -> Result<()> {
        self.expect_state(WriterState::Open, "start a row")?;
        self.expect_row_complete()?;
        self.proto.put_row_header(self.columns.len() as i16);
        self.fields_remaining = self.columns.len();
        Ok(())
    }

    /// Encodes the next field of the current row through its pre-resolved
    /// handler. Nothing is written when an error is returned.
    pub fn write(&mut self, value: impl Into<CopyValue>) -> Result<()> {
        self.expect_state(WriterState::Open, "write a field")?;
        if self.fields_remaining == 0 {
            return Err(Error::InvalidState {
                op: "write a field",
                state: "between rows",
            });
        }

        let ordinal = self.columns.len() - self.fields_remaining;
        self.columns[ordinal].handle(&mut self.proto.buf, &value.into())?;
        self.fields_remaining -= 1;
        Ok(())
    }

    /// Discards any unflushed bytes and forces the writer closed.
    ///
    /// This is the teardown primitive for error paths: the destination
    /// COPY operation is left incomplete and must be rolled back by the
    /// owning connection layer.
    pub fn abort(&mut self) {
        self.proto.buf.clear();
        self.state = WriterState::Closed;
        self.fields_remaining = 0;
    }

    /// Buffers the trailer and marks the writer closed. The writer stays
    /// closed whether or not the final flush succeeds.
    fn put_trailer(&mut self) -> Result<()> {
        self.expect_state(WriterState::Open, "close the stream")?;
        self.expect_row_complete()?;
        self.proto.put_trailer();
        self.state = WriterState::Closed;
        Ok(())
    }

    fn expect_state(&self, expected: WriterState, op: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                op,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn expect_row_complete(&self) -> Result<()> {
        if self.fields_remaining != 0 {
            return Err(Error::ColumnCount {
                expected: self.columns.len(),
                written: self.columns.len() - self.fields_remaining,
            });
        }
        Ok(())
    }
}

impl<S: Write> PgCopyWriter<S> {
    /// Flushes buffered bytes to the sink (blocking).
    pub fn flush_blocking(&mut self) -> Result<()> {
        self.proto.flush_blocking()?;
        Ok(())
    }

    /// Emits the trailer, flushes, and closes the writer (blocking).
    ///
    /// Not idempotent: a second close fails with
    /// [`Error::InvalidState`].
    pub fn close_blocking(&mut self) -> Result<()> {
        self.put_trailer()?;
        self.flush_blocking()
    }
}

impl<S: AsyncWrite + Unpin> PgCopyWriter<S> {
    /// Flushes buffered bytes to the sink (async).
    pub async fn flush(&mut self) -> Result<()> {
        self.proto.flush().await?;
        Ok(())
    }

    /// Emits the trailer, flushes, and closes the writer (async).
    pub async fn close(&mut self) -> Result<()> {
        self.put_trailer()?;
        self.flush().await
    }
}
