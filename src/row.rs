//! Name-addressed row building on top of [`PgCopyWriter`].
//!
//! This is convenience plumbing for callers that think in column names
//! rather than ordinals; all encoding is delegated to the writer.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::{
    copy_writer::PgCopyWriter,
    error::{Error, Result},
    registry::HandlerRegistry,
    types::{CopyValue, PgType},
};

/// Flush to the sink whenever this much is buffered.
const FLUSH_THRESHOLD_BYTES: usize = 64 * 1024;

/// A named, typed column of the destination table.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    ty: PgType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: PgType) -> Self {
        Column {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pg_type(&self) -> PgType {
        self.ty
    }
}

/// The destination table: an optional schema, a name, and the ordered
/// columns the COPY will populate.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Option<String>,
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: impl Into<Vec<Column>>) -> Self {
        Table {
            schema: None,
            name: name.into(),
            columns: columns.into(),
        }
    }

    pub fn with_schema(
        schema: impl Into<String>,
        name: impl Into<String>,
        columns: impl Into<Vec<Column>>,
    ) -> Self {
        Table {
            schema: Some(schema.into()),
            name: name.into(),
            columns: columns.into(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The `COPY ... FROM STDIN BINARY` statement the orchestration layer
    /// issues before streaming the bytes this crate produces.
    pub fn copy_command(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(Column::name)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "COPY {}({columns}) FROM STDIN BINARY",
            self.qualified_name()
        )
    }

    fn column_types(&self) -> Vec<PgType> {
        self.columns.iter().map(Column::pg_type).collect()
    }
}

/// Writes whole rows addressed by column name, serializing concurrent
/// callers on one underlying [`PgCopyWriter`].
///
/// The mutex around the writer is the only concurrency guarantee offered:
/// each [`write_row`](Self::write_row) call owns the writer for one
/// complete row, so partial rows from different threads can never
/// interleave in the byte stream.
pub struct RowWriter<S> {
    writer: Mutex<PgCopyWriter<S>>,
    lookup: HashMap<String, usize>,
    num_columns: usize,
}

impl<S: Write> RowWriter<S> {
    /// Builds a writer for `table` over `stream` and emits the file
    /// header. The caller is responsible for having issued
    /// [`Table::copy_command`] on the connection feeding `stream`.
    pub fn open(table: &Table, registry: &HandlerRegistry, stream: S) -> Result<Self> {
        let mut writer = PgCopyWriter::new(stream, registry, &table.column_types())?;
        writer.open()?;

        let lookup = table
            .columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| (column.name.clone(), ordinal))
            .collect();

        Ok(RowWriter {
            writer: Mutex::new(writer),
            lookup,
            num_columns: table.columns.len(),
        })
    }

    /// Writes one row. The closure fills a [`SimpleRow`] by column name;
    /// columns it leaves unset encode as NULL.
    ///
    /// A closure error aborts before any row byte is emitted, so the
    /// stream stays valid. Encoding or I/O errors after that point
    /// abandon the stream.
    pub fn write_row(&self, fill: impl FnOnce(&mut SimpleRow) -> Result<()>) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut row = SimpleRow {
            lookup: &self.lookup,
            values: vec![None; self.num_columns],
        };
        fill(&mut row)?;

        let encode = |writer: &mut PgCopyWriter<S>| -> Result<()> {
            writer.start_row()?;
            for value in row.values {
                writer.write(value.unwrap_or(CopyValue::Null))?;
            }
            if writer.buffered() >= FLUSH_THRESHOLD_BYTES {
                writer.flush_blocking()?;
            }
            Ok(())
        };

        if let Err(err) = encode(&mut writer) {
            // The stream is unusable mid-row; discard it rather than let
            // a later close emit a trailer onto a broken prefix.
            tracing::warn!(error = %err, "abandoning copy stream after row failure");
            writer.abort();
            return Err(err);
        }
        Ok(())
    }

    /// Emits the trailer, flushes, and returns the sink.
    pub fn close(self) -> Result<S> {
        let mut writer = self
            .writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        writer.close_blocking()?;
        Ok(writer.into_parts().0)
    }
}

/// Per-row cursor mapping column names to ordinals. Values set here are
/// buffered and written in ordinal order once the fill closure returns.
pub struct SimpleRow<'a> {
    lookup: &'a HashMap<String, usize>,
    values: Vec<Option<CopyValue>>,
}

impl SimpleRow<'_> {
    /// Sets a column by name. Setting the same column twice keeps the
    /// later value.
    pub fn set(&mut self, column: &str, value: impl Into<CopyValue>) -> Result<()> {
        let Some(ordinal) = self.lookup.get(column) else {
            return Err(Error::UnknownColumn(column.to_string()));
        };
        self.values[*ordinal] = Some(value.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;
    use std::sync::Arc;

    fn users_table() -> Table {
        Table::new(
            "users",
            vec![
                Column::new("id", PgType::INT4),
                Column::new("name", PgType::TEXT),
            ],
        )
    }

    #[test]
    fn test_copy_command() {
        assert_eq!(
            "COPY users(id, name) FROM STDIN BINARY",
            users_table().copy_command()
        );
    }

    #[test]
    fn test_copy_command_with_schema() {
        let table = Table::with_schema("app", "users", vec![Column::new("id", PgType::INT4)]);
        assert_eq!("COPY app.users(id) FROM STDIN BINARY", table.copy_command());
    }

    #[test]
    fn test_write_row_by_name() {
        let registry = HandlerRegistry::default();
        let writer = RowWriter::open(&users_table(), &registry, Vec::<u8>::new()).unwrap();

        writer
            .write_row(|row| {
                row.set("name", "ada")?;
                row.set("id", 1)
            })
            .unwrap();
        let stream = writer.close().unwrap();

        let mut buf = &stream[19..];
        assert_eq!(2, buf.get_i16());
        assert_eq!(4, buf.get_i32());
        assert_eq!(1, buf.get_i32()); // id written first despite set order
        assert_eq!(3, buf.get_i32());
        assert_eq!(b"ada", &buf[..3]);
    }

    #[test]
    fn test_unset_column_is_null() {
        let registry = HandlerRegistry::default();
        let writer = RowWriter::open(&users_table(), &registry, Vec::<u8>::new()).unwrap();

        writer.write_row(|row| row.set("id", 2)).unwrap();
        let stream = writer.close().unwrap();

        let mut buf = &stream[19..];
        assert_eq!(2, buf.get_i16());
        assert_eq!(4, buf.get_i32());
        assert_eq!(2, buf.get_i32());
        assert_eq!(-1, buf.get_i32()); // name never set
        assert_eq!(-1, buf.get_i16());
    }

    #[test]
    fn test_unknown_column_leaves_stream_intact() {
        let registry = HandlerRegistry::default();
        let writer = RowWriter::open(&users_table(), &registry, Vec::<u8>::new()).unwrap();

        let err = writer
            .write_row(|row| row.set("email", "a@b.c"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(name) if name == "email"));

        // the failed row wrote nothing; the stream is still usable
        writer.write_row(|row| row.set("id", 3)).unwrap();
        let stream = writer.close().unwrap();

        let mut buf = &stream[19..];
        assert_eq!(2, buf.get_i16());
    }

    #[test]
    fn test_concurrent_rows_never_interleave() {
        let registry = HandlerRegistry::default();
        let writer =
            Arc::new(RowWriter::open(&users_table(), &registry, Vec::<u8>::new()).unwrap());

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        writer
                            .write_row(|row| {
                                row.set("id", t * 25 + i)?;
                                row.set("name", "row")
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let writer = Arc::into_inner(writer).unwrap();
        let stream = writer.close().unwrap();

        // every row re-parses cleanly: 2 columns, int4 then 3-byte text
        let mut buf = &stream[19..];
        let mut rows = 0;
        loop {
            let count = buf.get_i16();
            if count == -1 {
                break;
            }
            assert_eq!(2, count);
            assert_eq!(4, buf.get_i32());
            buf.advance(4);
            assert_eq!(3, buf.get_i32());
            buf.advance(3);
            rows += 1;
        }
        assert_eq!(100, rows);
        assert!(buf.is_empty());
    }
}
