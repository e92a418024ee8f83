//! Encoder for the PostgreSQL `COPY ... FROM STDIN BINARY` sub-protocol.
//!
//! The crate turns typed values into the COPY binary wire format and
//! streams them into a caller-supplied sink: file header once, a
//! column-count header plus length-prefixed fields per row, and the
//! end-of-data trailer on close. Establishing a connection, issuing the
//! `COPY` command, and transaction handling are the caller's business;
//! this crate only produces bytes.
//!
//! [`PgCopyWriter`] is the core ordinal-addressed writer; [`RowWriter`]
//! layers column-name addressing and per-row locking on top. Encodings
//! for types beyond the built-in set plug in through the
//! [`HandlerRegistry`].

mod copy_writer;
mod error;
mod proto;
mod registry;
mod row;
mod types;

pub mod handlers;

pub use copy_writer::PgCopyWriter;
pub use error::{Error, Result};
pub use proto::{COPY_SIGNATURE, PgCopyProto, field, put_null};
pub use registry::HandlerRegistry;
pub use row::{Column, RowWriter, SimpleRow, Table};
pub use types::{CopyValue, PgType};
