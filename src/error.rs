use crate::types::PgType;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for COPY BINARY encoding and the associated sink I/O.
///
/// Every failure is fatal to the writer that produced it: the COPY byte
/// stream is strictly sequential, so once a byte is wrong or missing the
/// remainder of the stream cannot be repaired. Callers that want to retry
/// must re-issue the whole COPY operation with a fresh writer.
#[derive(Debug)]
pub enum Error {
    /// An I/O failure on the underlying sink, wrapping the original cause.
    Write(std::io::Error),
    /// No value handler is registered for the given logical type.
    UnsupportedType(PgType),
    /// A value's variant does not match the handler bound to its column.
    TypeMismatch { expected: PgType, value: &'static str },
    /// A writer method was called in the wrong state.
    InvalidState { op: &'static str, state: &'static str },
    /// A row was left incomplete, or more fields were written than the
    /// row declared.
    ColumnCount { expected: usize, written: usize },
    /// No column with the given name exists in the target table.
    UnknownColumn(String),
    /// A value cannot be represented in its wire encoding.
    ValueOutOfRange(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Write(e) => write!(f, "encountered I/O error: {e}"),
            Error::UnsupportedType(ty) => {
                write!(f, "no value handler registered for type {ty}")
            }
            Error::TypeMismatch { expected, value } => {
                write!(f, "column expects {expected} but got a {value} value")
            }
            Error::InvalidState { op, state } => {
                write!(f, "cannot {op} while the writer is {state}")
            }
            Error::ColumnCount { expected, written } => {
                write!(
                    f,
                    "row declared {expected} columns but {written} were written"
                )
            }
            Error::UnknownColumn(name) => write!(f, "unknown column \"{name}\""),
            Error::ValueOutOfRange(what) => {
                write!(f, "{what} is out of range for its wire encoding")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Write(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Write(value)
    }
}
