//! Mapping from logical type to value handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{Error, Result},
    handlers::{
        BoolHandler, ByteaHandler, CharHandler, DateHandler, Float4Handler, Float8Handler,
        Int2Handler, Int4Handler, Int8Handler, JsonbHandler, NumericHandler, TextHandler,
        TimestampHandler, UuidHandler, ValueHandler,
    },
    types::PgType,
};

/// Registry of value handlers keyed by logical type.
///
/// A registry is assembled before any writer is built from it and is
/// read-only from then on: [`crate::PgCopyWriter::new`] resolves every
/// column's handler exactly once, so the per-row write path never
/// performs a type lookup. Handlers are stateless and `Send + Sync`,
/// so one registry can serve any number of writers, concurrent or not.
pub struct HandlerRegistry {
    handlers: HashMap<PgType, Arc<dyn ValueHandler>>,
}

impl HandlerRegistry {
    /// An empty registry with no handlers at all.
    pub fn empty() -> Self {
        HandlerRegistry {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for a logical type, replacing any previous
    /// binding. Registering under a built-in type overrides the default
    /// encoding.
    pub fn register(&mut self, ty: impl Into<PgType>, handler: Arc<dyn ValueHandler>) -> &mut Self {
        self.handlers.insert(ty.into(), handler);
        self
    }

    /// Looks up the handler for a logical type.
    pub fn resolve(&self, ty: PgType) -> Result<&Arc<dyn ValueHandler>> {
        self.handlers.get(&ty).ok_or(Error::UnsupportedType(ty))
    }
}

impl Default for HandlerRegistry {
    /// A registry with every built-in handler installed. `varchar`
    /// shares the `text` encoding.
    fn default() -> Self {
        let mut registry = HandlerRegistry::empty();
        let text = Arc::new(TextHandler);
        registry
            .register(PgType::BOOL, Arc::new(BoolHandler))
            .register(PgType::BYTEA, Arc::new(ByteaHandler))
            .register(PgType::CHAR, Arc::new(CharHandler))
            .register(PgType::INT2, Arc::new(Int2Handler))
            .register(PgType::INT4, Arc::new(Int4Handler))
            .register(PgType::INT8, Arc::new(Int8Handler))
            .register(PgType::FLOAT4, Arc::new(Float4Handler))
            .register(PgType::FLOAT8, Arc::new(Float8Handler))
            .register(PgType::TEXT, text.clone())
            .register(PgType::VARCHAR, text)
            .register(PgType::JSONB, Arc::new(JsonbHandler))
            .register(PgType::DATE, Arc::new(DateHandler))
            .register(PgType::TIMESTAMP, Arc::new(TimestampHandler))
            .register(PgType::NUMERIC, Arc::new(NumericHandler))
            .register(PgType::UUID, Arc::new(UuidHandler));
        registry
    }
}
