use thiserror::Error;

/// Errors raised by the document store and its backends.
///
/// Cache failures are deliberately a separate variant: the cache is an
/// optimization, not a source of truth, and the core degrades to a durable
/// read instead of surfacing them on the hot path.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no document '{id}' in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("collection '{collection}' has no template to materialize '{id}'")]
    NoTemplate { collection: String, id: String },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("durable store error: {0}")]
    Durable(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("malformed request: {0}")]
    Decode(String),
}
