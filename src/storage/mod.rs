//! Storage backends for the document store.
//!
//! The core talks to its backends through two trait seams:
//! [`traits::CacheStore`] (ephemeral, byte-oriented, TTL-expiring) and
//! [`traits::DurableStore`] (ground truth, document-oriented). Production
//! deployments pair [`redis::RedisCache`] with [`sql::SqlStore`]; the
//! [`memory`] backends cover local development and the test suite.

pub mod memory;
pub mod redis;
pub mod sql;
pub mod traits;
