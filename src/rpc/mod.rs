//! Request/reply RPC surface.
//!
//! Other processes talk to the store through typed messages on a shared
//! channel: [`message`] defines the wire types, [`gateway`] consumes
//! requests, dispatches into the [`DocumentStore`](crate::store::DocumentStore),
//! and answers each with a correlated [`Response`](message::Response).

pub mod gateway;
pub mod message;

pub use gateway::{Envelope, RpcClient, RpcGateway};
pub use message::{Request, Response};
