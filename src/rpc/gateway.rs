// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RPC gateway: the request/reply consumer.
//!
//! The gateway owns one end of a shared mpsc channel. Each [`Envelope`]
//! carries a raw JSON payload and a oneshot reply slot; the consumer loop
//! decodes the payload into a typed [`Request`], dispatches into the store,
//! and answers with a [`Response`]. Every failure - malformed payload
//! included - becomes a failure response; nothing escapes the loop, so one
//! bad request never takes down service for others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::DocumentStore;

use super::message::{Request, Response};

/// One in-flight request: raw payload plus its correlated reply slot.
pub struct Envelope {
    pub payload: Value,
    pub reply: oneshot::Sender<Response>,
}

/// Consumer that serves store operations from a request channel.
pub struct RpcGateway {
    store: Arc<DocumentStore>,
}

impl RpcGateway {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Run the consumer loop until the channel closes. Each request is
    /// handled on its own task, so a slow operation never blocks the rest
    /// of the queue.
    pub fn spawn(self, mut requests: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = requests.recv().await {
                let store = Arc::clone(&self.store);
                tokio::spawn(async move {
                    let response = handle(&store, envelope.payload).await;
                    if envelope.reply.send(response).is_err() {
                        debug!("rpc caller went away before the reply");
                    }
                });
            }
            debug!("rpc request channel closed, gateway stopping");
        })
    }
}

async fn handle(store: &DocumentStore, payload: Value) -> Response {
    let request: Request = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed rpc request");
            crate::metrics::record_operation("rpc", "decode", "error");
            return Response::err(StoreError::Decode(e.to_string()));
        }
    };

    let operation = request.type_name();
    let start = Instant::now();

    let response = match dispatch(store, request).await {
        Ok(Some(data)) => Response::ok(data),
        Ok(None) => Response::empty(),
        Err(e) => Response::err(e),
    };

    crate::metrics::record_latency("rpc", operation, start.elapsed());
    crate::metrics::record_operation(
        "rpc",
        operation,
        if response.success { "success" } else { "error" },
    );
    response
}

async fn dispatch(store: &DocumentStore, request: Request) -> Result<Option<Value>, StoreError> {
    match request {
        Request::Get { collection, id } => {
            let doc = store.get(&collection, &id).await?;
            // `data: null` is the documented "not found" result
            Ok(Some(encode(&doc)?))
        }
        Request::Fetch { collection, id } => {
            let doc = store.fetch(&collection, &id).await?;
            Ok(Some(encode(&doc)?))
        }
        Request::Update {
            collection,
            id,
            updates,
        } => {
            let doc = store.update(&collection, &id, updates).await?;
            Ok(Some(encode(&doc)?))
        }
        Request::Remove { collection, id } => {
            store.remove(&collection, &id).await?;
            Ok(None)
        }
        Request::All { collection } => {
            let docs = store.all(&collection).await?;
            Ok(Some(encode(&docs)?))
        }
        Request::Count { collection } => {
            let count = store.count(&collection).await?;
            Ok(Some(Value::from(count)))
        }
        Request::ClearCache => {
            store.clear_cache().await?;
            Ok(None)
        }
        Request::Flush => {
            let summary = store.flush().await;
            Ok(Some(encode(&summary)?))
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Decode(format!("response encoding: {}", e)))
}

/// Caller-side handle: serializes typed requests, awaits the correlated
/// reply, and applies the request-level timeout.
#[derive(Clone)]
pub struct RpcClient {
    tx: mpsc::Sender<Envelope>,
    timeout: Duration,
}

impl RpcClient {
    /// Create a client and the receiver to hand to [`RpcGateway::spawn`].
    pub fn channel(buffer: usize, timeout: Duration) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx, timeout }, rx)
    }

    pub async fn call(&self, request: &Request) -> Response {
        match serde_json::to_value(request) {
            Ok(payload) => self.call_raw(payload).await,
            Err(e) => Response::err(format!("request encoding: {}", e)),
        }
    }

    /// Send an already-encoded payload. Malformed payloads are answered by
    /// the gateway with a failure response, exactly like remote callers see.
    pub async fn call_raw(&self, payload: Value) -> Response {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            payload,
            reply: reply_tx,
        };

        if self.tx.send(envelope).await.is_err() {
            return Response::err("rpc gateway is not running");
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Response::err("rpc reply channel dropped"),
            Err(_) => Response::err("rpc request timed out"),
        }
    }
}
