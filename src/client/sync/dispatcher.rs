//! # Mutation Dispatcher
//!
//! Maps a mutation's type to the single remote call that commits it.
//!
//! Handlers sit behind the [`MutationHandler`] trait so that new mutation
//! types, or test doubles, can be plugged in without touching queue or retry
//! logic. The dispatcher itself never retries; a failed transmit is reported
//! back to the orchestrator, which owns the retry policy.
//!
//! ## Endpoints
//!
//! | Mutation type | Endpoint |
//! |---|---|
//! | `maintenance-request` | `POST /api/maintenance-requests` |
//! | `payment-proof` | `POST /api/payments/proofs` |
//! | `chat-message` | `POST /api/chat/messages` |
//! | `announcement-read-receipt` | `POST /api/announcements/read-receipts` |
//!
//! Every request carries the mutation id in `X-Mutation-Id` so the server can
//! recognise a replay.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::client::config::Config;
use crate::shared::{MutationType, QueuedMutation};

/// Header carrying the mutation id on every outbound request.
pub const MUTATION_ID_HEADER: &str = "X-Mutation-Id";

/// Why a remote commit did not happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransmitError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("remote rejected mutation with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The handler did not finish in time.
    #[error("transmit timed out after {0:?}")]
    Timeout(Duration),

    /// No handler is registered for this type.
    #[error("no handler registered for mutation type '{0}'")]
    UnknownMutationType(MutationType),

    /// The handler panicked mid-transmit.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Result type for transmit operations.
pub type TransmitResult = Result<(), TransmitError>;

/// Boxed future returned by [`MutationHandler::transmit`].
pub type TransmitFuture<'a> = Pin<Box<dyn Future<Output = TransmitResult> + Send + 'a>>;

/// Performs the remote commit for one mutation type.
pub trait MutationHandler: Send + Sync {
    /// Issue exactly one outbound request carrying the mutation's payload.
    fn transmit<'a>(&'a self, mutation: &'a QueuedMutation) -> TransmitFuture<'a>;
}

/// Handler that POSTs the payload as JSON to a fixed URL.
pub struct HttpHandler {
    client: Client,
    url: String,
}

impl HttpHandler {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MutationHandler for HttpHandler {
    fn transmit<'a>(&'a self, mutation: &'a QueuedMutation) -> TransmitFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .header(MUTATION_ID_HEADER, mutation.id.as_str())
                .json(&mutation.payload)
                .send()
                .await
                .map_err(|e| TransmitError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransmitError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(())
        })
    }
}

/// Adapter turning an async closure into a [`MutationHandler`].
pub struct FnHandler<F>(F);

impl<F, Fut> FnHandler<F>
where
    F: Fn(QueuedMutation) -> Fut + Send + Sync,
    Fut: Future<Output = TransmitResult> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, Fut> MutationHandler for FnHandler<F>
where
    F: Fn(QueuedMutation) -> Fut + Send + Sync,
    Fut: Future<Output = TransmitResult> + Send + 'static,
{
    fn transmit<'a>(&'a self, mutation: &'a QueuedMutation) -> TransmitFuture<'a> {
        Box::pin((self.0)(mutation.clone()))
    }
}

/// Static routing table from mutation type to handler.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<MutationType, Arc<dyn MutationHandler>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("Dispatcher").field("handlers", &types).finish()
    }
}

impl Dispatcher {
    /// Dispatcher with no handlers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher posting every known type to its endpoint on `config`'s server.
    pub fn http(config: &Config) -> Self {
        let client = Client::new();
        let mut dispatcher = Self::new();
        for mutation_type in MutationType::ALL {
            let url = config.api_url(Self::endpoint(mutation_type));
            dispatcher.register(mutation_type, HttpHandler::new(client.clone(), url));
        }
        dispatcher
    }

    /// Remote path committing `mutation_type`.
    pub fn endpoint(mutation_type: MutationType) -> &'static str {
        match mutation_type {
            MutationType::MaintenanceRequest => "/api/maintenance-requests",
            MutationType::PaymentProof => "/api/payments/proofs",
            MutationType::ChatMessage => "/api/chat/messages",
            MutationType::AnnouncementReadReceipt => "/api/announcements/read-receipts",
        }
    }

    /// Register (or replace) the handler for `mutation_type`.
    pub fn register<H>(&mut self, mutation_type: MutationType, handler: H) -> &mut Self
    where
        H: MutationHandler + 'static,
    {
        self.handlers.insert(mutation_type, Arc::new(handler));
        self
    }

    /// Builder-style [`Dispatcher::register`].
    pub fn with_handler<H>(mut self, mutation_type: MutationType, handler: H) -> Self
    where
        H: MutationHandler + 'static,
    {
        self.register(mutation_type, handler);
        self
    }

    pub fn has_handler(&self, mutation_type: MutationType) -> bool {
        self.handlers.contains_key(&mutation_type)
    }

    /// Commit `mutation` through its type's handler.
    pub async fn transmit(&self, mutation: &QueuedMutation) -> TransmitResult {
        let Some(handler) = self.handlers.get(&mutation.mutation_type) else {
            tracing::error!(
                "No dispatcher handler for {} (mutation {}); it will not be committed",
                mutation.mutation_type,
                mutation.id
            );
            return Err(TransmitError::UnknownMutationType(mutation.mutation_type));
        };

        handler.transmit(mutation).await
    }
}
