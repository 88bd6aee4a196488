//! Common test utilities and helpers
//!
//! - Engine fixtures over an in-memory store
//! - Scripted mutation handlers that record every transmit
//! - Config pointed at a wiremock server

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use propsync::client::config::Config;
use propsync::client::engine::SyncEngine;
use propsync::client::local_db::LocalDatabase;
use propsync::client::sync::{
    Dispatcher, MutationHandler, NetworkStatus, TransmitError, TransmitFuture,
};
use propsync::shared::config::AppConfig;
use propsync::shared::{MutationId, MutationType, QueuedMutation};

/// Grace delay used by fixtures; waits in tests are a multiple of it.
pub const GRACE: Duration = Duration::from_millis(50);

pub fn test_config() -> Config {
    Config::new()
        .with_grace_delay(GRACE)
        .with_transmit_timeout(Duration::from_millis(500))
        .with_sync_interval(Duration::from_secs(60))
}

pub fn config_for(server_uri: &str) -> Config {
    Config::with_builder(AppConfig::builder().server_url(server_uri))
        .unwrap()
        .with_grace_delay(GRACE)
        .with_transmit_timeout(Duration::from_millis(300))
}

/// Base URL of a local port with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Every mutation a handler was asked to transmit, in call order.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<QueuedMutation>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, mutation: &QueuedMutation) {
        self.calls.lock().unwrap().push(mutation.clone());
    }

    pub fn calls(&self) -> Vec<QueuedMutation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ids(&self) -> Vec<MutationId> {
        self.calls().into_iter().map(|m| m.id).collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[derive(Clone, Copy)]
pub enum Behaviour {
    Accept,
    Reject,
}

pub struct ScriptedHandler {
    recorder: Recorder,
    behaviour: Behaviour,
    delay: Duration,
}

impl MutationHandler for ScriptedHandler {
    fn transmit<'a>(&'a self, mutation: &'a QueuedMutation) -> TransmitFuture<'a> {
        Box::pin(async move {
            self.recorder.record(mutation);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.behaviour {
                Behaviour::Accept => Ok(()),
                Behaviour::Reject => Err(TransmitError::Rejected {
                    status: 500,
                    body: "internal server error".to_string(),
                }),
            }
        })
    }
}

/// Dispatcher routing every mutation type to one scripted handler.
pub fn scripted_dispatcher(recorder: &Recorder, behaviour: Behaviour, delay: Duration) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    for mutation_type in MutationType::ALL {
        dispatcher.register(
            mutation_type,
            ScriptedHandler {
                recorder: recorder.clone(),
                behaviour,
                delay,
            },
        );
    }
    dispatcher
}

pub fn engine(dispatcher: Dispatcher, status: NetworkStatus) -> SyncEngine {
    SyncEngine::builder(test_config())
        .store(LocalDatabase::in_memory())
        .dispatcher(dispatcher)
        .network_status(status)
        .build()
}

/// Engine whose handlers accept everything, plus the recorder watching them.
pub fn accepting_engine(status: NetworkStatus) -> (SyncEngine, Recorder) {
    let recorder = Recorder::new();
    let dispatcher = scripted_dispatcher(&recorder, Behaviour::Accept, Duration::ZERO);
    (engine(dispatcher, status), recorder)
}

/// Engine whose handlers reject everything, plus the recorder watching them.
pub fn rejecting_engine(status: NetworkStatus) -> (SyncEngine, Recorder) {
    let recorder = Recorder::new();
    let dispatcher = scripted_dispatcher(&recorder, Behaviour::Reject, Duration::ZERO);
    (engine(dispatcher, status), recorder)
}

/// Wait long enough for grace-delay deletions to run.
pub async fn wait_for_grace() {
    tokio::time::sleep(GRACE * 4).await;
}
