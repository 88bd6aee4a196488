//! # Network Monitor
//!
//! Translates the host's connectivity signal into a queryable status and
//! edge-triggered notifications.
//!
//! The monitor trusts the host signal as ground truth: it never polls, probes
//! latency or second-guesses a transition. Repeated reports of the same
//! status are swallowed so subscribers only ever observe edges.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }
}

#[derive(Debug)]
pub struct NetworkMonitor {
    status: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self { status }
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status().is_online()
    }

    /// Report the host's current connectivity.
    ///
    /// Returns `true` when this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let next = NetworkStatus::from(online);
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            match next {
                NetworkStatus::Online => tracing::info!("Connectivity restored"),
                NetworkStatus::Offline => tracing::warn!("Connectivity lost"),
            }
        }
        changed
    }

    /// Receiver that wakes on every transition.
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    /// Call `handler` on every offline-to-online edge.
    ///
    /// The returned task ends when the monitor is dropped; abort it to
    /// unsubscribe earlier.
    pub fn on_online<F, Fut>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let status = *rx.borrow_and_update();
                if status.is_online() {
                    handler().await;
                }
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}
