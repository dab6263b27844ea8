//! Connectivity monitoring.
//!
//! `NetworkMonitor` holds the last observed online/offline state. Whoever
//! observes connectivity (a platform callback, or a [`ConnectivityProbe`]
//! polled by [`NetworkMonitor::spawn_probe_loop`]) reports it through
//! [`NetworkMonitor::set_online`]; listeners only hear about transitions.
//! Nothing in this module returns an error to the caller.

use crate::config::NetworkConfig;
use crate::error::SyncResult;
use crate::subscription::Subscription;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// A lightweight reachability check against the remote store.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns whether the remote store is reachable.
    async fn probe(&self) -> SyncResult<bool>;
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;
type ListenerMap = Arc<Mutex<HashMap<u64, Listener>>>;

/// Tracks connectivity and notifies subscribers on transitions.
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
    listeners: ListenerMap,
    next_listener: AtomicU64,
}

impl NetworkMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Last observed connectivity state.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Records an observed state. Listeners run only if the state changed.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return;
        }

        info!("Connectivity changed: {}", if online { "online" } else { "offline" });

        // Snapshot so listeners may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(online);
        }
    }

    /// Registers a transition listener.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));

        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// A receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Suspends until online or until `timeout` elapses.
    ///
    /// Returns whether connectivity was achieved.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|online| *online)).await,
            Ok(Ok(_))
        )
    }

    /// Runs one probe and records the outcome. Probe errors count as offline.
    pub async fn check(&self, probe: &dyn ConnectivityProbe) -> bool {
        let online = match probe.probe().await {
            Ok(online) => online,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        };
        self.set_online(online);
        online
    }

    /// Probes connectivity every `config.probe_interval` until the returned
    /// handle is cancelled.
    pub fn spawn_probe_loop(
        self: &Arc<Self>,
        probe: Arc<dyn ConnectivityProbe>,
        config: &NetworkConfig,
    ) -> Subscription {
        let monitor = Arc::downgrade(self);
        let interval = config.probe_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.check(probe.as_ref()).await;
            }
        });
        Subscription::for_task(handle)
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
