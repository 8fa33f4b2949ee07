//! Tracks whether the ledger is reachable and announces transitions.
//!
//! The monitor does not trust a single signal. Callers feed it observations (a failed request, a
//! periodic probe) and it only emits a `Transition` when the observed state actually changes.
//! `was_offline` is sticky: it is set on every transition to offline and stays set until a
//! recovery has been fully handled and acknowledged.

use crate::api::Mode;
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// The reachability probe is shorter than a regular request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Online,
    Offline,
}

serde_plain::derive_display_from_serialize!(Transition);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    pub is_online: bool,
    pub was_offline: bool,
}

/// Answers "can we reach the ledger right now?".
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes the API base URL. Any HTTP response, including an error status, means the server is
/// reachable; only a failure to get a response counts as offline.
pub struct HttpProbe {
    client: reqwest::Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("Unable to build the HTTP client")?;
        let url = Url::parse(api_url).with_context(|| format!("Invalid API URL '{api_url}'"))?;
        Ok(Self { client, url })
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(response) => {
                debug!("Probe of {} answered {}", self.url, response.status());
                true
            }
            Err(e) => {
                debug!("Probe of {} failed: {e}", self.url);
                false
            }
        }
    }
}

/// A probe whose answer is set by hand.
#[derive(Debug)]
pub struct StaticProbe {
    reachable: AtomicBool,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Probe for StaticProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Builds the probe for `mode`. In test mode the ledger is in memory and always reachable.
pub fn probe(config: &Config, mode: Mode) -> Result<Arc<dyn Probe>> {
    match mode {
        Mode::Http => Ok(Arc::new(HttpProbe::new(config.api_url())?)),
        Mode::Test => Ok(Arc::new(StaticProbe::new(true))),
    }
}

pub struct ConnectivityMonitor {
    state: Mutex<ConnectivityState>,
    events: broadcast::Sender<Transition>,
    probe: Arc<dyn Probe>,
}

impl ConnectivityMonitor {
    /// Starting offline counts as an offline episode, so `was_offline` starts set.
    pub fn new(initially_online: bool, probe: Arc<dyn Probe>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(ConnectivityState {
                is_online: initially_online,
                was_offline: !initially_online,
            }),
            events,
            probe,
        }
    }

    pub fn is_online(&self) -> bool {
        self.lock().is_online
    }

    pub fn was_offline(&self) -> bool {
        self.lock().was_offline
    }

    pub fn state(&self) -> ConnectivityState {
        *self.lock()
    }

    /// Receives every transition that happens after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.events.subscribe()
    }

    /// Records an observation of reachability. Returns and broadcasts the transition if the state
    /// changed; repeated observations of the same state are absorbed.
    pub fn observe(&self, online: bool) -> Option<Transition> {
        let transition = {
            let mut state = self.lock();
            if state.is_online == online {
                return None;
            }
            state.is_online = online;
            if online {
                Transition::Online
            } else {
                state.was_offline = true;
                Transition::Offline
            }
        };
        match transition {
            Transition::Online => info!("Connection restored"),
            Transition::Offline => warn!("Connection lost, new transactions will be saved offline"),
        }
        // Nobody listening is fine
        let _ = self.events.send(transition);
        Some(transition)
    }

    /// Asks the probe and records the answer. Returns whether the ledger is reachable.
    pub async fn probe(&self) -> bool {
        let reachable = self.probe.is_reachable().await;
        self.observe(reachable);
        reachable
    }

    /// Clears `was_offline`. Called once a recovery has been handled: the outbox drained with no
    /// failures, or there was nothing to drain.
    pub fn acknowledge_recovered(&self) {
        let mut state = self.lock();
        if state.was_offline {
            debug!("Recovery acknowledged");
        }
        state.was_offline = false;
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
