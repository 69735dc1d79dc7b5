//! Host-side reachability probe.
//!
//! A process has no operating-system "came back online" event to listen to,
//! so the `wbuf` binary feeds its [`ConnectivitySignal`] from a periodic TCP
//! connect to the API host. Embedders with a better source of truth can set
//! the signal themselves and skip this module.

use std::time::Duration;

use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::connectivity::{ConnectivitySignal, ConnectivityState};
use crate::error::{Error, Result};

/// Checks whether a host accepts TCP connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ReachabilityProbe {
    /// Create a probe for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Create a probe for the host and port a URL points at.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host or no known default port.
    pub fn for_url(url: &Url, timeout: Duration) -> Result<Self> {
        let host = url.host_str().ok_or_else(|| Error::ConfigValidation {
            message: format!("URL has no host: {url}"),
        })?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::ConfigValidation {
                message: format!("URL has no port: {url}"),
            })?;
        Ok(Self::new(host.trim_matches(&['[', ']'][..]), port, timeout))
    }

    /// The probed `host:port`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Run a single check.
    pub async fn check(&self) -> ConnectivityState {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => ConnectivityState::Online,
            Ok(Err(e)) => {
                trace!(addr = %self.target(), error = %e, "Probe connect failed");
                ConnectivityState::Offline
            }
            Err(_) => {
                trace!(addr = %self.target(), "Probe timed out");
                ConnectivityState::Offline
            }
        }
    }

    /// Probe every `interval` and report results to `signal`.
    ///
    /// The first check runs immediately.
    #[must_use]
    pub fn spawn(self, signal: ConnectivitySignal, interval: Duration) -> ProbeHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            debug!(addr = %self.target(), ?interval, "Reachability probe started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let state = self.check().await;
                        signal.set(state);
                    }
                }
            }
            debug!("Reachability probe stopped");
        });

        ProbeHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running probe. Dropping it stops the probe.
#[derive(Debug)]
pub struct ProbeHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    /// Stop the probe and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Reachability probe task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn wait_for(signal: &ConnectivitySignal, state: ConnectivityState) {
        for _ in 0..200 {
            if signal.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("signal never became {state}");
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_for_url_uses_default_port() {
        let url = Url::parse("http://api.example.test/api/pizzas").unwrap();
        let probe = ReachabilityProbe::for_url(&url, Duration::from_millis(100)).unwrap();
        assert_eq!(probe.target(), "api.example.test:80");
    }

    #[test]
    fn test_for_url_explicit_port() {
        let url = Url::parse("https://localhost:3001/api/pizzas").unwrap();
        let probe = ReachabilityProbe::for_url(&url, Duration::from_millis(100)).unwrap();
        assert_eq!(probe.target(), "localhost:3001");
    }

    #[test]
    fn test_for_url_ipv6_host() {
        let url = Url::parse("http://[::1]:3001/api/pizzas").unwrap();
        let probe = ReachabilityProbe::for_url(&url, Duration::from_millis(100)).unwrap();
        assert_eq!(probe.target(), "::1:3001");
    }

    #[tokio::test]
    async fn test_check_listening_port_is_online() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = ReachabilityProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert_eq!(probe.check().await, ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_check_closed_port_is_offline() {
        let port = closed_port().await;

        let probe = ReachabilityProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert_eq!(probe.check().await, ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn test_spawned_probe_reports_to_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let signal = ConnectivitySignal::new(ConnectivityState::Offline);

        let handle = ReachabilityProbe::new("127.0.0.1", port, Duration::from_millis(200))
            .spawn(signal.clone(), Duration::from_millis(20));
        wait_for(&signal, ConnectivityState::Online).await;

        drop(listener);
        wait_for(&signal, ConnectivityState::Offline).await;

        handle.stop().await;
    }
}
