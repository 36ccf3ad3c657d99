//! Connectivity observation and validation
//!
//! Link-layer signals alone are untrusted (captive portals and VPNs
//! produce false positives), so every link change triggers an active
//! reachability probe before connectivity is declared, and a periodic
//! re-probe catches silent degradation. State transitions:
//!
//! ```text
//! disconnected -> connecting -> { connected | disconnected }
//! connected    -> unstable      (N consecutive failed probes)
//! unstable     -> disconnected  (failures persist)
//! unstable     -> connected     (a probe succeeds)
//! ```
//!
//! The monitor is the single writer of `NetworkState`; readers subscribe
//! through a watch channel and observe every transition.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::logging::*;
use crate::types::{ConnStatus, LinkType, NetworkState};

/// Active reachability check against one host
///
/// The engine depends only on this trait; tests substitute a scripted
/// probe, production uses `DnsProbe`.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
	/// Whether the host answered within the caller's patience
	async fn probe(&self, host: &str) -> bool;
}

/// Default probe: DNS resolution round-trip via the system resolver
pub struct DnsProbe {
	timeout: std::time::Duration,
}

impl DnsProbe {
	pub fn new(timeout: std::time::Duration) -> Self {
		DnsProbe { timeout }
	}
}

#[async_trait]
impl ReachabilityProbe for DnsProbe {
	async fn probe(&self, host: &str) -> bool {
		matches!(
			tokio::time::timeout(self.timeout, tokio::net::lookup_host(host)).await,
			Ok(Ok(_))
		)
	}
}

/// Observes and validates connectivity; drives queue draining via its
/// watch channel
pub struct NetworkMonitor {
	state_tx: watch::Sender<NetworkState>,
	// Keeps the channel alive when no subscriber is attached yet
	_state_rx: watch::Receiver<NetworkState>,
	probe: Arc<dyn ReachabilityProbe>,
	config: Arc<Config>,
	consecutive_failures: AtomicU32,
}

impl NetworkMonitor {
	/// Create a monitor in the disconnected state
	pub fn new(config: Arc<Config>, probe: Arc<dyn ReachabilityProbe>) -> Self {
		let (state_tx, state_rx) = watch::channel(NetworkState::default());
		NetworkMonitor {
			state_tx,
			_state_rx: state_rx,
			probe,
			config,
			consecutive_failures: AtomicU32::new(0),
		}
	}

	/// Subscribe to state transitions
	pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
		self.state_tx.subscribe()
	}

	/// Current state snapshot
	pub fn state(&self) -> NetworkState {
		*self.state_tx.borrow()
	}

	fn set_state(&self, state: NetworkState) {
		let previous = *self.state_tx.borrow();
		if previous != state {
			info!(from = %previous.status, to = %state.status, "network state transition");
			self.state_tx.send_replace(state);
		}
	}

	/// Probe the configured host set concurrently; reachable if any answers
	async fn any_host_reachable(&self) -> bool {
		let probes = self
			.config
			.probe_hosts
			.iter()
			.map(|host| self.probe.probe(host));
		join_all(probes).await.into_iter().any(|ok| ok)
	}

	/// Feed a link-layer connectivity signal from the platform
	///
	/// A non-`None` link is only a hint: the monitor moves to connecting
	/// and runs an active probe before declaring the connection usable.
	pub async fn report_link(&self, link: LinkType) {
		if link == LinkType::None {
			self.consecutive_failures.store(0, Ordering::SeqCst);
			self.set_state(NetworkState { status: ConnStatus::Disconnected, link });
			return;
		}

		self.set_state(NetworkState { status: ConnStatus::Connecting, link });
		if self.any_host_reachable().await {
			self.consecutive_failures.store(0, Ordering::SeqCst);
			self.set_state(NetworkState { status: ConnStatus::Connected, link });
		} else {
			debug!(link = link_display(link), "link reported but reachability probe failed");
			self.set_state(NetworkState { status: ConnStatus::Disconnected, link });
		}
	}

	/// Re-validate connectivity without a link-state change
	///
	/// Called periodically; catches silent degradation of a connection
	/// that still looks up at the link layer.
	pub async fn recheck(&self) {
		let current = self.state();
		match current.status {
			// Probe already in flight
			ConnStatus::Connecting => {}

			ConnStatus::Disconnected => {
				// Nothing to revalidate without a link
				if current.link == LinkType::None {
					return;
				}
				self.report_link(current.link).await;
			}

			ConnStatus::Connected => {
				if self.any_host_reachable().await {
					self.consecutive_failures.store(0, Ordering::SeqCst);
				} else {
					let failures =
						self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
					if failures >= self.config.unstable_threshold {
						self.set_state(NetworkState {
							status: ConnStatus::Unstable,
							link: current.link,
						});
					}
				}
			}

			ConnStatus::Unstable => {
				if self.any_host_reachable().await {
					self.consecutive_failures.store(0, Ordering::SeqCst);
					self.set_state(NetworkState {
						status: ConnStatus::Connected,
						link: current.link,
					});
				} else {
					self.set_state(NetworkState {
						status: ConnStatus::Disconnected,
						link: current.link,
					});
				}
			}
		}
	}

	/// Periodic re-probe loop; runs until the owning task is aborted
	pub async fn run(self: Arc<Self>) {
		let mut ticker =
			tokio::time::interval(std::time::Duration::from_secs(self.config.probe_interval_secs));
		// The first tick fires immediately; skip it so constructing the
		// service does not race an instant probe
		ticker.tick().await;
		loop {
			ticker.tick().await;
			self.recheck().await;
		}
	}
}

fn link_display(link: LinkType) -> &'static str {
	match link {
		LinkType::Wifi => "wifi",
		LinkType::Mobile => "mobile",
		LinkType::Ethernet => "ethernet",
		LinkType::None => "none",
		LinkType::Other => "other",
	}
}


// vim: ts=4
