//! Connectivity guard
//!
//! Answers whether the phone is associated with the device's access point and
//! waits for (re)association with a bounded timeout.

use anyhow::Result;
use log::{debug, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{oneshot, watch},
    task::AbortHandle,
    time::sleep,
};
use trait_variant::make;

pub const SSID_LOOKUP_ATTEMPTS: u32 = 3;
pub const SSID_LOOKUP_PAUSE: Duration = Duration::from_millis(100);

/// Snapshot of the active network path as reported by the OS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkPath {
    pub usable: bool,
    pub wifi: bool,
}

impl NetworkPath {
    pub const WIFI: NetworkPath = NetworkPath {
        usable: true,
        wifi: true,
    };

    pub fn is_usable_wifi(&self) -> bool {
        self.usable && self.wifi
    }
}

/// OS facilities needed to reason about Wi-Fi association
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait NetworkMonitor {
    /// Name of the currently associated Wi-Fi network, if any
    async fn current_ssid(&self) -> Result<Option<String>>;

    /// Start observing path changes
    ///
    /// The receiver starts at `NetworkPath::default()` until the first sample
    /// is taken; a sample that differs from it is published as a change.
    /// Dropping the receiver stops the observation.
    fn observe_paths(&self) -> watch::Receiver<NetworkPath>;
}

/// Derived on every query, never cached
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectivityState {
    pub associated: bool,
    pub ssid: Option<String>,
}

/// Completion cell resolved by whichever of several racing triggers comes first
///
/// Later calls to [`Resolution::resolve`] are no-ops.
pub struct Resolution<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Resolution<T> {
    pub fn pending() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Returns `true` if this call resolved the cell
    pub fn resolve(&self, value: T) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => {
                // the waiter may already be gone; the cell is resolved either way
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self.sender.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Aborts the wrapped tasks when dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

pub struct ConnectivityGuard<N> {
    monitor: Arc<N>,
    expected_ssid: Arc<str>,
}

impl<N> Clone for ConnectivityGuard<N> {
    fn clone(&self) -> Self {
        Self {
            monitor: Arc::clone(&self.monitor),
            expected_ssid: Arc::clone(&self.expected_ssid),
        }
    }
}

impl<N> ConnectivityGuard<N>
where
    N: NetworkMonitor + Send + Sync + 'static,
{
    pub fn new(monitor: N, expected_ssid: &str) -> Self {
        Self {
            monitor: Arc::new(monitor),
            expected_ssid: Arc::from(expected_ssid),
        }
    }

    pub fn expected_ssid(&self) -> &str {
        &self.expected_ssid
    }

    /// Whether the phone is associated with the device network right now
    ///
    /// SSID lookups fail transiently right after association changes, so the
    /// lookup is tried a few times before giving up.
    pub async fn is_associated(&self) -> bool {
        self.state().await.associated
    }

    pub async fn state(&self) -> ConnectivityState {
        let mut last_ssid = None;

        for attempt in 0..SSID_LOOKUP_ATTEMPTS {
            if attempt > 0 {
                sleep(SSID_LOOKUP_PAUSE).await;
            }

            match self.monitor.current_ssid().await {
                Ok(Some(ssid)) if *ssid == *self.expected_ssid => {
                    return ConnectivityState {
                        associated: true,
                        ssid: Some(ssid),
                    };
                }
                Ok(ssid) => {
                    debug!("ssid lookup {attempt}: associated with {ssid:?}");
                    last_ssid = ssid;
                }
                Err(e) => debug!("ssid lookup {attempt} failed: {e:#}"),
            }
        }

        ConnectivityState {
            associated: false,
            ssid: last_ssid,
        }
    }

    /// Wait until a usable Wi-Fi path associated with the device network
    /// shows up, or until `timeout` elapses
    ///
    /// The path observer and the timer race on a [`Resolution`]; the loser is
    /// aborted on every exit, including when the caller drops this future.
    pub async fn await_association(&self, timeout: Duration) -> bool {
        let (resolution, outcome) = Resolution::pending();
        let resolution = Arc::new(resolution);
        let mut paths = self.monitor.observe_paths();

        let watcher = {
            let guard = self.clone();
            let resolution = Arc::clone(&resolution);
            tokio::spawn(async move {
                loop {
                    let path = *paths.borrow_and_update();

                    if path.is_usable_wifi() && guard.is_associated().await {
                        resolution.resolve(true);
                        return;
                    }

                    if paths.changed().await.is_err() {
                        debug!("network path observer closed");
                        return;
                    }
                }
            })
        };

        let timer = {
            let resolution = Arc::clone(&resolution);
            tokio::spawn(async move {
                sleep(timeout).await;
                if resolution.resolve(false) {
                    warn!("no association with device network within {timeout:?}");
                }
            })
        };

        let _tasks = AbortOnDrop(vec![watcher.abort_handle(), timer.abort_handle()]);

        outcome.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall_double::double;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[double]
    use crate::connectivity::NetworkMonitor;

    const SSID: &str = "Valokenno";

    fn monitor_with_ssids(ssids: Vec<Result<Option<&'static str>, &'static str>>) -> NetworkMonitor {
        let calls = Arc::new(AtomicU32::new(0));
        let mut monitor = NetworkMonitor::default();
        monitor.expect_current_ssid().returning(move || {
            let index = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let next = ssids.get(index).copied().unwrap_or(Ok(None));
            Box::pin(async move {
                next.map(|ssid| ssid.map(String::from))
                    .map_err(|e| anyhow::anyhow!(e))
            })
        });
        monitor
    }

    mod resolution {
        use super::*;

        #[test]
        fn only_first_resolve_wins() {
            let (resolution, mut rx) = Resolution::pending();

            assert!(!resolution.is_resolved());
            assert!(resolution.resolve(false));
            assert!(!resolution.resolve(true));
            assert!(resolution.is_resolved());
            assert_eq!(rx.try_recv(), Ok(false));
        }

        #[test]
        fn resolve_after_waiter_dropped_does_not_panic() {
            let (resolution, rx) = Resolution::pending();
            drop(rx);

            assert!(resolution.resolve(1));
            assert!(!resolution.resolve(2));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn concurrent_triggers_resolve_exactly_once() {
            for _ in 0..100 {
                let (resolution, rx) = Resolution::pending();
                let resolution = Arc::new(resolution);

                let timer = {
                    let resolution = Arc::clone(&resolution);
                    tokio::spawn(async move { resolution.resolve(false) })
                };
                let observer = {
                    let resolution = Arc::clone(&resolution);
                    tokio::spawn(async move {
                        sleep(Duration::from_micros(500)).await;
                        resolution.resolve(true)
                    })
                };

                let wins = [timer.await.unwrap(), observer.await.unwrap()];
                assert_eq!(wins.iter().filter(|won| **won).count(), 1);
                assert!(rx.await.is_ok());
            }
        }
    }

    mod is_associated {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn matching_ssid_on_first_lookup() {
            let guard = ConnectivityGuard::new(monitor_with_ssids(vec![Ok(Some(SSID))]), SSID);
            assert!(guard.is_associated().await);
        }

        #[tokio::test(start_paused = true)]
        async fn retries_transient_lookup_failures() {
            let guard = ConnectivityGuard::new(
                monitor_with_ssids(vec![Err("lookup failed"), Ok(None), Ok(Some(SSID))]),
                SSID,
            );
            let started = tokio::time::Instant::now();

            assert!(guard.is_associated().await);
            assert!(started.elapsed() >= 2 * SSID_LOOKUP_PAUSE);
            assert!(started.elapsed() < 3 * SSID_LOOKUP_PAUSE);
        }

        #[tokio::test(start_paused = true)]
        async fn gives_up_after_three_lookups() {
            let calls = Arc::new(AtomicU32::new(0));
            let mut monitor = NetworkMonitor::default();
            {
                let calls = Arc::clone(&calls);
                monitor.expect_current_ssid().returning(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(Some("HomeNetwork".to_string())) })
                });
            }
            let guard = ConnectivityGuard::new(monitor, SSID);

            let state = guard.state().await;
            assert!(!state.associated);
            assert_eq!(state.ssid.as_deref(), Some("HomeNetwork"));
            assert_eq!(calls.load(Ordering::SeqCst), SSID_LOOKUP_ATTEMPTS);
        }

        #[tokio::test(start_paused = true)]
        async fn missing_ssid_means_not_associated() {
            let guard = ConnectivityGuard::new(monitor_with_ssids(vec![]), SSID);
            assert!(!guard.is_associated().await);
        }
    }

    mod await_association {
        use super::*;

        fn monitor_with_paths(
            paths: watch::Receiver<NetworkPath>,
            associated: bool,
        ) -> NetworkMonitor {
            let mut monitor = NetworkMonitor::default();
            monitor.expect_observe_paths().returning(move || paths.clone());
            monitor.expect_current_ssid().returning(move || {
                Box::pin(async move { Ok(associated.then(|| SSID.to_string())) })
            });
            monitor
        }

        #[tokio::test(start_paused = true)]
        async fn resolves_immediately_on_current_wifi_path() {
            let (_tx, rx) = watch::channel(NetworkPath::WIFI);
            let guard = ConnectivityGuard::new(monitor_with_paths(rx, true), SSID);
            let started = tokio::time::Instant::now();

            assert!(guard.await_association(Duration::from_secs(10)).await);
            assert!(started.elapsed() < Duration::from_secs(1));
        }

        #[tokio::test(start_paused = true)]
        async fn resolves_when_path_becomes_usable() {
            let (tx, rx) = watch::channel(NetworkPath::default());
            let guard = ConnectivityGuard::new(monitor_with_paths(rx, true), SSID);

            tokio::spawn(async move {
                sleep(Duration::from_secs(3)).await;
                let _ = tx.send(NetworkPath::WIFI);
                // keep the sender alive past the wait
                sleep(Duration::from_secs(60)).await;
            });

            let started = tokio::time::Instant::now();
            assert!(guard.await_association(Duration::from_secs(10)).await);
            assert!(started.elapsed() >= Duration::from_secs(3));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test(start_paused = true)]
        async fn times_out_when_not_on_device_network() {
            let (_tx, rx) = watch::channel(NetworkPath::WIFI);
            let guard = ConnectivityGuard::new(monitor_with_paths(rx, false), SSID);
            let started = tokio::time::Instant::now();

            assert!(!guard.await_association(Duration::from_secs(5)).await);
            assert!(started.elapsed() >= Duration::from_secs(5));
        }

        #[tokio::test(start_paused = true)]
        async fn ignores_non_wifi_paths() {
            let (_tx, rx) = watch::channel(NetworkPath {
                usable: true,
                wifi: false,
            });
            let guard = ConnectivityGuard::new(monitor_with_paths(rx, true), SSID);

            assert!(!guard.await_association(Duration::from_secs(5)).await);
        }

        #[tokio::test(start_paused = true)]
        async fn path_update_racing_the_timer_resolves_once() {
            let (tx, rx) = watch::channel(NetworkPath::default());
            let guard = ConnectivityGuard::new(monitor_with_paths(rx, true), SSID);
            let timeout = Duration::from_secs(5);

            tokio::spawn(async move {
                sleep(timeout + Duration::from_millis(1)).await;
                let _ = tx.send(NetworkPath::WIFI);
                sleep(Duration::from_secs(60)).await;
            });

            assert!(!guard.await_association(timeout).await);
            // a late path update must not resurrect the finished wait
            sleep(Duration::from_secs(1)).await;
        }

        #[tokio::test(start_paused = true)]
        async fn releases_observer_after_resolution() {
            let (tx, rx) = watch::channel(NetworkPath::WIFI);
            let guard = ConnectivityGuard::new(monitor_with_paths(rx.clone(), true), SSID);
            drop(rx);

            assert!(guard.await_association(Duration::from_secs(10)).await);
            sleep(Duration::from_millis(10)).await;

            // only the mock's own copy of the receiver remains
            assert_eq!(tx.receiver_count(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn releases_observer_when_caller_abandons_wait() {
            let (tx, rx) = watch::channel(NetworkPath::default());
            let guard = ConnectivityGuard::new(monitor_with_paths(rx.clone(), true), SSID);
            drop(rx);

            let wait = guard.await_association(Duration::from_secs(10));
            let abandoned = tokio::time::timeout(Duration::from_secs(1), wait).await;
            assert!(abandoned.is_err());

            sleep(Duration::from_millis(10)).await;
            assert_eq!(tx.receiver_count(), 1);
        }
    }
}
