//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use core_async::time::{sleep, timeout, Duration};
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Desktop network monitor implementation
///
/// Reachability is decided by opening a TCP connection to a well-known
/// endpoint. Platform-specific APIs (netlink, SystemConfiguration, Network
/// List Manager) would be more precise but need extra dependencies.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_addr: DEFAULT_PROBE_ADDR.to_string(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Probe a different `host:port` (e.g. the remote store's own endpoint).
    pub fn with_probe_addr(mut self, addr: impl Into<String>) -> Self {
        self.probe_addr = addr.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match timeout(
            PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;

        let info = NetworkInfo {
            status,
            // Ethernet and WiFi are indistinguishable without platform APIs
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
        };

        debug!(status = ?status, probe = %self.probe_addr, "Network info updated");
        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            sleep(self.monitor.poll_interval).await;

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}
