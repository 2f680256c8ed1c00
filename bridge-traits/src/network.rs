//! Network Monitoring Abstraction
//!
//! Provides connectivity status so the sync queue can skip drains while
//! offline and drain as soon as connectivity returns.

use async_trait::async_trait;

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Cellular,
    WiFi,
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    pub fn connected(network_type: NetworkType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(network_type),
            is_metered: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == NetworkStatus::Connected
    }
}

/// Network monitor trait
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability probe
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
/// - **Web**: `navigator.onLine` + `online`/`offline` events
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Implementations should emit an event whenever the status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_info() {
        let info = NetworkInfo {
            status: NetworkStatus::Connected,
            network_type: Some(NetworkType::WiFi),
            is_metered: false,
        };

        assert!(info.is_connected());
        assert_eq!(info.network_type, Some(NetworkType::WiFi));
        assert!(!info.is_metered);
    }
}
