//! # Core Configuration Module
//!
//! Collects the host bridges and settings the snapshot, sync and recovery
//! services are built from.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance. It enforces fail-fast validation so that a feature is never
//! enabled without the bridge it relies on.
//!
//! ## Required Dependencies
//!
//! - `LocalStore` - Device storage for snapshots, the sync queue and sessions
//!
//! ## Optional Dependencies
//!
//! - `RemoteStore` - Target of the outbound sync queue
//! - `SessionEngine` - Rebuilds interrupted sessions during recovery
//! - `NetworkMonitor` - Skips drains while offline, triggers one on reconnect
//! - `LifecycleObserver` - Triggers a drain when the app is backgrounded
//! - `Clock` - Time source (defaults to [`SystemClock`])
//! - `LoggerSink` - Host log forwarding
//!
//! When the `desktop-shims` feature is enabled, a SQLite-backed `LocalStore`
//! in the platform data directory is injected automatically if none is
//! provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .local_store(Arc::new(MyLocalStore))
//!     .remote_store(Arc::new(MyRemoteStore))
//!     .enable_remote_sync(true)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Remote sync without a remote store is rejected
//! let config = CoreConfig::builder()
//!     .enable_remote_sync(true)
//!     .build()
//!     .expect("Should fail - missing required bridges");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use bridge_traits::{
    Clock, LifecycleObserver, LocalStore, LoggerSink, NetworkMonitor, RemoteStore, SessionEngine,
    SystemClock,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Table the default recovery source reads session records from.
pub const DEFAULT_SESSION_TABLE: &str = "active_sessions";

/// Identity of the device the engine runs on.
///
/// Recorded in every snapshot and hashed into migration ticket fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub platform: String,
    pub app_version: String,
}

impl DeviceInfo {
    pub fn new(
        device_id: impl Into<String>,
        platform: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            platform: platform.into(),
            app_version: app_version.into(),
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_id: "unknown-device".to_string(),
            platform: std::env::consts::OS.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A storage backend the recovery scanner inspects for interrupted sessions.
///
/// `store: None` means the configured [`LocalStore`] is used.
#[derive(Clone)]
pub struct SessionSourceConfig {
    pub name: String,
    pub table: String,
    pub store: Option<Arc<dyn LocalStore>>,
}

impl SessionSourceConfig {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl std::fmt::Debug for SessionSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSourceConfig")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("store", &self.store.as_ref().map(|_| "LocalStore { ... }"))
            .finish()
    }
}

/// Core configuration for the fitness sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Device storage (required)
    pub local_store: Arc<dyn LocalStore>,

    /// Remote backend for the outbound queue (optional)
    pub remote_store: Option<Arc<dyn RemoteStore>>,

    /// Session reconstruction (optional)
    pub session_engine: Option<Arc<dyn SessionEngine>>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// App lifecycle observer (optional)
    pub lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,

    pub clock: Arc<dyn Clock>,

    /// Host log forwarding (optional).
    ///
    /// Services never install a subscriber themselves; the host passes
    /// [`CoreConfig::logging_config`] to [`init_logging`](crate::logging::init_logging).
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    pub device_info: DeviceInfo,

    /// Backends scanned for interrupted sessions
    pub session_sources: Vec<SessionSourceConfig>,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("local_store", &"LocalStore { ... }")
            .field(
                "remote_store",
                &self.remote_store.as_ref().map(|_| "RemoteStore { ... }"),
            )
            .field(
                "session_engine",
                &self.session_engine.as_ref().map(|_| "SessionEngine { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "lifecycle_observer",
                &self
                    .lifecycle_observer
                    .as_ref()
                    .map(|_| "LifecycleObserver { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("device_info", &self.device_info)
            .field("session_sources", &self.session_sources)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
///
/// Each flag requires the corresponding bridge; `build()` rejects
/// inconsistent combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Push queued local mutations to the remote store (requires RemoteStore)
    pub enable_remote_sync: bool,

    /// Run the recovery sweep at bootstrap (requires SessionEngine)
    pub enable_startup_recovery: bool,

    /// Allow periodic automatic snapshots
    pub enable_automatic_snapshots: bool,

    /// Skip drains while offline and drain on reconnect (requires NetworkMonitor)
    pub enable_network_awareness: bool,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Device info is present
    /// - Session sources are well-formed and unique
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.device_info.device_id.trim().is_empty() {
            return Err(Error::Config("Device id cannot be empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.session_sources {
            if source.name.trim().is_empty() || source.table.trim().is_empty() {
                return Err(Error::Config(
                    "Session sources need a non-empty name and table".to_string(),
                ));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate session source name: {}",
                    source.name
                )));
            }
        }

        if self.features.enable_remote_sync && self.remote_store.is_none() {
            return Err(Error::capability_missing(
                "RemoteStore",
                "Remote sync enabled but no RemoteStore provided. \
                 Disable the feature or inject a RemoteStore implementation.",
            ));
        }

        if self.features.enable_startup_recovery && self.session_engine.is_none() {
            return Err(Error::capability_missing(
                "SessionEngine",
                "Startup recovery enabled but no SessionEngine provided. \
                 Disable the feature or inject a SessionEngine implementation.",
            ));
        }

        if self.features.enable_network_awareness && self.network_monitor.is_none() {
            return Err(Error::capability_missing(
                "NetworkMonitor",
                "Network awareness enabled but no NetworkMonitor provided. \
                 Disable the feature or inject a NetworkMonitor implementation.",
            ));
        }

        Ok(())
    }

    /// Default logging settings forwarding to the configured sink, if any.
    pub fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::default();
        match &self.logger_sink {
            Some(sink) => config.with_logger_sink(sink.clone()),
            None => config,
        }
    }

    /// Session sources with the default local store filled in.
    pub fn resolved_session_sources(&self) -> Vec<(String, String, Arc<dyn LocalStore>)> {
        self.session_sources
            .iter()
            .map(|source| {
                let store = source
                    .store
                    .clone()
                    .unwrap_or_else(|| self.local_store.clone());
                (source.name.clone(), source.table.clone(), store)
            })
            .collect()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_local_store() -> Result<Arc<dyn LocalStore>> {
    Err(Error::capability_missing(
        "LocalStore",
        "LocalStore implementation is required for snapshots, the sync queue and session records. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default SqliteLocalStore. \
         Mobile: inject platform-native storage.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_local_store() -> Result<Arc<dyn LocalStore>> {
    use bridge_desktop::SqliteLocalStore;
    use core_async::runtime::Handle;
    use std::thread;

    let init_store = || -> Result<SqliteLocalStore> {
        core_async::runtime::block_on(SqliteLocalStore::open_default())
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create runtime for default LocalStore: {}",
                    e
                ))
            })?
            .map_err(Error::Bridge)
    };

    // block_on cannot nest inside a running runtime
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(init_store).join().map_err(|_| {
            Error::Internal("Worker thread panicked while creating default LocalStore".to_string())
        })??,
        Err(_) => init_store()?,
    };

    let store: Arc<dyn LocalStore> = Arc::new(store);
    Ok(store)
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    local_store: Option<Arc<dyn LocalStore>>,
    remote_store: Option<Arc<dyn RemoteStore>>,
    session_engine: Option<Arc<dyn SessionEngine>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    device_info: Option<DeviceInfo>,
    session_sources: Vec<SessionSourceConfig>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the local store implementation (required).
    pub fn local_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.local_store = Some(store);
        self
    }

    pub fn remote_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.remote_store = Some(store);
        self
    }

    pub fn session_engine(mut self, engine: Arc<dyn SessionEngine>) -> Self {
        self.session_engine = Some(engine);
        self
    }

    /// Sets the network monitor implementation (optional).
    ///
    /// Used to skip drains while offline and to request a drain when
    /// connectivity returns.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn device_info(mut self, info: DeviceInfo) -> Self {
        self.device_info = Some(info);
        self
    }

    /// Registers a backend to scan for interrupted sessions.
    ///
    /// When no source is registered, `build()` adds one named `local` over
    /// the [`DEFAULT_SESSION_TABLE`] of the local store.
    pub fn session_source(mut self, source: SessionSourceConfig) -> Self {
        self.session_sources.push(source);
        self
    }

    pub fn enable_remote_sync(mut self, enabled: bool) -> Self {
        self.features.enable_remote_sync = enabled;
        self
    }

    pub fn enable_startup_recovery(mut self, enabled: bool) -> Self {
        self.features.enable_startup_recovery = enabled;
        self
    }

    pub fn enable_automatic_snapshots(mut self, enabled: bool) -> Self {
        self.features.enable_automatic_snapshots = enabled;
        self
    }

    pub fn enable_network_awareness(mut self, enabled: bool) -> Self {
        self.features.enable_network_awareness = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - No `LocalStore` was provided and no desktop default is available
    /// - Configuration values are invalid
    /// - Feature flags are inconsistent with available bridges
    pub fn build(self) -> Result<CoreConfig> {
        let features = self.features;
        let remote_missing = features.enable_remote_sync && self.remote_store.is_none();

        // Report bridge mismatches before touching the filesystem for a default store
        if remote_missing {
            return Err(Error::capability_missing(
                "RemoteStore",
                "Remote sync enabled but no RemoteStore provided. \
                 Disable the feature or inject a RemoteStore implementation.",
            ));
        }

        let local_store = match self.local_store {
            Some(store) => store,
            None => provide_default_local_store()?,
        };

        let mut session_sources = self.session_sources;
        if session_sources.is_empty() {
            session_sources.push(SessionSourceConfig::new("local", DEFAULT_SESSION_TABLE));
        }

        let config = CoreConfig {
            local_store,
            remote_store: self.remote_store,
            session_engine: self.session_engine,
            network_monitor: self.network_monitor,
            lifecycle_observer: self.lifecycle_observer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            device_info: self.device_info.unwrap_or_default(),
            session_sources,
            features,
        };

        config.validate()?;

        Ok(config)
    }
}
