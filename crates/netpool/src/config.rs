//! Pool and connection configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionFactory;
use crate::error::{BoxError, PoolError, PoolResult};

/// Transform applied to a [`ConnectionConfig`] right before it is handed to the factory
pub type PreConnectHook = Arc<dyn Fn(&mut ConnectionConfig) -> Result<(), BoxError> + Send + Sync>;

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Where and how to dial a single connection
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    host_port: String,
    #[serde(default = "default_protocol")]
    protocol: String,
    #[serde(skip)]
    pre_connect_hooks: Vec<PreConnectHook>,
}

impl ConnectionConfig {
    /// Create a config for `host_port` over `protocol`
    pub fn new(host_port: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            host_port: host_port.into(),
            protocol: protocol.into(),
            pre_connect_hooks: Vec::new(),
        }
    }

    /// Create a TCP config for `host_port`
    pub fn tcp(host_port: impl Into<String>) -> Self {
        Self::new(host_port, default_protocol())
    }

    /// Append a pre-connect hook. Hooks run in insertion order.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ConnectionConfig) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pre_connect_hooks.push(Arc::new(hook));
        self
    }

    /// Target address, `host:port`
    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// Protocol name such as `tcp`
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Number of registered pre-connect hooks
    pub fn hook_count(&self) -> usize {
        self.pre_connect_hooks.len()
    }

    /// Override the target address. Meant for use inside hooks.
    pub fn set_host_port(&mut self, host_port: impl Into<String>) {
        self.host_port = host_port.into();
    }

    /// Override the protocol. Meant for use inside hooks.
    pub fn set_protocol(&mut self, protocol: impl Into<String>) {
        self.protocol = protocol.into();
    }

    /// Run every pre-connect hook over a copy of this config
    pub fn prepare(&self) -> PoolResult<Self> {
        let mut prepared = self.clone();
        for hook in &self.pre_connect_hooks {
            hook(&mut prepared).map_err(PoolError::Hook)?;
        }
        Ok(prepared)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host_port", &self.host_port)
            .field("protocol", &self.protocol)
            .field("pre_connect_hooks", &self.pre_connect_hooks.len())
            .finish()
    }
}

fn validate_bounds(initial: usize, max: usize, configs: usize) -> PoolResult<()> {
    if max == 0 || initial > max {
        return Err(PoolError::InvalidCapacity { initial, max });
    }
    if configs < initial {
        return Err(PoolError::InsufficientConnectionConfigs {
            required: initial,
            provided: configs,
        });
    }
    Ok(())
}

/// Plain-data pool settings, loadable from any serde format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Connections dialed eagerly at bootstrap
    pub initial_capacity: usize,
    /// Maximum number of idle connections kept
    pub max_capacity: usize,
    /// Log every connection created at bootstrap
    pub debug_mode: bool,
    /// Seed configs, indexed `0..initial_capacity` at bootstrap
    pub connection_configs: Vec<ConnectionConfig>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_capacity: 10,
            debug_mode: false,
            connection_configs: Vec::new(),
        }
    }
}

impl PoolSettings {
    /// Check the capacity invariants
    pub fn validate(&self) -> PoolResult<()> {
        validate_bounds(
            self.initial_capacity,
            self.max_capacity,
            self.connection_configs.len(),
        )
    }
}

/// Complete pool configuration, factory included
pub struct PoolConfig<C> {
    /// Connections dialed eagerly at bootstrap
    pub initial_capacity: usize,
    /// Capacity of the idle store
    pub max_capacity: usize,
    /// Dials new connections
    pub factory: Arc<dyn ConnectionFactory<C>>,
    /// Seed configs, indexed `0..initial_capacity` at bootstrap
    pub connection_configs: Vec<ConnectionConfig>,
    /// Log every connection created at bootstrap
    pub debug_mode: bool,
}

impl<C> PoolConfig<C> {
    /// Start building a config around `factory`
    pub fn builder(factory: impl ConnectionFactory<C>) -> PoolConfigBuilder<C> {
        PoolConfigBuilder::new(factory)
    }

    /// Combine loaded settings with a factory
    pub fn from_settings(
        settings: PoolSettings,
        factory: impl ConnectionFactory<C>,
    ) -> PoolResult<Self> {
        settings.validate()?;
        Ok(Self {
            initial_capacity: settings.initial_capacity,
            max_capacity: settings.max_capacity,
            factory: Arc::new(factory),
            connection_configs: settings.connection_configs,
            debug_mode: settings.debug_mode,
        })
    }

    /// Check the capacity invariants
    pub fn validate(&self) -> PoolResult<()> {
        validate_bounds(
            self.initial_capacity,
            self.max_capacity,
            self.connection_configs.len(),
        )
    }
}

impl<C> Clone for PoolConfig<C> {
    fn clone(&self) -> Self {
        Self {
            initial_capacity: self.initial_capacity,
            max_capacity: self.max_capacity,
            factory: self.factory.clone(),
            connection_configs: self.connection_configs.clone(),
            debug_mode: self.debug_mode,
        }
    }
}

impl<C> fmt::Debug for PoolConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("initial_capacity", &self.initial_capacity)
            .field("max_capacity", &self.max_capacity)
            .field("connection_configs", &self.connection_configs)
            .field("debug_mode", &self.debug_mode)
            .finish_non_exhaustive()
    }
}

/// Builder for pool configurations
pub struct PoolConfigBuilder<C> {
    initial_capacity: usize,
    max_capacity: usize,
    factory: Arc<dyn ConnectionFactory<C>>,
    connection_configs: Vec<ConnectionConfig>,
    debug_mode: bool,
}

impl<C> PoolConfigBuilder<C> {
    /// Create a new config builder
    #[must_use]
    pub fn new(factory: impl ConnectionFactory<C>) -> Self {
        let defaults = PoolSettings::default();
        Self {
            initial_capacity: defaults.initial_capacity,
            max_capacity: defaults.max_capacity,
            factory: Arc::new(factory),
            connection_configs: defaults.connection_configs,
            debug_mode: defaults.debug_mode,
        }
    }

    /// Set the number of connections dialed at bootstrap
    #[must_use]
    pub fn initial_capacity(mut self, initial: usize) -> Self {
        self.initial_capacity = initial;
        self
    }

    /// Set the idle store capacity
    #[must_use]
    pub fn max_capacity(mut self, max: usize) -> Self {
        self.max_capacity = max;
        self
    }

    /// Add one seed connection config
    #[must_use]
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_configs.push(config);
        self
    }

    /// Add several seed connection configs
    #[must_use]
    pub fn connection_configs(mut self, configs: impl IntoIterator<Item = ConnectionConfig>) -> Self {
        self.connection_configs.extend(configs);
        self
    }

    /// Enable or disable bootstrap diagnostics
    #[must_use]
    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> PoolResult<PoolConfig<C>> {
        validate_bounds(
            self.initial_capacity,
            self.max_capacity,
            self.connection_configs.len(),
        )?;

        Ok(PoolConfig {
            initial_capacity: self.initial_capacity,
            max_capacity: self.max_capacity,
            factory: self.factory,
            connection_configs: self.connection_configs,
            debug_mode: self.debug_mode,
        })
    }
}

impl<C> fmt::Debug for PoolConfigBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfigBuilder")
            .field("initial_capacity", &self.initial_capacity)
            .field("max_capacity", &self.max_capacity)
            .field("connection_configs", &self.connection_configs.len())
            .field("debug_mode", &self.debug_mode)
            .finish_non_exhaustive()
    }
}
