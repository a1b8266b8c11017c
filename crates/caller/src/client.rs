//! Client handle shared by every caller

use std::fmt;
use std::sync::Arc;

use dataservices_core::SessionState;
use dataservices_transport::Transport;
#[cfg(feature = "http")]
use tracing::info;

use crate::config::ClientConfig;

/// Transport plus configuration, shared by every caller built from it.
#[derive(Clone)]
pub struct DataServicesClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl DataServicesClient {
    /// Client over any transport, with default configuration.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Client over any transport.
    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    /// Client over an already shared transport.
    pub fn with_shared_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// HTTP client for the configured server.
    #[cfg(feature = "http")]
    pub fn connect(config: ClientConfig) -> dataservices_core::Result<Self> {
        config.validate()?;
        let transport =
            dataservices_transport::HttpTransport::new(config.base_url.clone(), config.timeout());
        info!(
            target: "dataservices::http",
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            "Created data services client"
        );
        Ok(Self::with_config(transport, config))
    }

    /// HTTP client configured from a `dataservices.toml` file.
    #[cfg(feature = "http")]
    pub fn connect_with_file(path: &std::path::Path) -> dataservices_core::Result<Self> {
        Self::connect(ClientConfig::from_file(path)?)
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared transport
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Generate a new session identifier.
    pub fn new_session_state(&self) -> SessionState {
        SessionState::new()
    }
}

impl fmt::Debug for DataServicesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataServicesClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
