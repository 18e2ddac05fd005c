// server.rs - service lifecycle: connect, secure, build the pipeline, route

use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{resolve_secret, TokenVerifier};
use crate::config::{Environment, RuntimeConfig};
use crate::database::{ConnectionState, ConnectionSupervisor, Connector, RetryPolicy, StoreConnector, StoreError, StoreKind};
use crate::middleware::{ErrorHandler, Pipeline};
use crate::routes::{bindings, compose};
use crate::state::AppState;

/// Startup progress. Each state is entered once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Securing,
    PipelineBuilt,
    Routed,
    Ready,
}

/// Faults that abort startup. The entry point must not bind a socket after
/// any of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid data store configuration: {0}")]
    Store(#[from] StoreError),

    #[error("JWT_SECRET must be set in the {0} environment")]
    MissingSecret(Environment),

    #[error("service already started (state: {0:?})")]
    AlreadyStarted(LifecycleState),
}

/// Owns the supervised connection and assembles the application router.
pub struct Service {
    config: RuntimeConfig,
    state: LifecycleState,
    supervisor: ConnectionSupervisor,
}

impl Service {
    pub fn new(config: RuntimeConfig) -> Self {
        let connector = Arc::new(StoreConnector::new(config.database.clone()));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: RuntimeConfig, connector: Arc<dyn Connector>) -> Self {
        let policy = RetryPolicy {
            retry_delay: config.retry_delay(),
            probe_interval: config.probe_interval(),
            close_timeout: config.close_timeout(),
        };
        let supervisor = ConnectionSupervisor::new(config.data_store_uri.clone(), connector, policy);
        Self {
            config,
            state: LifecycleState::Idle,
            supervisor,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Drive startup to `Ready` and hand back the composed application.
    ///
    /// An unreachable data store does not abort startup: the supervisor keeps
    /// retrying and handlers fail fast until it is back. A bad URI or a
    /// missing secret does.
    pub async fn run(&mut self) -> Result<Router, StartupError> {
        if self.state != LifecycleState::Idle {
            return Err(StartupError::AlreadyStarted(self.state));
        }

        self.advance(LifecycleState::Connecting);
        let kind = StoreKind::from_uri(&self.config.data_store_uri)?;
        info!("Connecting to {:?} data store", kind);
        let link = self.supervisor.connect().await;
        if link != ConnectionState::Connected {
            warn!("Starting without a data store connection ({}); reconnection is pending", link);
        }

        self.advance(LifecycleState::Securing);
        let Some(secret) = resolve_secret(&self.config) else {
            self.supervisor.close().await;
            return Err(StartupError::MissingSecret(self.config.environment));
        };
        let verifier = TokenVerifier::new(&secret);
        let pipeline = Pipeline::secure(&self.config);

        self.advance(LifecycleState::PipelineBuilt);
        let pipeline = pipeline.extend(&self.config);
        info!("Request pipeline: {:?}", pipeline.stages());

        self.advance(LifecycleState::Routed);
        let routes = compose(bindings(), verifier).with_state(AppState::new(self.supervisor.handle()));

        let app = pipeline.apply(ErrorHandler::new(self.config.is_production()).install(routes));
        self.advance(LifecycleState::Ready);
        Ok(app)
    }

    /// Close the supervised connection. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Shutting down; closing data store connection");
        self.supervisor.close().await;
    }

    fn advance(&mut self, next: LifecycleState) {
        info!("Service lifecycle: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config(environment: Environment) -> RuntimeConfig {
        let mut config = RuntimeConfig::preset(environment);
        config.data_store_uri = "memory://".to_string();
        config
    }

    #[tokio::test]
    async fn reaches_ready_with_memory_store() {
        let mut service = Service::new(memory_config(Environment::Development));
        assert_eq!(service.state(), LifecycleState::Idle);

        assert!(service.run().await.is_ok());
        assert_eq!(service.state(), LifecycleState::Ready);
        assert_eq!(service.supervisor().state(), ConnectionState::Connected);

        assert!(matches!(service.run().await, Err(StartupError::AlreadyStarted(LifecycleState::Ready))));
        service.shutdown().await;
        assert_eq!(service.supervisor().state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn unsupported_uri_aborts_while_connecting() {
        let mut config = memory_config(Environment::Development);
        config.data_store_uri = "mongodb://localhost/albums".to_string();
        let mut service = Service::new(config);

        let result = service.run().await;
        assert!(matches!(result, Err(StartupError::Store(StoreError::UnsupportedUri(_)))));
        assert_eq!(service.state(), LifecycleState::Connecting);
    }

    #[tokio::test]
    async fn production_requires_a_secret() {
        let mut service = Service::new(memory_config(Environment::Production));

        let result = service.run().await;
        assert!(matches!(result, Err(StartupError::MissingSecret(Environment::Production))));
        assert_eq!(service.state(), LifecycleState::Securing);
        assert_eq!(service.supervisor().state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn production_starts_with_a_secret() {
        let mut config = memory_config(Environment::Production);
        config.security.jwt_secret = Some("s3cret".to_string());
        let mut service = Service::new(config);
        assert!(service.run().await.is_ok());
    }
}
