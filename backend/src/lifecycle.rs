//! Node lifecycle
//!
//! Bootstraps a realtime node from [`ServerConfig`] and the external
//! collaborators, and coordinates its shutdown.

use crate::logging;
use anyhow::Result;
use log::info;
use skyfeed_bus::{Bus, Subscription};
use skyfeed_commons::topics::FUNCTION_CALL_TOPIC;
use skyfeed_configs::{RealtimeSettings, ServerConfig};
use skyfeed_realtime::{
    serve_client, Authenticator, ClientConnection, ClusterMembership, RealtimeModule,
    StaticMembership, StorageReader, TriggerCoordinator,
};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running realtime node
pub struct RealtimeNode {
    node_id: String,
    module: Arc<RealtimeModule>,
    coordinator: Arc<TriggerCoordinator>,
    function_calls: Subscription,
}

/// Load the config at `path` and install logging from its `[logging]` section
pub fn prepare(path: impl AsRef<Path>) -> Result<ServerConfig> {
    let config = ServerConfig::from_file(path.as_ref())?;
    logging::init_from_settings(&config.logging)?;
    info!("Loaded config from {}", path.as_ref().display());
    Ok(config)
}

/// Membership provider backed by `[cluster].alive_nodes`
pub fn static_membership(config: &ServerConfig) -> Arc<dyn ClusterMembership> {
    Arc::new(StaticMembership::new(config.cluster.alive_nodes))
}

/// Build the realtime module, apply `config.realtime` and start listening
/// on the cluster trigger and function call topics.
pub async fn bootstrap(
    config: &ServerConfig,
    bus: Arc<dyn Bus>,
    storage: Arc<dyn StorageReader>,
    authenticator: Arc<dyn Authenticator>,
    membership: Arc<dyn ClusterMembership>,
) -> Result<RealtimeNode> {
    config.validate()?;

    let module = Arc::new(RealtimeModule::new(
        config.node.project.clone(),
        Arc::clone(&bus),
        storage,
        authenticator,
    ));
    module.set_config(config.realtime.clone()).await;

    let coordinator = Arc::new(TriggerCoordinator::new(
        Arc::clone(&bus),
        Arc::clone(module.dispatcher()),
        membership,
        config.realtime.quorum_timeout(),
    ));
    coordinator.start().await?;

    let function_calls = match bus
        .subscribe(FUNCTION_CALL_TOPIC, coordinator.function_call_handler())
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            coordinator.stop();
            module.shutdown().await;
            return Err(e.into());
        },
    };

    info!(
        "Node {} ready (project={}, realtime enabled={})",
        config.node.node_id,
        config.node.project,
        module.is_enabled()
    );

    Ok(RealtimeNode {
        node_id: config.node.node_id.clone(),
        module,
        coordinator,
        function_calls,
    })
}

impl RealtimeNode {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn module(&self) -> &Arc<RealtimeModule> {
        &self.module
    }

    pub fn coordinator(&self) -> &Arc<TriggerCoordinator> {
        &self.coordinator
    }

    /// Apply new realtime settings at runtime
    pub async fn reconfigure(&self, settings: RealtimeSettings) {
        self.module.set_config(settings).await;
    }

    /// Serve a client connection on its own task
    pub fn accept(&self, connection: Arc<dyn ClientConnection>) -> JoinHandle<()> {
        tokio::spawn(serve_client(Arc::clone(&self.module), connection))
    }

    /// Stop listening on the cluster topics and drain the dispatcher
    pub async fn shutdown(self) {
        info!("Shutting down node {}", self.node_id);
        self.function_calls.unsubscribe();
        self.coordinator.stop();
        self.module.shutdown().await;
        info!("Node {} stopped", self.node_id);
    }
}
