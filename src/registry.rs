//! Registered clusters and their live clients, keyed by cluster id.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::backend::{CallPolicy, ClusterBackend, ClusterClient};
use crate::config::{ClusterMap, ClusterStore};
use crate::error::{ApiError, BackendError, BackendResult};
use crate::k8s::KubeGateway;
use crate::kubectl::SshKubectl;
use crate::model::{ClusterRecord, Controller};

/// Status reported for a registered cluster whose client failed to start.
pub const UNINITIALIZED: &str = "uninitialized";

#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(&self, id: &str, record: &ClusterRecord)
    -> BackendResult<Arc<dyn ClusterBackend>>;
}

/// Builds real backends: SSH + kubectl or a kubeconfig client.
pub struct LiveBackends {
    control_dir: PathBuf,
    ssh_timeout: Duration,
}

impl LiveBackends {
    pub fn new(control_dir: PathBuf, ssh_timeout: Duration) -> Self {
        Self {
            control_dir,
            ssh_timeout,
        }
    }
}

#[async_trait]
impl BackendFactory for LiveBackends {
    async fn build(
        &self,
        id: &str,
        record: &ClusterRecord,
    ) -> BackendResult<Arc<dyn ClusterBackend>> {
        match record.k8s_controller {
            Controller::Ssh => {
                let Some(ssh) = record.ssh_config.as_ref() else {
                    return Err(BackendError::InvalidInput(
                        "ssh_config is required for SSH clusters".to_string(),
                    ));
                };
                let backend =
                    SshKubectl::connect(id, ssh, &self.control_dir, self.ssh_timeout).await?;
                Ok(Arc::new(backend))
            }
            Controller::Kube => {
                let backend = KubeGateway::connect(id, record.kube_config.as_ref()).await?;
                Ok(Arc::new(backend))
            }
        }
    }
}

#[derive(Default)]
struct Registered {
    records: ClusterMap,
    clients: HashMap<String, ClusterClient>,
}

pub struct ClusterRegistry {
    store: ClusterStore,
    factory: Arc<dyn BackendFactory>,
    policy: CallPolicy,
    inner: RwLock<Registered>,
}

impl ClusterRegistry {
    pub fn new(store: ClusterStore, factory: Arc<dyn BackendFactory>, policy: CallPolicy) -> Self {
        Self {
            store,
            factory,
            policy,
            inner: RwLock::new(Registered::default()),
        }
    }

    /// Loads the store and starts every client concurrently. Returns how many
    /// clients came up; the rest stay registered without one.
    pub async fn bootstrap(&self) -> usize {
        let records = self.store.load();
        let built = join_all(records.iter().map(|(id, record)| async move {
            (id.clone(), self.build_client(id, record).await)
        }))
        .await;

        let mut clients = HashMap::new();
        for (id, result) in built {
            match result {
                Ok(client) => {
                    clients.insert(id, client);
                }
                Err(error) => {
                    error!(cluster = %id, "failed to initialize cluster client: {error}");
                }
            }
        }

        let ready = clients.len();
        info!(clusters = records.len(), ready, "cluster registry loaded");
        let mut inner = self.inner.write().await;
        inner.records = records;
        inner.clients = clients;
        ready
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Records in id order with passwords redacted, plus `id` and `status`.
    pub async fn list(&self) -> Vec<Value> {
        let inner = self.inner.read().await;
        inner
            .records
            .iter()
            .filter_map(|(id, record)| {
                let mut value = serde_json::to_value(record.redacted()).ok()?;
                let status = inner
                    .clients
                    .get(id)
                    .map(|client| client.state().label())
                    .unwrap_or(UNINITIALIZED);
                if let Some(object) = value.as_object_mut() {
                    object.insert("id".to_string(), Value::String(id.clone()));
                    object.insert("status".to_string(), Value::String(status.to_string()));
                }
                Some(value)
            })
            .collect()
    }

    pub async fn client(&self, id: &str) -> Result<ClusterClient, ApiError> {
        let inner = self.inner.read().await;
        if !inner.records.contains_key(id) {
            return Err(ApiError::ClusterNotFound);
        }
        inner
            .clients
            .get(id)
            .cloned()
            .ok_or(ApiError::ClientNotInitialized)
    }

    /// Registers a cluster under its name. The client is built before
    /// anything is stored.
    pub async fn add(&self, mut record: ClusterRecord) -> Result<String, ApiError> {
        record.validate().map_err(ApiError::BadRequest)?;
        record.name = record.name.trim().to_string();
        let id = record.name.clone();

        if self.inner.read().await.records.contains_key(&id) {
            return Err(conflict(&id));
        }

        let client = self
            .build_client(&id, &record)
            .await
            .map_err(|error| match error {
                BackendError::InvalidInput(message) => ApiError::BadRequest(message),
                error => {
                    ApiError::Internal(format!("failed to initialize cluster client: {error}"))
                }
            })?;

        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&id) {
            drop(inner);
            client.close().await;
            return Err(conflict(&id));
        }

        inner.records.insert(id.clone(), record);
        if let Err(error) = self.store.save(&inner.records) {
            inner.records.remove(&id);
            drop(inner);
            client.close().await;
            return Err(persist_failed(&id, error));
        }

        inner.clients.insert(id.clone(), client);
        info!(cluster = %id, "cluster added");
        Ok(id)
    }

    /// Renames a cluster. When its id is its old name the id follows the new
    /// name, carrying the live client along.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<String, ApiError> {
        let new_name = new_name.trim();
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get(id) else {
            return Err(ApiError::ClusterNotFound);
        };
        if new_name.is_empty() {
            return Err(ApiError::BadRequest("Cluster name is required".to_string()));
        }
        if new_name.contains('/') {
            return Err(ApiError::BadRequest(
                "Cluster name must not contain '/'".to_string(),
            ));
        }

        let old_name = record.name.clone();
        let moves = id == old_name && new_name != id;
        if moves && inner.records.contains_key(new_name) {
            return Err(conflict(new_name));
        }

        let snapshot = inner.records.clone();
        let target = if moves { new_name.to_string() } else { id.to_string() };
        if let Some(mut record) = inner.records.remove(id) {
            record.name = new_name.to_string();
            inner.records.insert(target.clone(), record);
        }

        if let Err(error) = self.store.save(&inner.records) {
            inner.records = snapshot;
            return Err(persist_failed(id, error));
        }

        if moves && let Some(client) = inner.clients.remove(id) {
            inner.clients.insert(target.clone(), client);
        }
        info!(cluster = %id, new_id = %target, "cluster renamed from {old_name} to {new_name}");
        Ok(target)
    }

    pub async fn remove(&self, id: &str) -> Result<(), ApiError> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.remove(id) else {
            return Err(ApiError::ClusterNotFound);
        };

        if let Err(error) = self.store.save(&inner.records) {
            inner.records.insert(id.to_string(), record);
            return Err(persist_failed(id, error));
        }

        let client = inner.clients.remove(id);
        drop(inner);
        if let Some(client) = client {
            client.close().await;
        }
        info!(cluster = %id, "cluster removed");
        Ok(())
    }

    pub async fn shutdown(&self) {
        let clients = {
            let mut inner = self.inner.write().await;
            std::mem::take(&mut inner.clients)
        };
        join_all(clients.values().map(ClusterClient::close)).await;
        info!(count = clients.len(), "cluster sessions closed");
    }

    async fn build_client(&self, id: &str, record: &ClusterRecord) -> BackendResult<ClusterClient> {
        let backend = self.factory.build(id, record).await?;
        Ok(ClusterClient::new(
            backend,
            record.namespace.clone(),
            self.policy,
        ))
    }
}

fn conflict(id: &str) -> ApiError {
    ApiError::Conflict(format!("Cluster {id} already exists"))
}

fn persist_failed(id: &str, error: anyhow::Error) -> ApiError {
    warn!(cluster = %id, "rolled back cluster change: {error:#}");
    ApiError::Internal("Failed to save cluster configuration".to_string())
}
