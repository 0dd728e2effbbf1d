//! Cluster operations shared by the kubeconfig and SSH backends.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};
use crate::model::{ConnectionState, ResourceKind, WorkloadRow};
use crate::table::image_repository;

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Summary rows for `kind` in `namespace`; namespaces ignore the namespace argument.
    async fn list(&self, kind: ResourceKind, namespace: &str) -> BackendResult<Vec<WorkloadRow>>;

    async fn namespace_exists(&self, name: &str) -> BackendResult<bool>;

    async fn create_namespace(&self, name: &str) -> BackendResult<()>;

    async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> BackendResult<()>;

    async fn detail(&self, kind: ResourceKind, name: &str, namespace: &str)
    -> BackendResult<Value>;

    async fn logs(&self, pod: &str, namespace: &str, lines: Option<i64>) -> BackendResult<String>;

    async fn update_image(&self, deployment: &str, image: &str, namespace: &str)
    -> BackendResult<()>;

    async fn scale(&self, deployment: &str, replicas: i32, namespace: &str) -> BackendResult<()>;

    async fn restart(&self, deployment: &str, namespace: &str) -> BackendResult<()>;

    /// `NAME` / `IMAGES` rows, images comma-joined in container order.
    async fn deployment_images(&self, namespace: &str) -> BackendResult<Vec<WorkloadRow>>;

    /// Creates or updates every object of a (multi-document) manifest. Returns one
    /// line per applied object.
    async fn apply(&self, manifest: &str, namespace: &str) -> BackendResult<Vec<String>>;

    async fn ping(&self) -> BackendResult<()>;

    fn state(&self) -> ConnectionState;

    async fn close(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub read_retries: u32,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            read_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMatch {
    pub name: String,
    pub ready: String,
    pub image: String,
    pub namespace: String,
}

/// A backend bound to one cluster: default namespace, argument checks, call
/// timeout and retries of read-only calls.
#[derive(Clone)]
pub struct ClusterClient {
    backend: Arc<dyn ClusterBackend>,
    namespace: String,
    policy: CallPolicy,
}

impl ClusterClient {
    pub fn new(backend: Arc<dyn ClusterBackend>, namespace: String, policy: CallPolicy) -> Self {
        Self {
            backend,
            namespace,
            policy,
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.namespace
    }

    pub fn state(&self) -> ConnectionState {
        self.backend.state()
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }

    pub async fn ping(&self) -> BackendResult<()> {
        self.read("ping", || self.backend.ping()).await
    }

    pub async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> BackendResult<Vec<WorkloadRow>> {
        let namespace = self.resolve_namespace(namespace);
        self.read(kind.kubectl_name(), || self.backend.list(kind, &namespace))
            .await
    }

    /// Namespace rows with `SELECT: true` on the cluster's configured namespace.
    pub async fn namespaces(&self) -> BackendResult<Vec<WorkloadRow>> {
        let mut rows = self.list(ResourceKind::Namespaces, None).await?;
        for row in rows.iter_mut() {
            if row.get("NAME").and_then(Value::as_str) == Some(self.namespace.as_str()) {
                row.insert("SELECT".to_string(), Value::Bool(true));
            }
        }
        Ok(rows)
    }

    pub async fn create_namespace(&self, name: &str) -> BackendResult<String> {
        let name = required("namespace name", name)?;
        if self
            .read("namespace lookup", || self.backend.namespace_exists(name))
            .await?
        {
            return Err(BackendError::AlreadyExists(format!(
                "namespace {name} already exists"
            )));
        }
        self.write(|| self.backend.create_namespace(name)).await?;
        Ok(format!("namespace {name} created"))
    }

    pub async fn delete_namespace(&self, name: &str) -> BackendResult<String> {
        let name = required("namespace name", name)?;
        if !self
            .read("namespace lookup", || self.backend.namespace_exists(name))
            .await?
        {
            return Err(BackendError::NotFound(format!(
                "namespace {name} does not exist"
            )));
        }
        self.write(|| self.backend.delete(ResourceKind::Namespaces, name, name))
            .await?;
        Ok(format!("namespace {name} deleted"))
    }

    pub async fn detail(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> BackendResult<Value> {
        if !kind.has_detail() {
            return Err(BackendError::InvalidInput(format!(
                "{kind} has no detail view"
            )));
        }
        let name = required("name", name)?;
        let namespace = self.resolve_namespace(namespace);
        self.read("detail", || self.backend.detail(kind, name, &namespace))
            .await
    }

    pub async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> BackendResult<String> {
        if kind == ResourceKind::Namespaces {
            return self.delete_namespace(name).await;
        }
        let name = required("name", name)?;
        let namespace = self.resolve_namespace(namespace);
        self.write(|| self.backend.delete(kind, name, &namespace))
            .await?;
        Ok(format!(
            "{} {namespace}/{name} deleted",
            kind.title().to_ascii_lowercase()
        ))
    }

    pub async fn logs(
        &self,
        pod: &str,
        namespace: Option<&str>,
        lines: Option<i64>,
    ) -> BackendResult<String> {
        let pod = required("pod name", pod)?;
        if lines.is_some_and(|value| value <= 0) {
            return Err(BackendError::InvalidInput(
                "lines must be a positive number".to_string(),
            ));
        }
        let namespace = self.resolve_namespace(namespace);
        self.read("logs", || self.backend.logs(pod, &namespace, lines))
            .await
    }

    pub async fn update_image(
        &self,
        deployment: &str,
        image: &str,
        namespace: Option<&str>,
    ) -> BackendResult<String> {
        let deployment = required("deployment name", deployment)?;
        let image = required("image", image)?;
        let namespace = self.resolve_namespace(namespace);
        self.write(|| self.backend.update_image(deployment, image, &namespace))
            .await?;
        Ok(format!("deployment {deployment} image updated to {image}"))
    }

    pub async fn scale(
        &self,
        deployment: &str,
        replicas: i64,
        namespace: Option<&str>,
    ) -> BackendResult<String> {
        let deployment = required("deployment name", deployment)?;
        let replicas = i32::try_from(replicas)
            .ok()
            .filter(|value| *value >= 0)
            .ok_or_else(|| {
                BackendError::InvalidInput("Replicas must be non-negative".to_string())
            })?;
        let namespace = self.resolve_namespace(namespace);
        self.write(|| self.backend.scale(deployment, replicas, &namespace))
            .await?;
        Ok(format!("deployment {deployment} scaled to {replicas}"))
    }

    pub async fn restart(&self, deployment: &str, namespace: Option<&str>) -> BackendResult<String> {
        let deployment = required("deployment name", deployment)?;
        let namespace = self.resolve_namespace(namespace);
        self.write(|| self.backend.restart(deployment, &namespace))
            .await?;
        Ok(format!("deployment {deployment} restarted"))
    }

    /// Deployments whose images start with the repository part of `image`.
    pub async fn search_by_image(
        &self,
        image: &str,
        namespace: Option<&str>,
    ) -> BackendResult<Vec<ImageMatch>> {
        let image = required("Image name", image)?;
        let namespace = self.resolve_namespace(namespace);
        let repository = image_repository(image);

        let images = self
            .read("deployment images", || {
                self.backend.deployment_images(&namespace)
            })
            .await?;
        let readiness = match self
            .read("deployments", || {
                self.backend.list(ResourceKind::Deployments, &namespace)
            })
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                debug!("readiness unavailable for image search: {error}");
                Vec::new()
            }
        };

        Ok(images
            .iter()
            .filter_map(|row| {
                let name = row.get("NAME").and_then(Value::as_str)?;
                let images = row.get("IMAGES").and_then(Value::as_str).unwrap_or("");
                if !images.starts_with(repository) {
                    return None;
                }
                let ready = readiness
                    .iter()
                    .find(|candidate| {
                        candidate.get("NAME").and_then(Value::as_str) == Some(name)
                    })
                    .and_then(|candidate| candidate.get("READY"))
                    .map(value_text)
                    .unwrap_or_default();
                Some(ImageMatch {
                    name: name.to_string(),
                    ready,
                    image: images.to_string(),
                    namespace: namespace.clone(),
                })
            })
            .collect())
    }

    pub async fn apply(&self, manifest: &str, namespace: Option<&str>) -> BackendResult<String> {
        if manifest.trim().is_empty() {
            return Err(BackendError::InvalidInput(
                "YAML content is required".to_string(),
            ));
        }
        let namespace = self.resolve_namespace(namespace);
        let applied = self
            .write(|| self.backend.apply(manifest, &namespace))
            .await?;
        Ok(applied.join("\n"))
    }

    fn resolve_namespace(&self, namespace: Option<&str>) -> String {
        namespace
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.namespace)
            .to_string()
    }

    async fn read<T, F, Fut>(&self, what: &str, call: F) -> BackendResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.bounded(call()).await {
                Err(error) if error.is_transient() && attempt < self.policy.read_retries => {
                    attempt += 1;
                    warn!(attempt, "retrying {what} after transient failure: {error}");
                    sleep(RETRY_BACKOFF * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn write<T, F, Fut>(&self, call: F) -> BackendResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        self.bounded(call()).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        match timeout(self.policy.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.policy.timeout.as_secs())),
        }
    }
}

fn required<'a>(what: &str, value: &'a str) -> BackendResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BackendError::InvalidInput(format!("{what} is required")));
    }
    Ok(value)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Applied-object summary line in kubectl's `kind/name verb` form.
pub fn applied_line(kind: &str, name: &str, verb: &str) -> String {
    format!("{}/{name} {verb}", kind.to_ascii_lowercase())
}

#[cfg(test)]
pub mod fake {
    //! In-memory backend used by registry and route tests.

    use super::ClusterBackend;
    use crate::error::{BackendError, BackendResult};
    use crate::model::{ConnectionState, ResourceKind, WorkloadRow, row};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    pub struct FakeBackend {
        pub namespaces: Mutex<Vec<String>>,
        /// namespace -> deployment name -> (image, replicas)
        pub deployments: Mutex<BTreeMap<String, BTreeMap<String, (String, i32)>>>,
        pub applied: Mutex<Vec<String>>,
        pub deleted: Mutex<Vec<String>>,
        pub flaky_reads: AtomicU32,
        pub flaky_writes: AtomicU32,
        /// Milliseconds every list call stalls before answering.
        pub list_delay_ms: AtomicU64,
        pub closed: Mutex<bool>,
    }

    impl FakeBackend {
        pub fn seeded() -> Self {
            let backend = Self::default();
            *backend.namespaces.lock().unwrap() =
                vec!["default".to_string(), "kube-system".to_string()];
            let mut apps = BTreeMap::new();
            apps.insert("web".to_string(), ("nginx:1.25".to_string(), 2));
            apps.insert("worker".to_string(), ("busybox:1.36".to_string(), 1));
            backend
                .deployments
                .lock()
                .unwrap()
                .insert("default".to_string(), apps);
            backend
        }

        fn take_flake(&self) -> BackendResult<()> {
            take_from(&self.flaky_reads)
        }
    }

    fn take_from(failures: &AtomicU32) -> BackendResult<()> {
        let remaining = failures.load(Ordering::SeqCst);
        if remaining > 0 {
            failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Unavailable("flaky".to_string()));
        }
        Ok(())
    }

    #[async_trait]
    impl ClusterBackend for FakeBackend {
        async fn list(
            &self,
            kind: ResourceKind,
            namespace: &str,
        ) -> BackendResult<Vec<WorkloadRow>> {
            let delay = self.list_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.take_flake()?;
            let rows = match kind {
                ResourceKind::Namespaces => self
                    .namespaces
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|name| {
                        row([
                            ("NAME", json!(name)),
                            ("STATUS", json!("Active")),
                            ("AGE", json!("1d")),
                        ])
                    })
                    .collect(),
                ResourceKind::Deployments => self
                    .deployments
                    .lock()
                    .unwrap()
                    .get(namespace)
                    .map(|apps| {
                        apps.iter()
                            .map(|(name, (_, replicas))| {
                                row([
                                    ("NAME", json!(name)),
                                    ("READY", json!(format!("{replicas}/{replicas}"))),
                                    ("UP_TO_DATE", json!(replicas)),
                                    ("AVAILABLE", json!(replicas)),
                                    ("AGE", json!("2h")),
                                ])
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            Ok(rows)
        }

        async fn namespace_exists(&self, name: &str) -> BackendResult<bool> {
            Ok(self.namespaces.lock().unwrap().iter().any(|ns| ns == name))
        }

        async fn create_namespace(&self, name: &str) -> BackendResult<()> {
            self.namespaces.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn delete(
            &self,
            kind: ResourceKind,
            name: &str,
            namespace: &str,
        ) -> BackendResult<()> {
            if kind == ResourceKind::Namespaces {
                self.namespaces.lock().unwrap().retain(|ns| ns != name);
            }
            self.deleted
                .lock()
                .unwrap()
                .push(format!("{}/{namespace}/{name}", kind.kubectl_name()));
            Ok(())
        }

        async fn detail(
            &self,
            kind: ResourceKind,
            name: &str,
            namespace: &str,
        ) -> BackendResult<Value> {
            let deployments = self.deployments.lock().unwrap();
            match deployments.get(namespace).and_then(|apps| apps.get(name)) {
                Some((image, replicas)) if kind == ResourceKind::Deployments => Ok(json!({
                    "kind": "Deployment",
                    "metadata": {"name": name, "namespace": namespace},
                    "spec": {"replicas": replicas, "template": {"spec": {"containers": [{"name": name, "image": image}]}}}
                })),
                _ => Err(BackendError::NotFound(format!(
                    "{kind} {name} not found in namespace {namespace}"
                ))),
            }
        }

        async fn logs(
            &self,
            pod: &str,
            _namespace: &str,
            lines: Option<i64>,
        ) -> BackendResult<String> {
            let all = (1..=5).map(|n| format!("{pod} line {n}")).collect::<Vec<_>>();
            let take = lines.map(|n| n as usize).unwrap_or(all.len()).min(all.len());
            Ok(all[all.len() - take..].join("\n"))
        }

        async fn update_image(
            &self,
            deployment: &str,
            image: &str,
            namespace: &str,
        ) -> BackendResult<()> {
            let mut deployments = self.deployments.lock().unwrap();
            let entry = deployments
                .get_mut(namespace)
                .and_then(|apps| apps.get_mut(deployment))
                .ok_or_else(|| BackendError::NotFound(format!("deployment {deployment}")))?;
            entry.0 = image.to_string();
            Ok(())
        }

        async fn scale(
            &self,
            deployment: &str,
            replicas: i32,
            namespace: &str,
        ) -> BackendResult<()> {
            take_from(&self.flaky_writes)?;
            let mut deployments = self.deployments.lock().unwrap();
            let entry = deployments
                .get_mut(namespace)
                .and_then(|apps| apps.get_mut(deployment))
                .ok_or_else(|| BackendError::NotFound(format!("deployment {deployment}")))?;
            entry.1 = replicas;
            Ok(())
        }

        async fn restart(&self, _deployment: &str, _namespace: &str) -> BackendResult<()> {
            Ok(())
        }

        async fn deployment_images(&self, namespace: &str) -> BackendResult<Vec<WorkloadRow>> {
            self.take_flake()?;
            Ok(self
                .deployments
                .lock()
                .unwrap()
                .get(namespace)
                .map(|apps| {
                    apps.iter()
                        .map(|(name, (image, _))| {
                            row([("NAME", json!(name)), ("IMAGES", json!(image))])
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn apply(&self, manifest: &str, namespace: &str) -> BackendResult<Vec<String>> {
            self.applied
                .lock()
                .unwrap()
                .push(format!("{namespace}:{manifest}"));
            Ok(vec!["applied".to_string()])
        }

        async fn ping(&self) -> BackendResult<()> {
            self.take_flake()
        }

        fn state(&self) -> ConnectionState {
            if *self.closed.lock().unwrap() {
                ConnectionState::Closed
            } else {
                ConnectionState::Ready
            }
        }

        async fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }
}
