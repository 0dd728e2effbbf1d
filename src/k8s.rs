use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::{self, Scope};
use kube::{Api, Client, Config, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{ClusterBackend, applied_line};
use crate::error::{BackendError, BackendResult};
use crate::manifest::split_documents;
use crate::model::{ConnectionState, KubeConfigSource, ResourceKind, WorkloadRow, row};
use crate::table::format_age;

const FIELD_MANAGER: &str = "kubedeck";
const LIST_PAGE_SIZE: u32 = 500;

/// Cluster backend talking to the API server directly with a kubeconfig.
pub struct KubeGateway {
    label: String,
    client: Client,
    state: Mutex<ConnectionState>,
}

impl KubeGateway {
    /// Builds the client and pings the API server. An unreachable server
    /// leaves the gateway `degraded` rather than failing construction.
    pub async fn connect(label: &str, source: Option<&KubeConfigSource>) -> BackendResult<Self> {
        let config = load_config(source).await?;
        let cluster_url = config.cluster_url.to_string();
        let gateway = Self::with_client(label, Client::try_from(config)?);

        match gateway.ping().await {
            Ok(()) => info!(cluster = %label, server = %cluster_url, "kubernetes client ready"),
            Err(error) => warn!(
                cluster = %label,
                server = %cluster_url,
                "kubernetes API server not reachable yet: {error}"
            ),
        }

        Ok(gateway)
    }

    fn with_client(label: &str, client: Client) -> Self {
        Self {
            label: label.to_string(),
            client,
            state: Mutex::new(ConnectionState::Connecting),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut state) = self.state.lock()
            && *state != next
            && *state != ConnectionState::Closed
        {
            debug!(cluster = %self.label, from = %*state, to = %next, "kube state change");
            *state = next;
        }
    }

    /// Converts a kube result, tracking reachability of the API server.
    fn settle<T>(&self, result: Result<T, kube::Error>) -> BackendResult<T> {
        match result {
            Ok(value) => {
                self.set_state(ConnectionState::Ready);
                Ok(value)
            }
            Err(error) => {
                let error = classify(error);
                self.set_state(if error.is_connection_failure() {
                    ConnectionState::Degraded
                } else {
                    ConnectionState::Ready
                });
                Err(error)
            }
        }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_of<K>(&self, namespace: &str) -> BackendResult<Vec<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.namespaced::<K>(namespace);
        self.list_all(&api).await
    }

    /// Every object the API returns, following continue tokens page by page.
    async fn list_all<K>(&self, api: &Api<K>) -> BackendResult<Vec<K>>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        collect_pages(|token| async move {
            let mut params = list_params();
            if let Some(token) = token.as_deref() {
                params = params.continue_token(token);
            }
            let page = self.settle(api.list(&params).await)?;
            Ok((page.items, page.metadata.continue_))
        })
        .await
    }

    async fn detail_of<K>(&self, kind: ResourceKind, name: &str, namespace: &str) -> BackendResult<Value>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.namespaced::<K>(namespace);
        let Some(object) = self.settle(api.get_opt(name).await)? else {
            return Err(not_found(kind, name, namespace));
        };
        serde_json::to_value(&object)
            .map_err(|error| BackendError::Other(anyhow::anyhow!("failed to encode {kind}: {error}")))
    }

    async fn delete_of<K>(&self, name: &str, namespace: &str) -> BackendResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.namespaced::<K>(namespace);
        self.settle(api.delete(name, &DeleteParams::default()).await)?;
        Ok(())
    }

    async fn fetch_namespaces(&self) -> BackendResult<Vec<WorkloadRow>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = self.list_all(&api).await?;
        Ok(namespaces.iter().map(namespace_row).collect())
    }

    async fn apply_document(&self, document: Value, namespace: &str) -> BackendResult<String> {
        let mut object: DynamicObject = serde_json::from_value(document)
            .map_err(|error| BackendError::Manifest(error.to_string()))?;
        let Some(types) = object.types.clone() else {
            return Err(BackendError::Manifest(
                "every document needs apiVersion and kind".to_string(),
            ));
        };
        let Some(name) = object.metadata.name.clone() else {
            return Err(BackendError::Manifest(format!(
                "{} without metadata.name",
                types.kind
            )));
        };

        let gvk = parse_gvk(&types.api_version, &types.kind);
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|error| match classify(error) {
                BackendError::NotFound(_) => BackendError::Manifest(format!(
                    "unsupported kind {} in {}",
                    types.kind, types.api_version
                )),
                other => other,
            })?;

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            let target = object
                .metadata
                .namespace
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| namespace.to_string());
            object.metadata.namespace = Some(target.clone());
            Api::namespaced_with(self.client.clone(), &target, &resource)
        } else {
            object.metadata.namespace = None;
            Api::all_with(self.client.clone(), &resource)
        };

        let existed = self.settle(api.get_opt(&name).await)?.is_some();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.settle(api.patch(&name, &params, &Patch::Apply(&object)).await)?;

        let verb = if existed { "configured" } else { "created" };
        debug!(cluster = %self.label, kind = %types.kind, %name, verb, "applied object");
        Ok(applied_line(&types.kind, &name, verb))
    }
}

#[async_trait]
impl ClusterBackend for KubeGateway {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> BackendResult<Vec<WorkloadRow>> {
        let rows = match kind {
            ResourceKind::Namespaces => self.fetch_namespaces().await?,
            ResourceKind::Deployments => self
                .list_of::<Deployment>(namespace)
                .await?
                .iter()
                .map(deployment_row)
                .collect(),
            ResourceKind::Pods => self
                .list_of::<Pod>(namespace)
                .await?
                .iter()
                .map(pod_row)
                .collect(),
            ResourceKind::Services => self
                .list_of::<Service>(namespace)
                .await?
                .iter()
                .map(service_row)
                .collect(),
            ResourceKind::ConfigMaps => self
                .list_of::<ConfigMap>(namespace)
                .await?
                .iter()
                .map(configmap_row)
                .collect(),
            ResourceKind::Ingresses => self
                .list_of::<Ingress>(namespace)
                .await?
                .iter()
                .map(ingress_row)
                .collect(),
        };
        Ok(rows)
    }

    async fn namespace_exists(&self, name: &str) -> BackendResult<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(self.settle(api.get_opt(name).await)?.is_some())
    }

    async fn create_namespace(&self, name: &str) -> BackendResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        self.settle(api.create(&PostParams::default(), &namespace).await)?;
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> BackendResult<()> {
        match kind {
            ResourceKind::Namespaces => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                self.settle(api.delete(name, &DeleteParams::default()).await)?;
                Ok(())
            }
            ResourceKind::Deployments => self.delete_of::<Deployment>(name, namespace).await,
            ResourceKind::Pods => self.delete_of::<Pod>(name, namespace).await,
            ResourceKind::Services => self.delete_of::<Service>(name, namespace).await,
            ResourceKind::ConfigMaps => self.delete_of::<ConfigMap>(name, namespace).await,
            ResourceKind::Ingresses => self.delete_of::<Ingress>(name, namespace).await,
        }
    }

    async fn detail(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> BackendResult<Value> {
        match kind {
            ResourceKind::Deployments => self.detail_of::<Deployment>(kind, name, namespace).await,
            ResourceKind::Services => self.detail_of::<Service>(kind, name, namespace).await,
            ResourceKind::ConfigMaps => self.detail_of::<ConfigMap>(kind, name, namespace).await,
            ResourceKind::Ingresses => self.detail_of::<Ingress>(kind, name, namespace).await,
            ResourceKind::Pods => self.detail_of::<Pod>(kind, name, namespace).await,
            ResourceKind::Namespaces => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                let Some(object) = self.settle(api.get_opt(name).await)? else {
                    return Err(not_found(kind, name, namespace));
                };
                serde_json::to_value(&object).map_err(|error| {
                    BackendError::Other(anyhow::anyhow!("failed to encode namespace: {error}"))
                })
            }
        }
    }

    async fn logs(&self, pod: &str, namespace: &str, lines: Option<i64>) -> BackendResult<String> {
        let pods: Api<Pod> = self.namespaced(namespace);
        let params = LogParams {
            tail_lines: lines,
            ..LogParams::default()
        };
        self.settle(pods.logs(pod, &params).await)
    }

    async fn update_image(
        &self,
        deployment: &str,
        image: &str,
        namespace: &str,
    ) -> BackendResult<()> {
        let api: Api<Deployment> = self.namespaced(namespace);
        let Some(current) = self.settle(api.get_opt(deployment).await)? else {
            return Err(not_found(ResourceKind::Deployments, deployment, namespace));
        };
        let Some(container) = current
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|spec| spec.containers.first())
        else {
            return Err(BackendError::InvalidInput(format!(
                "deployment {deployment} has no containers"
            )));
        };

        let patch = json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{ "name": container.name, "image": image }]
                    }
                }
            }
        });
        self.settle(
            api.patch(deployment, &PatchParams::default(), &Patch::Strategic(&patch))
                .await,
        )?;
        Ok(())
    }

    async fn scale(&self, deployment: &str, replicas: i32, namespace: &str) -> BackendResult<()> {
        let patch = json!({ "spec": { "replicas": replicas } });
        let api: Api<Deployment> = self.namespaced(namespace);
        self.settle(
            api.patch(deployment, &PatchParams::default(), &Patch::Merge(&patch))
                .await,
        )?;
        Ok(())
    }

    async fn restart(&self, deployment: &str, namespace: &str) -> BackendResult<()> {
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "kubectl.kubernetes.io/restartedAt": Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });
        let api: Api<Deployment> = self.namespaced(namespace);
        self.settle(
            api.patch(deployment, &PatchParams::default(), &Patch::Merge(&patch))
                .await,
        )?;
        Ok(())
    }

    async fn deployment_images(&self, namespace: &str) -> BackendResult<Vec<WorkloadRow>> {
        Ok(self
            .list_of::<Deployment>(namespace)
            .await?
            .iter()
            .map(|deployment| {
                row([
                    ("NAME", json!(deployment.name_any())),
                    ("IMAGES", json!(deployment_images(deployment))),
                ])
            })
            .collect())
    }

    async fn apply(&self, manifest: &str, namespace: &str) -> BackendResult<Vec<String>> {
        let mut applied = Vec::new();
        for document in split_documents(manifest)? {
            applied.push(self.apply_document(document, namespace).await?);
        }
        Ok(applied)
    }

    async fn ping(&self) -> BackendResult<()> {
        self.settle(self.client.apiserver_version().await)?;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Degraded)
    }

    async fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = ConnectionState::Closed;
        }
        debug!(cluster = %self.label, "kubernetes client released");
    }
}

async fn load_config(source: Option<&KubeConfigSource>) -> BackendResult<Config> {
    let kubeconfig = match source {
        None => Kubeconfig::read().ok(),
        Some(KubeConfigSource::Text(text)) => Some(kubeconfig_from_text(text)?),
        Some(KubeConfigSource::Document(document)) => Some(
            serde_json::from_value::<Kubeconfig>(document.clone()).map_err(|error| {
                BackendError::InvalidInput(format!("invalid kube_config mapping: {error}"))
            })?,
        ),
    };

    match kubeconfig {
        Some(kubeconfig) => Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|error| BackendError::InvalidInput(format!("invalid kubeconfig: {error}"))),
        None => Config::infer().await.map_err(|error| {
            BackendError::Unavailable(format!(
                "no kubeconfig found and in-cluster configuration unavailable: {error}"
            ))
        }),
    }
}

/// A single-line string naming an existing file is read from disk; anything
/// else must be kubeconfig YAML.
fn kubeconfig_from_text(text: &str) -> BackendResult<Kubeconfig> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BackendError::InvalidInput("kube_config is empty".to_string()));
    }

    if !trimmed.contains('\n') && Path::new(trimmed).is_file() {
        return Kubeconfig::read_from(trimmed).map_err(|error| {
            BackendError::InvalidInput(format!("failed to read kubeconfig {trimmed}: {error}"))
        });
    }

    Kubeconfig::from_yaml(text).map_err(|error| {
        BackendError::InvalidInput(format!(
            "kube_config is neither an existing file nor kubeconfig YAML: {error}"
        ))
    })
}

fn classify(error: kube::Error) -> BackendError {
    match &error {
        kube::Error::Api(status) if status.code == 404 => {
            BackendError::NotFound(status.message.clone())
        }
        kube::Error::Api(status) if status.code == 409 => {
            BackendError::AlreadyExists(status.message.clone())
        }
        _ => BackendError::Kube(error),
    }
}

fn not_found(kind: ResourceKind, name: &str, namespace: &str) -> BackendError {
    BackendError::NotFound(format!("{kind} {name} not found in namespace {namespace}"))
}

fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

fn list_params() -> ListParams {
    ListParams::default().limit(LIST_PAGE_SIZE)
}

async fn collect_pages<T, F, Fut>(mut fetch: F) -> BackendResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = BackendResult<(Vec<T>, Option<String>)>>,
{
    let mut items = Vec::new();
    let mut token = None;
    loop {
        let (page, next) = fetch(token.take()).await?;
        items.extend(page);
        match next.filter(|next| !next.is_empty()) {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}

fn namespace_row(namespace: &Namespace) -> WorkloadRow {
    let phase = namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Active".to_string());

    row([
        ("NAME", json!(namespace.name_any())),
        ("STATUS", json!(phase)),
        ("AGE", json!(human_age(namespace.metadata.creation_timestamp.as_ref()))),
    ])
}

fn deployment_row(deployment: &Deployment) -> WorkloadRow {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|status| status.ready_replicas).unwrap_or(0);
    let updated = status.and_then(|status| status.updated_replicas).unwrap_or(0);
    let available = status
        .and_then(|status| status.available_replicas)
        .unwrap_or(0);

    row([
        ("NAME", json!(deployment.name_any())),
        ("READY", json!(format!("{ready}/{desired}"))),
        ("UP_TO_DATE", json!(updated.to_string())),
        ("AVAILABLE", json!(available.to_string())),
        ("AGE", json!(human_age(deployment.metadata.creation_timestamp.as_ref()))),
    ])
}

fn pod_row(pod: &Pod) -> WorkloadRow {
    let (ready, total, restarts) = pod_readiness(pod);

    row([
        ("NAME", json!(pod.name_any())),
        ("READY", json!(format!("{ready}/{total}"))),
        ("STATUS", json!(pod_status(pod))),
        ("RESTARTS", json!(restarts.to_string())),
        ("AGE", json!(human_age(pod.metadata.creation_timestamp.as_ref()))),
    ])
}

fn service_row(service: &Service) -> WorkloadRow {
    let spec = service.spec.as_ref();
    let service_type = spec
        .and_then(|spec| spec.type_.clone())
        .unwrap_or_else(|| "ClusterIP".to_string());
    let cluster_ip = spec
        .and_then(|spec| spec.cluster_ip.clone())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "<none>".to_string());

    row([
        ("NAME", json!(service.name_any())),
        ("TYPE", json!(service_type)),
        ("CLUSTER_IP", json!(cluster_ip)),
        ("EXTERNAL_IP", json!(service_external_ip(service))),
        ("PORTS", json!(service_ports_summary(service))),
        ("AGE", json!(human_age(service.metadata.creation_timestamp.as_ref()))),
    ])
}

fn configmap_row(configmap: &ConfigMap) -> WorkloadRow {
    let data = configmap.data.as_ref().map(|entries| entries.len()).unwrap_or(0)
        + configmap
            .binary_data
            .as_ref()
            .map(|entries| entries.len())
            .unwrap_or(0);

    row([
        ("NAME", json!(configmap.name_any())),
        ("DATA", json!(data.to_string())),
        ("AGE", json!(human_age(configmap.metadata.creation_timestamp.as_ref()))),
    ])
}

fn ingress_row(ingress: &Ingress) -> WorkloadRow {
    let spec = ingress.spec.as_ref();
    let class = spec
        .and_then(|spec| spec.ingress_class_name.clone())
        .unwrap_or_else(|| "<none>".to_string());
    let hosts = spec
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| rule.host.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let hosts = if hosts.is_empty() {
        "*".to_string()
    } else {
        hosts.join(",")
    };
    let address = ingress
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    let has_tls = spec
        .and_then(|spec| spec.tls.as_ref())
        .is_some_and(|items| !items.is_empty());

    row([
        ("NAME", json!(ingress.name_any())),
        ("CLASS", json!(class)),
        ("HOSTS", json!(hosts)),
        ("ADDRESS", json!(address)),
        ("PORTS", json!(if has_tls { "80, 443" } else { "80" })),
        ("AGE", json!(human_age(ingress.metadata.creation_timestamp.as_ref()))),
    ])
}

fn deployment_images(deployment: &Deployment) -> String {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|spec| {
            spec.containers
                .iter()
                .filter_map(|container| container.image.clone())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// Load-balancer ingress first, then explicit external IPs.
fn service_external_ip(service: &Service) -> String {
    let balancer = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()));
    if let Some(address) = balancer {
        return address;
    }

    let external = service
        .spec
        .as_ref()
        .and_then(|spec| spec.external_ips.as_ref())
        .filter(|ips| !ips.is_empty())
        .map(|ips| ips.join(","));
    external.unwrap_or_else(|| "<none>".to_string())
}

fn service_ports_summary(service: &Service) -> String {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.clone())
        .unwrap_or_default();
    if ports.is_empty() {
        return "<none>".to_string();
    }

    ports
        .into_iter()
        .map(|port| {
            let protocol = port.protocol.unwrap_or_else(|| "TCP".to_string());
            match port.node_port {
                Some(node_port) => format!("{}:{node_port}/{protocol}", port.port),
                None => format!("{}/{protocol}", port.port),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Ready and total containers plus restarts. The total comes from the pod spec so
/// a pod without container statuses yet still counts its containers.
fn pod_readiness(pod: &Pod) -> (usize, usize, i32) {
    let container_statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or(&[]);
    let total = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.len())
        .unwrap_or(0)
        .max(container_statuses.len());
    let ready = container_statuses
        .iter()
        .filter(|container| container.ready)
        .count();
    let restarts = container_statuses
        .iter()
        .map(|container| container.restart_count)
        .sum();

    (ready, total, restarts)
}

/// Phase, overridden by a terminating pod or a waiting/terminated container reason.
fn pod_status(pod: &Pod) -> String {
    if pod.metadata.deletion_timestamp.is_some() {
        return "Terminating".to_string();
    }

    let status = pod.status.as_ref();
    let reason = status
        .and_then(|status| status.container_statuses.as_ref())
        .and_then(|containers| {
            containers.iter().find_map(|container| {
                let state = container.state.as_ref()?;
                state
                    .waiting
                    .as_ref()
                    .and_then(|waiting| waiting.reason.clone())
                    .or_else(|| {
                        state
                            .terminated
                            .as_ref()
                            .and_then(|terminated| terminated.reason.clone())
                    })
            })
        });

    reason
        .or_else(|| status.and_then(|status| status.reason.clone()))
        .or_else(|| status.and_then(|status| status.phase.clone()))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    let elapsed = k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second();
    format_age(elapsed)
}
