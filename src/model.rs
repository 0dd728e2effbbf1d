use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// One table row as rendered by the dashboard, keyed by upper-case column name.
pub type WorkloadRow = Map<String, Value>;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const REDACTED: &str = "******";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Namespaces,
    Deployments,
    Pods,
    Services,
    ConfigMaps,
    Ingresses,
}

impl ResourceKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Namespaces => "Namespace",
            Self::Deployments => "Deployment",
            Self::Pods => "Pod",
            Self::Services => "Service",
            Self::ConfigMaps => "ConfigMap",
            Self::Ingresses => "Ingress",
        }
    }

    /// Resource name as understood by `kubectl get`.
    pub fn kubectl_name(self) -> &'static str {
        match self {
            Self::Namespaces => "namespaces",
            Self::Deployments => "deployments",
            Self::Pods => "pods",
            Self::Services => "services",
            Self::ConfigMaps => "configmaps",
            Self::Ingresses => "ingresses",
        }
    }

    /// Kinds that have a detail view in the dashboard.
    pub fn has_detail(self) -> bool {
        matches!(
            self,
            Self::Deployments | Self::Services | Self::ConfigMaps | Self::Ingresses
        )
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum Controller {
    #[default]
    #[serde(rename = "SSH", alias = "ssh")]
    Ssh,
    #[serde(rename = "KUBE", alias = "kube")]
    Kube,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    pub hostname: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

/// Where the kubeconfig for a `KUBE` cluster comes from.
///
/// A string is either a path on the server or kubeconfig YAML pasted inline;
/// which one is decided when the client is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KubeConfigSource {
    Text(String),
    Document(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub k8s_controller: Controller,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_config: Option<SshConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<KubeConfigSource>,
    /// Fields the dashboard stores alongside the cluster that the service does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ClusterRecord {
    pub fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Cluster name is required".to_string());
        }
        if name.contains('/') {
            return Err("Cluster name must not contain '/'".to_string());
        }

        if self.k8s_controller == Controller::Ssh {
            let Some(ssh) = self.ssh_config.as_ref() else {
                return Err("ssh_config is required for SSH clusters".to_string());
            };
            if ssh.hostname.trim().is_empty() || ssh.username.trim().is_empty() {
                return Err("ssh_config requires hostname and username".to_string());
            }
        }

        Ok(())
    }

    pub fn redacted(&self) -> Self {
        let mut record = self.clone();
        if let Some(ssh) = record.ssh_config.as_mut()
            && ssh.password.as_deref().is_some_and(|value| !value.is_empty())
        {
            ssh.password = Some(REDACTED.to_string());
        }
        record
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Ready,
    Degraded,
    Closed,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }

    /// A session in this state has to reconnect before running anything.
    pub fn needs_reconnect(self) -> bool {
        matches!(self, Self::Degraded | Self::Closed)
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub fn row<const N: usize>(columns: [(&str, Value); N]) -> WorkloadRow {
    columns
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
