//! Manifests built from dashboard forms, and splitting of user-supplied YAML.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort,
    ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{BackendError, BackendResult};

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentForm {
    pub name: String,
    pub image: String,
    #[serde(default = "one")]
    pub replicas: i32,
    #[serde(default)]
    pub container_port: Option<i32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicePortForm {
    pub port: i32,
    #[serde(default)]
    pub target_port: Option<i32>,
    #[serde(default)]
    pub node_port: Option<i32>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceForm {
    pub name: String,
    #[serde(default = "cluster_ip", rename = "type", alias = "service_type")]
    pub service_type: String,
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub ports: Vec<ServicePortForm>,
    /// Single-port shorthand: `port`, `target_port`, `node_port`, `protocol` at the top level.
    #[serde(flatten)]
    pub single: Option<ServicePortForm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigMapForm {
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressRuleForm {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default = "prefix")]
    pub path_type: String,
    pub service_name: String,
    pub service_port: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressForm {
    pub name: String,
    #[serde(default)]
    pub ingress_class: Option<String>,
    #[serde(default)]
    pub rules: Vec<IngressRuleForm>,
    #[serde(flatten)]
    pub single: Option<IngressRuleForm>,
}

fn one() -> i32 {
    1
}

fn cluster_ip() -> String {
    "ClusterIP".to_string()
}

fn root_path() -> String {
    "/".to_string()
}

fn prefix() -> String {
    "Prefix".to_string()
}

impl DeploymentForm {
    pub fn to_manifest(&self, namespace: &str) -> BackendResult<String> {
        let name = required_name(&self.name)?;
        if self.image.trim().is_empty() {
            return Err(invalid("image is required"));
        }
        if self.replicas < 0 {
            return Err(invalid("Replicas must be non-negative"));
        }

        let mut labels = self.labels.clone();
        labels.insert("app".to_string(), name.to_string());
        let selector = BTreeMap::from([("app".to_string(), name.to_string())]);

        let env = self
            .env
            .iter()
            .map(|(key, value)| EnvVar {
                name: key.clone(),
                value: Some(scalar_text(value)),
                ..EnvVar::default()
            })
            .collect::<Vec<_>>();

        let container = Container {
            name: name.to_string(),
            image: Some(self.image.trim().to_string()),
            ports: self.container_port.map(|port| {
                vec![ContainerPort {
                    container_port: port,
                    ..ContainerPort::default()
                }]
            }),
            env: (!env.is_empty()).then_some(env),
            ..Container::default()
        };

        let deployment = Deployment {
            metadata: metadata(name, namespace, Some(labels.clone())),
            spec: Some(DeploymentSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(selector),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };

        render(&deployment)
    }
}

impl ServiceForm {
    pub fn to_manifest(&self, namespace: &str) -> BackendResult<String> {
        let name = required_name(&self.name)?;

        let mut selector = self.selector.clone();
        if selector.is_empty() {
            let app = self
                .app
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(name);
            selector.insert("app".to_string(), app.to_string());
        }

        let forms = if self.ports.is_empty() {
            self.single.iter().collect::<Vec<_>>()
        } else {
            self.ports.iter().collect::<Vec<_>>()
        };
        if forms.is_empty() {
            return Err(invalid("at least one service port is required"));
        }

        let ports = forms
            .into_iter()
            .enumerate()
            .map(|(index, form)| {
                if !(1..=65_535).contains(&form.port) {
                    return Err(invalid(&format!("invalid service port {}", form.port)));
                }
                let protocol = form
                    .protocol
                    .as_deref()
                    .map(str::to_ascii_uppercase)
                    .unwrap_or_else(|| "TCP".to_string());
                Ok(ServicePort {
                    name: Some(format!("port-{index}")),
                    port: form.port,
                    target_port: Some(IntOrString::Int(form.target_port.unwrap_or(form.port))),
                    node_port: form.node_port,
                    protocol: Some(protocol),
                    ..ServicePort::default()
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let service = Service {
            metadata: metadata(name, namespace, None),
            spec: Some(ServiceSpec {
                type_: Some(self.service_type.clone()),
                selector: Some(selector),
                ports: Some(ports),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };

        render(&service)
    }
}

impl ConfigMapForm {
    pub fn to_manifest(&self, namespace: &str) -> BackendResult<String> {
        let name = required_name(&self.name)?;
        let data = self
            .data
            .iter()
            .map(|(key, value)| (key.clone(), scalar_text(value)))
            .collect::<BTreeMap<_, _>>();

        let configmap = ConfigMap {
            metadata: metadata(name, namespace, None),
            data: Some(data),
            ..ConfigMap::default()
        };

        render(&configmap)
    }
}

impl IngressForm {
    pub fn to_manifest(&self, namespace: &str) -> BackendResult<String> {
        let name = required_name(&self.name)?;
        let forms = if self.rules.is_empty() {
            self.single.iter().collect::<Vec<_>>()
        } else {
            self.rules.iter().collect::<Vec<_>>()
        };
        if forms.is_empty() {
            return Err(invalid("at least one ingress rule is required"));
        }

        let rules = forms
            .into_iter()
            .map(|form| {
                if form.service_name.trim().is_empty() {
                    return Err(invalid("service_name is required for ingress rules"));
                }
                Ok(IngressRule {
                    host: form
                        .host
                        .as_deref()
                        .map(str::trim)
                        .filter(|host| !host.is_empty())
                        .map(str::to_string),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some(form.path.clone()),
                            path_type: form.path_type.clone(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: form.service_name.trim().to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(form.service_port),
                                        ..ServiceBackendPort::default()
                                    }),
                                }),
                                ..IngressBackend::default()
                            },
                        }],
                    }),
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let ingress = Ingress {
            metadata: metadata(name, namespace, None),
            spec: Some(IngressSpec {
                ingress_class_name: self
                    .ingress_class
                    .as_deref()
                    .filter(|class| !class.trim().is_empty())
                    .map(str::to_string),
                rules: Some(rules),
                ..IngressSpec::default()
            }),
            ..Ingress::default()
        };

        render(&ingress)
    }
}

/// Parses every non-empty document of a multi-document YAML manifest.
pub fn split_documents(manifest: &str) -> BackendResult<Vec<Value>> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(manifest).enumerate() {
        let value = Value::deserialize(document).map_err(|error| {
            BackendError::Manifest(format!("document {}: {error}", index + 1))
        })?;
        match value {
            Value::Null => continue,
            Value::Object(_) => documents.push(value),
            _ => {
                return Err(BackendError::Manifest(format!(
                    "document {} is not a mapping",
                    index + 1
                )));
            }
        }
    }

    if documents.is_empty() {
        return Err(BackendError::Manifest("no objects in manifest".to_string()));
    }
    Ok(documents)
}

fn metadata(name: &str, namespace: &str, labels: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels,
        ..ObjectMeta::default()
    }
}

fn render<T: Serialize>(object: &T) -> BackendResult<String> {
    serde_yaml::to_string(object)
        .map_err(|error| BackendError::Manifest(format!("failed to render manifest: {error}")))
}

fn required_name(name: &str) -> BackendResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("name is required"));
    }
    Ok(name)
}

fn invalid(message: &str) -> BackendError {
    BackendError::InvalidInput(message.to_string())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
