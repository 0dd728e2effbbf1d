//! Cluster backend that drives `kubectl` on a remote host over SSH.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::backend::ClusterBackend;
use crate::error::{BackendError, BackendResult};
use crate::manifest::split_documents;
use crate::model::{ConnectionState, ResourceKind, SshConfig, WorkloadRow};
use crate::ssh::{RemoteShell, SshSession};
use crate::table::parse_table;

const IMAGE_COLUMNS: &str =
    "custom-columns=NAME:.metadata.name,IMAGES:.spec.template.spec.containers[*].image";
const FIRST_CONTAINER: &str = "jsonpath={.spec.template.spec.containers[0].name}";
const SHELL_NOT_EXECUTABLE: i32 = 126;
const SHELL_NOT_FOUND: i32 = 127;

pub struct SshKubectl<S = SshSession> {
    shell: S,
}

impl SshKubectl<SshSession> {
    /// Opens the SSH session up front so bad credentials surface when the
    /// cluster is registered.
    pub async fn connect(
        label: &str,
        config: &SshConfig,
        control_dir: &Path,
        timeout: Duration,
    ) -> BackendResult<Self> {
        let session = SshSession::new(label, config.clone(), control_dir, timeout);
        session.connect().await?;
        Ok(Self::with_shell(session))
    }
}

impl<S: RemoteShell> SshKubectl<S> {
    pub fn with_shell(shell: S) -> Self {
        Self { shell }
    }

    async fn kubectl(&self, args: &[&str], stdin: Option<&str>) -> BackendResult<String> {
        let command = kubectl_command(args);
        debug!(%command, "running kubectl");
        let output = self.shell.exec(&command, stdin).await?;
        if output.success() {
            return Ok(output.stdout);
        }
        Err(command_error(command, output.status, output.stderr))
    }
}

#[async_trait]
impl<S: RemoteShell> ClusterBackend for SshKubectl<S> {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> BackendResult<Vec<WorkloadRow>> {
        let output = match kind {
            ResourceKind::Namespaces => self.kubectl(&["get", "namespaces"], None).await?,
            _ => {
                self.kubectl(&["get", kind.kubectl_name(), "-n", namespace], None)
                    .await?
            }
        };
        Ok(parse_table(&output))
    }

    async fn namespace_exists(&self, name: &str) -> BackendResult<bool> {
        match self
            .kubectl(&["get", "namespace", name, "-o", "name"], None)
            .await
        {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn create_namespace(&self, name: &str) -> BackendResult<()> {
        self.kubectl(&["create", "namespace", name], None).await?;
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> BackendResult<()> {
        match kind {
            ResourceKind::Namespaces => self.kubectl(&["delete", "namespace", name], None).await?,
            _ => {
                self.kubectl(
                    &["delete", kind.kubectl_name(), name, "-n", namespace],
                    None,
                )
                .await?
            }
        };
        Ok(())
    }

    async fn detail(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> BackendResult<Value> {
        let output = self
            .kubectl(
                &["get", kind.kubectl_name(), name, "-n", namespace, "-o", "json"],
                None,
            )
            .await?;
        serde_json::from_str(&output).map_err(|error| BackendError::Command {
            command: format!("kubectl get {} {name}", kind.kubectl_name()),
            stderr: format!("unreadable JSON output: {error}"),
        })
    }

    async fn logs(&self, pod: &str, namespace: &str, lines: Option<i64>) -> BackendResult<String> {
        let tail = lines.map(|value| format!("--tail={value}"));
        let mut args = vec!["logs", pod, "-n", namespace];
        if let Some(tail) = tail.as_deref() {
            args.push(tail);
        }
        self.kubectl(&args, None).await
    }

    async fn update_image(
        &self,
        deployment: &str,
        image: &str,
        namespace: &str,
    ) -> BackendResult<()> {
        let container = self
            .kubectl(
                &["get", "deployment", deployment, "-n", namespace, "-o", FIRST_CONTAINER],
                None,
            )
            .await?;
        let container = container.trim();
        if container.is_empty() {
            return Err(BackendError::InvalidInput(format!(
                "deployment {deployment} has no containers"
            )));
        }

        let target = format!("deployment/{deployment}");
        let assignment = format!("{container}={image}");
        self.kubectl(
            &["set", "image", &target, &assignment, "-n", namespace],
            None,
        )
        .await?;
        Ok(())
    }

    async fn scale(&self, deployment: &str, replicas: i32, namespace: &str) -> BackendResult<()> {
        let target = format!("deployment/{deployment}");
        let replicas = format!("--replicas={replicas}");
        self.kubectl(&["scale", &target, &replicas, "-n", namespace], None)
            .await?;
        Ok(())
    }

    async fn restart(&self, deployment: &str, namespace: &str) -> BackendResult<()> {
        let target = format!("deployment/{deployment}");
        self.kubectl(&["rollout", "restart", &target, "-n", namespace], None)
            .await?;
        Ok(())
    }

    async fn deployment_images(&self, namespace: &str) -> BackendResult<Vec<WorkloadRow>> {
        let output = self
            .kubectl(
                &["get", "deployments", "-n", namespace, "-o", IMAGE_COLUMNS],
                None,
            )
            .await?;
        Ok(parse_table(&output))
    }

    /// Documents naming their own namespace keep it; kubectl refuses a
    /// document whose namespace differs from `-n`, so each run of documents
    /// sharing a target namespace is applied on its own.
    async fn apply(&self, manifest: &str, namespace: &str) -> BackendResult<Vec<String>> {
        let mut applied = Vec::new();
        for (target, batch) in namespace_batches(split_documents(manifest)?, namespace)? {
            let output = self
                .kubectl(&["apply", "-n", &target, "-f", "-"], Some(&batch))
                .await?;
            applied.extend(
                output
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(applied)
    }

    async fn ping(&self) -> BackendResult<()> {
        self.kubectl(&["get", "--raw", "/version"], None).await?;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.shell.state()
    }

    async fn close(&self) {
        self.shell.close().await;
    }
}

/// Groups consecutive documents by target namespace, keeping manifest order,
/// and renders each group back to a multi-document YAML stream.
fn namespace_batches(
    documents: Vec<Value>,
    fallback: &str,
) -> BackendResult<Vec<(String, String)>> {
    let mut batches: Vec<(String, String)> = Vec::new();
    for document in documents {
        let target = document
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(fallback)
            .to_string();
        let rendered = serde_yaml::to_string(&document)
            .map_err(|error| BackendError::Manifest(error.to_string()))?;

        match batches.last_mut() {
            Some((current, batch)) if *current == target => {
                batch.push_str("---\n");
                batch.push_str(&rendered);
            }
            _ => batches.push((target, rendered)),
        }
    }
    Ok(batches)
}

fn kubectl_command(args: &[&str]) -> String {
    let mut command = String::from("kubectl");
    for arg in args {
        command.push(' ');
        command.push_str(&shell_quote(arg));
    }
    command
}

/// Quotes `value` for a POSIX shell unless it only holds safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value.chars().all(|ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '@' | '+')
        });
    if safe {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Only kubectl's own `Error from server (Reason)` lines are classified; a
/// shell failure such as a missing kubectl binary (exit 126/127) stays a
/// command error.
fn command_error(command: String, status: Option<i32>, stderr: String) -> BackendError {
    let message = stderr.trim().to_string();
    if matches!(status, Some(SHELL_NOT_EXECUTABLE | SHELL_NOT_FOUND)) {
        return BackendError::Command {
            command,
            stderr: message,
        };
    }
    if message.contains("(NotFound)") {
        return BackendError::NotFound(message);
    }
    if message.contains("(AlreadyExists)") {
        return BackendError::AlreadyExists(message);
    }
    BackendError::Command {
        command,
        stderr: message,
    }
}

#[cfg(test)]
mod tests {
    use super::{SshKubectl, kubectl_command, shell_quote};
    use crate::backend::ClusterBackend;
    use crate::error::{BackendError, BackendResult};
    use crate::model::{ConnectionState, ResourceKind};
    use crate::ssh::{CommandOutput, RemoteShell};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned outputs and records every command it was asked to run.
    #[derive(Default)]
    struct ScriptedShell {
        replies: Mutex<VecDeque<CommandOutput>>,
        commands: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedShell {
        fn reply(self, status: i32, stdout: &str, stderr: &str) -> Self {
            self.replies.lock().unwrap().push_back(CommandOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                status: Some(status),
            });
            self
        }
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn exec(&self, command: &str, stdin: Option<&str>) -> BackendResult<CommandOutput> {
            self.commands
                .lock()
                .unwrap()
                .push((command.to_string(), stdin.map(str::to_string)));
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or(CommandOutput {
                status: Some(0),
                ..CommandOutput::default()
            }))
        }

        fn state(&self) -> ConnectionState {
            ConnectionState::Ready
        }

        async fn close(&self) {}
    }

    fn commands(backend: &SshKubectl<ScriptedShell>) -> Vec<String> {
        backend
            .shell
            .commands
            .lock()
            .unwrap()
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    #[test]
    fn arguments_are_quoted_for_the_remote_shell() {
        assert_eq!(shell_quote("web-1"), "web-1");
        assert_eq!(shell_quote("nginx:1.25"), "nginx:1.25");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("x;rm -rf /"), "'x;rm -rf /'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(
            kubectl_command(&["get", "pods", "-n", "team a"]),
            "kubectl get pods -n 'team a'"
        );
    }

    #[tokio::test]
    async fn list_parses_kubectl_table() {
        let shell = ScriptedShell::default().reply(
            0,
            "NAME   TYPE        CLUSTER-IP   EXTERNAL-IP   PORT(S)   AGE\napi    ClusterIP   10.0.0.9     <none>        80/TCP    4d\n",
            "",
        );
        let backend = SshKubectl::with_shell(shell);
        let rows = backend
            .list(ResourceKind::Services, "default")
            .await
            .unwrap();

        assert_eq!(rows[0]["PORTS"], "80/TCP");
        assert_eq!(commands(&backend), vec!["kubectl get services -n default"]);
    }

    #[tokio::test]
    async fn missing_namespace_is_reported_as_absent() {
        let shell = ScriptedShell::default().reply(
            1,
            "",
            "Error from server (NotFound): namespaces \"ghost\" not found\n",
        );
        let backend = SshKubectl::with_shell(shell);
        assert!(!backend.namespace_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn missing_kubectl_binary_is_not_a_missing_object() {
        let shell = ScriptedShell::default()
            .reply(127, "", "bash: line 1: kubectl: command not found\n")
            .reply(127, "", "bash: line 1: kubectl: command not found\n");
        let backend = SshKubectl::with_shell(shell);

        assert!(matches!(
            backend.namespace_exists("default").await,
            Err(BackendError::Command { .. })
        ));
        assert!(matches!(
            backend.list(ResourceKind::Pods, "default").await,
            Err(BackendError::Command { .. })
        ));
    }

    #[tokio::test]
    async fn server_reasons_are_classified() {
        let shell = ScriptedShell::default()
            .reply(1, "", "Error from server (AlreadyExists): namespaces \"team\" already exists\n")
            .reply(1, "", "Error from server (NotFound): pods \"api-9\" not found\n");
        let backend = SshKubectl::with_shell(shell);

        assert!(matches!(
            backend.create_namespace("team").await,
            Err(BackendError::AlreadyExists(_))
        ));
        assert!(matches!(
            backend.logs("api-9", "default", None).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failures_keep_stderr() {
        let shell = ScriptedShell::default().reply(1, "", "error: You must be logged in\n");
        let backend = SshKubectl::with_shell(shell);
        let error = backend.restart("web", "default").await.unwrap_err();

        match error {
            BackendError::Command { command, stderr } => {
                assert_eq!(command, "kubectl rollout restart deployment/web -n default");
                assert_eq!(stderr, "error: You must be logged in");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_image_targets_first_container() {
        let shell = ScriptedShell::default().reply(0, "app", "").reply(0, "", "");
        let backend = SshKubectl::with_shell(shell);
        backend
            .update_image("web", "nginx:1.27", "prod")
            .await
            .unwrap();

        assert_eq!(
            commands(&backend),
            vec![
                "kubectl get deployment web -n prod -o 'jsonpath={.spec.template.spec.containers[0].name}'",
                "kubectl set image deployment/web app=nginx:1.27 -n prod",
            ]
        );
    }

    #[tokio::test]
    async fn update_image_without_containers_is_rejected() {
        let shell = ScriptedShell::default().reply(0, "\n", "");
        let backend = SshKubectl::with_shell(shell);
        assert!(matches!(
            backend.update_image("web", "nginx", "prod").await,
            Err(BackendError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn apply_streams_manifest_on_stdin() {
        let shell = ScriptedShell::default().reply(
            0,
            "configmap/settings created\nservice/api configured\n",
            "",
        );
        let backend = SshKubectl::with_shell(shell);
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n";
        let applied = backend.apply(manifest, "apps").await.unwrap();

        assert_eq!(applied, vec!["configmap/settings created", "service/api configured"]);
        let recorded = backend.shell.commands.lock().unwrap();
        assert_eq!(recorded[0].0, "kubectl apply -n apps -f -");
        let stdin = recorded[0].1.as_deref().unwrap();
        assert!(stdin.contains("kind: ConfigMap"));
        assert!(stdin.contains("name: settings"));
    }

    #[tokio::test]
    async fn apply_keeps_explicit_document_namespaces() {
        let shell = ScriptedShell::default()
            .reply(0, "configmap/a created\n", "")
            .reply(0, "configmap/b created\n", "")
            .reply(0, "configmap/c created\n", "");
        let backend = SshKubectl::with_shell(shell);
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n\
                        ---\n\
                        apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n  namespace: team-b\n\
                        ---\n\
                        apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\n";
        let applied = backend.apply(manifest, "default").await.unwrap();

        assert_eq!(
            applied,
            vec!["configmap/a created", "configmap/b created", "configmap/c created"]
        );
        let recorded = backend.shell.commands.lock().unwrap();
        let commands = recorded.iter().map(|(command, _)| command.as_str()).collect::<Vec<_>>();
        assert_eq!(
            commands,
            vec![
                "kubectl apply -n default -f -",
                "kubectl apply -n team-b -f -",
                "kubectl apply -n default -f -",
            ]
        );
        let second = recorded[1].1.as_deref().unwrap();
        assert!(second.contains("name: b"));
        assert!(!second.contains("name: a"));
    }

    #[tokio::test]
    async fn apply_batches_documents_sharing_a_namespace() {
        let backend = SshKubectl::with_shell(ScriptedShell::default());
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n\
                        ---\n\
                        apiVersion: v1\nkind: Service\nmetadata:\n  name: b\n  namespace: apps\n";
        backend.apply(manifest, "apps").await.unwrap();

        let recorded = backend.shell.commands.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let stdin = recorded[0].1.as_deref().unwrap();
        assert!(stdin.contains("name: a"));
        assert!(stdin.contains("---\n"));
        assert!(stdin.contains("kind: Service"));
    }

    #[tokio::test]
    async fn logs_and_scale_build_flags() {
        let backend = SshKubectl::with_shell(ScriptedShell::default());
        backend.logs("api-0", "default", Some(50)).await.unwrap();
        backend.logs("api-0", "default", None).await.unwrap();
        backend.scale("web", 3, "default").await.unwrap();

        assert_eq!(
            commands(&backend),
            vec![
                "kubectl logs api-0 -n default --tail=50",
                "kubectl logs api-0 -n default",
                "kubectl scale deployment/web --replicas=3 -n default",
            ]
        );
    }

    #[tokio::test]
    async fn deployment_images_use_custom_columns() {
        let shell = ScriptedShell::default().reply(
            0,
            "NAME   IMAGES\nweb    nginx:1.25,envoy:1.30\n",
            "",
        );
        let backend = SshKubectl::with_shell(shell);
        let rows = backend.deployment_images("default").await.unwrap();

        assert_eq!(rows[0]["IMAGES"], "nginx:1.25,envoy:1.30");
        assert!(commands(&backend)[0].contains("'custom-columns=NAME:.metadata.name,IMAGES:.spec.template.spec.containers[*].image'"));
    }
}
