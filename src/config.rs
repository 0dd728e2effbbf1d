use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::crypto::{CryptoManager, is_encrypted};
use crate::model::ClusterRecord;

pub type ClusterMap = BTreeMap<String, ClusterRecord>;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ClustersFile {
    #[serde(default)]
    clusters: ClusterMap,
}

/// YAML-backed store of registered clusters. SSH passwords are sealed on disk
/// and plaintext in memory.
#[derive(Clone)]
pub struct ClusterStore {
    path: PathBuf,
    crypto: Arc<CryptoManager>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EncryptReport {
    pub encrypted: Vec<String>,
    pub skipped: Vec<String>,
    pub backup: Option<PathBuf>,
}

impl ClusterStore {
    pub fn new(path: impl Into<PathBuf>, crypto: Arc<CryptoManager>) -> Self {
        Self {
            path: path.into(),
            crypto,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every cluster with secrets opened. A missing store is empty; an
    /// unreadable one is logged and treated as empty so the service still starts.
    pub fn load(&self) -> ClusterMap {
        if !self.path.exists() {
            return ClusterMap::new();
        }

        match self.read_file() {
            Ok(file) => file
                .clusters
                .into_iter()
                .map(|(id, mut record)| {
                    if let Some(ssh) = record.ssh_config.as_ref() {
                        record.ssh_config = Some(self.crypto.decrypt_ssh_config(ssh));
                    }
                    (id, record)
                })
                .collect(),
            Err(error) => {
                error!(path = %self.path.display(), "failed to load cluster store: {error:#}");
                ClusterMap::new()
            }
        }
    }

    pub fn save(&self, clusters: &ClusterMap) -> Result<()> {
        let mut sealed = ClusterMap::new();
        for (id, record) in clusters {
            let mut record = record.clone();
            if let Some(ssh) = record.ssh_config.as_ref() {
                record.ssh_config = Some(self.crypto.encrypt_ssh_config(ssh)?);
            }
            sealed.insert(id.clone(), record);
        }

        self.write_file(&ClustersFile { clusters: sealed })
    }

    /// Seals plaintext passwords already present in the store file, keeping a
    /// `.bak` copy of the original.
    pub fn encrypt_existing(&self) -> Result<EncryptReport> {
        if !self.path.exists() {
            anyhow::bail!("cluster store {} does not exist", self.path.display());
        }

        let backup = backup_path(&self.path);
        fs::copy(&self.path, &backup)
            .with_context(|| format!("failed to back up {}", self.path.display()))?;

        let mut file = self.read_file()?;
        let mut report = EncryptReport {
            encrypted: Vec::new(),
            skipped: Vec::new(),
            backup: Some(backup),
        };

        for (id, record) in file.clusters.iter_mut() {
            let Some(ssh) = record.ssh_config.as_ref() else {
                continue;
            };
            let Some(password) = ssh.password.as_deref() else {
                continue;
            };
            if password.is_empty() || is_encrypted(password) {
                report.skipped.push(id.clone());
                continue;
            }

            let sealed = self.crypto.encrypt_ssh_config(ssh)?;
            record.ssh_config = Some(sealed);
            report.encrypted.push(id.clone());
        }

        if !report.encrypted.is_empty() {
            self.write_file(&file)?;
            info!(
                count = report.encrypted.len(),
                "encrypted plaintext passwords in cluster store"
            );
        }

        Ok(report)
    }

    /// Human-readable listing of stored SSH credentials with secrets opened.
    pub fn decrypted_report(&self) -> Result<String> {
        if !self.path.exists() {
            anyhow::bail!("cluster store {} does not exist", self.path.display());
        }

        let file = self.read_file()?;
        let mut out = String::new();
        for (id, record) in &file.clusters {
            let _ = writeln!(out, "cluster: {id}");
            let _ = writeln!(out, "  controller: {:?}", record.k8s_controller);
            if let Some(ssh) = record.ssh_config.as_ref() {
                let ssh = self.crypto.decrypt_ssh_config(ssh);
                let _ = writeln!(out, "  host: {}", ssh.hostname);
                let _ = writeln!(out, "  user: {}", ssh.username);
                let _ = writeln!(
                    out,
                    "  password: {}",
                    ssh.password.as_deref().unwrap_or("-")
                );
                let _ = writeln!(out, "  port: {}", ssh.port);
            }
        }
        Ok(out)
    }

    fn read_file(&self) -> Result<ClustersFile> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read cluster store {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(ClustersFile::default());
        }
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse cluster store {}", self.path.display()))
    }

    fn write_file(&self, file: &ClustersFile) -> Result<()> {
        let rendered =
            serde_yaml::to_string(file).context("failed to serialize cluster store")?;
        let staging = self.path.with_extension("yaml.tmp");
        fs::write(&staging, rendered)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}
