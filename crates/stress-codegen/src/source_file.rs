use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::script::write_artifact;

pub const PUBLISH_MANIFEST_NAME: &str = "publish_manifest.json";

/// What packaging does with a published file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFileAction {
    #[default]
    None,
    /// Copy verbatim into the output layout.
    Binplace,
    Compile,
    /// Embed as a loadable resource.
    Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileInfo {
    pub relative_path: String,
    pub action: SourceFileAction,
}

impl SourceFileInfo {
    pub fn new(relative_path: impl Into<String>, action: SourceFileAction) -> Self {
        Self {
            relative_path: relative_path.into(),
            action,
        }
    }

    pub fn binplace(relative_path: impl Into<String>) -> Self {
        Self::new(relative_path, SourceFileAction::Binplace)
    }
}

/// Ordered list of files handed to packaging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishRegistry {
    entries: Vec<SourceFileInfo>,
}

impl PublishRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SourceFileInfo) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFileInfo> {
        self.entries.iter()
    }

    pub fn with_action(&self, action: SourceFileAction) -> impl Iterator<Item = &SourceFileInfo> {
        self.entries.iter().filter(move |e| e.action == action)
    }

    /// Writes `publish_manifest.json` next to the published files, with the
    /// sha256 of every entry that exists on disk.
    pub fn write_manifest(&self, source_directory: &Path, test_name: &str) -> Result<PathBuf> {
        let mut files = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let path = source_directory.join(&entry.relative_path);
            let digest = if path.is_file() {
                Some(sha256_file(&path)?)
            } else {
                None
            };
            files.push(json!({
                "path": entry.relative_path,
                "action": entry.action,
                "sha256": digest,
            }));
        }
        let payload = json!({
            "schema_version": "publish_manifest_v1",
            "test_name": test_name,
            "generated_at": Utc::now().to_rfc3339(),
            "files": files,
        });
        let manifest_path = source_directory.join(PUBLISH_MANIFEST_NAME);
        let bytes = serde_json::to_vec_pretty(&payload)?;
        write_artifact(&manifest_path, &bytes)?;
        tracing::debug!(path = %manifest_path.display(), entries = self.entries.len(), "wrote publish manifest");
        Ok(manifest_path)
    }
}

impl<'a> IntoIterator for &'a PublishRegistry {
    type Item = &'a SourceFileInfo;
    type IntoIter = std::slice::Iter<'a, SourceFileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(format!("sha256:{}", hex::encode(Sha256::digest(&bytes))))
}
