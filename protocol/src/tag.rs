use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Identifies one kind of derived index data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactId {
    Chunks,
    Lancedb,
    Fts,
    Snippets,
    GlobalCache,
}

impl ArtifactId {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactId::Chunks => "chunks",
            ArtifactId::Lancedb => "lancedb",
            ArtifactId::Fts => "fts",
            ArtifactId::Snippets => "snippets",
            ArtifactId::GlobalCache => "globalCache",
        }
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The partition under which catalog rows exist: a workspace root, a VCS
/// branch (empty string permitted), and the artifact kind.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag {
    pub directory: String,
    pub branch: String,
    pub artifact_id: ArtifactId,
}

impl Tag {
    pub fn new(
        directory: impl Into<String>,
        branch: impl Into<String>,
        artifact_id: ArtifactId,
    ) -> Self {
        Self {
            directory: directory.into(),
            branch: branch.into(),
            artifact_id,
        }
    }

    /// Same workspace and branch, different artifact.
    pub fn with_artifact(&self, artifact_id: ArtifactId) -> Self {
        Self {
            directory: self.directory.clone(),
            branch: self.branch.clone(),
            artifact_id,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.directory, self.branch, self.artifact_id)
    }
}

/// The content-addressed identity of a stored artifact version: an absolute
/// workspace URI plus the lowercase hex SHA-256 of the file bytes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PathAndCacheKey {
    pub path: String,
    pub cache_key: String,
}

impl PathAndCacheKey {
    pub fn new(path: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cache_key: cache_key.into(),
        }
    }
}

/// Per-file stat snapshot taken at the start of a refresh.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileStatsEntry {
    /// Milliseconds since the Unix epoch.
    pub last_modified: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Snapshot of every candidate file under a workspace root.
pub type FileStats = HashMap<String, FileStatsEntry>;
