use crate::diff::{FilePatch, LineDelta};
use crate::tree::TreeEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
}

impl FromStr for FileStatus {
    type Err = String;

    /// Accepts the GitHub file status vocabulary. Renames, copies and other
    /// in-place changes count as modifications.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "added" => Ok(FileStatus::Added),
            "removed" | "deleted" => Ok(FileStatus::Removed),
            "modified" | "renamed" | "copied" | "changed" | "unchanged" => {
                Ok(FileStatus::Modified)
            }
            _ => Err(format!("Invalid file status: {s}")),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Modified => write!(f, "modified"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitStats {
    pub additions: usize,
    pub deletions: usize,
    pub total: usize,
}

impl CommitStats {
    /// `total` is always derived, never taken from a backend.
    pub fn new(additions: usize, deletions: usize) -> Self {
        Self {
            additions,
            deletions,
            total: additions + deletions,
        }
    }

    pub fn from_files(files: &[FileChangeMetadata]) -> Self {
        let (additions, deletions) = files
            .iter()
            .fold((0, 0), |(a, d), f| (a + f.additions, d + f.deletions));
        Self::new(additions, deletions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeMetadata {
    pub path: String,
    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
}

impl From<&FilePatch> for FileChangeMetadata {
    fn from(patch: &FilePatch) -> Self {
        Self {
            path: patch.path.clone(),
            status: patch.status,
            additions: patch.additions,
            deletions: patch.deletions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchedFile {
    pub status: FileStatus,
    /// Blob id for on-demand retrieval, when it could be resolved.
    #[serde(rename = "sha")]
    pub content_hash: Option<String>,
    pub deltas: Vec<LineDelta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    #[serde(rename = "parent_hash")]
    pub parent_commit_hash: String,
    /// Unix seconds.
    #[serde(rename = "date")]
    pub authored_at: i64,
    pub message: String,
    pub stats: CommitStats,
    pub files: Vec<FileChangeMetadata>,
}

/// Everything one ingestion call produces. Serialized, this is the tree cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    pub commit: CommitMetadata,
    pub patched_files: BTreeMap<String, PatchedFile>,
    pub files: Vec<TreeEntry>,
}

impl EngineResult {
    pub fn assemble(
        tree: Vec<TreeEntry>,
        patched_files: BTreeMap<String, PatchedFile>,
        commit: CommitMetadata,
    ) -> Self {
        Self {
            commit,
            patched_files,
            files: tree,
        }
    }

    /// Compact JSON, stable for identical inputs.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::LineKind;
    use crate::tree::EntryKind;

    fn sample_result() -> EngineResult {
        let files = vec![FileChangeMetadata {
            path: "src/main.c".to_string(),
            status: FileStatus::Modified,
            additions: 2,
            deletions: 1,
        }];
        let mut patched = BTreeMap::new();
        patched.insert(
            "src/main.c".to_string(),
            PatchedFile {
                status: FileStatus::Modified,
                content_hash: Some("abc".to_string()),
                deltas: vec![LineDelta {
                    line_kind: LineKind::Remove,
                    source_line_no: Some(3),
                    target_line_no: None,
                    diff_line_no: 4,
                    content: "old".to_string(),
                }],
            },
        );
        EngineResult::assemble(
            vec![TreeEntry {
                path: "src".to_string(),
                content_hash: "def".to_string(),
                kind: EntryKind::Tree,
            }],
            patched,
            CommitMetadata {
                parent_commit_hash: "p".to_string(),
                authored_at: 1_546_300_800,
                message: "Fix overflow".to_string(),
                stats: CommitStats::from_files(&files),
                files,
            },
        )
    }

    #[test]
    fn test_stats_total_is_sum() {
        let stats = CommitStats::new(2, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(CommitStats::from_files(&[]), CommitStats::new(0, 0));
    }

    #[test]
    fn test_file_status_from_github_vocabulary() {
        assert_eq!(FileStatus::from_str("added").unwrap(), FileStatus::Added);
        assert_eq!(FileStatus::from_str("removed").unwrap(), FileStatus::Removed);
        assert_eq!(FileStatus::from_str("renamed").unwrap(), FileStatus::Modified);
        assert_eq!(FileStatus::from_str("MODIFIED").unwrap(), FileStatus::Modified);
        assert!(FileStatus::from_str("exploded").is_err());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(sample_result()).unwrap();
        assert_eq!(json["commit"]["parent_hash"], "p");
        assert_eq!(json["commit"]["date"], 1_546_300_800);
        assert_eq!(json["commit"]["stats"]["total"], 3);
        assert_eq!(json["commit"]["files"][0]["status"], "modified");
        assert_eq!(json["patched_files"]["src/main.c"]["sha"], "abc");
        assert_eq!(
            json["patched_files"]["src/main.c"]["deltas"][0]["line_type"],
            "-"
        );
        assert_eq!(json["files"][0]["type"], "tree");
        assert_eq!(json["files"][0]["sha"], "def");
    }

    #[test]
    fn test_json_round_trip_is_stable() {
        let result = sample_result();
        let first = result.to_json().unwrap();
        let restored = EngineResult::from_json(&first).unwrap();
        assert_eq!(restored, result);
        assert_eq!(restored.to_json().unwrap(), first);
    }
}
