//! Unified diff normalization.
//!
//! Both backends end up here: GitHub hands us unified diff text per file,
//! the local backend hands us git2 patches. Either way the output is the same
//! list of changed lines. Context lines are dropped.

use crate::error::{VcsError, VcsResult};
use crate::model::FileStatus;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Remove,
}

/// One added or removed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    #[serde(rename = "line_type")]
    pub line_kind: LineKind,
    pub source_line_no: Option<u32>,
    pub target_line_no: Option<u32>,
    /// 1-based position inside the file's diff text, `---` being line 1.
    pub diff_line_no: u32,
    #[serde(rename = "value")]
    pub content: String,
}

/// Normalized patch of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub path: String,
    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
    pub deltas: Vec<LineDelta>,
}

impl FilePatch {
    fn new(source: Option<String>, target: Option<String>) -> Self {
        let status = match (&source, &target) {
            (None, Some(_)) => FileStatus::Added,
            (Some(_), None) => FileStatus::Removed,
            _ => FileStatus::Modified,
        };
        Self {
            path: target.or(source).unwrap_or_default(),
            status,
            additions: 0,
            deletions: 0,
            deltas: Vec::new(),
        }
    }

    fn push_add(&mut self, target_line_no: u32, diff_line_no: u32, content: &str) {
        self.additions += 1;
        self.deltas.push(LineDelta {
            line_kind: LineKind::Add,
            source_line_no: None,
            target_line_no: Some(target_line_no),
            diff_line_no,
            content: content.to_string(),
        });
    }

    fn push_remove(&mut self, source_line_no: u32, diff_line_no: u32, content: &str) {
        self.deletions += 1;
        self.deltas.push(LineDelta {
            line_kind: LineKind::Remove,
            source_line_no: Some(source_line_no),
            target_line_no: None,
            diff_line_no,
            content: content.to_string(),
        });
    }
}

struct HunkState {
    source_left: u32,
    target_left: u32,
    source_line: u32,
    target_line: u32,
}

impl HunkState {
    fn is_done(&self) -> bool {
        self.source_left == 0 && self.target_left == 0
    }
}

fn parse_hunk_header(line: &str) -> VcsResult<HunkState> {
    let captures = HUNK_HEADER_RE
        .captures(line)
        .ok_or_else(|| VcsError::DiffParse(format!("invalid hunk header: {line}")))?;
    let number = |idx: usize, default: u32| -> VcsResult<u32> {
        match captures.get(idx) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| VcsError::DiffParse(format!("invalid hunk header: {line}"))),
            None => Ok(default),
        }
    };
    Ok(HunkState {
        source_line: number(1, 0)?,
        source_left: number(2, 1)?,
        target_line: number(3, 0)?,
        target_left: number(4, 1)?,
    })
}

/// Path from a `---`/`+++` header, `None` for `/dev/null`.
fn header_path(rest: &str, prefix: &str) -> Option<String> {
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    if path == DEV_NULL {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

/// Parse unified diff text holding any number of files.
///
/// Only files with `---`/`+++` headers are reported. An empty input yields an
/// empty list. Structural problems (a hunk body that disagrees with its header,
/// changed lines outside of a hunk) fail with [`VcsError::DiffParse`].
pub fn parse_unified_diff(text: &str) -> VcsResult<Vec<FilePatch>> {
    let mut files = Vec::new();
    let mut current: Option<FilePatch> = None;
    let mut pending_source: Option<Option<String>> = None;
    let mut hunk: Option<HunkState> = None;
    let mut diff_line_no: u32 = 0;

    for line in text.lines() {
        if let Some(state) = hunk.as_mut() {
            diff_line_no += 1;
            let file = current
                .as_mut()
                .ok_or_else(|| VcsError::DiffParse("hunk without file header".to_string()))?;
            match line.chars().next() {
                Some('+') => {
                    if state.target_left == 0 {
                        return Err(VcsError::DiffParse(format!(
                            "hunk in {} has more added lines than declared",
                            file.path
                        )));
                    }
                    file.push_add(state.target_line, diff_line_no, &line[1..]);
                    state.target_line += 1;
                    state.target_left -= 1;
                }
                Some('-') => {
                    if state.source_left == 0 {
                        return Err(VcsError::DiffParse(format!(
                            "hunk in {} has more removed lines than declared",
                            file.path
                        )));
                    }
                    file.push_remove(state.source_line, diff_line_no, &line[1..]);
                    state.source_line += 1;
                    state.source_left -= 1;
                }
                Some(' ') | None => {
                    if state.source_left == 0 || state.target_left == 0 {
                        return Err(VcsError::DiffParse(format!(
                            "hunk in {} has more context lines than declared",
                            file.path
                        )));
                    }
                    state.source_line += 1;
                    state.target_line += 1;
                    state.source_left -= 1;
                    state.target_left -= 1;
                }
                // "\ No newline at end of file"
                Some('\\') => {}
                Some(_) => {
                    return Err(VcsError::DiffParse(format!(
                        "unexpected line in hunk of {}: {line}",
                        file.path
                    )));
                }
            }
            if state.is_done() {
                hunk = None;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("--- ") {
            if let Some(file) = current.take() {
                files.push(file);
            }
            pending_source = Some(header_path(rest, "a/"));
            diff_line_no = 1;
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let source = pending_source.take().ok_or_else(|| {
                VcsError::DiffParse("target header without source header".to_string())
            })?;
            current = Some(FilePatch::new(source, header_path(rest, "b/")));
            diff_line_no = 2;
        } else if line.starts_with("@@") {
            if current.is_none() {
                return Err(VcsError::DiffParse(
                    "hunk header without file header".to_string(),
                ));
            }
            diff_line_no += 1;
            let state = parse_hunk_header(line)?;
            if !state.is_done() {
                hunk = Some(state);
            }
        } else if line.starts_with("diff ") {
            if let Some(file) = current.take() {
                files.push(file);
            }
        } else if line.starts_with('\\') {
            diff_line_no += 1;
        } else if line.starts_with('+') || line.starts_with('-') || line.starts_with(' ') {
            return Err(VcsError::DiffParse(format!(
                "changed line outside of a hunk: {line}"
            )));
        }
        // Anything else is an extended header (index, mode, rename, binary).
    }

    if hunk.is_some() {
        return Err(VcsError::DiffParse(
            "hunk is shorter than declared".to_string(),
        ));
    }
    if let Some(file) = current.take() {
        files.push(file);
    }
    Ok(files)
}

/// Deltas of a single-file patch fragment as returned by the GitHub API.
///
/// The fragment starts at its first hunk header. A synthetic `--- a`/`+++ b`
/// header is put in front of it before parsing. An absent or empty fragment
/// (binary files, mode-only changes) gives no deltas.
pub fn parse_patch_fragment(fragment: Option<&str>) -> VcsResult<Vec<LineDelta>> {
    let fragment = match fragment {
        Some(f) if !f.trim().is_empty() => f,
        _ => return Ok(Vec::new()),
    };
    let mut text = String::with_capacity(fragment.len() + 12);
    text.push_str("--- a\n+++ b\n");
    text.push_str(fragment);
    debug!("Parsing diff\n{text}");

    let mut files = parse_unified_diff(&text)?;
    Ok(files.pop().map(|file| file.deltas).unwrap_or_default())
}

/// Normalize one git2 patch, numbering lines as if it had been printed as
/// unified diff text.
pub fn from_git2_patch(
    path: String,
    status: FileStatus,
    patch: &git2::Patch<'_>,
) -> VcsResult<FilePatch> {
    let mut file = FilePatch {
        path,
        status,
        additions: 0,
        deletions: 0,
        deltas: Vec::new(),
    };
    let translate = |e: git2::Error| VcsError::DiffParse(e.message().to_string());

    let mut diff_line_no: u32 = 2;
    for hunk_idx in 0..patch.num_hunks() {
        diff_line_no += 1;
        let line_count = patch.num_lines_in_hunk(hunk_idx).map_err(translate)?;
        for line_idx in 0..line_count {
            let line = patch.line_in_hunk(hunk_idx, line_idx).map_err(translate)?;
            diff_line_no += 1;
            let content = String::from_utf8_lossy(line.content());
            let content = content.strip_suffix('\n').unwrap_or(&content);
            match line.origin() {
                '+' => {
                    let line_no = line.new_lineno().ok_or_else(|| {
                        VcsError::DiffParse("added line without line number".to_string())
                    })?;
                    file.push_add(line_no, diff_line_no, content);
                }
                '-' => {
                    let line_no = line.old_lineno().ok_or_else(|| {
                        VcsError::DiffParse("removed line without line number".to_string())
                    })?;
                    file.push_remove(line_no, diff_line_no, content);
                }
                _ => {}
            }
        }
    }
    Ok(file)
}
