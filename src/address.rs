//! Commit address parsing.
//!
//! Turns loosely formatted commit references into a validated
//! [`CommitAddress`]. Parsing never touches the network or the disk, and an
//! address is either fully populated or not returned at all.

use crate::error::{VcsError, VcsResult};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// `{scheme}://{authority}{path}`, query and fragment ignored.
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<authority>[^/?#]*)(?P<path>[^?#]*)")
        .expect("valid url regex")
});

static GITHUB_COMMIT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z0-9_.\-]+)/([A-Za-z0-9_.\-]+)/commit/([a-fA-F0-9]{5,})/?$").expect("valid github regex")
});

static GITHUB_REPO_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_.\-]+)/([A-Za-z0-9_.\-]+)/?$").expect("valid github repo regex"));

// [SCHEME]://[HOST]/[PATH].git#[COMMIT_HASH]
// [SCHEME]://[HOST]/[PATH].git@[COMMIT_HASH]
static REMOTE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>.*/(?P<name>[^/]+)\.git)(?:[#@](?P<commit>[a-fA-F0-9]{7,}))?$")
        .expect("valid remote regex")
});

static REMOTE_REPO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>.*/(?P<name>[^/]+)\.git)$").expect("valid remote repo regex")
});

static COMMIT_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{5,}$").expect("valid hash regex"));

pub const GITHUB_HOST: &str = "github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressKind {
    GithubCommit,
    GitRemoteCommit,
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressKind::GithubCommit => write!(f, "github"),
            AddressKind::GitRemoteCommit => write!(f, "git-remote"),
        }
    }
}

/// A parsed reference to one commit in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitAddress {
    kind: AddressKind,
    owner: Option<String>,
    repo_name: String,
    repo_url: String,
    commit_hash: Option<String>,
    canonical_link: String,
}

impl CommitAddress {
    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Repository owner. Always present for GitHub addresses.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn commit_hash(&self) -> Option<&str> {
        self.commit_hash.as_deref()
    }

    pub fn canonical_link(&self) -> &str {
        &self.canonical_link
    }

    /// Lowercased hostname of the repository URL.
    pub fn hostname(&self) -> Option<String> {
        split_url(&self.repo_url).map(|parts| parts.host)
    }

    /// Web URL prefix for browsing files at the bound commit.
    pub fn browse_file_url(&self) -> Option<String> {
        self.browse_url("blob")
    }

    /// Web URL prefix for browsing directories at the bound commit.
    pub fn browse_tree_url(&self) -> Option<String> {
        self.browse_url("tree")
    }

    fn browse_url(&self, section: &str) -> Option<String> {
        // A custom repository doesn't necessarily have a web interface.
        if self.kind != AddressKind::GithubCommit {
            return None;
        }
        let owner = self.owner.as_deref()?;
        let hash = self.commit_hash.as_deref()?;
        Some(format!(
            "https://{GITHUB_HOST}/{owner}/{}/{section}/{hash}/",
            self.repo_name
        ))
    }
}

struct UrlParts<'a> {
    scheme: &'a str,
    host: String,
    path: &'a str,
}

fn split_url(raw: &str) -> Option<UrlParts<'_>> {
    let captures = URL_RE.captures(raw)?;
    let scheme = captures.name("scheme")?.as_str();
    let authority = captures.name("authority")?.as_str();
    let path = captures.name("path").map(|m| m.as_str()).unwrap_or("");

    // Drop userinfo and port.
    let host_port = authority.rsplit('@').next().unwrap_or("");
    let host = if let Some(rest) = host_port.strip_prefix('[') {
        rest.split(']').next().unwrap_or("")
    } else {
        host_port.split(':').next().unwrap_or("")
    };
    if host.is_empty() {
        return None;
    }

    Some(UrlParts {
        scheme,
        host: host.to_ascii_lowercase(),
        path,
    })
}

fn is_web_scheme(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("http")
}

/// Transports a generic remote may be cloned over. Local ones such as
/// `file://` are refused.
fn is_remote_scheme(scheme: &str) -> bool {
    is_web_scheme(scheme)
        || scheme.eq_ignore_ascii_case("git")
        || scheme.eq_ignore_ascii_case("ssh")
}

fn is_dot_segment(segment: &str) -> bool {
    segment.chars().all(|c| c == '.')
}

/// Parse `https://github.com/{owner}/{repo}/commit/{hash}`.
pub fn parse_github_link(raw: &str) -> VcsResult<CommitAddress> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(VcsError::AddressParse(
            "Please provide a Github commit link.".to_string(),
        ));
    }

    let invalid = || {
        VcsError::AddressParse(
            "Please provide a valid (https://github.com/{owner}/{repo}/commit/{hash}) commit link."
                .to_string(),
        )
    };

    let parts = split_url(raw).ok_or_else(invalid)?;
    if !is_web_scheme(parts.scheme) || parts.host != GITHUB_HOST {
        return Err(invalid());
    }
    let captures = GITHUB_COMMIT_PATH_RE
        .captures(parts.path)
        .ok_or_else(invalid)?;
    if is_dot_segment(&captures[1]) || is_dot_segment(&captures[2]) {
        return Err(invalid());
    }

    let owner = captures[1].to_string();
    let repo_name = captures[2].to_string();
    let commit_hash = captures[3].to_string();

    Ok(CommitAddress {
        kind: AddressKind::GithubCommit,
        repo_url: format!("https://{GITHUB_HOST}/{owner}/{repo_name}"),
        owner: Some(owner),
        repo_name,
        commit_hash: Some(commit_hash),
        canonical_link: raw.to_string(),
    })
}

/// Parse a `https://github.com/{owner}/{repo}` URL plus a separate hash.
pub fn parse_github_repo_and_hash(repo_url: &str, commit_hash: &str) -> VcsResult<CommitAddress> {
    let repo_url = repo_url.trim().trim_end_matches('/');
    let commit_hash = commit_hash.trim();
    if repo_url.is_empty() || commit_hash.is_empty() {
        return Err(VcsError::AddressParse(
            "Please provide a Github url and hash.".to_string(),
        ));
    }

    let invalid = || {
        VcsError::AddressParse(
            "Please provide a valid (https://github.com/{owner}/{repo}) repository url."
                .to_string(),
        )
    };

    let parts = split_url(repo_url).ok_or_else(invalid)?;
    if !is_web_scheme(parts.scheme) || parts.host != GITHUB_HOST {
        return Err(invalid());
    }
    let captures = GITHUB_REPO_PATH_RE.captures(parts.path).ok_or_else(invalid)?;
    if is_dot_segment(&captures[1]) || is_dot_segment(&captures[2]) {
        return Err(invalid());
    }
    validate_commit_hash(commit_hash)?;

    Ok(CommitAddress {
        kind: AddressKind::GithubCommit,
        owner: Some(captures[1].to_string()),
        repo_name: captures[2].to_string(),
        repo_url: repo_url.to_string(),
        commit_hash: Some(commit_hash.to_string()),
        canonical_link: format!("{repo_url}/commit/{commit_hash}"),
    })
}

/// Parse `{scheme}://{host}/{...}/{name}.git` with an optional `#{hash}` or
/// `@{hash}` suffix.
pub fn parse_remote_link(raw: &str) -> VcsResult<CommitAddress> {
    let raw = raw.trim();
    let invalid = || {
        VcsError::AddressParse(
            "Please provide a valid ([SCHEMA]://[HOST]/[PATH].git#[COMMIT_HASH]) Git Repo link."
                .to_string(),
        )
    };
    if raw.is_empty() {
        return Err(VcsError::AddressParse(
            "Please provide a valid URL.".to_string(),
        ));
    }

    let captures = REMOTE_LINK_RE.captures(raw).ok_or_else(invalid)?;
    let repo_url = captures.name("url").ok_or_else(invalid)?.as_str();
    let name = captures.name("name").ok_or_else(invalid)?.as_str();
    let parts = split_url(repo_url).ok_or_else(invalid)?;
    if !is_remote_scheme(parts.scheme) {
        return Err(invalid());
    }

    Ok(CommitAddress {
        kind: AddressKind::GitRemoteCommit,
        owner: None,
        repo_name: name.to_string(),
        repo_url: repo_url.to_string(),
        commit_hash: captures.name("commit").map(|m| m.as_str().to_string()),
        canonical_link: raw.to_string(),
    })
}

/// Parse a `{scheme}://{host}/{...}/{name}.git` URL plus a separate hash.
pub fn parse_remote_repo_and_hash(repo_url: &str, commit_hash: &str) -> VcsResult<CommitAddress> {
    let repo_url = repo_url.trim();
    let commit_hash = commit_hash.trim();
    if repo_url.is_empty() || commit_hash.is_empty() {
        return Err(VcsError::AddressParse(
            "Please provide a Git repository url and hash.".to_string(),
        ));
    }

    let invalid = || {
        VcsError::AddressParse(
            "Please provide a valid ([SCHEMA]://[HOST]/[PATH].git) Git Repo url.".to_string(),
        )
    };
    let captures = REMOTE_REPO_RE.captures(repo_url).ok_or_else(invalid)?;
    let name = captures.name("name").ok_or_else(invalid)?.as_str();
    let parts = split_url(repo_url).ok_or_else(invalid)?;
    if !is_remote_scheme(parts.scheme) {
        return Err(invalid());
    }
    validate_commit_hash(commit_hash)?;

    Ok(CommitAddress {
        kind: AddressKind::GitRemoteCommit,
        owner: None,
        repo_name: name.to_string(),
        repo_url: repo_url.to_string(),
        commit_hash: Some(commit_hash.to_string()),
        canonical_link: format!("{repo_url}#{commit_hash}"),
    })
}

/// Hex, at least five characters.
pub fn validate_commit_hash(commit_hash: &str) -> VcsResult<()> {
    if COMMIT_HASH_RE.is_match(commit_hash) {
        Ok(())
    } else {
        Err(VcsError::AddressParse(
            "Please provide a valid git commit hash (min 5 characters)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_link_round_trips() {
        let links = [
            "https://github.com/OWNER/REPO/commit/abcdef1",
            "https://github.com/torvalds/linux/commit/0123456789abcdef0123456789abcdef01234567",
            "https://github.com/a-b/c.d/commit/ABCDE/",
        ];
        for link in links {
            let address = parse_github_link(link).unwrap();
            assert_eq!(address.canonical_link(), link);
            assert_eq!(address.kind(), AddressKind::GithubCommit);
            assert!(address.owner().is_some());
        }
    }

    #[test]
    fn test_github_link_fields() {
        let address = parse_github_link("https://github.com/OWNER/REPO/commit/abcdef1").unwrap();
        assert_eq!(address.owner(), Some("OWNER"));
        assert_eq!(address.repo_name(), "REPO");
        assert_eq!(address.repo_url(), "https://github.com/OWNER/REPO");
        assert_eq!(address.commit_hash(), Some("abcdef1"));
        assert_eq!(address.hostname().as_deref(), Some("github.com"));
    }

    #[test]
    fn test_github_link_rejects_malformed() {
        let links = [
            "",
            "https://gitlab.com/OWNER/REPO/commit/abcdef1",
            "https://github.com.evil.org/OWNER/REPO/commit/abcdef1",
            "https://github.com/OWNER/commit/abcdef1",
            "https://github.com/OWNER/REPO/commit/",
            "https://github.com/OWNER/REPO/commit/xyz1234",
            "https://github.com/OWNER/REPO/tree/abcdef1",
            "ftp://github.com/OWNER/REPO/commit/abcdef1",
            "github.com/OWNER/REPO/commit/abcdef1",
            "not a url",
            "https://github.com/../../commit/abcdef1",
            "https://github.com/OWNER/%2e%2e/commit/abcdef1",
        ];
        for link in links {
            let err = parse_github_link(link).unwrap_err();
            assert!(matches!(err, VcsError::AddressParse(_)), "{link}");
        }
    }

    #[test]
    fn test_github_repo_and_hash() {
        let address =
            parse_github_repo_and_hash("https://github.com/OWNER/REPO/", "abcde").unwrap();
        assert_eq!(address.owner(), Some("OWNER"));
        assert_eq!(address.repo_name(), "REPO");
        assert_eq!(
            address.canonical_link(),
            "https://github.com/OWNER/REPO/commit/abcde"
        );

        assert!(parse_github_repo_and_hash("https://github.com/OWNER/REPO", "abcd").is_err());
        assert!(parse_github_repo_and_hash("https://github.com/OWNER/REPO", "zzzzzz").is_err());
        assert!(parse_github_repo_and_hash("https://github.com/OWNER", "abcdef").is_err());
        assert!(parse_github_repo_and_hash("", "abcdef").is_err());
    }

    #[test]
    fn test_remote_link_with_hash_separators() {
        for separator in ['#', '@'] {
            let link = format!("https://example.com/org/name.git{separator}abc1234");
            let address = parse_remote_link(&link).unwrap();
            assert_eq!(address.kind(), AddressKind::GitRemoteCommit);
            assert_eq!(address.repo_name(), "name");
            assert_eq!(address.repo_url(), "https://example.com/org/name.git");
            assert_eq!(address.commit_hash(), Some("abc1234"));
            assert_eq!(address.canonical_link(), link);
            assert_eq!(address.owner(), None);
        }
    }

    #[test]
    fn test_remote_link_without_hash() {
        let address = parse_remote_link("https://git.centos.org/r/rpms/dhcp.git").unwrap();
        assert_eq!(address.repo_name(), "dhcp");
        assert_eq!(address.commit_hash(), None);
        assert_eq!(address.hostname().as_deref(), Some("git.centos.org"));
    }

    #[test]
    fn test_remote_link_rejects_malformed() {
        let links = [
            "",
            "https://example.com/org/name",
            "https://example.com/org/name.git#abc12",
            "https://example.com/org/name.git#nothex12",
            "/local/path/name.git",
            "https:///name.git",
            "file://localhost/tmp/private.git#abc1234",
            "FILE://localhost/srv/name.git",
            "ext::sh -c touch% /tmp/pwned://x/name.git",
        ];
        for link in links {
            let err = parse_remote_link(link).unwrap_err();
            assert!(matches!(err, VcsError::AddressParse(_)), "{link}");
        }
    }

    #[test]
    fn test_remote_repo_and_hash() {
        let address =
            parse_remote_repo_and_hash("https://user@example.com:8443/org/name.git", "abcde")
                .unwrap();
        assert_eq!(address.repo_name(), "name");
        assert_eq!(address.hostname().as_deref(), Some("example.com"));
        assert_eq!(
            address.canonical_link(),
            "https://user@example.com:8443/org/name.git#abcde"
        );

        assert!(parse_remote_repo_and_hash("https://example.com/org/name.git", "abcd").is_err());
        assert!(parse_remote_repo_and_hash("https://example.com/org/name", "abcdef").is_err());
        assert!(parse_remote_repo_and_hash("file://localhost/srv/name.git", "abcdef").is_err());

        for url in [
            "http://example.com/name.git",
            "git://example.com/name.git",
            "ssh://git@example.com:2222/org/name.git",
        ] {
            assert!(parse_remote_repo_and_hash(url, "abcdef").is_ok(), "{url}");
        }
    }

    #[test]
    fn test_browse_urls() {
        let address = parse_github_link("https://github.com/OWNER/REPO/commit/abcdef1").unwrap();
        assert_eq!(
            address.browse_file_url().as_deref(),
            Some("https://github.com/OWNER/REPO/blob/abcdef1/")
        );
        assert_eq!(
            address.browse_tree_url().as_deref(),
            Some("https://github.com/OWNER/REPO/tree/abcdef1/")
        );

        let remote = parse_remote_link("https://example.com/org/name.git#abc1234").unwrap();
        assert_eq!(remote.browse_file_url(), None);
        assert_eq!(remote.browse_tree_url(), None);
    }
}
