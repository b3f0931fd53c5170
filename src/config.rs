use dirs::{cache_dir, config_dir};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const TOKEN_ENV_VAR: &str = "GITHUB_API_ACCESS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub debug: Option<bool>,
    pub github_token: Option<String>,
    pub github_api_url: Option<String>,
    pub repo_root: Option<PathBuf>,
    pub http_timeout_seconds: Option<u64>,
}

impl Config {
    /// Load the config file, `path` overriding the default location.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> color_eyre::eyre::Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::get_config_path);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn get_config_path() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vcs-proxy")
            .join("config.json")
    }

    /// Token from the config, else from the environment. `None` means
    /// anonymous API access.
    pub fn get_github_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .or_else(|| env::var(TOKEN_ENV_VAR).ok())
            .filter(|token| !token.trim().is_empty())
    }

    pub fn get_github_api_url(&self) -> String {
        self.github_api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Root of the local clone cache.
    pub fn get_repo_root(&self) -> PathBuf {
        self.repo_root.clone().unwrap_or_else(|| {
            cache_dir()
                .map(|dir| dir.join("vcs-proxy"))
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vulnerable_code")
        })
    }

    pub fn get_http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.unwrap_or(30))
    }

    pub fn merge_with_args(&self, args: &Args) -> Self {
        Self {
            debug: if args.debug { Some(true) } else { self.debug },
            github_token: args
                .github_token
                .clone()
                .or_else(|| self.github_token.clone()),
            github_api_url: args
                .github_api_url
                .clone()
                .or_else(|| self.github_api_url.clone()),
            repo_root: args.repo_root.clone().or_else(|| self.repo_root.clone()),
            http_timeout_seconds: args.http_timeout_seconds.or(self.http_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "vcs-proxy", about = "Fetch normalized commit data and file contents from GitHub or any git remote")]
pub struct Args {
    #[arg(short, long, help = "Print version information and exit")]
    pub version: bool,

    #[arg(short, long, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, help = "Commit link, e.g. https://github.com/owner/repo/commit/<hash>")]
    pub commit_link: Option<String>,

    #[arg(long, help = "Repository URL, e.g. https://example.com/org/name.git")]
    pub repo_url: Option<String>,

    #[arg(long, help = "Commit hash, overrides the hash embedded in the link")]
    pub commit_hash: Option<String>,

    #[arg(long, help = "Blob id, or tree-ish when --item-path is given")]
    pub item_hash: Option<String>,

    #[arg(long, help = "Path of the file below --item-hash")]
    pub item_path: Option<String>,

    #[arg(long, help = "File holding the cached commit data; reused when valid, refreshed otherwise")]
    pub tree_cache: Option<PathBuf>,

    #[arg(long, help = "Path of the config file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "GitHub API token (default: $GITHUB_API_ACCESS_TOKEN)")]
    pub github_token: Option<String>,

    #[arg(long, help = "GitHub API base URL (default: https://api.github.com)")]
    pub github_api_url: Option<String>,

    #[arg(long, help = "Directory holding local clones of generic remotes")]
    pub repo_root: Option<PathBuf>,

    #[arg(long, help = "Timeout in seconds for GitHub API calls (default: 30)")]
    pub http_timeout_seconds: Option<u64>,
}
