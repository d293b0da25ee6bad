//! Configuration management for depscan

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default cache TTL (one week)
const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

/// Default number of components per remote request
const DEFAULT_PAGE_SIZE: usize = 100;

/// Default number of impact paths kept per issue and component
const DEFAULT_IMPACT_PATHS_LIMIT: usize = 50;

/// Default scan service request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variable read when no access token is configured
pub const ACCESS_TOKEN_ENV: &str = "DEPSCAN_ACCESS_TOKEN";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Remote scan service
    pub server: ServerConfig,
    /// Scan scheduling
    pub scan: ScanConfig,
    /// Scan cache
    pub cache: CacheConfig,
    /// Build tool program names
    pub tools: ToolsConfig,
    /// Descriptor paths to skip (glob patterns)
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Remote scan service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the scan service
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Bearer token, either literal or a `${VAR}` / `$VAR` reference
    pub access_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            access_token: None,
        }
    }
}

impl ServerConfig {
    /// Token sent to the scan service, if any
    ///
    /// Falls back to `DEPSCAN_ACCESS_TOKEN` when nothing is configured.
    pub fn resolved_token(&self) -> Option<String> {
        match self.access_token.as_deref() {
            Some(value) => resolve_env_var(value.trim()),
            None => std::env::var(ACCESS_TOKEN_ENV).ok(),
        }
        .filter(|token| !token.is_empty())
    }
}

fn resolve_env_var(value: &str) -> Option<String> {
    if let Some(inner) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        return std::env::var(inner).ok();
    }
    if let Some(name) = value.strip_prefix('$')
        && !name.contains('{')
    {
        return std::env::var(name).ok();
    }
    Some(value.to_string())
}

/// How components are submitted to the scan service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Flat component lists, paged
    #[default]
    Components,
    /// One dependency graph per project root
    Graph,
}

/// Scan scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub mode: ScanMode,
    /// Components per remote request
    pub page_size: usize,
    /// Impact paths kept per (issue, component) pair
    pub impact_paths_limit: usize,
    /// Project key sent with graph scans
    pub project_key: Option<String>,
    /// Watches sent with graph scans
    pub watches: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            page_size: DEFAULT_PAGE_SIZE,
            impact_paths_limit: DEFAULT_IMPACT_PATHS_LIMIT,
            project_key: None,
            watches: Vec::new(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Validity of a cached scan result in seconds
    pub ttl_secs: u64,
    /// Persist results to SQLite
    pub persistent: bool,
    /// Database location (defaults to the user cache directory)
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            persistent: true,
            path: None,
        }
    }
}

/// Program names of the ecosystem tools
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub go: String,
    pub mvn: String,
    pub npm: String,
    pub yarn: String,
    pub pnpm: String,
    pub python: String,
    pub nuget_deps_tree: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            go: "go".to_string(),
            mvn: "mvn".to_string(),
            npm: "npm".to_string(),
            yarn: "yarn".to_string(),
            pnpm: "pnpm".to_string(),
            python: "python3".to_string(),
            nuget_deps_tree: "nuget-deps-tree".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from a JSON value, falling back to defaults
    pub fn from_json(options: Option<serde_json::Value>) -> Self {
        match options {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("Invalid configuration, using defaults: {}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Check whether a descriptor path matches one of the exclude patterns
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|pattern| glob_match(pattern, &path))
    }
}

/// Minimal glob matching: `**` spans directories, `*` stays within one
///
/// `**/` also matches an empty run of directories. Runs in
/// `O(pattern * path)` with no recursion, so stacked `**` segments stay cheap.
fn glob_match(pattern: &str, path: &str) -> bool {
    let p = pattern.as_bytes();
    let s = path.as_bytes();
    let width = s.len() + 1;
    // matched[i * width + j]: p[i..] matches s[j..]
    let mut matched = vec![false; (p.len() + 1) * width];
    matched[p.len() * width + s.len()] = true;

    for i in (0..p.len()).rev() {
        for j in (0..=s.len()).rev() {
            let at = |i: usize, j: usize| matched[i * width + j];
            let hit = if p[i] == b'*' && p.get(i + 1) == Some(&b'*') {
                let mut next = i + 2;
                if p.get(next) == Some(&b'/') {
                    next += 1;
                }
                at(next, j) || (j < s.len() && at(i, j + 1))
            } else if p[i] == b'*' {
                at(i + 1, j) || (j < s.len() && s[j] != b'/' && at(i, j + 1))
            } else {
                j < s.len() && s[j] == p[i] && at(i + 1, j + 1)
            };
            matched[i * width + j] = hit;
        }
    }
    matched[0]
}
