//! On-disk snapshot cache of GET responses.
//!
//! # Design
//! The cache file is a flat JSON object mapping cache keys (base-relative
//! path, optionally followed by `?` and the sorted query string) to response
//! bodies. It is read once when the executor is built.
//!
//! - `Dev` mode serves a pre-seeded file and never writes to it. The file
//!   must exist.
//! - `Auto` mode starts from whatever file it finds (or nothing) and appends
//!   new GET responses for allow-listed paths, rewriting the file after every
//!   insert.
//! - `Disabled` turns both lookup and writeback off.
//!
//! Inserts are serialized behind a mutex, so overlapping calls cannot lose
//! each other's entries. A failed write is logged and the call that
//! triggered it still succeeds.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::http::HttpMethod;

/// Values of the deployment mode signal that select `CacheMode::Auto`.
pub const AUTO_CACHE_SIGNALS: &[&str] = &["auto", "autocache", "auto-cache", "auto_cache"];

/// Endpoints whose GET responses are stable enough to snapshot. `*` matches
/// exactly one path segment.
pub const DEFAULT_CACHEABLE_PATTERNS: &[&str] = &[
    "/tenants/current",
    "/tenants/*",
    "/applications",
    "/applications/*",
    "/applications/*/accountStoreMappings",
    "/directories/*",
    "/directories/*/groups",
    "/groups/*",
    "/accountStoreMappings/*",
    "/customData/*",
];

/// Primary cache file plus an optional second location to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFiles {
    pub primary: PathBuf,
    pub fallback: Option<PathBuf>,
}

impl CacheFiles {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    fn candidates(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.primary.as_path()).chain(self.fallback.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheMode {
    #[default]
    Disabled,
    Dev(CacheFiles),
    Auto(CacheFiles),
}

impl CacheMode {
    /// Pick the mode from a deployment signal such as an environment
    /// variable's value: a recognised auto-cache identifier selects `auto`,
    /// anything else (including no signal) selects the read-only `dev` cache.
    pub fn from_signal(signal: Option<&str>, dev: CacheFiles, auto: CacheFiles) -> Self {
        match signal {
            Some(value) if is_auto_signal(value) => CacheMode::Auto(auto),
            _ => CacheMode::Dev(dev),
        }
    }
}

fn is_auto_signal(value: &str) -> bool {
    let value = value.trim();
    AUTO_CACHE_SIGNALS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(value))
}

/// Cache settings. In JSON the mode and its files sit side by side, e.g.
/// `{"mode": "auto", "primary": "cache.json"}`; a missing `mode` means
/// `disabled`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCacheConfig")]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub cacheable: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeName {
    #[default]
    Disabled,
    Dev,
    Auto,
}

#[derive(Deserialize)]
struct RawCacheConfig {
    #[serde(default)]
    mode: ModeName,
    #[serde(default)]
    primary: Option<PathBuf>,
    #[serde(default)]
    fallback: Option<PathBuf>,
    #[serde(default = "default_patterns")]
    cacheable: Vec<String>,
}

impl TryFrom<RawCacheConfig> for CacheConfig {
    type Error = String;

    fn try_from(raw: RawCacheConfig) -> Result<Self, Self::Error> {
        let files = |name: &str| match raw.primary.clone() {
            Some(primary) => Ok(CacheFiles {
                primary,
                fallback: raw.fallback.clone(),
            }),
            None => Err(format!("cache mode `{name}` needs a `primary` file")),
        };
        let mode = match raw.mode {
            ModeName::Disabled => CacheMode::Disabled,
            ModeName::Dev => CacheMode::Dev(files("dev")?),
            ModeName::Auto => CacheMode::Auto(files("auto")?),
        };
        Ok(Self {
            mode,
            cacheable: raw.cacheable,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Disabled,
            cacheable: default_patterns(),
        }
    }
}

impl CacheConfig {
    pub fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

fn default_patterns() -> Vec<String> {
    DEFAULT_CACHEABLE_PATTERNS
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// A path template such as `/applications/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPattern {
    segments: Vec<String>,
}

impl UriPattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        if !pattern.starts_with('/') {
            return Err(ConfigError::InvalidPattern(pattern.to_string()));
        }
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        Ok(Self { segments })
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or_default();
        if !path.starts_with('/') {
            return false;
        }
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        for expected in &self.segments {
            match parts.next() {
                Some(actual) if expected == "*" || expected == actual => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Off,
    ReadOnly,
    ReadWrite,
}

/// Key → response mapping backed by a JSON file.
#[derive(Debug)]
pub struct CacheStore {
    access: Access,
    entries: Mutex<BTreeMap<String, Value>>,
    persist_to: Option<PathBuf>,
    patterns: Vec<UriPattern>,
    hits: AtomicU64,
}

impl CacheStore {
    /// A store that never answers and never writes.
    pub fn disabled() -> Self {
        Self {
            access: Access::Off,
            entries: Mutex::new(BTreeMap::new()),
            persist_to: None,
            patterns: Vec::new(),
            hits: AtomicU64::new(0),
        }
    }

    pub fn load(config: &CacheConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .cacheable
            .iter()
            .map(|p| UriPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        let (access, entries, persist_to) = match &config.mode {
            CacheMode::Disabled => return Ok(Self::disabled()),
            CacheMode::Dev(files) => match read_first(files)? {
                Some((path, entries)) => {
                    info!(path = %path.display(), entries = entries.len(), "loaded dev cache");
                    (Access::ReadOnly, entries, None)
                }
                None => {
                    return Err(ConfigError::CacheFileMissing {
                        primary: files.primary.clone(),
                        fallback: files.fallback.clone(),
                    })
                }
            },
            CacheMode::Auto(files) => match read_first(files)? {
                Some((path, entries)) => {
                    info!(path = %path.display(), entries = entries.len(), "loaded auto cache");
                    (Access::ReadWrite, entries, Some(path))
                }
                None => {
                    info!(path = %files.primary.display(), "no auto cache yet, starting empty");
                    (Access::ReadWrite, BTreeMap::new(), Some(files.primary.clone()))
                }
            },
        };

        Ok(Self {
            access,
            entries: Mutex::new(entries),
            persist_to,
            patterns,
            hits: AtomicU64::new(0),
        })
    }

    pub fn lookup(&self, key: &str) -> Option<Value> {
        if self.access == Access::Off {
            return None;
        }
        let found = self.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Whether a response for `method` on `path` may be written back.
    pub fn is_cacheable(&self, method: HttpMethod, path: &str) -> bool {
        self.access == Access::ReadWrite
            && method == HttpMethod::Get
            && self.patterns.iter().any(|p| p.matches(path))
    }

    /// Insert a response and persist the whole mapping. Returns `true` when
    /// the entry was added; existing keys are never overwritten.
    pub fn put(&self, method: HttpMethod, path: &str, key: &str, value: &Value) -> bool {
        if !self.is_cacheable(method, path) {
            return false;
        }
        let mut entries = self.lock();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), value.clone());
        debug!(key, "added response to auto cache");

        if let Some(path) = &self.persist_to {
            if let Err(err) = persist(path, &entries) {
                warn!(path = %path.display(), error = %err, "failed to persist auto cache");
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups answered from the cache since construction.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Where auto-cache writes go, if anywhere.
    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_to.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read the first candidate file that exists. Missing files are skipped;
/// unreadable or malformed ones are errors.
fn read_first(
    files: &CacheFiles,
) -> Result<Option<(PathBuf, BTreeMap<String, Value>)>, ConfigError> {
    for path in files.candidates() {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let value: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(map) = value else {
            return Err(ConfigError::CacheShape {
                path: path.to_path_buf(),
            });
        };
        return Ok(Some((path.to_path_buf(), map.into_iter().collect())));
    }
    Ok(None)
}

/// Write to a sibling temp file, then rename over the target.
fn persist(path: &Path, entries: &BTreeMap<String, Value>) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}
