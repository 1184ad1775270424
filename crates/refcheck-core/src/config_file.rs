use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub lookups: Option<LookupsConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub parsing: Option<ParsingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub scopus_api_key: Option<String>,
    pub serpapi_key: Option<String>,
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupsConfig {
    pub disabled: Option<Vec<String>>,
    pub similarity_threshold: Option<f64>,
    pub secondary_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Raw `[parsing]` table. Turned into a parsing config by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsingSection {
    pub extra_heading_keywords: Option<Vec<String>>,
    pub extra_stop_keywords: Option<Vec<String>>,
    pub heading_max_chars: Option<usize>,
    pub split_backoff_chars: Option<usize>,
    pub whole_document_fallback: Option<bool>,
    pub ieee_fast_path: Option<bool>,
}

/// Platform config directory path: `<config_dir>/refcheck/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("refcheck").join("config.toml"))
}

/// Load config by cascading CWD `.refcheck.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".refcheck.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Overlay value if set, else base value.
fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (b, o) = (&base, &overlay);
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            scopus_api_key: pick(&o.api_keys, &b.api_keys, |a| a.scopus_api_key.clone()),
            serpapi_key: pick(&o.api_keys, &b.api_keys, |a| a.serpapi_key.clone()),
            crossref_mailto: pick(&o.api_keys, &b.api_keys, |a| a.crossref_mailto.clone()),
        }),
        lookups: Some(LookupsConfig {
            disabled: pick(&o.lookups, &b.lookups, |l| l.disabled.clone()),
            similarity_threshold: pick(&o.lookups, &b.lookups, |l| l.similarity_threshold),
            secondary_limit: pick(&o.lookups, &b.lookups, |l| l.secondary_limit),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&o.concurrency, &b.concurrency, |c| c.num_workers),
            timeout_secs: pick(&o.concurrency, &b.concurrency, |c| c.timeout_secs),
        }),
        parsing: Some(ParsingSection {
            extra_heading_keywords: pick(&o.parsing, &b.parsing, |p| {
                p.extra_heading_keywords.clone()
            }),
            extra_stop_keywords: pick(&o.parsing, &b.parsing, |p| p.extra_stop_keywords.clone()),
            heading_max_chars: pick(&o.parsing, &b.parsing, |p| p.heading_max_chars),
            split_backoff_chars: pick(&o.parsing, &b.parsing, |p| p.split_backoff_chars),
            whole_document_fallback: pick(&o.parsing, &b.parsing, |p| p.whole_document_fallback),
            ieee_fast_path: pick(&o.parsing, &b.parsing, |p| p.ieee_fast_path),
        }),
    }
}

impl ConfigFile {
    /// Copy every value the file sets onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(keys) = &self.api_keys {
            if keys.scopus_api_key.is_some() {
                config.scopus_api_key = keys.scopus_api_key.clone();
            }
            if keys.serpapi_key.is_some() {
                config.serpapi_key = keys.serpapi_key.clone();
            }
            if keys.crossref_mailto.is_some() {
                config.crossref_mailto = keys.crossref_mailto.clone();
            }
        }
        if let Some(lookups) = &self.lookups {
            if let Some(disabled) = &lookups.disabled {
                config.disabled_lookups = disabled.clone();
            }
            if let Some(threshold) = lookups.similarity_threshold {
                config.similarity_threshold = threshold.clamp(0.0, 1.0);
            }
            if let Some(limit) = lookups.secondary_limit {
                config.secondary_limit = limit;
            }
        }
        if let Some(concurrency) = &self.concurrency {
            if let Some(n) = concurrency.num_workers {
                config.num_workers = n.max(1);
            }
            if let Some(t) = concurrency.timeout_secs {
                config.timeout_secs = t;
            }
        }
    }
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}
