// Tracker settings
// Loaded from ~/.config/flatwatch/config.toml (or --config)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest allowed `watch` period: one week.
pub const MAX_INTERVAL_MINS: u64 = 7 * 24 * 60;

const DEFAULT_SOURCE: &str = "https://www.halooglasi.com/nekretnine/izdavanje-stanova?grad_id_l-lokacija_id_l-mikrolokacija_id_l=40761%2C40784%2C40788%2C59345&cena_d_from=450&cena_d_to=600&cena_d_unit=4&kvadratura_d_from=40&kvadratura_d_unit=1&ostalo_id_ls=12100016";

/// Where listings come from and how to ask for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Search results URL; the page parameter is appended.
    pub url: String,
    /// Prefix for relative listing links.
    pub base_url: String,
    pub page_param: String,
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Stop after this many pages. Unset = until an empty page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE.to_string(),
            base_url: "https://www.halooglasi.com".to_string(),
            page_param: "page".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 30,
            max_pages: None,
        }
    }
}

impl SourceSettings {
    /// URL of result page `page` (1-based).
    pub fn page_url(&self, page: u32) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}{}={page}", self.url, self.page_param)
    }
}

/// CSS selectors and feature labels for the results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    pub listing: String,
    pub link: String,
    pub price: String,
    pub feature: String,
    pub legend: String,
    pub description: String,
    pub area_label: String,
    pub rooms_label: String,
    pub floor_label: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            listing: "div.product-item.product-list-item.real-estates".to_string(),
            link: "h3.product-title a".to_string(),
            price: "div.central-feature-wrapper span[data-value]".to_string(),
            feature: "li.col-p-1-3".to_string(),
            legend: "span.legend".to_string(),
            description: "span#plh51".to_string(),
            area_label: "Kvadratura".to_string(),
            rooms_label: "Broj soba".to_string(),
            floor_label: "Spratnost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file. Unset = platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flatwatch")
            .join("listings.db")
    }

    pub fn effective_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Fetch detail pages for listings still missing a description.
    pub fetch_descriptions: bool,
    /// `flatwatch watch` period.
    pub interval_mins: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { fetch_descriptions: true, interval_mins: 60 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub selectors: SelectorSettings,
    pub store: StoreSettings,
    pub run: RunSettings,
}

impl Settings {
    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flatwatch")
            .join("config.toml")
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(s).map_err(|e| ConfigError::Parse { path: None, message: e.to_string() })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse { path: None, message: e.to_string() })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { path: None, message } => ConfigError::Parse { path: Some(path.to_path_buf()), message },
            other => other,
        })
    }

    /// Load `path` (or the default location). A missing file means defaults;
    /// a file that exists but does not parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        log::debug!("loading config from {}", path.display());
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::Write { path: path.to_path_buf(), message: e.to_string() };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.to_toml()?).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let src = &self.source;
        if !(src.url.starts_with("http://") || src.url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!("source.url must be an http(s) URL, got '{}'", src.url)));
        }
        if src.page_param.trim().is_empty() {
            return Err(ConfigError::Validation("source.page_param is empty".into()));
        }
        if src.timeout_secs == 0 {
            return Err(ConfigError::Validation("source.timeout_secs must be > 0".into()));
        }
        if src.max_pages == Some(0) {
            return Err(ConfigError::Validation("source.max_pages must be > 0 (omit for no limit)".into()));
        }
        if self.run.interval_mins == 0 || self.run.interval_mins > MAX_INTERVAL_MINS {
            return Err(ConfigError::Validation(format!(
                "run.interval_mins must be between 1 and {MAX_INTERVAL_MINS}, got {}",
                self.run.interval_mins
            )));
        }

        let sel = &self.selectors;
        for (name, value) in [
            ("listing", &sel.listing),
            ("link", &sel.link),
            ("price", &sel.price),
            ("feature", &sel.feature),
            ("legend", &sel.legend),
            ("description", &sel.description),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("selectors.{name} is empty")));
            }
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.effective_path()
    }
}
