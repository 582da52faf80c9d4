/// Configuration for the catalog scraper
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base URL of the course catalog.
const CATALOG_URL: &str = "http://catalog.oregonstate.edu/";

/// Top-level scraper configuration.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Base URL that relative detail-page links are resolved against
    pub catalog_url: String,
    /// Search page listing every course, relative to `catalog_url`
    pub search_path: String,
    /// Query parameter appended to detail pages to show every column
    pub columns_param: (String, String),
    pub selectors: SelectorConfig,
    pub http: HttpConfig,
    pub commit: CommitConfig,
    pub retry: RetryPolicy,
    pub storage: StorageConfig,
}

/// CSS selectors and markers used to find things on catalog pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Id prefix of anchors on the search page that link to detail pages
    pub link_id_prefix: String,
    /// Substring every detail-page href contains
    pub detail_path_marker: String,
    /// The course heading, `"CS 161 (4) Introduction to Computer Science I"`
    pub heading: String,
    /// The element whose own text is the course description
    pub description: String,
    /// The offerings table holding one row per section
    pub offerings_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Attempts after the first for a retryable fetch failure
    pub fetch_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub timeout_secs: u64,
    /// Attempts after the first for a retryable storage failure
    pub retries: u32,
}

/// Exponential backoff settings shared by fetch and commit retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Where committed courses are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Sqlite { path: PathBuf },
    /// Keeps everything in process memory; nothing survives the run
    Memory,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            catalog_url: CATALOG_URL.to_string(),
            search_path: "CourseSearcher.aspx?chr=abg".to_string(),
            columns_param: (
                "Columns".to_string(),
                "abcdefghijklmnopqrstuvwxyz{".to_string(),
            ),
            selectors: SelectorConfig::default(),
            http: HttpConfig::default(),
            commit: CommitConfig::default(),
            retry: RetryPolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            link_id_prefix: "ctl00_ContentPlaceHolder".to_string(),
            detail_path_marker: "CourseDetail".to_string(),
            heading: "h3".to_string(),
            description: "#aspnetForm".to_string(),
            offerings_table: "#ctl00_ContentPlaceHolder1_SOCListUC1_gvOfferings".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            connect_timeout_secs: 10,
            fetch_timeout_secs: 30,
            fetch_retries: 2,
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            retries: 3,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: PathBuf::from("catalog.sqlite3"),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl CommitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScraperConfig {
    /// Loads a configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the JSON config file
    ///
    /// # Returns
    /// * `Ok(ScraperConfig)` - Loaded configuration, defaults for missing fields
    /// * `Err` - If the file can't be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = fs::read_to_string(path)?;
        let config: ScraperConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}
