use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, de::DeserializeOwned};

pub const SOURCE_NAME: &str = "Ministry of Health, Labour and Welfare";
pub const SOURCE_ENTITY: &str = "Japan";
pub const DEFAULT_SOURCE_URL: &str =
    "https://www.mhlw.go.jp/stf/seisakunitsuite/newpage_00023.html";
pub const DEFAULT_BASE_URL: &str = "https://www.mhlw.go.jp";

/// Serialization of the extracted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// The `MHLW_*` env vars needed for scraping.
#[derive(Debug, Deserialize)]
pub struct ScrapingEnv {
    #[serde(default = "default_source_url")]
    source_url: String,
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_output_path")]
    output_path: PathBuf,
    #[serde(default)]
    output_format: OutputFormat,
    #[serde(default = "default_hash_path")]
    hash_path: String,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    only_date: Option<NaiveDate>,
    #[serde(default = "default_max_concurrent_downloads")]
    max_concurrent_downloads: usize,
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data/mhlw_hospitalization.csv")
}

fn default_hash_path() -> String {
    "cache/mhlw_hospitalization.hash".to_string()
}

fn default_max_concurrent_downloads() -> usize {
    1
}

#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    pub source_url: String,
    pub base_url: String,
    pub output_path: PathBuf,
    pub output_format: OutputFormat,
    /// `None` disables the page hash cache.
    pub hash_path: Option<PathBuf>,
    pub force: bool,
    pub debug: bool,
    pub only_date: Option<NaiveDate>,
    pub max_concurrent_downloads: usize,
}

impl ScrapingConfig {
    pub fn new() -> anyhow::Result<Self> {
        let scraping_env = ScrapingEnv::load_from_env()?;
        Ok(Self::from(scraping_env))
    }

    /// Resolve an attachment href found on the index page.
    pub fn attachment_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if href.starts_with('/') {
            format!("{base}{href}")
        } else {
            format!("{base}/{href}")
        }
    }
}

impl From<ScrapingEnv> for ScrapingConfig {
    fn from(env: ScrapingEnv) -> Self {
        let hash_path = if env.hash_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(env.hash_path))
        };
        Self {
            source_url: env.source_url,
            base_url: env.base_url,
            output_path: env.output_path,
            output_format: env.output_format,
            hash_path,
            force: env.force,
            debug: env.debug,
            only_date: env.only_date,
            max_concurrent_downloads: env.max_concurrent_downloads.max(1),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            base_url: default_base_url(),
            output_path: default_output_path(),
            output_format: OutputFormat::Csv,
            hash_path: Some(PathBuf::from(default_hash_path())),
            force: false,
            debug: false,
            only_date: None,
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

pub struct ReportDateExtractor {
    // Matches Japanese dates such as `2020年5月13日`.
    date_extraction_regex: Regex,
}

impl ReportDateExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let date_extraction_regex = Regex::new(r"(20[0-9]*?)年(.*?)月(.*?)日")?;
        Ok(Self {
            date_extraction_regex,
        })
    }

    pub fn has_date(&self, text: &str) -> bool {
        self.date_extraction_regex.is_match(text)
    }

    pub fn find_date(&self, text: &str) -> anyhow::Result<NaiveDate> {
        let Some(caps) = self.date_extraction_regex.captures(text) else {
            return Err(anyhow::anyhow!("couldn't find a date in: {}", text));
        };
        let number = |i: usize| -> anyhow::Result<u32> {
            let raw = caps.get(i).map_or("", |m| m.as_str()).trim();
            raw.parse::<u32>()
                .with_context(|| format!("invalid date component {raw:?}"))
        };
        let year = number(1)? as i32;
        let month = number(2)?;
        let day = number(3)?;
        NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| anyhow::anyhow!("invalid date {year}-{month}-{day}"))
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config = envy::prefixed("MHLW_")
            .from_env::<Self>()
            .context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
