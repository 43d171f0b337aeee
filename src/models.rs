use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// Evidence class of a cited source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    Research,
    Guideline,
    Review,
    MetaAnalysis,
    #[serde(other)]
    Other,
}

impl ReferenceKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Guideline => "guideline",
            Self::Review => "review",
            Self::MetaAnalysis => "meta-analysis",
            Self::Other => "other",
        }
    }
}

/// A literature reference a citation id points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReferenceKind>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_leading: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// The answer service sends `null` for reference fields it has no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Reference {
    pub fn new(id: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            journal: None,
            authors: None,
            published_date: None,
            pmid: None,
            kind: None,
            is_leading: false,
            is_new: false,
            relevance_score: None,
        }
    }

    /// Publication year, from an ISO date or a leading four-digit year
    pub fn published_year(&self) -> Option<i32> {
        let date = self.published_date.as_deref()?.trim();
        if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(parsed.year());
        }
        date.get(..4)?.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Seconds without a chunk before a session errors out; 0 disables
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: u64,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_true")]
    pub fallback_char_by_char: bool,
    #[serde(default = "default_char_delay")]
    pub fallback_char_delay_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub theme: ThemeConfig,
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_stall_timeout() -> u64 {
    120
}

const fn default_true() -> bool {
    true
}

const fn default_char_delay() -> u64 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            user_id: None,
            request_timeout: default_request_timeout(),
            stall_timeout: default_stall_timeout(),
            fallback_enabled: true,
            fallback_char_by_char: true,
            fallback_char_delay_ms: default_char_delay(),
            log_level: default_log_level(),
            theme: ThemeConfig::default(),
        }
    }
}

#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub answer_color: String,
    pub citation_color: String,
    pub border_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            answer_color: "white".to_string(),
            citation_color: "blue".to_string(),
            border_color: "cyan".to_string(),
        }
    }
}
