//! Ingestion inputs and their mapping onto collection records.
//!
//! Crawlers and spreadsheet importers emit two JSON shapes: web/PDF documents
//! `{text, url, title, type}` and FAQ pairs `{question, answer, sheet?}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::store::Collection;
use crate::core::errors::ApiError;

/// Placeholder source for web hits stored without a URL.
pub const WEB_SOURCE_FALLBACK: &str = "Web content";

const ID_HASH_LEN: usize = 24;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDocument {
    pub text: String,
    pub url: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QnaEntry {
    pub question: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

/// Anything the ingestion pipeline can embed and persist.
pub trait Ingestible {
    const COLLECTION: Collection;

    /// Whether the item may enter the store at all.
    fn is_valid(&self, local_corpus_marker: &str) -> bool;

    /// Stable id over every input field, so two items share an id only
    /// when they are identical.
    fn record_id(&self) -> String;

    /// Body that is stored and embedded.
    fn body(&self) -> String;

    fn metadata(&self) -> BTreeMap<String, String>;
}

impl Ingestible for WebDocument {
    const COLLECTION: Collection = Collection::Web;

    fn is_valid(&self, local_corpus_marker: &str) -> bool {
        if self.text.trim().is_empty() {
            return false;
        }
        is_absolute_web_url(&self.url)
            || (!local_corpus_marker.is_empty() && self.url.contains(local_corpus_marker))
    }

    fn record_id(&self) -> String {
        content_id("web", &[&self.url, &self.title, &self.doc_type, &self.text])
    }

    fn body(&self) -> String {
        self.text.clone()
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        let year = latest_year(&format!("{}{}{}", self.url, self.title, self.text))
            .map(|y| y.to_string())
            .unwrap_or_default();

        BTreeMap::from([
            ("url".to_string(), self.url.clone()),
            ("title".to_string(), self.title.clone()),
            ("type".to_string(), self.doc_type.clone()),
            ("year".to_string(), year),
        ])
    }
}

impl Ingestible for QnaEntry {
    const COLLECTION: Collection = Collection::Faq;

    fn is_valid(&self, _local_corpus_marker: &str) -> bool {
        !self.question.trim().is_empty() && !self.answer.trim().is_empty()
    }

    fn record_id(&self) -> String {
        content_id(
            "faq",
            &[
                &self.question,
                &self.answer,
                self.sheet.as_deref().unwrap_or_default(),
            ],
        )
    }

    fn body(&self) -> String {
        format!("Q: {}; A: {}", self.question, self.answer)
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::from([
            ("source".to_string(), "faq".to_string()),
            ("question".to_string(), self.question.clone()),
            ("answer".to_string(), self.answer.clone()),
        ]);
        if let Some(sheet) = self.sheet.as_ref().filter(|s| !s.is_empty()) {
            metadata.insert("sheet".to_string(), sheet.clone());
        }
        metadata
    }
}

fn is_absolute_web_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn year_pattern() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"20\d\d").expect("year pattern is valid"))
}

/// Largest `20xx` token in `text`, a recency hint rather than a parsed date.
pub fn latest_year(text: &str) -> Option<u16> {
    mentioned_years(text).into_iter().max()
}

/// Every `20xx` token in `text`, in order of appearance, without duplicates.
pub fn mentioned_years(text: &str) -> Vec<u16> {
    let mut years: Vec<u16> = Vec::new();
    for m in year_pattern().find_iter(text) {
        if let Ok(year) = m.as_str().parse::<u16>() {
            if !years.contains(&year) {
                years.push(year);
            }
        }
    }
    years
}

fn content_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    // length-prefixed so field boundaries cannot shift between inputs
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", prefix, &digest[..ID_HASH_LEN])
}

pub fn load_web_documents(path: &Path) -> Result<Vec<WebDocument>, ApiError> {
    load_json_array(path)
}

pub fn load_qna_entries(path: &Path) -> Result<Vec<QnaEntry>, ApiError> {
    load_json_array(path)
}

fn load_json_array<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, ApiError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ApiError::NotFound(format!("Cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        ApiError::BadRequest(format!("Invalid JSON in {}: {}", path.display(), e))
    })
}
