//! Machine translation through a LibreTranslate-compatible endpoint.
//!
//! Results are cached on disk per `(language, text)` and expire after the configured TTL.
//! English input passes through untouched. Any failure yields the original text.

use super::is_supported;
use crate::config::TranslationSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CACHE_PREFIX: &str = "libretranslate_cache_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    /// Epoch millis when the entry was stored.
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

pub fn cache_key(text: &str, lang: &str) -> String {
    format!("{}{}_{}", CACHE_PREFIX, lang, text)
}

pub struct AutoTranslator {
    endpoint: String,
    client: reqwest::Client,
    cache_path: PathBuf,
    ttl: Duration,
    cache: BTreeMap<String, CacheEntry>,
}

impl AutoTranslator {
    pub fn new(settings: &TranslationSettings, cache_path: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        let cache = Self::load_cache(&cache_path);
        Ok(Self {
            endpoint: settings.endpoint.clone(),
            client,
            cache_path,
            ttl: Duration::from_secs(settings.cache_ttl_days * 24 * 60 * 60),
            cache,
        })
    }

    fn load_cache(path: &Path) -> BTreeMap<String, CacheEntry> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Translate: ignoring unreadable cache {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }

    pub fn save_cache(&self) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
        }
        let json = serde_json::to_string(&self.cache).context("Failed to serialize translation cache")?;
        std::fs::write(&self.cache_path, json)
            .with_context(|| format!("Failed to write translation cache {:?}", self.cache_path))
    }

    /// Cached translation still within the TTL at `now_ms`. Expired entries are dropped.
    pub fn cached_at(&mut self, text: &str, lang: &str, now_ms: i64) -> Option<String> {
        let key = cache_key(text, lang);
        let entry = self.cache.get(&key)?;
        if now_ms.saturating_sub(entry.timestamp) < self.ttl.as_millis() as i64 {
            return Some(entry.value.clone());
        }
        debug!("Translate: cache entry for {:?} ({}) expired", text, lang);
        self.cache.remove(&key);
        None
    }

    pub fn store_at(&mut self, text: &str, lang: &str, value: &str, now_ms: i64) {
        self.cache.insert(
            cache_key(text, lang),
            CacheEntry {
                value: value.to_string(),
                timestamp: now_ms,
            },
        );
    }

    async fn request(&self, text: &str, lang: &str) -> Result<Option<String>> {
        let body = TranslateRequest {
            q: text,
            source: "en",
            target: lang,
            format: "text",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("Translation request failed")?
            .error_for_status()
            .context("Translation endpoint returned an error status")?;
        let parsed: TranslateResponse = response
            .json()
            .await
            .context("Failed to decode translation response")?;
        Ok(parsed.translated_text.filter(|s| !s.is_empty()))
    }

    /// Translate English `text` into `lang`, falling back to `text` on any failure.
    pub async fn translate(&mut self, text: &str, lang: &str) -> String {
        if lang == "en" || text.trim().is_empty() {
            return text.to_string();
        }
        if !is_supported(lang) {
            debug!("Translate: unsupported language {}, passing through", lang);
            return text.to_string();
        }
        let now = chrono::Utc::now().timestamp_millis();
        if let Some(hit) = self.cached_at(text, lang, now) {
            return hit;
        }
        match self.request(text, lang).await {
            Ok(Some(translated)) => {
                self.store_at(text, lang, &translated, now);
                if let Err(e) = self.save_cache() {
                    warn!("Translate: {:#}", e);
                }
                translated
            }
            Ok(None) => {
                warn!("Translate: empty translation for {:?} ({})", text, lang);
                text.to_string()
            }
            Err(e) => {
                warn!("Translate: {:#}", e);
                text.to_string()
            }
        }
    }

    pub async fn translate_many(&mut self, texts: &[String], lang: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.translate(text, lang).await);
        }
        out
    }

    /// Drop every cached translation. Returns how many were removed.
    pub fn clear_cache(&mut self) -> Result<usize> {
        let removed = self.cache.len();
        self.cache.clear();
        self.save_cache()?;
        info!("Translate: cleared {} cached translation(s)", removed);
        Ok(removed)
    }

    /// Approximate cache footprint: serialized entry sizes in KB.
    pub fn cache_size_kb(&self) -> f64 {
        let bytes: usize = self
            .cache
            .values()
            .map(|entry| serde_json::to_string(entry).map(|s| s.len()).unwrap_or(0))
            .sum();
        bytes as f64 / 1024.0
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn translator(dir: &tempfile::TempDir) -> AutoTranslator {
        let settings = TranslationSettings {
            endpoint: "http://127.0.0.1:9/translate".to_string(),
            timeout_secs: 1,
            ..TranslationSettings::default()
        };
        AutoTranslator::new(&settings, dir.path().join("translation-cache.json")).unwrap()
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("Hello", "hi"), "libretranslate_cache_hi_Hello");
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let mut tr = translator(&dir);
        tr.store_at("Hello", "hi", "नमस्ते", 0);
        assert_eq!(tr.cached_at("Hello", "hi", 6 * DAY_MS).as_deref(), Some("नमस्ते"));
        assert!(tr.cached_at("Hello", "gu", 6 * DAY_MS).is_none());
        assert!(tr.cached_at("Hello", "hi", 7 * DAY_MS).is_none());
        assert_eq!(tr.cache_len(), 0);
    }

    #[test]
    fn test_cache_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut tr = translator(&dir);
        tr.store_at("Fleet", "gu", "કાફલો", 1);
        tr.save_cache().unwrap();
        assert!(tr.cache_size_kb() > 0.0);

        let mut reloaded = translator(&dir);
        assert_eq!(reloaded.cache_len(), 1);
        assert_eq!(reloaded.clear_cache().unwrap(), 1);
        assert_eq!(translator(&dir).cache_len(), 0);
    }

    #[tokio::test]
    async fn test_english_and_unsupported_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let mut tr = translator(&dir);
        assert_eq!(tr.translate("Hello", "en").await, "Hello");
        assert_eq!(tr.translate("Hello", "fr").await, "Hello");
    }

    #[tokio::test]
    async fn test_failed_request_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let mut tr = translator(&dir);
        let out = tr
            .translate_many(&["Temperature".to_string(), "Shock".to_string()], "hi")
            .await;
        assert_eq!(out, vec!["Temperature".to_string(), "Shock".to_string()]);
        assert_eq!(tr.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut tr = translator(&dir);
        tr.store_at("Hello", "hi", "नमस्ते", chrono::Utc::now().timestamp_millis());
        assert_eq!(tr.translate("Hello", "hi").await, "नमस्ते");
    }
}
