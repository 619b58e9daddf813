//! Snapshot sources
//!
//! - `File`: a JSON file, re-read whenever its mtime changes.
//! - `Firestore`: the REST list-documents endpoint, polled on every fetch.

use super::firestore::{list_documents_url, ListDocumentsResponse};
use super::Snapshot;
use crate::config::{SourceKind, SourceSettings};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};

/// Upper bound on pages read per fetch, so a misbehaving server cannot loop us forever.
const MAX_PAGES: usize = 50;

pub struct FileSource {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_mtime: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).ok().and_then(|m| m.modified().ok())
    }

    async fn read(&self) -> Result<Snapshot> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot file {:?}", self.path))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file {:?}", self.path))?;
        Ok(Snapshot::from_json(&value, Utc::now()))
    }
}

pub struct FirestoreSource {
    project: String,
    collection: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl FirestoreSource {
    pub fn new(
        project: String,
        collection: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            project,
            collection,
            api_key,
            client,
        })
    }

    async fn fetch_all(&self) -> Result<Snapshot> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let url = list_documents_url(
                &self.project,
                &self.collection,
                self.api_key.as_deref(),
                page_token.as_deref(),
            )?;
            trace!("Source: Firestore page {} for {}", page, self.collection);
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Firestore request failed")?
                .error_for_status()
                .context("Firestore returned an error status")?;
            let body: ListDocumentsResponse = response
                .json()
                .await
                .context("Failed to decode Firestore response")?;
            documents.extend(body.documents);
            match body.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        let mut by_id = serde_json::Map::new();
        for doc in &documents {
            by_id.insert(doc.id().to_string(), doc.to_plain());
        }
        debug!("Source: Firestore returned {} documents", by_id.len());
        Ok(Snapshot::from_json(&serde_json::Value::Object(by_id), Utc::now()))
    }
}

pub enum SnapshotSource {
    File(FileSource),
    Firestore(FirestoreSource),
}

impl SnapshotSource {
    pub fn from_settings(settings: &SourceSettings) -> Result<Self> {
        match settings.kind {
            SourceKind::File => {
                let path = settings.snapshot_file_path();
                info!("Source: watching snapshot file {:?}", path);
                Ok(Self::File(FileSource::new(path)))
            }
            SourceKind::Firestore => {
                let project = settings
                    .firestore_project
                    .clone()
                    .context("Firestore source requires a project id")?;
                info!(
                    "Source: polling Firestore project {} collection {}",
                    project, settings.collection
                );
                Ok(Self::Firestore(FirestoreSource::new(
                    project,
                    settings.collection.clone(),
                    settings.firestore_api_key.clone(),
                    Duration::from_secs(settings.request_timeout_secs),
                )?))
            }
        }
    }

    /// Next snapshot if anything changed since the last call. Firestore always returns one.
    pub async fn next_snapshot(&mut self) -> Result<Option<Snapshot>> {
        match self {
            Self::File(source) => {
                let mtime = source.mtime();
                if mtime.is_none() {
                    debug!("Source: snapshot file {:?} does not exist yet", source.path);
                    return Ok(None);
                }
                if mtime == source.last_mtime {
                    return Ok(None);
                }
                let snapshot = source.read().await?;
                source.last_mtime = mtime;
                debug!(
                    "Source: snapshot file changed, {} vehicles",
                    snapshot.vehicles.len()
                );
                Ok(Some(snapshot))
            }
            Self::Firestore(source) => source.fetch_all().await.map(Some),
        }
    }

    /// Read the current state regardless of change detection.
    pub async fn snapshot_now(&mut self) -> Result<Snapshot> {
        match self {
            Self::File(source) => {
                let snapshot = source.read().await?;
                source.last_mtime = source.mtime();
                Ok(snapshot)
            }
            Self::Firestore(source) => source.fetch_all().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reports_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipments.json");
        let mut source = SnapshotSource::File(FileSource::new(path.clone()));

        assert!(source.next_snapshot().await.unwrap().is_none());

        std::fs::write(&path, r#"[{"truck_id": "GJ-01-LIVE", "last_updated": 5}]"#).unwrap();
        let snapshot = source.next_snapshot().await.unwrap().expect("first read");
        assert_eq!(snapshot.vehicles[0].last_updated_ms, 5);

        assert!(source.next_snapshot().await.unwrap().is_none());
        assert_eq!(source.snapshot_now().await.unwrap().vehicles.len(), 1);
    }

    #[tokio::test]
    async fn test_file_source_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipments.json");
        std::fs::write(&path, "not json").unwrap();
        let mut source = SnapshotSource::File(FileSource::new(path));
        assert!(source.next_snapshot().await.is_err());
    }

    #[test]
    fn test_firestore_requires_project() {
        let settings = SourceSettings {
            kind: SourceKind::Firestore,
            ..SourceSettings::default()
        };
        assert!(SnapshotSource::from_settings(&settings).is_err());
    }
}
