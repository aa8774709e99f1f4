//! Tracks which project ids earlier reports already published.

use crate::domain::model::{Project, SeenSet, Source};
use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Load the seen file. A missing file is a first run; a malformed one is an error.
pub async fn load_seen<S: Storage>(storage: &S, path: &str) -> Result<SeenSet> {
    if !storage.exists(path).await {
        tracing::info!("📭 No seen file at {}, treating every project as new", path);
        return Ok(SeenSet::default());
    }

    let data = storage.read_file(path).await?;
    let seen: SeenSet = serde_json::from_slice(&data).map_err(|e| EtlError::ProcessingError {
        message: format!("Seen file {} is malformed: {}", path, e),
    })?;

    tracing::debug!(
        "📬 Loaded seen file: {} article80, {} permits",
        seen.article80.len(),
        seen.permits.len()
    );
    Ok(seen)
}

/// Drop repeated ids (first occurrence kept) and flag projects not in `seen`.
pub fn mark_new(projects: Vec<Project>, source: Source, seen: &SeenSet) -> Vec<Project> {
    let known = seen.ids(source);
    let mut batch_ids = HashSet::new();
    let before = projects.len();

    let out: Vec<Project> = projects
        .into_iter()
        .filter(|p| batch_ids.insert(p.id.clone()))
        .map(|mut p| {
            p.is_new = !known.contains(&p.id);
            p
        })
        .collect();

    if out.len() < before {
        tracing::debug!(
            "🔁 Dropped {} duplicate {} ids",
            before - out.len(),
            source
        );
    }
    out
}

/// Seen set to persist after this run: previous ids plus every id in the report.
pub fn record_run(
    previous: &SeenSet,
    article80: &[Project],
    permits: &[Project],
    run_time: DateTime<Utc>,
) -> SeenSet {
    let mut next = previous.clone();
    next.ids_mut(Source::Article80)
        .extend(article80.iter().map(|p| p.id.clone()));
    next.ids_mut(Source::Permits)
        .extend(permits.iter().map(|p| p.id.clone()));
    next.last_run = Some(run_time);
    next
}

pub async fn save_seen<S: Storage>(storage: &S, path: &str, seen: &SeenSet) -> Result<()> {
    let data = serde_json::to_vec_pretty(seen)?;
    storage.write_file(path, &data).await?;
    tracing::info!(
        "💾 Seen file updated: {} ({} article80, {} permits)",
        path,
        seen.article80.len(),
        seen.permits.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::domain::model::{ProjectDetails, Relevance};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn project(id: &str, name: &str) -> Project {
        Project {
            id: id.to_string(),
            source: Source::Permits,
            name: name.to_string(),
            address: "N/A".to_string(),
            neighborhood: "Boston".to_string(),
            status: "Issued".to_string(),
            sqft: 0,
            valuation: 2_000_000.0,
            description: "N/A".to_string(),
            primary_date: String::new(),
            keywords_matched: vec![],
            relevance: Relevance::Low,
            is_new: false,
            details: ProjectDetails::Permit {
                permit_type: "N/A".to_string(),
                permit_number: id.to_string(),
                applicant: String::new(),
                worktype: String::new(),
                permit_type_descr: String::new(),
                expiration_date: String::new(),
                issued_date: "N/A".to_string(),
            },
            brjp: None,
        }
    }

    #[test]
    fn test_mark_new_against_seen() {
        let mut seen = SeenSet::default();
        seen.permits.insert("1".to_string());

        let out = mark_new(vec![project("1", "a"), project("2", "b")], Source::Permits, &seen);

        assert!(!out[0].is_new);
        assert!(out[1].is_new);
    }

    #[test]
    fn test_mark_new_ids_are_per_source() {
        let mut seen = SeenSet::default();
        seen.article80.insert("1".to_string());

        let out = mark_new(vec![project("1", "a")], Source::Permits, &seen);
        assert!(out[0].is_new);
    }

    #[test]
    fn test_mark_new_keeps_first_duplicate() {
        let out = mark_new(
            vec![project("5", "first"), project("6", "x"), project("5", "second")],
            Source::Permits,
            &SeenSet::default(),
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "first");
    }

    #[test]
    fn test_record_run_unions_ids() {
        let mut previous = SeenSet::default();
        previous.permits.insert("old".to_string());
        previous
            .extra
            .insert("notes".to_string(), serde_json::json!("kept"));
        let run_time = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

        let next = record_run(&previous, &[project("a80", "x")], &[project("new", "y")], run_time);

        assert!(next.permits.contains("old"));
        assert!(next.permits.contains("new"));
        assert!(next.article80.contains("a80"));
        assert_eq!(next.last_run, Some(run_time));
        assert_eq!(next.extra["notes"], "kept");
    }

    #[tokio::test]
    async fn test_load_missing_seen_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        let seen = load_seen(&storage, "seen_projects.json").await.unwrap();
        assert_eq!(seen, SeenSet::default());
    }

    #[tokio::test]
    async fn test_load_malformed_seen_is_error() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write_file("seen.json", b"[not json").await.unwrap();

        let err = load_seen(&storage, "seen.json").await.unwrap_err();
        assert!(matches!(err, EtlError::ProcessingError { .. }));
    }

    #[tokio::test]
    async fn test_save_and_reload_seen() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage
            .write_file("seen.json", br#"{"article80": ["1"], "version": 2}"#)
            .await
            .unwrap();

        let mut seen = load_seen(&storage, "seen.json").await.unwrap();
        assert!(seen.permits.is_empty());
        seen.permits.insert("p1".to_string());
        save_seen(&storage, "seen.json", &seen).await.unwrap();

        let reloaded = load_seen(&storage, "seen.json").await.unwrap();
        assert!(reloaded.article80.contains("1"));
        assert!(reloaded.permits.contains("p1"));
        assert_eq!(reloaded.extra["version"], 2);
    }
}
