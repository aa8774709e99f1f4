use crate::adapters::CkanClient;
use crate::config::TrackerConfig;
use crate::core::{brjp, classify, dedupe};
use crate::domain::model::{
    BrjpRows, BrjpSummary, ExtractedData, Record, Source, TransformResult,
};
use crate::domain::ports::{Pipeline, Storage};
use crate::report::{self, export};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};

/// Weekly tracker run: fetch both datasets (plus BRJP when enabled),
/// score, dedupe, render.
pub struct TrackerPipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) config: TrackerConfig,
    pub(crate) client: CkanClient,
    dry_run: bool,
    run_time: Option<DateTime<Utc>>,
}

impl<S: Storage> TrackerPipeline<S> {
    pub fn new(storage: S, config: TrackerConfig) -> Result<Self> {
        let client = CkanClient::new(config.source.clone())?;
        Ok(Self {
            storage,
            config,
            client,
            dry_run: false,
            run_time: None,
        })
    }

    /// Score and render, but leave the report and seen file untouched.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pin the run timestamp instead of using the wall clock.
    pub fn with_run_time(mut self, run_time: DateTime<Utc>) -> Self {
        self.run_time = Some(run_time);
        self
    }

    async fn fetch_source(&self, source: Source, resource_id: &str) -> Result<Vec<Record>> {
        tracing::info!("📡 Fetching {} ({})", source.label(), resource_id);
        match self.client.fetch_all(resource_id).await {
            Ok(records) => {
                tracing::info!("📡 {}: {} records", source.label(), records.len());
                Ok(records)
            }
            Err(e) => {
                tracing::warn!("⚠️ {} fetch failed: {}", source.label(), e);
                tracing::warn!("💡 {}", e.recovery_suggestion());
                Err(e)
            }
        }
    }

    async fn fetch_sql_or_empty(&self, label: &str, sql: &str) -> Vec<Record> {
        match self.client.fetch_sql(sql).await {
            Ok(rows) => {
                tracing::debug!("📊 BRJP {}: {} rows", label, rows.len());
                rows
            }
            Err(e) => {
                tracing::warn!("⚠️ BRJP {} query failed, section left empty: {}", label, e);
                Vec::new()
            }
        }
    }

    async fn fetch_brjp(&self) -> BrjpRows {
        let queries = brjp::build_queries(
            &self.config.brjp.resource_id,
            &self.config.brjp.pipefitter_trades,
        );
        BrjpRows {
            projects: self.fetch_sql_or_empty("projects", &queries.projects).await,
            pipefitter: self
                .fetch_sql_or_empty("pipefitter", &queries.pipefitter)
                .await,
            trades: self.fetch_sql_or_empty("trades", &queries.trades).await,
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for TrackerPipeline<S> {
    async fn extract(&self) -> Result<ExtractedData> {
        let source = &self.config.source;
        let article80 = self
            .fetch_source(Source::Article80, &source.article80_resource)
            .await;
        let permits = self
            .fetch_source(Source::Permits, &source.permits_resource)
            .await;

        // 兩個來源都失敗就中止，避免發布空報表並覆寫 seen 檔
        let (article80, permits) = match (article80, permits) {
            (Err(_), Err(e)) => {
                tracing::error!("❌ Both primary sources failed, nothing will be written");
                return Err(e);
            }
            (a, p) => (a.unwrap_or_default(), p.unwrap_or_default()),
        };

        let brjp = if self.config.brjp.is_active() {
            tracing::info!("📊 Fetching BRJP compliance data");
            Some(self.fetch_brjp().await)
        } else {
            if self.config.brjp.enabled {
                tracing::warn!("⚠️ No BRJP resource id configured, skipping BRJP sections");
            }
            None
        };

        Ok(ExtractedData {
            article80,
            permits,
            brjp,
        })
    }

    async fn transform(&self, data: ExtractedData) -> Result<TransformResult> {
        let run_time = self.run_time.unwrap_or_else(Utc::now);
        let scoring = &self.config.scoring;

        let article80 = classify::classify_all(&data.article80, Source::Article80, scoring);
        let permits = classify::classify_all(&data.permits, Source::Permits, scoring);
        tracing::info!(
            "🔎 Relevant: {} of {} Article 80, {} of {} permits",
            article80.len(),
            data.article80.len(),
            permits.len(),
            data.permits.len()
        );

        let previous = dedupe::load_seen(&self.storage, &self.config.output.seen_file).await?;
        let mut article80 = dedupe::mark_new(article80, Source::Article80, &previous);
        let mut permits = dedupe::mark_new(permits, Source::Permits, &previous);
        classify::sort_for_report(&mut article80);
        classify::sort_for_report(&mut permits);

        let brjp = match &data.brjp {
            Some(rows) => {
                let summary = brjp::summarize(
                    rows,
                    &self.config.brjp.targets,
                    self.config.brjp.active_window_months,
                    run_time,
                );
                let matched = brjp::match_projects(
                    article80.iter_mut().chain(permits.iter_mut()),
                    &summary.projects,
                );
                tracing::info!(
                    "📊 BRJP: {} projects, {} matched to tracker projects",
                    summary.projects.len(),
                    matched
                );
                summary
            }
            None => BrjpSummary::default(),
        };

        let seen = dedupe::record_run(&previous, &article80, &permits, run_time);

        Ok(TransformResult {
            article80,
            permits,
            brjp,
            seen,
            run_time,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let output = &self.config.output;
        let report_path = output.report_path();
        let html = report::render_report(&result, &self.config)?;

        if self.dry_run {
            tracing::info!(
                "🧪 Dry run: rendered {} bytes for {}, nothing written",
                html.len(),
                report_path
            );
            return Ok(report_path);
        }

        self.storage.write_file(&report_path, html.as_bytes()).await?;
        tracing::info!("📝 Report written to {}", report_path);

        if output.wants("csv") {
            let path = output.export_path("csv");
            let data = export::to_csv(result.article80.iter().chain(result.permits.iter()))?;
            self.storage.write_file(&path, &data).await?;
            tracing::info!("📝 CSV export written to {}", path);
        }
        if output.wants("json") {
            let path = output.export_path("json");
            let data = export::to_json(&result.article80, &result.permits, result.run_time)?;
            self.storage.write_file(&path, &data).await?;
            tracing::info!("📝 JSON export written to {}", path);
        }

        // 報表成功寫出後才更新 seen 檔
        dedupe::save_seen(&self.storage, &output.seen_file, &result.seen).await?;

        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EtlError;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        fail_on: Option<String>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
                fail_on: None,
            }
        }

        /// Writes to `path` fail with a permission error.
        fn failing_on(path: &str) -> Self {
            Self {
                fail_on: Some(path.to_string()),
                ..Self::new()
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }

        async fn file_count(&self) -> usize {
            self.files.lock().await.len()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("Write denied: {}", path),
                )));
            }
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().await.contains_key(path)
        }
    }

    fn config(base_url: String) -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.source.base_url = base_url;
        config.source.article80_resource = "a80".to_string();
        config.source.permits_resource = "permits".to_string();
        config.source.retry_attempts = 0;
        config.output.formats = vec!["html".to_string(), "csv".to_string(), "json".to_string()];
        config
    }

    fn ckan(records: serde_json::Value) -> serde_json::Value {
        json!({"success": true, "result": {"records": records}})
    }

    fn mock_sources(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search")
                .query_param("resource_id", "a80");
            then.status(200).json_body(ckan(json!([
                {"_id": 1, "project__project_name": "Harbor Lab", "description": "laboratory with chiller plant",
                 "project_street_number": "10", "project_street_name": "Fan Pier", "project_street_suffix": "Boulevard",
                 "gross_square_footage": "120000", "project__record_type": "Large Project"},
                {"_id": 2, "project__project_name": "Porch", "gross_square_footage": "400"}
            ])));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search")
                .query_param("resource_id", "permits");
            then.status(200).json_body(ckan(json!([
                {"_id": 11, "PERMITNUMBER": "ALT1", "DECLARED_VALUATION": "$3,000,000",
                 "DESCRIPTION": "HVAC replacement", "ADDRESS": "1 Main St"},
                {"_id": 11, "PERMITNUMBER": "ALT1", "DECLARED_VALUATION": "$3,000,000",
                 "DESCRIPTION": "HVAC replacement duplicate", "ADDRESS": "1 Main St"},
                {"_id": 12, "PERMITNUMBER": "ALT2", "DECLARED_VALUATION": "500000",
                 "DESCRIPTION": "HVAC small"}
            ])));
        });
    }

    fn run_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_full_run_writes_report_exports_and_seen() {
        let server = MockServer::start();
        mock_sources(&server);
        let storage = MockStorage::new();
        let pipeline = TrackerPipeline::new(storage.clone(), config(server.base_url()))
            .unwrap()
            .with_run_time(run_time());

        let data = pipeline.extract().await.unwrap();
        assert_eq!(data.record_count(), 5);
        assert!(data.brjp.is_none());

        let result = pipeline.transform(data).await.unwrap();
        assert_eq!(result.article80.len(), 1);
        assert_eq!(result.permits.len(), 1);
        assert_eq!(result.new_count(), 2);
        assert_eq!(result.permits[0].name, "HVAC replacement");

        let path = pipeline.load(result).await.unwrap();
        assert_eq!(path, "docs/index.html");

        let html = String::from_utf8(storage.get_file("docs/index.html").await.unwrap()).unwrap();
        assert!(html.contains("Harbor Lab"));
        assert!(storage.get_file("docs/projects.csv").await.is_some());
        assert!(storage.get_file("docs/projects.json").await.is_some());

        let seen: serde_json::Value =
            serde_json::from_slice(&storage.get_file("seen_projects.json").await.unwrap()).unwrap();
        assert_eq!(seen["article80"], json!(["1"]));
        assert_eq!(seen["permits"], json!(["11"]));
        assert_eq!(seen["last_run"], "2026-10-19T12:00:00Z");
    }

    #[tokio::test]
    async fn test_one_source_failure_is_tolerated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search")
                .query_param("resource_id", "a80");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search")
                .query_param("resource_id", "permits");
            then.status(200).json_body(ckan(json!([
                {"_id": 5, "DECLARED_VALUATION": "20000000", "DESCRIPTION": "Tower"}
            ])));
        });

        let pipeline = TrackerPipeline::new(MockStorage::new(), config(server.base_url())).unwrap();
        let data = pipeline.extract().await.unwrap();

        assert!(data.article80.is_empty());
        assert_eq!(data.permits.len(), 1);
    }

    #[tokio::test]
    async fn test_both_sources_failing_aborts() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/datastore_search");
            then.status(503);
        });

        let storage = MockStorage::new();
        let pipeline = TrackerPipeline::new(storage.clone(), config(server.base_url())).unwrap();
        let err = pipeline.extract().await.unwrap_err();

        assert!(matches!(err, EtlError::ApiError(_)));
        assert_eq!(storage.file_count().await, 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let server = MockServer::start();
        mock_sources(&server);
        let storage = MockStorage::new();
        let pipeline = TrackerPipeline::new(storage.clone(), config(server.base_url()))
            .unwrap()
            .dry_run(true);

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();
        let path = pipeline.load(result).await.unwrap();

        assert_eq!(path, "docs/index.html");
        assert_eq!(storage.file_count().await, 0);
    }

    #[tokio::test]
    async fn test_previously_seen_projects_not_new() {
        let server = MockServer::start();
        mock_sources(&server);
        let storage = MockStorage::new();
        storage
            .write_file("seen_projects.json", br#"{"article80": ["1"], "permits": []}"#)
            .await
            .unwrap();
        let pipeline = TrackerPipeline::new(storage.clone(), config(server.base_url())).unwrap();

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();

        assert!(!result.article80[0].is_new);
        assert!(result.permits[0].is_new);
    }

    #[tokio::test]
    async fn test_brjp_enrichment_matches_by_address() {
        let server = MockServer::start();
        mock_sources(&server);
        let mut cfg = config(server.base_url());
        cfg.brjp.enabled = true;
        cfg.brjp.resource_id = "brjp-res".to_string();
        let queries = brjp::build_queries(&cfg.brjp.resource_id, &cfg.brjp.pipefitter_trades);

        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search_sql")
                .query_param("sql", queries.projects.as_str());
            then.status(200).json_body(ckan(json!([
                {"agency": "OED", "compliance_project_name": "Main St Reno", "project_address": "1 Main Street, Suite 4",
                 "total_hours": "1000", "resident_hours": "600", "poc_hours": "450", "women_hours": "150",
                 "last_period": "2026-09-30"}
            ])));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search_sql")
                .query_param("sql", queries.pipefitter.as_str());
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/datastore_search_sql")
                .query_param("sql", queries.trades.as_str());
            then.status(200).json_body(ckan(json!([
                {"trade": "Pipefitter", "total_hours": "400", "project_count": "2"}
            ])));
        });

        let pipeline = TrackerPipeline::new(MockStorage::new(), cfg)
            .unwrap()
            .with_run_time(run_time());

        let data = pipeline.extract().await.unwrap();
        let rows = data.brjp.as_ref().unwrap();
        assert_eq!(rows.projects.len(), 1);
        // 單一查詢失敗只留下空區塊
        assert!(rows.pipefitter.is_empty());
        assert_eq!(rows.trades.len(), 1);

        let result = pipeline.transform(data).await.unwrap();
        let matched = result.permits[0].brjp.as_ref().unwrap();
        assert_eq!(matched.name, "Main St Reno");
        assert_eq!(matched.project_status, crate::domain::model::ActivityStatus::Active);
        assert!(result.article80[0].brjp.is_none());
        assert_eq!(result.brjp.aggregates.as_ref().unwrap().compliant, 1);
    }

    const SEEN: &[u8] = br#"{"article80": ["1"], "permits": []}"#;

    async fn seeded(storage: MockStorage) -> MockStorage {
        storage.write_file("seen_projects.json", SEEN).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_failed_report_write_keeps_seen_file() {
        let server = MockServer::start();
        mock_sources(&server);
        let storage = seeded(MockStorage::failing_on("docs/index.html")).await;
        let pipeline = TrackerPipeline::new(storage.clone(), config(server.base_url())).unwrap();

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();
        let err = pipeline.load(result).await.unwrap_err();

        assert!(matches!(err, EtlError::IoError(_)));
        let seen = storage.get_file("seen_projects.json").await.unwrap();
        assert_eq!(seen, SEEN);
        assert!(storage.get_file("docs/projects.csv").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_export_write_keeps_seen_file() {
        let server = MockServer::start();
        mock_sources(&server);
        let storage = seeded(MockStorage::failing_on("docs/projects.json")).await;
        let pipeline = TrackerPipeline::new(storage.clone(), config(server.base_url())).unwrap();

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();

        assert!(pipeline.load(result).await.is_err());
        assert!(storage.get_file("docs/index.html").await.is_some());
        let seen = storage.get_file("seen_projects.json").await.unwrap();
        assert_eq!(seen, SEEN);
    }

    #[tokio::test]
    async fn test_brjp_skipped_without_resource_id() {
        let server = MockServer::start();
        mock_sources(&server);
        let sql = server.mock(|when, then| {
            when.method(GET).path("/datastore_search_sql");
            then.status(200).json_body(ckan(json!([])));
        });
        let mut cfg = config(server.base_url());
        cfg.brjp.enabled = true;
        cfg.brjp.resource_id = "${BRJP_RESOURCE_ID}".to_string();

        let pipeline = TrackerPipeline::new(MockStorage::new(), cfg).unwrap();
        let data = pipeline.extract().await.unwrap();

        assert!(data.brjp.is_none());
        assert_eq!(data.permits.len(), 3);
        sql.assert_hits(0);
    }
}
