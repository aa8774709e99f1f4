use crate::domain::model::BrjpTargets;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://data.boston.gov/api/3/action";
pub const ARTICLE80_RESOURCE: &str = "32e3dc10-182d-4f51-bbd9-4c28b525f1ed";
pub const PERMITS_RESOURCE: &str = "6ddcd912-32a0-43df-9908-63574f8c7e77";

pub const OUTPUT_FORMATS: [&str; 3] = ["html", "csv", "json"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub source: SourceConfig,
    pub scoring: ScoringConfig,
    pub brjp: BrjpConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub article80_resource: String,
    pub permits_resource: String,
    pub page_size: usize,
    pub max_records: usize,
    pub timeout_seconds: u64,
    pub sql_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            article80_resource: ARTICLE80_RESOURCE.to_string(),
            permits_resource: PERMITS_RESOURCE.to_string(),
            page_size: 1000,
            max_records: 5000,
            timeout_seconds: 60,
            sql_timeout_seconds: 120,
            retry_attempts: 2,
            retry_delay_seconds: 5,
            user_agent: "BostonHVACTracker/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Permits declared below this are ignored.
    pub min_valuation: f64,
    /// Anything at or above this is high relevance regardless of keywords.
    pub auto_flag_valuation: f64,
    /// Project-type matches at or above this are promoted to high.
    pub high_value_type_threshold: f64,
    pub large_sqft_threshold: u64,
    /// Used to estimate Article 80 value when no development cost is filed.
    pub cost_per_sqft: f64,
    pub direct_hvac_keywords: Vec<String>,
    pub project_type_keywords: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_valuation: 1_000_000.0,
            auto_flag_valuation: 10_000_000.0,
            high_value_type_threshold: 5_000_000.0,
            large_sqft_threshold: 50_000,
            cost_per_sqft: 300.0,
            direct_hvac_keywords: to_strings(&[
                "hvac",
                "mechanical",
                "heating",
                "air conditioning",
                "ventilation",
                "boiler",
                "chiller",
                "heat pump",
                "ductwork",
                "rooftop unit",
                "cooling tower",
                "steam",
                "pipefitting",
                "sprinkler",
                "geothermal",
                "refrigeration",
            ]),
            project_type_keywords: to_strings(&[
                "laboratory",
                "life science",
                "hospital",
                "medical",
                "data center",
                "research",
                "hotel",
                "dormitory",
                "university",
                "school",
                "mixed-use",
                "mixed use",
                "office",
                "residential",
                "manufacturing",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrjpConfig {
    pub enabled: bool,
    pub resource_id: String,
    pub pipefitter_trades: Vec<String>,
    pub active_window_months: u32,
    pub targets: BrjpTargets,
}

impl BrjpConfig {
    /// Enabled and pointing at a real resource (an unsubstituted `${VAR}` does not count).
    pub fn is_active(&self) -> bool {
        let id = self.resource_id.trim();
        self.enabled && !id.is_empty() && !id.starts_with("${")
    }
}

impl Default for BrjpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            resource_id: String::new(),
            pipefitter_trades: to_strings(&[
                "Pipefitter",
                "Steamfitter",
                "Plumber",
                "Sprinkler Fitter",
                "Sheet Metal Worker",
                "Refrigeration Mechanic",
            ]),
            active_window_months: 6,
            targets: BrjpTargets::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: String,
    pub report_filename: String,
    pub seen_file: String,
    pub formats: Vec<String>,
    pub title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: "docs".to_string(),
            report_filename: "index.html".to_string(),
            seen_file: "seen_projects.json".to_string(),
            formats: vec!["html".to_string()],
            title: "Boston HVAC Construction Tracker".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn wants(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f == format)
    }

    pub fn report_path(&self) -> String {
        join(&self.output_dir, &self.report_filename)
    }

    pub fn export_path(&self, extension: &str) -> String {
        join(&self.output_dir, &format!("projects.{}", extension))
    }
}

fn join(dir: &str, file: &str) -> String {
    Path::new(dir).join(file).to_string_lossy().into_owned()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl TrackerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，缺少的欄位使用預設值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${BRJP_RESOURCE_ID})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("source.base_url", &self.source.base_url)?;
        validation::validate_non_empty_string(
            "source.article80_resource",
            &self.source.article80_resource,
        )?;
        validation::validate_non_empty_string(
            "source.permits_resource",
            &self.source.permits_resource,
        )?;
        validation::validate_positive_number("source.page_size", self.source.page_size, 1)?;
        validation::validate_positive_number(
            "source.max_records",
            self.source.max_records,
            self.source.page_size,
        )?;

        if self.scoring.auto_flag_valuation < self.scoring.min_valuation {
            return Err(EtlError::InvalidConfigValueError {
                field: "scoring.auto_flag_valuation".to_string(),
                value: self.scoring.auto_flag_valuation.to_string(),
                reason: "Must not be below scoring.min_valuation".to_string(),
            });
        }
        if self.scoring.direct_hvac_keywords.is_empty()
            && self.scoring.project_type_keywords.is_empty()
        {
            return Err(EtlError::ConfigValidationError {
                field: "scoring".to_string(),
                message: "At least one keyword list must be non-empty".to_string(),
            });
        }

        if self.brjp.enabled && !self.brjp.is_active() {
            tracing::warn!(
                "⚠️ brjp.enabled is set but brjp.resource_id is empty or unset; BRJP sections will be skipped"
            );
        }
        let targets = &self.brjp.targets;
        validation::validate_range("brjp.targets.resident_pct", targets.resident_pct, 0.0, 100.0)?;
        validation::validate_range("brjp.targets.poc_pct", targets.poc_pct, 0.0, 100.0)?;
        validation::validate_range("brjp.targets.women_pct", targets.women_pct, 0.0, 100.0)?;

        validation::validate_path("output.output_dir", &self.output.output_dir)?;
        validation::validate_path("output.report_filename", &self.output.report_filename)?;
        validation::validate_path("output.seen_file", &self.output.seen_file)?;
        validation::validate_choices("output.formats", &self.output.formats, &OUTPUT_FORMATS)?;

        Ok(())
    }
}

impl Validate for TrackerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
