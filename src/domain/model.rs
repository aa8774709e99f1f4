use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Raw CKAN datastore row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    /// First present, non-null field among `keys`, rendered as text.
    /// CKAN returns numbers for some columns, so those are stringified.
    pub fn text(&self, keys: &[&str]) -> String {
        keys.iter()
            .filter_map(|k| self.data.get(*k))
            .find(|v| !v.is_null())
            .map(value_to_string)
            .unwrap_or_default()
    }

    pub fn number(&self, keys: &[&str]) -> f64 {
        let raw = self.text(keys);
        raw.trim().parse::<f64>().unwrap_or(0.0)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Record {
    fn from(obj: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            data: obj.into_iter().collect(),
        }
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Article80,
    Permits,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Article80 => "article80",
            Source::Permits => "permits",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Source::Article80 => "Article 80",
            Source::Permits => "Permit",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order doubles as report order: high first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
            Relevance::Low => "low",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProjectDetails {
    Article80 {
        record_type: String,
        proposed_use: String,
        board_approval_date: String,
        last_filed_date: String,
        website_url: String,
    },
    Permit {
        permit_type: String,
        permit_number: String,
        applicant: String,
        worktype: String,
        permit_type_descr: String,
        expiration_date: String,
        issued_date: String,
    },
}

/// A record that passed the relevance gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub source: Source,
    pub name: String,
    pub address: String,
    pub neighborhood: String,
    pub status: String,
    pub sqft: u64,
    /// Declared valuation for permits, estimated for Article 80.
    pub valuation: f64,
    pub description: String,
    pub primary_date: String,
    pub keywords_matched: Vec<String>,
    pub relevance: Relevance,
    pub is_new: bool,
    pub details: ProjectDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brjp: Option<BrjpProject>,
}

impl Project {
    /// Matched keywords with repeats removed, first occurrence wins.
    pub fn unique_keywords(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for kw in &self.keywords_matched {
            if !out.contains(&kw.as_str()) {
                out.push(kw);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceStatus {
    Compliant,
    Partial,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::Partial => "partial",
            ComplianceStatus::NonCompliant => "non-compliant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "Compliant",
            ComplianceStatus::Partial => "Partial",
            ComplianceStatus::NonCompliant => "Non Compliant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Active,
    Completed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Active => "active",
            ActivityStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityStatus::Active => "Active",
            ActivityStatus::Completed => "Completed",
        }
    }
}

/// Jobs-policy worker hours for one (project name, address) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrjpProject {
    pub name: String,
    pub address: String,
    pub norm_address: String,
    pub total_hours: f64,
    pub resident_hours: f64,
    pub poc_hours: f64,
    pub women_hours: f64,
    pub resident_pct: f64,
    pub poc_pct: f64,
    pub women_pct: f64,
    pub agencies: Vec<String>,
    pub last_period: String,
    pub neighborhood: String,
    pub developer: String,
    pub general_contractor: String,
    pub compliance_status: ComplianceStatus,
    pub project_status: ActivityStatus,
}

impl BrjpProject {
    pub fn is_oed(&self) -> bool {
        self.agencies.iter().any(|a| a == "OED")
    }

    pub fn is_bpda(&self) -> bool {
        self.agencies.iter().any(|a| a == "BPDA")
    }

    /// Filter key used by the report: "oed", "bpda" or empty.
    pub fn agency_key(&self) -> &'static str {
        if self.is_oed() {
            "oed"
        } else if self.is_bpda() {
            "bpda"
        } else {
            ""
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrjpAggregates {
    pub total_hours: f64,
    pub resident_pct: f64,
    pub poc_pct: f64,
    pub women_pct: f64,
    pub total_projects: usize,
    pub compliant: usize,
    pub partial: usize,
    pub non_compliant: usize,
    pub oed_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipefitterProject {
    pub name: String,
    pub address: String,
    pub trades: BTreeMap<String, f64>,
}

impl PipefitterProject {
    pub fn total_hours(&self) -> f64 {
        self.trades.values().sum()
    }

    /// Trades ordered by hours, largest first.
    pub fn trades_by_hours(&self) -> Vec<(&str, f64)> {
        let mut trades: Vec<(&str, f64)> =
            self.trades.iter().map(|(t, h)| (t.as_str(), *h)).collect();
        trades.sort_by(|a, b| b.1.total_cmp(&a.1));
        trades
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub trade: String,
    pub total_hours: f64,
    pub project_count: u64,
    pub resident_pct: f64,
    pub poc_pct: f64,
    pub women_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrjpTargets {
    pub resident_pct: f64,
    pub poc_pct: f64,
    pub women_pct: f64,
}

impl Default for BrjpTargets {
    fn default() -> Self {
        Self {
            resident_pct: 51.0,
            poc_pct: 40.0,
            women_pct: 12.0,
        }
    }
}

/// Everything the jobs-policy and pipefitter tabs need.
#[derive(Debug, Clone, Default)]
pub struct BrjpSummary {
    /// Keyed by (project name, address).
    pub projects: BTreeMap<(String, String), BrjpProject>,
    pub aggregates: Option<BrjpAggregates>,
    pub pipefitter_by_project: BTreeMap<(String, String), PipefitterProject>,
    pub global_trades: Vec<TradeSummary>,
}

/// Raw rows returned by the three jobs-policy SQL queries.
#[derive(Debug, Clone, Default)]
pub struct BrjpRows {
    pub projects: Vec<Record>,
    pub pipefitter: Vec<Record>,
    pub trades: Vec<Record>,
}

/// Project ids already published in earlier reports, per source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeenSet {
    #[serde(default)]
    pub article80: BTreeSet<String>,
    #[serde(default)]
    pub permits: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Keys written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SeenSet {
    pub fn ids(&self, source: Source) -> &BTreeSet<String> {
        match source {
            Source::Article80 => &self.article80,
            Source::Permits => &self.permits,
        }
    }

    pub fn ids_mut(&mut self, source: Source) -> &mut BTreeSet<String> {
        match source {
            Source::Article80 => &mut self.article80,
            Source::Permits => &mut self.permits,
        }
    }
}

/// Output of the extract step.
#[derive(Debug, Clone, Default)]
pub struct ExtractedData {
    pub article80: Vec<Record>,
    pub permits: Vec<Record>,
    pub brjp: Option<BrjpRows>,
}

impl ExtractedData {
    pub fn record_count(&self) -> usize {
        self.article80.len() + self.permits.len()
    }
}

/// Output of the transform step, input of the load step.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub article80: Vec<Project>,
    pub permits: Vec<Project>,
    pub brjp: BrjpSummary,
    pub seen: SeenSet,
    pub run_time: DateTime<Utc>,
}

impl TransformResult {
    pub fn project_count(&self) -> usize {
        self.article80.len() + self.permits.len()
    }

    pub fn new_count(&self) -> usize {
        self.article80
            .iter()
            .chain(self.permits.iter())
            .filter(|p| p.is_new)
            .count()
    }
}
