//! Boston Residents Jobs Policy (BRJP) worker-hours aggregation.
//!
//! The datastore holds one row per worker per period; the three SQL
//! queries from [`build_queries`] roll those up server-side and the
//! functions here merge, score and match the results.

use crate::domain::model::{
    ActivityStatus, BrjpAggregates, BrjpProject, BrjpRows, BrjpSummary, BrjpTargets,
    ComplianceStatus, PipefitterProject, Project, Record, TradeSummary,
};
use chrono::{DateTime, Datelike, Months, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// The datastore stores hours as text, so every SUM casts first.
const HOURS: &str = r#"CAST("worker_hours_this_period" AS NUMERIC)"#;

pub struct BrjpQueries {
    pub projects: String,
    pub pipefitter: String,
    pub trades: String,
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn build_queries(resource_id: &str, pipefitter_trades: &[String]) -> BrjpQueries {
    let demographic_sums = format!(
        r#"SUM(CASE WHEN "boston_resident" = 't' THEN {h} ELSE 0 END) AS resident_hours, SUM(CASE WHEN "person_of_color" = 't' THEN {h} ELSE 0 END) AS poc_hours, SUM(CASE WHEN "gender" = 'Woman' THEN {h} ELSE 0 END) AS women_hours"#,
        h = HOURS
    );

    let projects = format!(
        r#"SELECT "agency", "compliance_project_name", "project_address", SUM({h}) AS total_hours, {demo}, MAX("period_ending") AS last_period, MAX("neighborhood") AS neighborhood, MAX("developer") AS developer, MAX("general_contractor_name") AS general_contractor FROM "{rid}" GROUP BY "agency", "compliance_project_name", "project_address""#,
        h = HOURS,
        demo = demographic_sums,
        rid = resource_id
    );

    let trades_in = pipefitter_trades
        .iter()
        .map(|t| sql_quote(t))
        .collect::<Vec<_>>()
        .join(", ");
    let pipefitter = format!(
        r#"SELECT "compliance_project_name", "project_address", "trade", SUM({h}) AS trade_hours FROM "{rid}" WHERE "trade" IN ({trades}) GROUP BY "compliance_project_name", "project_address", "trade""#,
        h = HOURS,
        rid = resource_id,
        trades = trades_in
    );

    let trades = format!(
        r#"SELECT "trade", SUM({h}) AS total_hours, COUNT(DISTINCT "compliance_project_name") AS project_count, {demo} FROM "{rid}" GROUP BY "trade""#,
        h = HOURS,
        demo = demographic_sums,
        rid = resource_id
    );

    BrjpQueries {
        projects,
        pipefitter,
        trades,
    }
}

struct AddressRules {
    unit: Regex,
    abbreviations: Vec<(Regex, &'static str)>,
    punctuation: Regex,
    whitespace: Regex,
}

const ABBREVIATIONS: [(&str, &str); 16] = [
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("ROAD", "RD"),
    ("DRIVE", "DR"),
    ("BOULEVARD", "BLVD"),
    ("LANE", "LN"),
    ("PLACE", "PL"),
    ("COURT", "CT"),
    ("CIRCLE", "CIR"),
    ("HIGHWAY", "HWY"),
    ("PARKWAY", "PKWY"),
    ("TERRACE", "TER"),
    ("SOUTH", "S"),
    ("NORTH", "N"),
    ("EAST", "E"),
    ("WEST", "W"),
];

impl AddressRules {
    fn compile() -> Result<Self, regex::Error> {
        let abbreviations = ABBREVIATIONS
            .iter()
            .map(|(long, short)| Ok((Regex::new(&format!(r"\b{}\b", long))?, *short)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            unit: Regex::new(r"\s*(?:\b(?:UNIT|SUITE|STE|APT)\b|#)\s*\S*")?,
            abbreviations,
            punctuation: Regex::new(r"[.,\-#/]")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }
}

fn address_rules() -> Option<&'static AddressRules> {
    static RULES: OnceLock<Option<AddressRules>> = OnceLock::new();
    RULES
        .get_or_init(|| {
            AddressRules::compile()
                .map_err(|e| tracing::error!("❌ Address patterns failed to compile: {}", e))
                .ok()
        })
        .as_ref()
}

/// Canonical form for address matching: upper-case, unit suffix removed,
/// street words abbreviated, punctuation turned into single spaces.
pub fn normalize_address(address: &str) -> String {
    let upper = address.trim().to_uppercase();
    if upper.is_empty() {
        return String::new();
    }
    let Some(rules) = address_rules() else {
        return upper.split_whitespace().collect::<Vec<_>>().join(" ");
    };

    let mut s = rules.unit.replace_all(&upper, "").into_owned();
    for (pattern, short) in &rules.abbreviations {
        s = pattern.replace_all(&s, *short).into_owned();
    }
    let s = rules.punctuation.replace_all(&s, " ");
    rules.whitespace.replace_all(&s, " ").trim().to_string()
}

fn pct(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

fn text(record: &Record, key: &str) -> String {
    record.text(&[key]).trim().to_string()
}

/// First day of the month `window_months` before `now`, as `YYYY-MM-DD`.
pub fn active_cutoff(now: DateTime<Utc>, window_months: u32) -> String {
    let first_of_month = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive());
    first_of_month
        .checked_sub_months(Months::new(window_months))
        .unwrap_or(first_of_month)
        .format("%Y-%m-%d")
        .to_string()
}

pub fn compliance_for(
    resident_pct: f64,
    poc_pct: f64,
    women_pct: f64,
    targets: &BrjpTargets,
) -> ComplianceStatus {
    let met = [
        resident_pct >= targets.resident_pct,
        poc_pct >= targets.poc_pct,
        women_pct >= targets.women_pct,
    ];
    if met.iter().all(|m| *m) {
        ComplianceStatus::Compliant
    } else if met.iter().any(|m| *m) {
        ComplianceStatus::Partial
    } else {
        ComplianceStatus::NonCompliant
    }
}

/// Merge per-agency rows into one entry per (name, address) and score it.
pub fn process_projects(
    rows: &[Record],
    targets: &BrjpTargets,
    active_window_months: u32,
    now: DateTime<Utc>,
) -> BTreeMap<(String, String), BrjpProject> {
    let mut projects: BTreeMap<(String, String), BrjpProject> = BTreeMap::new();

    for row in rows {
        let name = text(row, "compliance_project_name");
        let address = text(row, "project_address");
        let agency = text(row, "agency").to_uppercase();
        let last_period = text(row, "last_period");
        let neighborhood = text(row, "neighborhood");
        let developer = text(row, "developer");
        let contractor = text(row, "general_contractor");

        let entry = projects
            .entry((name.clone(), address.clone()))
            .or_insert_with(|| BrjpProject {
                norm_address: normalize_address(&address),
                name,
                address,
                total_hours: 0.0,
                resident_hours: 0.0,
                poc_hours: 0.0,
                women_hours: 0.0,
                resident_pct: 0.0,
                poc_pct: 0.0,
                women_pct: 0.0,
                agencies: Vec::new(),
                last_period: String::new(),
                neighborhood: String::new(),
                developer: String::new(),
                general_contractor: String::new(),
                compliance_status: ComplianceStatus::NonCompliant,
                project_status: ActivityStatus::Completed,
            });

        entry.total_hours += row.number(&["total_hours"]);
        entry.resident_hours += row.number(&["resident_hours"]);
        entry.poc_hours += row.number(&["poc_hours"]);
        entry.women_hours += row.number(&["women_hours"]);
        if !agency.is_empty() && !entry.agencies.contains(&agency) {
            entry.agencies.push(agency);
        }
        if last_period > entry.last_period {
            entry.last_period = last_period;
        }
        if entry.neighborhood.is_empty() {
            entry.neighborhood = neighborhood;
        }
        if entry.developer.is_empty() {
            entry.developer = developer;
        }
        if entry.general_contractor.is_empty() {
            entry.general_contractor = contractor;
        }
    }

    let cutoff = active_cutoff(now, active_window_months);
    for p in projects.values_mut() {
        p.resident_pct = pct(p.resident_hours, p.total_hours);
        p.poc_pct = pct(p.poc_hours, p.total_hours);
        p.women_pct = pct(p.women_hours, p.total_hours);
        p.compliance_status = compliance_for(p.resident_pct, p.poc_pct, p.women_pct, targets);
        // ISO 日期字串可直接比較
        p.project_status = if !p.last_period.is_empty() && p.last_period >= cutoff {
            ActivityStatus::Active
        } else {
            ActivityStatus::Completed
        };
    }

    projects
}

pub fn process_pipefitter(rows: &[Record]) -> BTreeMap<(String, String), PipefitterProject> {
    let mut result: BTreeMap<(String, String), PipefitterProject> = BTreeMap::new();
    for row in rows {
        let name = text(row, "compliance_project_name");
        let address = text(row, "project_address");
        let entry = result
            .entry((name.clone(), address.clone()))
            .or_insert_with(|| PipefitterProject {
                name,
                address,
                trades: BTreeMap::new(),
            });
        *entry.trades.entry(text(row, "trade")).or_insert(0.0) += row.number(&["trade_hours"]);
    }
    result
}

pub fn process_global_trades(rows: &[Record]) -> Vec<TradeSummary> {
    let mut trades: Vec<TradeSummary> = rows
        .iter()
        .map(|row| {
            let total = row.number(&["total_hours"]);
            TradeSummary {
                trade: text(row, "trade"),
                total_hours: total,
                project_count: row.number(&["project_count"]).max(0.0) as u64,
                resident_pct: pct(row.number(&["resident_hours"]), total),
                poc_pct: pct(row.number(&["poc_hours"]), total),
                women_pct: pct(row.number(&["women_hours"]), total),
            }
        })
        .collect();
    trades.sort_by(|a, b| b.total_hours.total_cmp(&a.total_hours));
    trades
}

pub fn compute_aggregates(projects: &BTreeMap<(String, String), BrjpProject>) -> BrjpAggregates {
    let mut agg = BrjpAggregates {
        total_projects: projects.len(),
        ..BrjpAggregates::default()
    };
    let (mut resident, mut poc, mut women) = (0.0, 0.0, 0.0);

    for p in projects.values() {
        agg.total_hours += p.total_hours;
        resident += p.resident_hours;
        poc += p.poc_hours;
        women += p.women_hours;
        match p.compliance_status {
            ComplianceStatus::Compliant => agg.compliant += 1,
            ComplianceStatus::Partial => agg.partial += 1,
            ComplianceStatus::NonCompliant => agg.non_compliant += 1,
        }
        if p.is_oed() {
            agg.oed_count += 1;
        }
    }

    agg.resident_pct = pct(resident, agg.total_hours);
    agg.poc_pct = pct(poc, agg.total_hours);
    agg.women_pct = pct(women, agg.total_hours);
    agg
}

/// Attach jobs-policy data to tracker projects whose normalized address
/// matches. Returns how many matched.
pub fn match_projects<'a, I>(projects: I, brjp: &BTreeMap<(String, String), BrjpProject>) -> usize
where
    I: IntoIterator<Item = &'a mut Project>,
{
    let by_address: HashMap<&str, &BrjpProject> = brjp
        .values()
        .filter(|bp| !bp.norm_address.is_empty())
        .map(|bp| (bp.norm_address.as_str(), bp))
        .collect();

    let mut matched = 0;
    for project in projects {
        let norm = normalize_address(&project.address);
        project.brjp = by_address.get(norm.as_str()).map(|bp| (*bp).clone());
        if project.brjp.is_some() {
            matched += 1;
        }
    }
    matched
}

pub fn summarize(
    rows: &BrjpRows,
    targets: &BrjpTargets,
    active_window_months: u32,
    now: DateTime<Utc>,
) -> BrjpSummary {
    let projects = process_projects(&rows.projects, targets, active_window_months, now);
    let aggregates = (!projects.is_empty()).then(|| compute_aggregates(&projects));
    BrjpSummary {
        aggregates,
        pipefitter_by_project: process_pipefitter(&rows.pipefitter),
        global_trades: process_global_trades(&rows.trades),
        projects,
    }
}
