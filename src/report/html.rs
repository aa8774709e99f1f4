//! Static HTML report.
//!
//! Everything is pre-formatted into plain view structs here so the
//! handlebars template stays logic-free; the engine escapes every value.

use crate::config::TrackerConfig;
use crate::core::classify::report_order;
use crate::domain::model::{
    ActivityStatus, BrjpProject, BrjpTargets, ComplianceStatus, PipefitterProject, Project,
    ProjectDetails, Relevance, Source, TradeSummary, TransformResult,
};
use crate::report::format::{
    date_display, ellipsize, format_currency, format_hours, format_run_time, format_sqft,
    target_color, truncate,
};
use crate::utils::error::Result;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeSet;

const TEMPLATE: &str = include_str!("../../templates/report.html.hbs");

const PERMIT_RECORD_URL: &str = "https://data.boston.gov/dataset/approved-building-permits/resource/6ddcd912-32a0-43df-9908-63574f8c7e77?filters=PERMITNUMBER%3A";

#[derive(Debug, Serialize)]
struct ReportView {
    title: String,
    run_time: String,
    min_valuation: String,
    summary: SummaryView,
    neighborhoods: Vec<String>,
    statuses: Vec<String>,
    cards: Vec<CardView>,
    targets: TargetsView,
    gauges: Vec<GaugeView>,
    brjp_rows: Vec<BrjpRowView>,
    trade_cards: Vec<TradeCardView>,
    pipe_trades: Vec<String>,
    pipe_rows: Vec<PipeRowView>,
}

#[derive(Debug, Serialize)]
struct SummaryView {
    new: usize,
    total: usize,
    article80: usize,
    permits: usize,
    high: usize,
    brjp_tracked: usize,
    brjp_compliant: usize,
    brjp_oed: usize,
}

#[derive(Debug, Serialize)]
struct TargetsView {
    resident: String,
    poc: String,
    women: String,
}

#[derive(Debug, Serialize)]
struct Field {
    label: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct Link {
    href: String,
    label: String,
}

#[derive(Debug, Serialize)]
struct Badge {
    label: String,
    color: &'static str,
}

#[derive(Debug, Serialize)]
struct Bar {
    label: &'static str,
    width: String,
    target: String,
    color: &'static str,
    pct: String,
}

#[derive(Debug, Serialize)]
struct MiniBars {
    bars: Vec<Bar>,
    agencies: Vec<Badge>,
    hours: String,
}

#[derive(Debug, Serialize)]
struct CardView {
    source: &'static str,
    source_label: &'static str,
    source_color: &'static str,
    relevance: &'static str,
    relevance_upper: String,
    relevance_color: &'static str,
    is_new: bool,
    neighborhood: String,
    status: String,
    date: String,
    brjp_status: &'static str,
    oed: &'static str,
    search: String,
    name: String,
    address: String,
    details: Vec<Vec<Field>>,
    brjp: Option<MiniBars>,
    description: String,
    keywords: Vec<String>,
    links: Vec<Link>,
}

#[derive(Debug, Serialize)]
struct PctCell {
    value: String,
    color: &'static str,
}

#[derive(Debug, Serialize)]
struct GaugeView {
    label: &'static str,
    color: &'static str,
    deg: String,
    pct: String,
    target: String,
}

#[derive(Debug, Serialize)]
struct BrjpRowView {
    compliance: &'static str,
    compliance_label: &'static str,
    compliance_color: &'static str,
    agency: &'static str,
    agencies: String,
    project_status: &'static str,
    status_label: &'static str,
    status_color: &'static str,
    search: String,
    name: String,
    address: String,
    resident: PctCell,
    poc: PctCell,
    women: PctCell,
    hours: String,
    bars: Vec<Bar>,
    info: Vec<Field>,
    links: Vec<Link>,
}

#[derive(Debug, Serialize)]
struct TradeCardView {
    trade: String,
    hours: String,
    projects: u64,
    resident: PctCell,
    poc: PctCell,
    women: PctCell,
}

#[derive(Debug, Serialize)]
struct Breakdown {
    name: String,
    width: String,
    hours: String,
}

#[derive(Debug, Serialize)]
struct PipeRowView {
    trade: String,
    project_status: &'static str,
    status_label: &'static str,
    status_color: &'static str,
    search: String,
    name: String,
    address: String,
    hours: String,
    breakdown: Vec<Breakdown>,
    info: Vec<Field>,
    links: Vec<Link>,
}

fn quote(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn news_link(name: &str, address: &str) -> Link {
    let q = format!("\"{}\" \"{}\" Boston construction", truncate(name, 60), address);
    Link {
        href: format!("https://www.google.com/search?q={}", quote(&q)),
        label: "Search News".to_string(),
    }
}

fn map_link(address: &str) -> Option<Link> {
    if address.is_empty() || address == "N/A" {
        return None;
    }
    Some(Link {
        href: format!(
            "https://www.google.com/maps/search/?api=1&query={}",
            quote(&format!("{}, Boston, MA", address))
        ),
        label: "View on Map".to_string(),
    })
}

fn search_text(parts: &[&str]) -> String {
    let joined = parts.join(" ").to_lowercase();
    truncate(&joined, 500).to_string()
}

fn relevance_color(relevance: Relevance) -> &'static str {
    match relevance {
        Relevance::High => "#c0392b",
        Relevance::Medium => "#e67e22",
        Relevance::Low => "#7f8c8d",
    }
}

fn pct_cell(pct: f64, target: f64, decimals: usize) -> PctCell {
    PctCell {
        value: format!("{:.*}%", decimals, pct),
        color: target_color(pct, target),
    }
}

fn target_bars(bp: &BrjpProject, targets: &BrjpTargets, poc_label: &'static str) -> Vec<Bar> {
    [
        ("Residents", bp.resident_pct, targets.resident_pct),
        (poc_label, bp.poc_pct, targets.poc_pct),
        ("Women", bp.women_pct, targets.women_pct),
    ]
    .into_iter()
    .map(|(label, pct, target)| Bar {
        label,
        width: format!("{:.1}", pct.min(100.0)),
        target: format!("{:.1}", target.min(100.0)),
        color: target_color(pct, target),
        pct: format!("{:.1}", pct),
    })
    .collect()
}

fn mini_bars(bp: &BrjpProject, targets: &BrjpTargets) -> MiniBars {
    MiniBars {
        bars: target_bars(bp, targets, "POC"),
        agencies: bp
            .agencies
            .iter()
            .map(|a| Badge {
                label: a.clone(),
                color: if a == "OED" { "#8e44ad" } else { "#2980b9" },
            })
            .collect(),
        hours: format_hours(bp.total_hours),
    }
}

fn field(label: &'static str, value: impl Into<String>) -> Field {
    Field {
        label,
        value: value.into(),
    }
}

fn card_view(p: &Project, targets: &BrjpTargets) -> CardView {
    let mut links = Vec::new();
    let details = match &p.details {
        ProjectDetails::Article80 {
            record_type,
            proposed_use,
            website_url,
            ..
        } => {
            let mut first = vec![
                field("Status", p.status.clone()),
                field("Type", record_type.clone()),
                field("Size", format_sqft(p.sqft)),
            ];
            if p.valuation > 0.0 {
                first.push(field("Est. Value", format_currency(p.valuation)));
            }
            if !website_url.is_empty() {
                links.push(Link {
                    href: website_url.clone(),
                    label: "View Project".to_string(),
                });
            }
            vec![first, vec![field("Proposed Use", truncate(proposed_use, 200))]]
        }
        ProjectDetails::Permit {
            permit_number,
            applicant,
            worktype,
            issued_date,
            ..
        } => {
            let issued = date_display(issued_date);
            let mut lines = vec![vec![
                field("Valuation", format_currency(p.valuation)),
                field("Size", format_sqft(p.sqft)),
                field("Issued", if issued.is_empty() { "N/A" } else { issued }),
            ]];
            let extras: Vec<Field> = [
                ("Permit", permit_number),
                ("Applicant", applicant),
                ("Work Type", worktype),
            ]
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(label, v)| field(label, v.clone()))
            .collect();
            if !extras.is_empty() {
                lines.push(extras);
            }
            if !permit_number.is_empty() {
                links.push(Link {
                    href: format!("{}{}", PERMIT_RECORD_URL, quote(permit_number)),
                    label: format!("Permit #{}", permit_number),
                });
            }
            lines
        }
    };

    links.push(news_link(&p.name, &p.address));
    links.extend(map_link(&p.address));

    let applicant = match &p.details {
        ProjectDetails::Permit { applicant, .. } => applicant.as_str(),
        ProjectDetails::Article80 { .. } => "",
    };
    let keywords = p.keywords_matched.join(" ");
    let search = search_text(&[
        p.name.as_str(),
        p.address.as_str(),
        p.description.as_str(),
        keywords.as_str(),
        p.neighborhood.as_str(),
        applicant,
    ]);

    let (brjp_status, oed) = match &p.brjp {
        Some(bp) => (bp.compliance_status.as_str(), bp.agency_key()),
        None => ("", ""),
    };

    CardView {
        source: p.source.as_str(),
        source_label: p.source.label(),
        source_color: match p.source {
            Source::Article80 => "#3498db",
            Source::Permits => "#e67e22",
        },
        relevance: p.relevance.as_str(),
        relevance_upper: p.relevance.as_str().to_uppercase(),
        relevance_color: relevance_color(p.relevance),
        is_new: p.is_new,
        neighborhood: p.neighborhood.clone(),
        status: p.status.clone(),
        date: date_display(&p.primary_date).to_string(),
        brjp_status,
        oed,
        search,
        name: truncate(&p.name, 120).to_string(),
        address: p.address.clone(),
        details,
        brjp: p.brjp.as_ref().map(|bp| mini_bars(bp, targets)),
        description: ellipsize(&p.description, 300),
        keywords: p.unique_keywords().into_iter().map(str::to_string).collect(),
        links,
    }
}

fn activity(status: ActivityStatus) -> (&'static str, &'static str) {
    match status {
        ActivityStatus::Active => ("Active", "#27ae60"),
        ActivityStatus::Completed => ("Completed", "#95a5a6"),
    }
}

fn brjp_row_view(bp: &BrjpProject, targets: &BrjpTargets) -> BrjpRowView {
    let agencies = if bp.agencies.is_empty() {
        "N/A".to_string()
    } else {
        bp.agencies.join(", ")
    };
    let (status_label, status_color) = activity(bp.project_status);

    let mut info = Vec::new();
    if !bp.developer.is_empty() {
        info.push(field("Developer", truncate(&bp.developer, 100)));
    }
    if !bp.general_contractor.is_empty() {
        info.push(field("General Contractor", truncate(&bp.general_contractor, 100)));
    }
    if !bp.neighborhood.is_empty() {
        info.push(field("Neighborhood", truncate(&bp.neighborhood, 60)));
    }
    if !bp.last_period.is_empty() {
        info.push(field("Last Reported", truncate(&bp.last_period, 10)));
    }
    info.push(field(
        "Hours",
        format!(
            "Resident {} • POC {} • Women {} • Total {}",
            format_hours(bp.resident_hours),
            format_hours(bp.poc_hours),
            format_hours(bp.women_hours),
            format_hours(bp.total_hours)
        ),
    ));

    let mut links = vec![news_link(&bp.name, &bp.address)];
    links.extend(map_link(&bp.address));

    BrjpRowView {
        compliance: bp.compliance_status.as_str(),
        compliance_label: bp.compliance_status.label(),
        compliance_color: match bp.compliance_status {
            ComplianceStatus::Compliant => "#27ae60",
            ComplianceStatus::Partial => "#f39c12",
            ComplianceStatus::NonCompliant => "#e74c3c",
        },
        agency: bp.agency_key(),
        search: search_text(&[
            bp.name.as_str(),
            bp.address.as_str(),
            agencies.as_str(),
            bp.developer.as_str(),
        ]),
        agencies,
        project_status: bp.project_status.as_str(),
        status_label,
        status_color,
        name: truncate(&bp.name, 80).to_string(),
        address: truncate(&bp.address, 60).to_string(),
        resident: pct_cell(bp.resident_pct, targets.resident_pct, 1),
        poc: pct_cell(bp.poc_pct, targets.poc_pct, 1),
        women: pct_cell(bp.women_pct, targets.women_pct, 1),
        hours: format_hours(bp.total_hours),
        bars: target_bars(bp, targets, "People of Color"),
        info,
        links,
    }
}

fn trade_card_view(t: &TradeSummary, targets: &BrjpTargets) -> TradeCardView {
    TradeCardView {
        trade: t.trade.clone(),
        hours: format_hours(t.total_hours),
        projects: t.project_count,
        resident: pct_cell(t.resident_pct, targets.resident_pct, 0),
        poc: pct_cell(t.poc_pct, targets.poc_pct, 0),
        women: pct_cell(t.women_pct, targets.women_pct, 0),
    }
}

fn pipe_rows_for(pd: &PipefitterProject, bp: Option<&BrjpProject>) -> Vec<PipeRowView> {
    let total = pd.total_hours();
    let trades = pd.trades_by_hours();
    let project_status = bp
        .map(|b| b.project_status)
        .unwrap_or(ActivityStatus::Completed);
    let (status_label, status_color) = activity(project_status);

    let breakdown = || {
        trades
            .iter()
            .map(|(name, hours)| {
                let share = if total > 0.0 { hours / total * 100.0 } else { 0.0 };
                Breakdown {
                    name: name.to_string(),
                    width: format!("{:.1}", share.min(100.0)),
                    hours: format_hours(*hours),
                }
            })
            .collect::<Vec<_>>()
    };
    let info = || {
        let mut info = Vec::new();
        if let Some(bp) = bp {
            info.push(field("BRJP Status", bp.compliance_status.label()));
            if !bp.developer.is_empty() {
                info.push(field("Developer", truncate(&bp.developer, 100)));
            }
            if !bp.general_contractor.is_empty() {
                info.push(field("General Contractor", truncate(&bp.general_contractor, 100)));
            }
        }
        info
    };
    let links = || {
        let mut links = vec![news_link(&pd.name, &pd.address)];
        links.extend(map_link(&pd.address));
        links
    };

    trades
        .iter()
        .map(|(trade, hours)| PipeRowView {
            trade: trade.to_string(),
            project_status: project_status.as_str(),
            status_label,
            status_color,
            search: search_text(&[pd.name.as_str(), pd.address.as_str(), *trade]),
            name: truncate(&pd.name, 80).to_string(),
            address: truncate(&pd.address, 60).to_string(),
            hours: format_hours(*hours),
            breakdown: breakdown(),
            info: info(),
            links: links(),
        })
        .collect()
}

fn gauge(label: &'static str, pct: f64, target: f64) -> GaugeView {
    GaugeView {
        label,
        color: target_color(pct, target),
        deg: format!("{:.1}", (pct / 100.0 * 360.0).min(360.0)),
        pct: format!("{:.1}", pct),
        target: format!("{:.0}", target),
    }
}

fn build_view(result: &TransformResult, config: &TrackerConfig) -> ReportView {
    let targets = &config.brjp.targets;
    let mut all: Vec<&Project> = result.article80.iter().chain(result.permits.iter()).collect();
    all.sort_by(|a, b| report_order(a, b));

    let neighborhoods: BTreeSet<String> = all.iter().map(|p| p.neighborhood.clone()).collect();
    let statuses: BTreeSet<String> = all.iter().map(|p| p.status.clone()).collect();

    let brjp = &result.brjp;
    let aggregates = brjp.aggregates.clone().unwrap_or_default();

    let mut brjp_projects: Vec<&BrjpProject> = brjp.projects.values().collect();
    brjp_projects.sort_by(|a, b| b.total_hours.total_cmp(&a.total_hours));

    let mut pipe_projects: Vec<&PipefitterProject> = brjp.pipefitter_by_project.values().collect();
    pipe_projects.sort_by(|a, b| b.total_hours().total_cmp(&a.total_hours()));
    let pipe_trades: BTreeSet<String> = pipe_projects
        .iter()
        .flat_map(|p| p.trades.keys().cloned())
        .collect();

    let gauges = if brjp.aggregates.is_some() {
        vec![
            gauge("Boston Residents", aggregates.resident_pct, targets.resident_pct),
            gauge("People of Color", aggregates.poc_pct, targets.poc_pct),
            gauge("Women", aggregates.women_pct, targets.women_pct),
        ]
    } else {
        Vec::new()
    };

    ReportView {
        title: config.output.title.clone(),
        run_time: format_run_time(result.run_time),
        min_valuation: format_currency(config.scoring.min_valuation),
        summary: SummaryView {
            new: result.new_count(),
            total: all.len(),
            article80: result.article80.len(),
            permits: result.permits.len(),
            high: all.iter().filter(|p| p.relevance == Relevance::High).count(),
            brjp_tracked: aggregates.total_projects,
            brjp_compliant: aggregates.compliant,
            brjp_oed: aggregates.oed_count,
        },
        neighborhoods: neighborhoods.into_iter().collect(),
        statuses: statuses.into_iter().collect(),
        cards: all.iter().map(|p| card_view(p, targets)).collect(),
        targets: TargetsView {
            resident: format!("{:.0}", targets.resident_pct),
            poc: format!("{:.0}", targets.poc_pct),
            women: format!("{:.0}", targets.women_pct),
        },
        gauges,
        brjp_rows: brjp_projects
            .iter()
            .map(|bp| brjp_row_view(bp, targets))
            .collect(),
        trade_cards: brjp
            .global_trades
            .iter()
            .filter(|t| config.brjp.pipefitter_trades.contains(&t.trade))
            .map(|t| trade_card_view(t, targets))
            .collect(),
        pipe_trades: pipe_trades.into_iter().collect(),
        pipe_rows: pipe_projects
            .iter()
            .flat_map(|pd| {
                let bp = brjp.projects.get(&(pd.name.clone(), pd.address.clone()));
                pipe_rows_for(pd, bp)
            })
            .collect(),
    }
}

/// Render the full report page.
pub fn render_report(result: &TransformResult, config: &TrackerConfig) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_template_string("report", TEMPLATE)?;

    let view = build_view(result, config);
    tracing::debug!(
        "🖨️ Rendering {} cards, {} BRJP rows, {} pipefitter rows",
        view.cards.len(),
        view.brjp_rows.len(),
        view.pipe_rows.len()
    );
    Ok(handlebars.render("report", &view)?)
}
