use crate::domain::model::{Project, ProjectDetails};
use crate::report::format::date_display;
use crate::utils::error::{EtlError, Result};
use serde::Serialize;

/// One flat CSV row per project.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    source: &'a str,
    id: &'a str,
    name: &'a str,
    address: &'a str,
    neighborhood: &'a str,
    status: &'a str,
    relevance: &'a str,
    is_new: bool,
    valuation: f64,
    sqft: u64,
    date: &'a str,
    keywords: String,
    permit_number: &'a str,
    record_type: &'a str,
    brjp_compliance: &'a str,
    brjp_total_hours: Option<f64>,
}

impl<'a> From<&'a Project> for CsvRow<'a> {
    fn from(p: &'a Project) -> Self {
        let (permit_number, record_type) = match &p.details {
            ProjectDetails::Permit { permit_number, .. } => (permit_number.as_str(), ""),
            ProjectDetails::Article80 { record_type, .. } => ("", record_type.as_str()),
        };
        Self {
            source: p.source.as_str(),
            id: &p.id,
            name: &p.name,
            address: &p.address,
            neighborhood: &p.neighborhood,
            status: &p.status,
            relevance: p.relevance.as_str(),
            is_new: p.is_new,
            valuation: p.valuation,
            sqft: p.sqft,
            date: date_display(&p.primary_date),
            keywords: p.unique_keywords().join("; "),
            permit_number,
            record_type,
            brjp_compliance: p
                .brjp
                .as_ref()
                .map(|b| b.compliance_status.as_str())
                .unwrap_or(""),
            brjp_total_hours: p.brjp.as_ref().map(|b| b.total_hours),
        }
    }
}

pub fn to_csv<'a, I>(projects: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Project>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for project in projects {
        writer.serialize(CsvRow::from(project))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::processing(format!("CSV buffer flush failed: {}", e)))
}

#[derive(Serialize)]
struct JsonExport<'a> {
    generated_at: String,
    article80: &'a [Project],
    permits: &'a [Project],
}

pub fn to_json(
    article80: &[Project],
    permits: &[Project],
    generated_at: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<u8>> {
    let export = JsonExport {
        generated_at: generated_at.to_rfc3339(),
        article80,
        permits,
    };
    Ok(serde_json::to_vec_pretty(&export)?)
}
