//! HVAC relevance scoring for Article 80 projects and building permits.
//!
//! A record either fails the inclusion gate (dropped) or becomes a
//! [`Project`] with a high/medium/low [`Relevance`].

use crate::config::toml_config::ScoringConfig;
use crate::domain::model::{Project, ProjectDetails, Record, Relevance, Source};
use std::cmp::Ordering;

/// Dollar string to float. Missing or unparsable values count as zero.
pub fn parse_valuation(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Square footage, truncated to whole feet. Negative or unparsable is zero.
pub fn parse_sqft(raw: &str) -> u64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' '))
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

/// Keywords found in `text`, case-insensitive, in configuration order.
pub fn match_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| !kw.is_empty() && lower.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}

pub fn score_relevance(
    matched_direct: &[String],
    matched_type: &[String],
    valuation: f64,
    scoring: &ScoringConfig,
) -> Relevance {
    if valuation >= scoring.auto_flag_valuation {
        return Relevance::High;
    }
    if !matched_direct.is_empty() {
        return Relevance::High;
    }
    if !matched_type.is_empty() && valuation >= scoring.high_value_type_threshold {
        return Relevance::High;
    }
    if !matched_type.is_empty() {
        return Relevance::Medium;
    }
    Relevance::Low
}

fn or_default(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn join_non_empty(parts: &[String]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score one Article 80 development project. `None` when it fails the gate.
pub fn classify_article80(record: &Record, scoring: &ScoringConfig) -> Option<Project> {
    let name = record.text(&["project__project_name"]);
    let description = record.text(&["description"]);
    let uses = record.text(&["project_uses"]);
    let neighborhood = record.text(&["neighborhood"]);
    let status = record.text(&["project_status"]);
    let search_text = join_non_empty(&[
        name.clone(),
        description.clone(),
        uses.clone(),
        neighborhood.clone(),
        status.clone(),
    ]);

    let sqft = parse_sqft(&record.text(&["gross_square_footage"]));
    let dev_cost = parse_valuation(&record.text(&["total_development_cost"]));
    let estimated_valuation = if dev_cost > 0.0 {
        dev_cost
    } else {
        sqft as f64 * scoring.cost_per_sqft
    };

    let matched_direct = match_keywords(&search_text, &scoring.direct_hvac_keywords);
    let matched_type = match_keywords(&search_text, &scoring.project_type_keywords);

    let record_type = record.text(&["project__record_type"]);
    let is_large = record_type.to_lowercase().contains("large");
    let has_keywords = !matched_direct.is_empty() || !matched_type.is_empty();
    let is_big_sqft = sqft >= scoring.large_sqft_threshold;

    if !(has_keywords || is_large || is_big_sqft) {
        return None;
    }

    let relevance = score_relevance(&matched_direct, &matched_type, estimated_valuation, scoring);

    let address = join_non_empty(&[
        record.text(&["project_street_number"]),
        record.text(&["project_street_name"]),
        record.text(&["project_street_suffix"]),
    ]);
    let last_filed = record.text(&["last_filed_date"]);
    let board_approved = record.text(&["last_board_approved_date"]);
    let primary_date = if board_approved.is_empty() {
        last_filed.clone()
    } else {
        board_approved.clone()
    };

    let mut keywords_matched = matched_direct;
    keywords_matched.extend(matched_type);

    Some(Project {
        id: record.text(&["_id", "project_id"]),
        source: Source::Article80,
        name: or_default(name, "Unknown"),
        address: or_default(address, "N/A"),
        neighborhood: or_default(neighborhood, "N/A"),
        status: or_default(status, "N/A"),
        sqft,
        valuation: estimated_valuation,
        description: or_default(description, "N/A"),
        primary_date,
        keywords_matched,
        relevance,
        is_new: false,
        details: ProjectDetails::Article80 {
            record_type: or_default(record_type, "N/A"),
            proposed_use: or_default(uses, "N/A"),
            board_approval_date: or_default(board_approved, "N/A"),
            last_filed_date: or_default(last_filed, "N/A"),
            website_url: record.text(&["website_url"]),
        },
        brjp: None,
    })
}

/// Score one approved building permit. `None` when it fails the gate.
///
/// The permits dataset has shipped both upper- and lower-case column names,
/// so every field is looked up both ways.
pub fn classify_permit(record: &Record, scoring: &ScoringConfig) -> Option<Project> {
    let valuation = parse_valuation(&record.text(&["DECLARED_VALUATION", "declared_valuation"]));
    if valuation < scoring.min_valuation {
        return None;
    }

    let description = record.text(&["DESCRIPTION", "description"]);
    let comments = record.text(&["COMMENTS", "comments"]);
    let permit_type = record.text(&["PERMITTYPE", "permittype"]);
    let search_text = join_non_empty(&[description.clone(), comments.clone(), permit_type.clone()]);

    let matched_direct = match_keywords(&search_text, &scoring.direct_hvac_keywords);
    let matched_type = match_keywords(&search_text, &scoring.project_type_keywords);

    if matched_direct.is_empty() && matched_type.is_empty() && valuation < scoring.auto_flag_valuation
    {
        return None;
    }

    let relevance = score_relevance(&matched_direct, &matched_type, valuation, scoring);

    let permit_number = record.text(&["PERMITNUMBER", "permitnumber"]);
    let issued_date = record.text(&["ISSUED_DATE", "issued_date"]);
    let id = {
        let raw_id = record.text(&["_id"]);
        if raw_id.is_empty() {
            permit_number.clone()
        } else {
            raw_id
        }
    };

    let mut keywords_matched = matched_direct;
    keywords_matched.extend(matched_type);

    Some(Project {
        id,
        source: Source::Permits,
        name: or_default(description, "Permit"),
        address: or_default(record.text(&["ADDRESS", "address"]), "N/A"),
        neighborhood: or_default(record.text(&["CITY", "city"]), "Boston"),
        status: or_default(record.text(&["STATUS", "status"]), "Issued"),
        sqft: parse_sqft(&record.text(&["SQ_FEET", "sq_feet"])),
        valuation,
        description: or_default(comments, "N/A"),
        primary_date: issued_date.clone(),
        keywords_matched,
        relevance,
        is_new: false,
        details: ProjectDetails::Permit {
            permit_type: or_default(permit_type, "N/A"),
            permit_number,
            applicant: record.text(&["APPLICANT", "applicant"]),
            worktype: record.text(&["WORKTYPE", "worktype"]),
            permit_type_descr: record.text(&["PERMIT_TYPE_DESCR", "permit_type_descr"]),
            expiration_date: record.text(&["EXPIRATION_DATE", "expiration_date"]),
            issued_date: or_default(issued_date, "N/A"),
        },
        brjp: None,
    })
}

pub fn classify_all(
    records: &[Record],
    source: Source,
    scoring: &ScoringConfig,
) -> Vec<Project> {
    records
        .iter()
        .filter_map(|r| match source {
            Source::Article80 => classify_article80(r, scoring),
            Source::Permits => classify_permit(r, scoring),
        })
        .collect()
}

/// Report order: relevance first, then valuation descending.
pub fn report_order(a: &Project, b: &Project) -> Ordering {
    a.relevance
        .cmp(&b.relevance)
        .then_with(|| b.valuation.total_cmp(&a.valuation))
}

pub fn sort_for_report(projects: &mut [Project]) {
    projects.sort_by(report_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(obj) => Record::from(obj),
            _ => panic!("expected object"),
        }
    }

    fn scoring() -> ScoringConfig {
        ScoringConfig {
            direct_hvac_keywords: vec!["HVAC".to_string(), "chiller".to_string()],
            project_type_keywords: vec!["laboratory".to_string(), "hotel".to_string()],
            ..ScoringConfig::default()
        }
    }

    #[test]
    fn test_parse_valuation() {
        assert_eq!(parse_valuation("$1,250,000.50"), 1_250_000.5);
        assert_eq!(parse_valuation(" 3 000 000 "), 3_000_000.0);
        assert_eq!(parse_valuation(""), 0.0);
        assert_eq!(parse_valuation("TBD"), 0.0);
        assert_eq!(parse_valuation("NaN"), 0.0);
    }

    #[test]
    fn test_parse_sqft() {
        assert_eq!(parse_sqft("125,000"), 125_000);
        assert_eq!(parse_sqft("1234.9"), 1234);
        assert_eq!(parse_sqft("n/a"), 0);
        assert_eq!(parse_sqft("-10"), 0);
    }

    #[test]
    fn test_match_keywords_case_insensitive_in_config_order() {
        let kws = vec!["chiller".to_string(), "HVAC".to_string(), "boiler".to_string()];
        let matched = match_keywords("New hvac system and CHILLER plant", &kws);
        assert_eq!(matched, vec!["chiller", "HVAC"]);
        assert!(match_keywords("", &kws).is_empty());
    }

    #[test]
    fn test_score_relevance_rules() {
        let s = scoring();
        let direct = vec!["HVAC".to_string()];
        let kind = vec!["hotel".to_string()];
        let none: Vec<String> = vec![];

        assert_eq!(score_relevance(&none, &none, 10_000_000.0, &s), Relevance::High);
        assert_eq!(score_relevance(&direct, &none, 0.0, &s), Relevance::High);
        assert_eq!(score_relevance(&none, &kind, 5_000_000.0, &s), Relevance::High);
        assert_eq!(score_relevance(&none, &kind, 4_999_999.0, &s), Relevance::Medium);
        assert_eq!(score_relevance(&none, &none, 9_999_999.0, &s), Relevance::Low);
    }

    #[test]
    fn test_article80_keyword_match_included() {
        let r = record(json!({
            "_id": 7,
            "project__project_name": "Seaport Laboratory",
            "description": "New lab building with central chiller plant",
            "project_street_number": "100",
            "project_street_name": "Northern",
            "project_street_suffix": "Ave",
            "neighborhood": "South Boston",
            "project_status": "Board Approved",
            "project__record_type": "Small Project",
            "gross_square_footage": "20,000",
            "last_filed_date": "2026-01-02T00:00:00",
            "last_board_approved_date": "2026-03-04T00:00:00"
        }));

        let p = classify_article80(&r, &scoring()).unwrap();
        assert_eq!(p.id, "7");
        assert_eq!(p.address, "100 Northern Ave");
        assert_eq!(p.relevance, Relevance::High);
        assert_eq!(p.keywords_matched, vec!["chiller", "laboratory"]);
        // 無開發成本時以面積估算
        assert_eq!(p.valuation, 6_000_000.0);
        assert_eq!(p.primary_date, "2026-03-04T00:00:00");
    }

    #[test]
    fn test_article80_large_record_type_included_without_keywords() {
        let r = record(json!({
            "_id": 8,
            "project__project_name": "Parcel 12",
            "project__record_type": "Large Project",
            "total_development_cost": "$2,000,000",
            "last_filed_date": "2025-12-01"
        }));

        let p = classify_article80(&r, &scoring()).unwrap();
        assert_eq!(p.relevance, Relevance::Low);
        assert_eq!(p.valuation, 2_000_000.0);
        assert_eq!(p.address, "N/A");
        assert_eq!(p.primary_date, "2025-12-01");
        match p.details {
            ProjectDetails::Article80 {
                board_approval_date,
                ..
            } => assert_eq!(board_approval_date, "N/A"),
            _ => panic!("wrong details"),
        }
    }

    #[test]
    fn test_article80_big_sqft_included_and_small_dropped() {
        let big = record(json!({"_id": 9, "gross_square_footage": "60000"}));
        let p = classify_article80(&big, &scoring()).unwrap();
        assert_eq!(p.name, "Unknown");
        assert_eq!(p.valuation, 18_000_000.0);
        assert_eq!(p.relevance, Relevance::High);

        let small = record(json!({"_id": 10, "project__project_name": "Porch", "gross_square_footage": "900"}));
        assert!(classify_article80(&small, &scoring()).is_none());
    }

    #[test]
    fn test_permit_below_min_valuation_dropped() {
        let r = record(json!({"_id": 1, "DECLARED_VALUATION": "999999", "DESCRIPTION": "HVAC replacement"}));
        assert!(classify_permit(&r, &scoring()).is_none());
    }

    #[test]
    fn test_permit_without_keywords_needs_auto_flag() {
        let plain = record(json!({"_id": 2, "DECLARED_VALUATION": "5000000", "DESCRIPTION": "Interior fit-out"}));
        assert!(classify_permit(&plain, &scoring()).is_none());

        let huge = record(json!({"_id": 3, "DECLARED_VALUATION": "12000000", "DESCRIPTION": "Interior fit-out"}));
        let p = classify_permit(&huge, &scoring()).unwrap();
        assert_eq!(p.relevance, Relevance::High);
        assert!(p.keywords_matched.is_empty());
    }

    #[test]
    fn test_permit_fields_and_lowercase_columns() {
        let r = record(json!({
            "_id": 44,
            "permitnumber": "ALT123456",
            "declared_valuation": "$2,500,000",
            "description": "Hotel renovation",
            "comments": "Replace rooftop units",
            "permittype": "Long Form/Alteration Permit",
            "address": "1 Main St",
            "city": null,
            "status": "",
            "applicant": "Acme Mechanical",
            "issued_date": "2026-09-30T10:00:00",
            "sq_feet": "40000"
        }));

        let p = classify_permit(&r, &scoring()).unwrap();
        assert_eq!(p.id, "44");
        assert_eq!(p.relevance, Relevance::Medium);
        assert_eq!(p.name, "Hotel renovation");
        assert_eq!(p.description, "Replace rooftop units");
        assert_eq!(p.neighborhood, "Boston");
        assert_eq!(p.status, "Issued");
        assert_eq!(p.sqft, 40_000);
        assert_eq!(p.primary_date, "2026-09-30T10:00:00");
        match &p.details {
            ProjectDetails::Permit {
                permit_number,
                applicant,
                ..
            } => {
                assert_eq!(permit_number, "ALT123456");
                assert_eq!(applicant, "Acme Mechanical");
            }
            _ => panic!("wrong details"),
        }
    }

    #[test]
    fn test_permit_id_falls_back_to_permit_number() {
        let r = record(json!({"PERMITNUMBER": "ERT99", "DECLARED_VALUATION": "20000000"}));
        let p = classify_permit(&r, &scoring()).unwrap();
        assert_eq!(p.id, "ERT99");
        assert_eq!(p.name, "Permit");
    }

    #[test]
    fn test_sort_for_report() {
        let r = |id: i64, val: &str, desc: &str| {
            record(json!({"_id": id, "DECLARED_VALUATION": val, "DESCRIPTION": desc}))
        };
        let records = vec![
            r(1, "2000000", "hotel"),
            r(2, "3000000", "HVAC"),
            r(3, "4000000", "hotel"),
            r(4, "2500000", "chiller"),
        ];
        let mut projects = classify_all(&records, Source::Permits, &scoring());
        sort_for_report(&mut projects);

        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4", "3", "1"]);
    }
}
