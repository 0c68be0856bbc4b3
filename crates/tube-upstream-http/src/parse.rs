//! Tolerant parsing of the upstream line-status JSON shape (§6.2).
//!
//! Only the fields the core needs are named; everything else is ignored by
//! serde's default behaviour, satisfying "unknown fields MUST be ignored".

use serde::Deserialize;
use tube_core::{Disruption, LineRecord};

#[derive(Debug, Deserialize)]
struct RawLine {
    id: String,
    name: String,
    #[serde(rename = "lineStatuses", default)]
    line_statuses: Vec<RawLineStatus>,
}

#[derive(Debug, Deserialize)]
struct RawLineStatus {
    #[serde(rename = "statusSeverityDescription")]
    status_severity_description: String,
    #[serde(default)]
    disruption: Option<RawDisruption>,
}

#[derive(Debug, Deserialize)]
struct RawDisruption {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parses the JSON array returned by both upstream endpoints (§6.2) into
/// [`LineRecord`]s.
pub fn parse_lines(body: &str) -> Result<Vec<LineRecord>, serde_json::Error> {
    let raw: Vec<RawLine> = serde_json::from_str(body)?;
    Ok(raw.into_iter().map(convert).collect())
}

fn convert(raw: RawLine) -> LineRecord {
    let status = raw
        .line_statuses
        .first()
        .map(|s| s.status_severity_description.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let disruptions = raw
        .line_statuses
        .iter()
        .filter_map(|s| {
            let d = s.disruption.as_ref()?;
            let category = d.category.clone().unwrap_or_default();
            Some(Disruption {
                planned: category.to_ascii_lowercase().contains("planned"),
                category,
                description: d.description.clone().unwrap_or_default(),
            })
        })
        .collect();

    LineRecord {
        id: raw.id,
        name: raw.name,
        status_description: status.clone(),
        status,
        disruptions,
    }
}
