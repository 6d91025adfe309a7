//! Secondary event fields stored as the event's JSON `description`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::{PackageDetails, PackageItem};

const MAX_ITEM_NAME_CHARS: usize = 80;

/// Fields of a package event that are not first-class columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<PackageItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_zip: Option<String>,
}

impl EventDetails {
    pub fn from_extraction(details: &PackageDetails) -> Self {
        let items = details
            .items
            .as_ref()
            .filter(|items| !items.is_empty())
            .cloned();
        let item_name = items.as_deref().and_then(derive_item_name);

        Self {
            brand: non_blank(details.brand.as_deref()),
            items,
            item_name,
            order_date: details.order_date.as_deref().and_then(parse_date),
            estimated_delivery: details.estimated_delivery.as_deref().and_then(parse_date),
            tracking_url: non_blank(details.tracking_url.as_deref()),
            carrier: non_blank(details.carrier.as_deref()),
            carrier_raw: non_blank(details.carrier_raw.as_deref()),
            destination_city: non_blank(details.destination_city.as_deref()),
            destination_state: non_blank(details.destination_state.as_deref()),
            destination_zip: non_blank(details.destination_zip.as_deref()),
        }
    }

    /// Decodes a stored description. A missing description is empty details.
    pub fn decode(description: Option<&str>) -> Result<Self, serde_json::Error> {
        match description {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw),
            _ => Ok(Self::default()),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parses an ISO-8601 datetime or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Single item name, or all names joined by `, `, capped at 80 chars.
pub fn derive_item_name(items: &[PackageItem]) -> Option<String> {
    let names: Vec<&str> = items
        .iter()
        .filter_map(|item| item.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return None;
    }

    let joined = names.join(", ");
    if joined.chars().count() > MAX_ITEM_NAME_CHARS {
        let cut: String = joined.chars().take(MAX_ITEM_NAME_CHARS - 3).collect();
        Some(format!("{}...", cut))
    } else {
        Some(joined)
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
