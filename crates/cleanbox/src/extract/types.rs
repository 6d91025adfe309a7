//! Structured assistant outputs.
//!
//! Every field is optional at this boundary: the assistant is asked for a
//! fixed JSON shape but nothing guarantees it. Numbers and strings are
//! accepted interchangeably where models are known to mix them up.

use serde::{Deserialize, Deserializer, Serialize};

/// Input to one extraction call, already cleaned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionInput {
    pub subject: String,
    pub sender: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromoDetails {
    #[serde(deserialize_with = "lenient_string")]
    pub code: Option<String>,
    pub discount_raw: Option<String>,
    pub brand: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub url: Option<String>,
    pub expires_at: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageItem {
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub quantity: Option<u32>,
    pub variant: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageDetails {
    pub is_order_tracking: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
    pub carrier_raw: Option<String>,
    pub status: Option<String>,
    pub brand: Option<String>,
    pub items: Option<Vec<PackageItem>>,
    #[serde(deserialize_with = "lenient_string")]
    pub order_number: Option<String>,
    pub order_date: Option<String>,
    pub estimated_delivery: Option<String>,
    pub current_location: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub destination_zip: Option<String>,
    pub confidence: Option<f64>,
}

/// Accepts a string, a number or null.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts an integer, a numeric string or null.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Strips the Markdown code fence assistants like to wrap JSON in.
pub fn strip_json_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_details_lenient_fields() {
        let json = r#"{
            "isOrderTracking": true,
            "trackingNumber": 9400111899223,
            "orderNumber": "112-334",
            "destinationZip": 94107,
            "items": [{"name": "Mug", "quantity": "2", "price": 12.5}],
            "unexpected": "ignored"
        }"#;
        let details: PackageDetails = serde_json::from_str(json).unwrap();

        assert!(details.is_order_tracking);
        assert_eq!(details.tracking_number.as_deref(), Some("9400111899223"));
        assert_eq!(details.destination_zip.as_deref(), Some("94107"));
        let items = details.items.unwrap();
        assert_eq!(items[0].quantity, Some(2));
        assert_eq!(items[0].price.as_deref(), Some("12.5"));
        assert!(details.status.is_none());
    }

    #[test]
    fn test_promo_details_defaults() {
        let details: PromoDetails = serde_json::from_str("{}").unwrap();
        assert_eq!(details, PromoDetails::default());

        let details: PromoDetails =
            serde_json::from_str(r#"{"code": null, "discountRaw": "Free shipping"}"#).unwrap();
        assert!(details.code.is_none());
        assert_eq!(details.discount_raw.as_deref(), Some("Free shipping"));
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_json_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
