//! Decoding of Gmail `format=raw` messages.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use log::debug;
use mail_parser::MessageParser;

use super::error::{GmailError, Result};
use super::FetchedMessage;

/// Decodes Gmail's URL-safe base64, with or without padding.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.trim();
    URL_SAFE
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .map_err(|e| GmailError::Decode(format!("invalid base64url payload: {}", e)))
}

/// Metadata Gmail reports alongside the raw message.
#[derive(Debug, Clone, Default)]
pub struct RawEnvelope<'a> {
    pub id: &'a str,
    pub snippet: Option<&'a str>,
    /// Milliseconds since the epoch, as Gmail's `internalDate` string.
    pub internal_date: Option<&'a str>,
    pub size_estimate: Option<i64>,
}

/// Parses an RFC 822 message into the fields the pipeline stores.
///
/// The HTML body is preferred; plain text is the fallback. The `Date`
/// header wins over Gmail's internal date.
pub fn parse_message(envelope: &RawEnvelope<'_>, raw: &[u8]) -> Result<FetchedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| GmailError::Decode(format!("message {} is not RFC 822", envelope.id)))?;

    let subject = message.subject().unwrap_or_default().to_string();
    let from = message
        .from()
        .and_then(|addr| addr.first().map(format_address))
        .unwrap_or_default();
    let to = message
        .to()
        .and_then(|addr| addr.first().map(format_address))
        .unwrap_or_default();

    let sent_at = message
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .or_else(|| envelope.internal_date.and_then(parse_internal_date));

    let body = message
        .body_html(0)
        .or_else(|| message.body_text(0))
        .map(|b| b.into_owned())
        .filter(|b| !b.trim().is_empty());

    debug!(
        "Parsed message {} ({} bytes body)",
        envelope.id,
        body.as_ref().map(|b| b.len()).unwrap_or(0)
    );

    Ok(FetchedMessage {
        id: envelope.id.to_string(),
        subject,
        from,
        to,
        snippet: envelope.snippet.map(str::to_string),
        body,
        sent_at,
        size: envelope.size_estimate,
    })
}

fn parse_internal_date(ms: &str) -> Option<DateTime<Utc>> {
    ms.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

fn format_address(addr: &mail_parser::Addr) -> String {
    match addr.name() {
        Some(name) => format!("{} <{}>", name, addr.address().unwrap_or_default()),
        None => addr.address().unwrap_or_default().to_string(),
    }
}
