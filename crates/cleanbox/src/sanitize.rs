//! Helpers for scrubbing values before they reach logs or span fields.
//!
//! Scan logs are meant to be shareable, so mailbox addresses and raw
//! upstream error bodies (which may echo tokens) never go in verbatim.

/// Maximum number of characters of an upstream error body kept for logs.
pub const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Masks the local part of every address in a header value.
///
/// - `jane.doe@example.com` → `j***@example.com`
/// - `Shop <orders@shop.example>` → `Shop <o***@shop.example>`
/// - values without `@` are returned unchanged
pub fn redact_address(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, token) in value.split(' ').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&redact_token(token));
    }
    out
}

fn redact_token(token: &str) -> String {
    let Some(at) = token.find('@') else {
        return token.to_string();
    };
    let (head, domain) = token.split_at(at);
    // Keep wrapping punctuation such as `<` so display names stay readable.
    let prefix_len = head
        .char_indices()
        .find(|(_, c)| c.is_alphanumeric())
        .map(|(i, _)| i)
        .unwrap_or(head.len());
    let (prefix, local) = head.split_at(prefix_len);
    match local.chars().next() {
        Some(first) => format!("{}{}***{}", prefix, first, domain),
        None => format!("{}***{}", prefix, domain),
    }
}

/// Truncates an upstream response body for logging.
pub fn truncate_for_log(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_plain_address() {
        assert_eq!(redact_address("jane.doe@example.com"), "j***@example.com");
    }

    #[test]
    fn test_redact_display_name_address() {
        assert_eq!(
            redact_address("Acme Shop <orders@shop.example>"),
            "Acme Shop <o***@shop.example>"
        );
    }

    #[test]
    fn test_redact_without_address() {
        assert_eq!(redact_address("undisclosed-recipients"), "undisclosed-recipients");
        assert_eq!(redact_address("@paypal.com"), "***@paypal.com");
    }

    #[test]
    fn test_truncate_short_body_unchanged() {
        assert_eq!(truncate_for_log("invalid_grant"), "invalid_grant");
    }

    #[test]
    fn test_truncate_long_body_on_char_boundary() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let out = truncate_for_log(&body);
        assert!(out.ends_with("... (truncated)"));
        assert_eq!(
            out.trim_end_matches("... (truncated)").chars().count(),
            MAX_ERROR_BODY_LENGTH
        );
    }
}
