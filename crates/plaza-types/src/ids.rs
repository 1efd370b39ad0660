use uuid::Uuid;

/// Parse a client-supplied identifier. Anything that is not a UUID is not an id.
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

/// Handles are 3-32 characters of ASCII letters, digits, `_`, `.` or `-`.
pub fn is_valid_username(raw: &str) -> bool {
    (3..=32).contains(&raw.len())
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Loose shape check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !raw.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
