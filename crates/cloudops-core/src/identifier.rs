//! Provider identifier limits

/// Longest resource name GCP accepts (RFC 1035 label length)
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Clamp a resource name to at most `max_len` characters.
///
/// Names at or under the limit are returned unchanged. Truncation counts
/// characters, never splitting a code point.
pub fn clamp_identifier(name: &str, max_len: usize) -> String {
    match name.char_indices().nth(max_len) {
        Some((cut, _)) => name[..cut].to_string(),
        None => name.to_string(),
    }
}

/// Clamp `base` so that `base` + `suffix` fits in `max_len` characters.
///
/// Used when several resources share one base name; the suffix is what keeps
/// them distinct, so it is never the part that gets cut.
pub fn clamp_with_suffix(base: &str, suffix: &str, max_len: usize) -> String {
    let room = max_len.saturating_sub(suffix.chars().count());
    let mut name = clamp_identifier(base, room);
    name.push_str(suffix);
    clamp_identifier(&name, max_len)
}
