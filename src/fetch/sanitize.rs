//! Filesystem-safe path segments.

/// Characters never allowed in a path segment, besides control characters.
const ILLEGAL: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

/// Strip characters illegal in file paths and trim surrounding whitespace.
///
/// Removes control characters (0–31) and `" < > | : * ? \ /`. A result made
/// only of dots (`.`, `..`) would name the current or parent directory and
/// comes back empty.
pub fn sanitize_segment(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|&c| (c as u32) >= 32 && !ILLEGAL.contains(&c))
        .collect();
    without_dot_names(cleaned.trim())
}

/// Sanitize, then truncate to at most `max_chars` characters.
pub fn sanitize_truncated(s: &str, max_chars: usize) -> String {
    let cleaned = sanitize_segment(s);
    match cleaned.char_indices().nth(max_chars) {
        Some((cut, _)) => without_dot_names(cleaned[..cut].trim_end()),
        None => cleaned,
    }
}

fn without_dot_names(segment: &str) -> String {
    if segment.chars().all(|c| c == '.') {
        String::new()
    } else {
        segment.to_string()
    }
}
