//! Shared utility functions used across the codebase.

/// Shorten `text` to at most `max_chars` characters for log output.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Join a base URL and path segments, percent-encoding each segment.
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}
