//! Small shared helpers: UTF-8-safe truncation, slugs, timestamped blocks.

use chrono::{DateTime, Utc};

/// Truncates a string to at most `max_chars` characters, adding "..." when
/// truncated. Character-boundary safe, so multi-byte content never panics.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    truncate_impl(s, max_chars, "...")
}

/// Like [`truncate_str`] but with a suffix that stays visible in multi-line
/// output, used when embedding file contents into prompts.
pub fn truncate_with_note(s: &str, max_chars: usize) -> String {
    truncate_impl(s, max_chars, "\n... (truncated)")
}

fn truncate_impl(s: &str, max_chars: usize, suffix: &str) -> String {
    // Byte length <= max_chars implies char count <= max_chars.
    if s.len() <= max_chars {
        return s.to_string();
    }
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }

    let suffix_len = suffix.chars().count();
    if max_chars <= suffix_len {
        return suffix.chars().take(max_chars).collect();
    }
    let truncated: String = s.chars().take(max_chars - suffix_len).collect();
    format!("{}{}", truncated, suffix)
}

/// Lowercased, dash-separated slug for filenames. Runs of non-alphanumeric
/// characters collapse to a single dash; leading/trailing dashes are dropped.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Delimited block appended to task/subtask details when the agent supplies
/// free text. The closing delimiter repeats the timestamp so interleaved
/// blocks stay unambiguous.
pub fn timestamped_block(text: &str, at: DateTime<Utc>) -> String {
    let stamp = at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    format!(
        "<info added on {stamp}>\n{}\n</info added on {stamp}>",
        text.trim()
    )
}

/// Short dated marker appended to a description when an update prompt was too
/// brief to merit a full block.
pub fn dated_marker(at: DateTime<Utc>) -> String {
    format!(" [Updated: {}]", at.format("%Y-%m-%d"))
}
