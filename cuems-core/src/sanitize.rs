//! Filesystem-safe name sanitization.
//!
//! Three sibling rules, all truncating oversized input to 240 characters
//! (236 kept from the front, 4 kept from the end — room for a `-NNN`
//! version suffix plus `.tmp` under the 255-byte filesystem limit) before
//! normalizing case and punctuation. They differ only in which characters
//! survive the filter, since directory names that already carry a version
//! suffix must keep the hyphen that `sanitize_dir_name` would strip.

const MAX_LEN: usize = 240;
const HEAD_LEN: usize = 236;
const TAIL_LEN: usize = 4;

fn truncate_keeping_tail(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < MAX_LEN {
        return s.to_string();
    }
    let head: String = chars[0..HEAD_LEN].iter().collect();
    let tail: String = chars[chars.len() - TAIL_LEN..].iter().collect();
    head + &tail
}

fn filter_and_lower(s: &str, keep: &[char]) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || keep.contains(c))
        .collect::<String>()
        .trim_end()
        .to_lowercase()
}

/// Sanitizes a plain file name: spaces and hyphens both fold to `_`, only
/// `.` and `_` survive the character filter.
pub fn sanitize_file_name(input: &str) -> String {
    let truncated = truncate_keeping_tail(input);
    let normalized = truncated.replace(' ', "_").replace('-', "_");
    filter_and_lower(&normalized, &['.', '_'])
}

/// Sanitizes a directory name: spaces and hyphens fold to `_`, only `_`
/// survives. Use this for a fresh directory name with no version suffix.
pub fn sanitize_dir_name(input: &str) -> String {
    let truncated = truncate_keeping_tail(input);
    let normalized = truncated.replace(' ', "_").replace('-', "_");
    filter_and_lower(&normalized, &['_'])
}

/// Sanitizes a directory name while preserving `-`, so a name that already
/// carries a `-NNN` version suffix survives the pass unchanged.
pub fn sanitize_dir_permit_increment(input: &str) -> String {
    let truncated = truncate_keeping_tail(input);
    let normalized = truncated.replace(' ', "_");
    filter_and_lower(&normalized, &['_', '-'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_folds_spaces_and_hyphens_to_underscore() {
        assert_eq!(sanitize_file_name("My Cool-Clip.MP4"), "my_cool_clip.mp4");
    }

    #[test]
    fn file_name_drops_unsupported_punctuation() {
        assert_eq!(sanitize_file_name("a/b*c?.wav"), "abc.wav");
    }

    #[test]
    fn dir_name_drops_hyphen() {
        assert_eq!(sanitize_dir_name("show-intro"), "show_intro");
    }

    #[test]
    fn dir_permit_increment_keeps_hyphen() {
        assert_eq!(
            sanitize_dir_permit_increment("show_intro-002"),
            "show_intro-002"
        );
    }

    #[test]
    fn truncates_oversized_names_keeping_tail() {
        let long = "a".repeat(300) + ".wav";
        let out = sanitize_file_name(&long);
        assert_eq!(out.chars().count(), MAX_LEN);
        assert!(out.ends_with(".wav"));
    }
}
