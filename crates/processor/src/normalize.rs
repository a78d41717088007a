//! Whitespace collapse + length cap applied before a RawItem's text ever
//! reaches an `LlmClient`, per spec.md §4.5's normalization step.

const MAX_CHARS: usize = 8_000;

/// Collapses runs of whitespace to single spaces, trims the ends, and
/// truncates to `MAX_CHARS`. Title/description/body are joined in that
/// order so the cap always favors the item's most important text.
pub fn normalize(title: &str, description: Option<&str>, body: &str) -> String {
    let joined = match description {
        Some(desc) if !desc.trim().is_empty() => format!("{title}\n\n{desc}\n\n{body}"),
        _ => format!("{title}\n\n{body}"),
    };

    let collapsed: String = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_internal_whitespace() {
        let out = normalize("Title", None, "line one\n\n\nline   two\ttabbed");
        assert_eq!(out, "Title line one line two tabbed");
    }

    #[test]
    fn caps_at_max_chars() {
        let body = "x".repeat(MAX_CHARS + 500);
        let out = normalize("T", None, &body);
        assert_eq!(out.chars().count(), MAX_CHARS);
    }

    #[test]
    fn skips_empty_description() {
        let out = normalize("Title", Some("   "), "body");
        assert_eq!(out, "Title body");
    }

    #[test]
    fn includes_nonempty_description() {
        let out = normalize("Title", Some("Desc"), "body");
        assert_eq!(out, "Title Desc body");
    }
}
