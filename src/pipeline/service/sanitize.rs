//! Post-generation cleanup of raw service output.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(think|thinking|reasoning)>.*?</(?:think|thinking|reasoning)>")
        .expect("valid regex")
});

static STRAY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:think|thinking|reasoning)>").expect("valid regex"));

/// Strip reasoning blocks and stray reasoning tags from model output.
///
/// An unterminated opening tag drops everything after it; a closing tag
/// without an opener drops everything before it.
pub fn strip_model_artifacts(raw: &str) -> String {
    let mut text = THINK_BLOCK_RE.replace_all(raw, "").to_string();

    let stray = STRAY_TAG_RE
        .find(&text)
        .map(|m| (m.start(), m.end(), m.as_str().starts_with("</")));
    match stray {
        Some((_, end, true)) => text = text[end..].to_string(),
        Some((start, _, false)) => text.truncate(start),
        None => {}
    }
    text = STRAY_TAG_RE.replace_all(&text, "").to_string();

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_think_block() {
        let raw = "<think>\nlet me see {not json}\n</think>\n{\"title\": \"A\"}";
        assert_eq!(strip_model_artifacts(raw), "{\"title\": \"A\"}");
    }

    #[test]
    fn stray_closing_tag_drops_leading_reasoning() {
        assert_eq!(strip_model_artifacts("reasoning...</think>[1]"), "[1]");
    }

    #[test]
    fn unterminated_block_is_dropped() {
        assert_eq!(strip_model_artifacts("[1] <think> trailing"), "[1]");
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(strip_model_artifacts("  {\"a\":1}  "), "{\"a\":1}");
    }
}
