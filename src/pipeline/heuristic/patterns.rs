//! Named line predicates for local exercise parsing.
//!
//! Each family is an ordered list; the first entry that matches wins. A new
//! vocabulary is added by appending entries, no control flow changes needed.

use std::sync::LazyLock;

use regex::Regex;

/// A compiled line predicate with a stable family name.
pub struct NamedPattern {
    pub name: &'static str,
    pub regex: Regex,
}

fn pattern(name: &'static str, regex_str: &str) -> NamedPattern {
    NamedPattern {
        name,
        regex: Regex::new(regex_str).expect("Invalid heuristic regex pattern"),
    }
}

/// Exercise boundaries, in split priority order.
pub static BOUNDARY_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern("heading", r"^#{1,2}\s+\S"),
        pattern("cjk_ordinal", r"^\s*第\s*[0-9一二三四五六七八九十百零]+\s*题"),
        pattern(
            "title_label",
            r"(?i)^\s*(?:\*\*)?(?:题目|problem|question|exercise)\s*\d*\s*(?:\*\*)?\s*[:：]\s*\S",
        ),
        pattern("numbered_cjk", r"^\s*\d{1,4}、\s*\S"),
        pattern("numbered", r"^\s*\d{1,4}[.)]\s+\S"),
    ]
});

/// Input section markers. Capture group `rest` holds text on the marker line.
pub static INPUT_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "input_cjk",
            r"^\s*(?:[-*]\s+)?(?:\*\*)?(?:样例|示例)?输入(?:样例|示例)?\s*\d*\s*(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(?P<rest>.*))?$",
        ),
        pattern(
            "input_latin",
            r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(?:sample\s+|example\s+)?input\s*\d*\s*(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(?P<rest>.*))?$",
        ),
    ]
});

/// Output section markers. Capture group `rest` holds text on the marker line.
pub static OUTPUT_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "output_cjk",
            r"^\s*(?:[-*]\s+)?(?:\*\*)?(?:样例|示例|预期|期望)?输出(?:样例|示例|结果)?\s*\d*\s*(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(?P<rest>.*))?$",
        ),
        pattern(
            "output_latin",
            r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(?:sample\s+|example\s+|expected\s+)?output\s*\d*\s*(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(?P<rest>.*))?$",
        ),
    ]
});

/// Markers that close an open input/output section.
pub static STOP_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern("heading", r"^#{1,6}\s"),
        pattern(
            "explanation_cjk",
            r"^\s*(?:[-*]\s+)?(?:\*\*)?(?:解释|说明|提示|注意|约束|数据范围|限制|进阶)",
        ),
        pattern(
            "explanation_latin",
            r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(?:explanation|hints?|notes?|constraints?|follow[- ]?up)\b",
        ),
    ]
});

/// Difficulty metadata. Capture group `value` holds the label.
pub static DIFFICULTY_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "difficulty_line",
            r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(?:difficulty|level|难度)\s*(?:\*\*)?\s*[:：]\s*(?:\*\*)?\s*(?P<value>.+?)\s*(?:\*\*)?\s*$",
        ),
        pattern(
            "difficulty_bracket",
            r"(?i)[\[【(（]\s*(?P<value>easy|medium|hard|简单|中等|困难|入门)\s*[\]】)）]",
        ),
    ]
});

/// Tag metadata. Capture group `value` holds the raw list.
pub static TAG_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "tags_line",
            r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(?:tags?|topics?|标签|知识点|考点)\s*(?:\*\*)?\s*[:：]\s*(?:\*\*)?\s*(?P<value>.+?)\s*$",
        ),
    ]
});

/// Description markers. Capture group `rest` holds text on the marker line.
pub static DESCRIPTION_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "description_cjk",
            r"^\s*(?:#{1,6}\s*)?(?:[-*]\s+)?(?:\*\*)?(?:题目描述|问题描述|描述)\s*(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(?P<rest>.*))?$",
        ),
        pattern(
            "description_latin",
            r"(?i)^\s*(?:#{1,6}\s*)?(?:[-*]\s+)?(?:\*\*)?(?:problem\s+)?description\s*(?:\*\*)?\s*(?:[:：]\s*(?:\*\*)?\s*(?P<rest>.*))?$",
        ),
    ]
});

/// Prefixes removed from boundary lines to obtain a title.
static TITLE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:第\s*[0-9一二三四五六七八九十百零]+\s*题|\d{1,4}\s*[.)、]|(?:题目|problem|question|exercise)\s*\d*\s*[:：])\s*[:：.、]?\s*",
    )
    .expect("Invalid title prefix regex")
});

/// First pattern in `family` matching `line`.
pub fn first_match<'a>(family: &'a [NamedPattern], line: &str) -> Option<&'a NamedPattern> {
    family.iter().find(|p| p.regex.is_match(line))
}

pub fn matches_any(family: &[NamedPattern], line: &str) -> bool {
    first_match(family, line).is_some()
}

/// Named capture `group` of the first matching pattern. `Some("")` when the
/// pattern matched but the group did not participate.
pub fn capture<'a>(family: &[NamedPattern], line: &'a str, group: &str) -> Option<&'a str> {
    family.iter().find_map(|p| {
        p.regex
            .captures(line)
            .map(|caps| caps.name(group).map_or("", |m| m.as_str()))
    })
}

pub fn is_boundary(line: &str) -> bool {
    matches_any(&BOUNDARY_PATTERNS, line)
}

pub fn is_structural(line: &str) -> bool {
    matches_any(&INPUT_PATTERNS, line)
        || matches_any(&OUTPUT_PATTERNS, line)
        || matches_any(&STOP_PATTERNS, line)
}

pub fn is_metadata(line: &str) -> bool {
    DIFFICULTY_PATTERNS
        .iter()
        .take(1)
        .any(|p| p.regex.is_match(line))
        || matches_any(&TAG_PATTERNS, line)
}

/// Strip heading hashes, bold markers and numbering from a boundary line.
pub fn clean_title(line: &str) -> String {
    let trimmed = line.trim().trim_start_matches('#').trim();
    let unbolded = trimmed.replace("**", "");
    let stripped = TITLE_PREFIX_RE.replace(unbolded.trim(), "");
    let without_level = DIFFICULTY_PATTERNS[1].regex.replace_all(&stripped, "");
    without_level.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_families_in_priority_order() {
        assert_eq!(first_match(&BOUNDARY_PATTERNS, "## Two Sum").map(|p| p.name), Some("heading"));
        assert_eq!(first_match(&BOUNDARY_PATTERNS, "第一题 链表").map(|p| p.name), Some("cjk_ordinal"));
        assert_eq!(first_match(&BOUNDARY_PATTERNS, "题目：反转字符串").map(|p| p.name), Some("title_label"));
        assert_eq!(first_match(&BOUNDARY_PATTERNS, "3、爬楼梯").map(|p| p.name), Some("numbered_cjk"));
        assert_eq!(first_match(&BOUNDARY_PATTERNS, "4) Climb").map(|p| p.name), Some("numbered"));
        assert!(!is_boundary("### Example 1"));
    }

    #[test]
    fn input_marker_captures_inline_text() {
        assert_eq!(capture(&INPUT_PATTERNS, "输入：[2,7,11,15], 9", "rest"), Some("[2,7,11,15], 9"));
        assert_eq!(capture(&INPUT_PATTERNS, "**Input:** nums = [1]", "rest"), Some("nums = [1]"));
        assert_eq!(capture(&INPUT_PATTERNS, "**输入**", "rest"), Some(""));
        assert_eq!(capture(&INPUT_PATTERNS, "Input validation matters", "rest"), None);
        assert_eq!(capture(&INPUT_PATTERNS, "输入描述", "rest"), None);
    }

    #[test]
    fn output_marker_variants() {
        assert!(matches_any(&OUTPUT_PATTERNS, "输出：[0,1]"));
        assert!(matches_any(&OUTPUT_PATTERNS, "Expected Output: 3"));
        assert!(matches_any(&OUTPUT_PATTERNS, "样例输出 1"));
        assert!(!matches_any(&OUTPUT_PATTERNS, "Output format is a list"));
    }

    #[test]
    fn stop_markers() {
        assert!(matches_any(&STOP_PATTERNS, "Explanation: because"));
        assert!(matches_any(&STOP_PATTERNS, "**提示：**"));
        assert!(matches_any(&STOP_PATTERNS, "### Example 2"));
        assert!(!matches_any(&STOP_PATTERNS, "[1,2,3]"));
    }

    #[test]
    fn metadata_values() {
        assert_eq!(capture(&DIFFICULTY_PATTERNS, "难度：中等", "value"), Some("中等"));
        assert_eq!(capture(&DIFFICULTY_PATTERNS, "**Difficulty:** Hard", "value"), Some("Hard"));
        assert_eq!(capture(&DIFFICULTY_PATTERNS, "1. Two Sum [Easy]", "value"), Some("Easy"));
        assert_eq!(capture(&TAG_PATTERNS, "标签：数组、哈希表", "value"), Some("数组、哈希表"));
    }

    #[test]
    fn titles_are_cleaned() {
        assert_eq!(clean_title("# Two Sum"), "Two Sum");
        assert_eq!(clean_title("第3题 两数之和"), "两数之和");
        assert_eq!(clean_title("12. Reverse List [Easy]"), "Reverse List");
        assert_eq!(clean_title("题目：爬楼梯"), "爬楼梯");
        assert_eq!(clean_title("## **1、合并区间**"), "合并区间");
    }
}
