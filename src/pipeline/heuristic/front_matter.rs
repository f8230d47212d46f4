//! Single-exercise documents with a `---` metadata header, test-case blocks
//! under `### 测试用例 N：…` headings and an optional `## 参考答案` section.

use std::sync::LazyLock;

use regex::Regex;

use super::parser::extract_test_cases;
use crate::models::{Difficulty, ExerciseRecord, QuestionType};

static CASE_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{2,4}\s*(?:测试用例|test\s*case)\s*\d*\s*[:：]?\s*(?P<desc>.*)$")
        .expect("Invalid case heading regex")
});

static ANSWER_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{1,3}\s*(?:参考答案|参考解答|reference\s+(?:answer|solution))\s*$")
        .expect("Invalid answer heading regex")
});

static DESCRIPTION_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{1,3}\s*(?:题目描述|问题描述|description)\s*$")
        .expect("Invalid description heading regex")
});

/// Split into (header lines, body). `None` when there is no closed header.
fn split_header(content: &str) -> Option<(Vec<&str>, String)> {
    let mut lines = content.trim_start_matches('\u{feff}').trim_start().lines();
    if lines.next()?.trim() != "---" {
        return None;
    }
    let mut header = Vec::new();
    for line in lines.by_ref() {
        if line.trim() == "---" {
            let body: Vec<&str> = lines.collect();
            return Some((header, body.join("\n")));
        }
        header.push(line);
    }
    None
}

pub fn is_front_matter(content: &str) -> bool {
    split_header(content).is_some_and(|(header, _)| {
        header
            .iter()
            .any(|l| l.trim_start().to_lowercase().starts_with("title:"))
    })
}

fn header_value<'a>(header: &[&'a str], key: &str) -> Option<&'a str> {
    header.iter().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim().eq_ignore_ascii_case(key)).then(|| v.trim().trim_matches('"').trim_matches('\''))
    })
}

fn header_tags(raw: &str) -> Vec<&str> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split([',', '，', '、'])
        .map(|t| t.trim().trim_matches('"').trim_matches('\''))
        .filter(|t| !t.is_empty())
        .collect()
}

/// First fenced block in `lines`, without the fence lines.
fn first_fenced_block(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|l| l.trim_start().starts_with("```"))?;
    let rest = &lines[start + 1..];
    let end = rest
        .iter()
        .position(|l| l.trim_start().starts_with("```"))
        .unwrap_or(rest.len());
    Some(rest[..end].join("\n").trim_end().to_string())
}

/// Parse a front-matter document into one record. Returns `None` when the
/// header is missing or has no title.
pub fn parse_front_matter(content: &str) -> Option<ExerciseRecord> {
    let (header, body) = split_header(content)?;
    let title = header_value(&header, "title").filter(|t| !t.is_empty())?;

    let mut record = ExerciseRecord::new(title);
    if let Some(id) = header_value(&header, "id") {
        record.id = id.to_string();
    }
    if let Some(kind) = header_value(&header, "type") {
        record.question_type = QuestionType::from_label(kind);
    }
    if let Some(level) = header_value(&header, "difficulty") {
        record.difficulty = Difficulty::from_label(level).unwrap_or_default();
    }
    if let Some(tags) = header_value(&header, "tags") {
        for tag in header_tags(tags) {
            record.push_tag(tag);
        }
    }

    let lines: Vec<&str> = body.lines().collect();
    let case_starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| CASE_HEADING_RE.is_match(l.trim()))
        .map(|(i, _)| i)
        .collect();
    let answer_start = lines.iter().position(|l| ANSWER_HEADING_RE.is_match(l.trim()));

    let description_end = case_starts
        .first()
        .copied()
        .into_iter()
        .chain(answer_start)
        .min()
        .unwrap_or(lines.len());
    record.description = lines[..description_end]
        .iter()
        .filter(|l| !DESCRIPTION_HEADING_RE.is_match(l.trim()))
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    for (n, &start) in case_starts.iter().enumerate() {
        let end = case_starts
            .get(n + 1)
            .copied()
            .into_iter()
            .chain(answer_start.filter(|&a| a > start))
            .min()
            .unwrap_or(lines.len());
        let heading = lines[start].trim();
        let desc = CASE_HEADING_RE
            .captures(heading)
            .and_then(|c| c.name("desc"))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let block = lines[start + 1..end].join("\n");
        if let Some(mut case) = extract_test_cases(&block).into_iter().next() {
            if !desc.is_empty() {
                case.description = desc;
            }
            record.test_cases.push(case);
        }
    }

    if let Some(start) = answer_start {
        record.reference_answer = first_fenced_block(&lines[start + 1..]).filter(|a| !a.is_empty());
    }

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\nid: two-sum\ntitle: 两数之和\ntype: code\ndifficulty: easy\ntags: [数组, 哈希表]\n---\n\n## 题目描述\n\n给定一个整数数组 nums 和一个目标值 target。\n\n### 测试用例 1：基本情况\n\n**输入**\n```\n[2,7,11,15]\n9\n```\n\n**输出**\n```\n[0,1]\n```\n\n### 测试用例 2：重复元素\n\n**输入**\n```\n[3,3]\n6\n```\n\n**输出**\n```\n[0,1]\n```\n\n## 参考答案\n\n```python\ndef two_sum(nums, target):\n    pass\n```\n";

    #[test]
    fn detects_front_matter() {
        assert!(is_front_matter(DOC));
        assert!(!is_front_matter("# Title\n---\n"));
        assert!(!is_front_matter("---\nno title here\n---\n"));
    }

    #[test]
    fn parses_full_document() {
        let record = parse_front_matter(DOC).unwrap();
        assert_eq!(record.id, "two-sum");
        assert_eq!(record.title, "两数之和");
        assert_eq!(record.difficulty, Difficulty::Easy);
        assert_eq!(record.question_type, QuestionType::Code);
        assert_eq!(record.tags, vec!["数组", "哈希表"]);
        assert_eq!(record.description, "给定一个整数数组 nums 和一个目标值 target。");
        assert_eq!(record.test_cases.len(), 2);
        assert_eq!(record.test_cases[0].input, "[2,7,11,15]\n9");
        assert_eq!(record.test_cases[0].expected_output, "[0,1]");
        assert_eq!(record.test_cases[0].description, "基本情况");
        assert_eq!(record.test_cases[1].description, "重复元素");
        assert!(record
            .reference_answer
            .as_deref()
            .is_some_and(|a| a.starts_with("def two_sum")));
    }

    #[test]
    fn missing_title_is_rejected() {
        assert!(parse_front_matter("---\nid: x\n---\nbody").is_none());
        assert!(parse_front_matter("no header").is_none());
    }

    #[test]
    fn document_without_cases_keeps_description() {
        let record = parse_front_matter("---\ntitle: Echo\n---\nPrint the input.").unwrap();
        assert_eq!(record.description, "Print the input.");
        assert!(record.test_cases.is_empty());
        assert!(record.reference_answer.is_none());
    }
}
