use serde::{Deserialize, Serialize};

use super::front_matter::is_front_matter;
use super::patterns::{
    first_match, matches_any, NamedPattern, BOUNDARY_PATTERNS, DESCRIPTION_PATTERNS, DIFFICULTY_PATTERNS,
    INPUT_PATTERNS, OUTPUT_PATTERNS, TAG_PATTERNS,
};

/// What `analyze_format` learned about a document's layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatProfile {
    pub boundary_families: Vec<String>,
    pub input_families: Vec<String>,
    pub output_families: Vec<String>,
    pub metadata_families: Vec<String>,
    pub has_multiple_questions: bool,
    pub has_structured_examples: bool,
    pub boundary_line_count: usize,
    pub is_front_matter: bool,
}

impl FormatProfile {
    /// Every family name this profile matched, in family order.
    pub fn all_families(&self) -> impl Iterator<Item = &str> {
        self.boundary_families
            .iter()
            .chain(&self.input_families)
            .chain(&self.output_families)
            .chain(&self.metadata_families)
            .map(String::as_str)
    }
}

fn note(names: &mut Vec<String>, family: &[NamedPattern], line: &str) -> bool {
    match first_match(family, line) {
        Some(p) => {
            if !names.iter().any(|n| n == p.name) {
                names.push(p.name.to_string());
            }
            true
        }
        None => false,
    }
}

/// Detect boundaries, example sections and metadata. Lines inside code
/// fences are ignored.
pub fn analyze_format(content: &str) -> FormatProfile {
    let mut profile = FormatProfile {
        is_front_matter: is_front_matter(content),
        ..FormatProfile::default()
    };

    let mut in_fence = false;
    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if note(&mut profile.boundary_families, &BOUNDARY_PATTERNS, line) {
            profile.boundary_line_count += 1;
        }
        note(&mut profile.input_families, &INPUT_PATTERNS, line);
        note(&mut profile.output_families, &OUTPUT_PATTERNS, line);
        note(&mut profile.metadata_families, &DIFFICULTY_PATTERNS, line);
        note(&mut profile.metadata_families, &TAG_PATTERNS, line);
        note(&mut profile.metadata_families, &DESCRIPTION_PATTERNS, line);
    }

    profile.has_multiple_questions = !profile.is_front_matter && split_family(content).is_some();
    profile.has_structured_examples =
        !profile.input_families.is_empty() && !profile.output_families.is_empty();
    profile
}

/// Lines outside code fences, fence markers removed.
fn unfenced_lines(content: &str) -> Vec<&str> {
    let mut in_fence = false;
    content
        .lines()
        .filter(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return false;
            }
            !in_fence
        })
        .collect()
}

fn boundary_family(line: &str) -> Option<usize> {
    BOUNDARY_PATTERNS.iter().position(|p| p.regex.is_match(line))
}

/// Spans started by `family` that carry both an input and an output marker.
fn spans_with_examples(lines: &[&str], family: usize) -> usize {
    let mut complete = 0;
    let mut current: Option<(bool, bool)> = None;
    for line in lines {
        if boundary_family(line) == Some(family) {
            if let Some((true, true)) = current {
                complete += 1;
            }
            current = Some((false, false));
        }
        if let Some((input, output)) = current.as_mut() {
            *input |= matches_any(&INPUT_PATTERNS, line);
            *output |= matches_any(&OUTPUT_PATTERNS, line);
        }
    }
    if let Some((true, true)) = current {
        complete += 1;
    }
    complete
}

/// The boundary family that divides `content` into exercises, or `None` for
/// a single exercise.
///
/// The highest-priority family with at least two matches wins. A lower
/// family that follows a lone higher-priority boundary (a `# Title` above a
/// numbered steps list) only splits when at least two of its spans carry
/// their own examples.
pub fn split_family(content: &str) -> Option<&'static str> {
    let lines = unfenced_lines(content);
    let mut counts = vec![0usize; BOUNDARY_PATTERNS.len()];
    let mut first_line = vec![None; BOUNDARY_PATTERNS.len()];
    for (i, line) in lines.iter().enumerate() {
        if let Some(pos) = boundary_family(line) {
            counts[pos] += 1;
            first_line[pos].get_or_insert(i);
        }
    }

    let pos = counts.iter().position(|&c| c >= 2)?;
    let under_lone_heading = (0..pos).any(|higher| {
        counts[higher] == 1
            && first_line[higher]
                .zip(first_line[pos])
                .is_some_and(|(h, l)| h < l)
    });
    if under_lone_heading && spans_with_examples(&lines, pos) < 2 {
        return None;
    }
    Some(BOUNDARY_PATTERNS[pos].name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_exercise_profile() {
        let profile = analyze_format("# Two Sum\n输入：[2,7,11,15], 9\n输出：[0,1]");
        assert!(!profile.has_multiple_questions);
        assert!(profile.has_structured_examples);
        assert_eq!(profile.boundary_line_count, 1);
        assert_eq!(profile.boundary_families, vec!["heading"]);
        assert_eq!(profile.input_families, vec!["input_cjk"]);
        assert_eq!(profile.output_families, vec!["output_cjk"]);
    }

    #[test]
    fn multiple_exercises_detected() {
        let doc = "1. Add\nInput: 1 2\nOutput: 3\n\n2. Sub\nInput: 3 1\nOutput: 2\n";
        let profile = analyze_format(doc);
        assert!(profile.has_multiple_questions);
        assert_eq!(profile.boundary_line_count, 2);
        assert_eq!(profile.input_families, vec!["input_latin"]);
    }

    #[test]
    fn fenced_lines_are_ignored() {
        let doc = "# Task\n```\n1. not a boundary\n# comment\n```\nDifficulty: Easy\n";
        let profile = analyze_format(doc);
        assert_eq!(profile.boundary_line_count, 1);
        assert_eq!(profile.metadata_families, vec!["difficulty_line"]);
        assert!(!profile.has_structured_examples);
    }

    #[test]
    fn numbered_steps_under_one_heading_stay_single() {
        let doc = "# Merge Intervals\nSteps:\n1. sort the intervals\n2. sweep once\nInput: [[1,3],[2,6]]\nOutput: [[1,6]]\n";
        assert_eq!(split_family(doc), None);
        assert!(!analyze_format(doc).has_multiple_questions);
        assert_eq!(analyze_format(doc).boundary_line_count, 3);
    }

    #[test]
    fn numbered_exercises_under_a_set_heading_still_split() {
        let doc = "# Week 1\n1. Add\nInput: 1 2\nOutput: 3\n2. Sub\nInput: 3 1\nOutput: 2\n";
        assert_eq!(split_family(doc), Some("numbered"));
        assert!(analyze_format(doc).has_multiple_questions);
    }

    #[test]
    fn mixed_single_boundaries_are_one_exercise() {
        assert_eq!(split_family("# Title\n1. only step\nInput: 1\nOutput: 1"), None);
        assert_eq!(split_family("## A\nx\n## B\ny"), Some("heading"));
    }

    #[test]
    fn front_matter_is_never_multiple() {
        let doc = "---\ntitle: A\n---\n## 题目描述\n## 参考答案\n";
        let profile = analyze_format(doc);
        assert!(profile.is_front_matter);
        assert!(!profile.has_multiple_questions);
    }

    #[test]
    fn all_families_flattens() {
        let profile = analyze_format("# T\n标签：数组\nInput: 1\nOutput: 1");
        let names: Vec<&str> = profile.all_families().collect();
        assert_eq!(names, vec!["heading", "input_latin", "output_latin", "tags_line"]);
    }
}
