use super::format::{split_family, FormatProfile};
use super::front_matter::parse_front_matter;
use super::patterns::{
    capture, clean_title, first_match, is_boundary, is_metadata, is_structural, matches_any,
    BOUNDARY_PATTERNS, DESCRIPTION_PATTERNS, DIFFICULTY_PATTERNS, INPUT_PATTERNS,
    OUTPUT_PATTERNS, STOP_PATTERNS, TAG_PATTERNS,
};
use crate::models::{positional_case_description, Difficulty, ExerciseRecord, TestCase};

/// Longest title taken from a plain first line when no boundary exists.
const MAX_FALLBACK_TITLE_CHARS: usize = 80;

/// Parse a document (or chunk) into exercise records without any service call.
/// Records are returned without ids; empty-title exercises are dropped.
pub fn parse_content(content: &str, profile: &FormatProfile) -> Vec<ExerciseRecord> {
    if profile.is_front_matter {
        return parse_front_matter(content).into_iter().collect();
    }

    let spans = if profile.has_multiple_questions {
        split_exercises(content)
    } else {
        vec![content.to_string()]
    };

    spans
        .iter()
        .filter_map(|span| parse_exercise(span))
        .filter(|record| {
            // In a document with examples, a span without any is commentary
            // (preface, section intro) rather than an exercise.
            !(profile.has_multiple_questions
                && profile.has_structured_examples
                && record.test_cases.is_empty())
        })
        .collect()
}

/// Split a multi-exercise document into one span per exercise. Text before
/// the first boundary is dropped. A document without a split family is one
/// span.
pub fn split_exercises(content: &str) -> Vec<String> {
    let Some(family) = split_family(content) else {
        return vec![content.to_string()];
    };
    let lines: Vec<&str> = content.lines().collect();
    let starts_exercise =
        |line: &str| first_match(&BOUNDARY_PATTERNS, line).is_some_and(|p| p.name == family);

    let mut spans = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    let mut in_fence = false;

    for &line in &lines {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if !in_fence && starts_exercise(line) {
            if let Some(span) = current.take() {
                spans.push(span.join("\n"));
            }
            current = Some(Vec::new());
        }
        if let Some(span) = current.as_mut() {
            span.push(line);
        }
    }
    if let Some(span) = current {
        spans.push(span.join("\n"));
    }
    spans
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Title line: the first heading or boundary line, else the first plain line.
fn find_title(lines: &[&str]) -> Option<(usize, String)> {
    let mut in_fence = false;
    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence && is_boundary(line) {
            let title = clean_title(line);
            if !title.is_empty() {
                return Some((i, title));
            }
        }
    }

    let (i, line) = lines.iter().enumerate().find(|(_, l)| {
        let t = l.trim();
        !t.is_empty() && !is_fence(t) && !is_structural(t) && !is_metadata(t)
    })?;
    let title: String = clean_title(line).chars().take(MAX_FALLBACK_TITLE_CHARS).collect();
    (!title.is_empty()).then_some((i, title))
}

fn find_difficulty(lines: &[&str]) -> Difficulty {
    let line_match = lines
        .iter()
        .find_map(|l| DIFFICULTY_PATTERNS[0].regex.captures(l))
        .and_then(|c| c.name("value"))
        .and_then(|m| Difficulty::from_label(m.as_str()));
    let bracket_match = || {
        lines
            .iter()
            .find_map(|l| capture(&DIFFICULTY_PATTERNS[1..], l, "value"))
            .and_then(Difficulty::from_label)
    };
    line_match.or_else(bracket_match).unwrap_or_default()
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split([',', '，', '、', ';', '；', '|'])
        .map(|t| {
            t.trim()
                .trim_matches(|c| matches!(c, '[' | ']' | '【' | '】' | '`' | '#' | '*'))
                .trim()
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn collect_description(lines: &[&str], title_idx: Option<usize>) -> String {
    let marker = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| capture(&DESCRIPTION_PATTERNS, l, "rest").map(|rest| (i, rest)));

    let (start, mut parts) = match marker {
        Some((i, rest)) => {
            let first = if rest.trim().is_empty() { Vec::new() } else { vec![rest.trim()] };
            (i + 1, first)
        }
        None => (title_idx.map_or(0, |i| i + 1), Vec::new()),
    };

    for line in lines.iter().skip(start) {
        if is_structural(line) || is_fence(line) || matches_any(&DESCRIPTION_PATTERNS, line) {
            break;
        }
        if is_metadata(line) {
            continue;
        }
        parts.push(line.trim_end());
    }
    parts.join("\n").trim().to_string()
}

/// Parse a single exercise span. `None` when no title can be found.
pub fn parse_exercise(span: &str) -> Option<ExerciseRecord> {
    let lines: Vec<&str> = span.lines().collect();
    let (title_idx, title) = find_title(&lines)?;

    let mut record = ExerciseRecord::new(title);
    record.difficulty = find_difficulty(&lines);
    if let Some(raw) = lines.iter().find_map(|l| capture(&TAG_PATTERNS, l, "value")) {
        for tag in split_tags(raw) {
            record.push_tag(&tag);
        }
    }
    record.description = collect_description(&lines, Some(title_idx));

    let body = lines[title_idx + 1..].join("\n");
    record.test_cases = extract_test_cases(&body);
    Some(record)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseState {
    Idle,
    InInput,
    InOutput,
}

struct CaseCollector {
    state: CaseState,
    buffer: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl CaseCollector {
    fn flush(&mut self) {
        let text = self.buffer.join("\n").trim().to_string();
        self.buffer.clear();
        if text.is_empty() {
            return;
        }
        match self.state {
            CaseState::InInput => self.inputs.push(text),
            CaseState::InOutput => self.outputs.push(text),
            CaseState::Idle => {}
        }
    }

    fn open(&mut self, state: CaseState, rest: &str) {
        self.flush();
        self.state = state;
        if !rest.trim().is_empty() {
            self.buffer.push(rest.trim().to_string());
        }
    }
}

/// Collect input/output pairs with a line state machine. Inputs and outputs
/// pair positionally; unpaired trailing entries are dropped.
pub fn extract_test_cases(text: &str) -> Vec<TestCase> {
    let mut c = CaseCollector {
        state: CaseState::Idle,
        buffer: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
    };
    let mut in_fence = false;

    for line in text.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            if c.state != CaseState::Idle {
                c.buffer.push(line.trim_end().to_string());
            }
            continue;
        }

        if let Some(rest) = capture(&INPUT_PATTERNS, line, "rest") {
            c.open(CaseState::InInput, rest);
        } else if let Some(rest) = capture(&OUTPUT_PATTERNS, line, "rest") {
            c.open(CaseState::InOutput, rest);
        } else if line.trim().is_empty() {
            // A marker followed by a blank line keeps waiting for its block.
            if !c.buffer.is_empty() {
                c.flush();
                c.state = CaseState::Idle;
            }
        } else if matches_any(&STOP_PATTERNS, line) {
            c.flush();
            c.state = CaseState::Idle;
        } else if c.state != CaseState::Idle {
            c.buffer.push(line.trim().to_string());
        }
    }
    c.flush();

    let total = c.inputs.len().min(c.outputs.len());
    c.inputs
        .into_iter()
        .zip(c.outputs)
        .enumerate()
        .map(|(i, (input, output))| {
            TestCase::new(input, output).with_description(positional_case_description(i + 1, total))
        })
        .collect()
}
