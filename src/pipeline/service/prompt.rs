use crate::models::{ExerciseRecord, TestCase};

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a programming exercise extraction assistant. Your ONLY role is to
convert exercise documents into structured JSON.

RULES:
1. Extract EVERY exercise present in the text, in document order.
2. Copy titles, descriptions and given examples verbatim.
3. Output ONLY JSON. No commentary before or after it.
4. Never abbreviate data with "...", "…" or notes such as "(repeated)".
"#;

pub const REPAIR_SYSTEM_PROMPT: &str = r#"
You repair malformed JSON. Output ONLY the corrected JSON document.
Keep every value exactly as given. Do not add, drop or summarize data.
"#;

pub const TEST_CASE_SYSTEM_PROMPT: &str = r#"
You write test data for programming exercises. Every value you produce must be
complete and directly usable as program input or expected output. Output ONLY JSON.
"#;

/// Build the extraction prompt for one chunk.
pub fn build_extraction_prompt(chunk_content: &str, context_label: &str, min_cases: usize) -> String {
    format!(
        r#"Source: {context_label}

<document>
{chunk_content}
</document>

Extract ALL programming exercises from the above document into this JSON structure:

```json
{{
  "questions": [
    {{
      "title": "exercise title",
      "type": "code | choice | fill",
      "difficulty": "easy | medium | hard",
      "tags": ["topic1", "topic2"],
      "description": "full problem statement",
      "options": ["only for choice questions"],
      "testCases": [
        {{"input": "exact input", "output": "exact expected output", "description": "basic | boundary | special", "isAIGenerated": false}}
      ],
      "referenceAnswer": "reference solution or null"
    }}
  ]
}}
```

Provide at least {min_cases} test cases per exercise covering basic, boundary and special
cases. Examples copied from the document have "isAIGenerated": false; every case you write
yourself has "isAIGenerated": true."#
    )
}

/// Ask the service to turn a broken payload into valid JSON.
pub fn build_repair_prompt(broken: &str) -> String {
    format!(
        r#"The following text was meant to be JSON but does not parse.

<broken>
{broken}
</broken>

Return ONLY the corrected JSON. Keep all data unchanged. Do not use "..." or omit any
element."#
    )
}

fn render_cases(cases: &[(usize, &TestCase)]) -> String {
    cases
        .iter()
        .map(|(i, c)| {
            format!(
                "[{i}] input: {}\n    output: {}",
                c.input.replace('\n', "\\n"),
                c.expected_output.replace('\n', "\\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask for corrected data for the defective cases only.
pub fn build_fix_prompt(record: &ExerciseRecord, defective: &[usize]) -> String {
    let listed: Vec<(usize, &TestCase)> = defective
        .iter()
        .filter_map(|&i| record.test_cases.get(i).map(|c| (i, c)))
        .collect();

    format!(
        r#"Exercise: {title}

{description}

These test cases contain incomplete data:
{cases}

Rewrite each listed case with fully expanded, directly runnable data.
PROHIBITED: ellipses ("...", "…"), notes such as "(repeated 1000 times)" or "(omitted)",
bracketed placeholders such as "[large array]".

Wrong: {{"input": "[1, 2, 3, ..., 1000]", "output": "500500"}}
Right: {{"input": "[1, 2, 3, 4, 5]", "output": "15"}}

Keep inputs small enough to write out in full. Answer with:
{{"fixes": [{{"index": <listed index>, "input": "...", "output": "..."}}]}}"#,
        title = record.title,
        description = record.description,
        cases = render_cases(&listed),
    )
}

/// Ask for `needed` additional cases that differ from the existing ones.
pub fn build_supplement_prompt(record: &ExerciseRecord, needed: usize) -> String {
    let existing: Vec<(usize, &TestCase)> = record.test_cases.iter().enumerate().collect();
    let existing = if existing.is_empty() {
        "(none)".to_string()
    } else {
        render_cases(&existing)
    };

    format!(
        r#"Exercise: {title}

{description}

Existing test cases:
{existing}

Write {needed} NEW test cases that differ from the existing ones, covering boundary and
special situations. Every value must be complete; no ellipses or placeholders.
Answer with:
{{"testCases": [{{"input": "...", "output": "...", "description": "..."}}]}}"#,
        title = record.title,
        description = record.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_embeds_chunk_and_label() {
        let prompt = build_extraction_prompt("# Two Sum", "algo.md chunk 1/3", 5);
        assert!(prompt.contains("# Two Sum"));
        assert!(prompt.contains("algo.md chunk 1/3"));
        assert!(prompt.contains("at least 5 test cases"));
        assert!(prompt.contains("\"testCases\""));
    }

    #[test]
    fn repair_prompt_embeds_payload() {
        let prompt = build_repair_prompt("{\"title\": ");
        assert!(prompt.contains("{\"title\": "));
        assert!(prompt.contains("ONLY the corrected JSON"));
    }

    #[test]
    fn fix_prompt_lists_only_defective_cases() {
        let mut record = ExerciseRecord::new("Sum");
        record.test_cases = vec![
            TestCase::new("[1,2]", "3"),
            TestCase::new("[1, ..., 100]", "5050"),
        ];
        let prompt = build_fix_prompt(&record, &[1, 7]);
        assert!(prompt.contains("[1] input: [1, ..., 100]"));
        assert!(!prompt.contains("[0] input"));
        assert!(prompt.contains("Wrong:"));
        assert!(prompt.contains("Right:"));
    }

    #[test]
    fn supplement_prompt_states_count() {
        let record = ExerciseRecord::new("Sum");
        let prompt = build_supplement_prompt(&record, 2);
        assert!(prompt.contains("Write 2 NEW test cases"));
        assert!(prompt.contains("(none)"));
    }
}
