use serde_json::Value;

use crate::models::{
    positional_case_description, question_id, Difficulty, ExerciseRecord, QuestionType, TestCase,
};

/// Read-only view over untrusted service JSON. Every accessor is total:
/// missing keys and wrong types fall back to the given default.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a>(&'a Value);

impl<'a> Payload<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &'a Value {
        self.0
    }

    fn field(&self, key: &str) -> Option<&'a Value> {
        self.0.as_object()?.get(key)
    }

    /// First present, non-null key among `keys`.
    fn first_field(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .find_map(|k| self.field(k).filter(|v| !v.is_null()))
    }

    /// String value only; anything else yields `default`.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.field(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Text rendering of any scalar or composite value.
    pub fn get_text(&self, key: &str, default: &str) -> String {
        match self.field(key) {
            Some(v) => value_to_text(v).unwrap_or_else(|| default.to_string()),
            None => default.to_string(),
        }
    }

    pub fn get_array(&self, key: &str) -> Vec<Payload<'a>> {
        self.field(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(Payload).collect())
            .unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.field(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => true,
                "false" | "no" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// `get_text` over the first present key of several spellings.
    pub fn get_text_any(&self, keys: &[&str], default: &str) -> String {
        self.first_field(keys)
            .and_then(value_to_text)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_array_any(&self, keys: &[&str]) -> Vec<Payload<'a>> {
        keys.iter()
            .map(|k| self.get_array(k))
            .find(|items| !items.is_empty())
            .unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.field(key).is_some_and(|v| !v.is_null())
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Structured inputs are kept in JSON notation so they stay runnable.
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn string_list(item: &Payload<'_>, key: &str) -> Vec<String> {
    match item.value().get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(value_to_text).collect(),
        Some(Value::String(s)) => s
            .split([',', '，', '、'])
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Locate the exercise list: a bare array, a wrapper object, or one record.
fn exercise_items(root: &Value) -> Vec<Payload<'_>> {
    let payload = Payload::new(root);
    match root {
        Value::Array(items) => items.iter().map(Payload::new).collect(),
        Value::Object(_) => {
            let wrapped = payload.get_array_any(&["questions", "exercises", "problems", "items"]);
            if !wrapped.is_empty() {
                wrapped
            } else if payload.has("title") {
                vec![payload]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Cases from a payload item. Cases without an explicit marker are treated as
/// taken from the source document.
pub fn cases_from_payload(items: &[Payload<'_>], default_generated: bool) -> Vec<TestCase> {
    let total = items.len();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let description = item.get_str("description", "");
            TestCase {
                input: item.get_text_any(&["input", "in"], ""),
                expected_output: item.get_text_any(
                    &["output", "expectedOutput", "expected_output", "expected", "out"],
                    "",
                ),
                description: if description.trim().is_empty() {
                    positional_case_description(i + 1, total)
                } else {
                    description.trim().to_string()
                },
                is_ai_generated: if item.has("isAIGenerated") {
                    item.get_bool("isAIGenerated", default_generated)
                } else {
                    item.get_bool("is_ai_generated", default_generated)
                },
            }
        })
        .collect()
}

/// Build records from a parsed extraction payload. Items without a title are
/// skipped; ids derive from the chunk identity and in-chunk sequence.
pub fn records_from_payload(root: &Value, source_name: &str, chunk_index: usize) -> Vec<ExerciseRecord> {
    let mut records = Vec::new();

    for item in exercise_items(root) {
        let title = item.get_text_any(&["title", "name"], "").trim().to_string();
        if title.is_empty() {
            tracing::debug!(source = source_name, chunk = chunk_index, "Skipping untitled payload item");
            continue;
        }

        let mut record = ExerciseRecord::new(title);
        record.question_type = QuestionType::from_label(&item.get_str("type", "code"));
        record.difficulty = Difficulty::from_label(&item.get_text("difficulty", "")).unwrap_or_default();
        for tag in string_list(&item, "tags") {
            record.push_tag(&tag);
        }
        record.description = item.get_text_any(&["description", "content", "problem"], "").trim().to_string();
        record.options = string_list(&item, "options");
        record.test_cases = cases_from_payload(&item.get_array_any(&["testCases", "test_cases", "examples"]), false);
        record.reference_answer = Some(item.get_text_any(&["referenceAnswer", "reference_answer", "answer"], ""))
            .filter(|a| !a.trim().is_empty());

        record.id = question_id(source_name, chunk_index, records.len(), &record.title);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_are_total() {
        let value = json!({"a": "x", "n": 3, "b": true, "list": [1, 2], "s": "yes"});
        let p = Payload::new(&value);
        assert_eq!(p.get_str("a", "d"), "x");
        assert_eq!(p.get_str("n", "d"), "d");
        assert_eq!(p.get_str("missing", "d"), "d");
        assert_eq!(p.get_text("n", ""), "3");
        assert_eq!(p.get_text("list", ""), "[1,2]");
        assert_eq!(p.get_array("list").len(), 2);
        assert!(p.get_array("a").is_empty());
        assert!(p.get_bool("b", false));
        assert!(p.get_bool("s", false));
        assert!(!p.get_bool("missing", false));

        let scalar = json!(42);
        let p = Payload::new(&scalar);
        assert_eq!(p.get_str("a", "d"), "d");
        assert!(p.get_array("a").is_empty());
    }

    #[test]
    fn wrapped_payload_builds_records() {
        let value = json!({
            "questions": [{
                "title": "Two Sum",
                "difficulty": "Easy",
                "tags": ["array", "hash table", "array"],
                "description": "Find two indices.",
                "testCases": [
                    {"input": "[2,7,11,15], 9", "output": "[0,1]"},
                    {"input": [3, 3], "output": [0, 1], "isAIGenerated": true},
                    {"input": "[]", "expectedOutput": "[]", "description": "empty"}
                ]
            }, {
                "title": "   "
            }]
        });
        let records = records_from_payload(&value, "algo.md", 2);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, question_id("algo.md", 2, 0, "Two Sum"));
        assert_eq!(r.difficulty, Difficulty::Easy);
        assert_eq!(r.tags, vec!["array", "hash table"]);
        assert_eq!(r.test_cases.len(), 3);
        assert!(!r.test_cases[0].is_ai_generated);
        assert_eq!(r.test_cases[0].description, "basic");
        assert_eq!(r.test_cases[1].input, "[3,3]");
        assert!(r.test_cases[1].is_ai_generated);
        assert_eq!(r.test_cases[2].expected_output, "[]");
        assert_eq!(r.test_cases[2].description, "empty");
        assert!(r.reference_answer.is_none());
    }

    #[test]
    fn bare_array_and_single_object() {
        let array = json!([{"title": "A"}, {"title": "B", "type": "choice", "options": ["x", "y"]}]);
        let records = records_from_payload(&array, "s.md", 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].question_type, QuestionType::Choice);
        assert_eq!(records[1].options, vec!["x", "y"]);
        assert_ne!(records[0].id, records[1].id);

        let single = json!({"title": "Solo", "referenceAnswer": "print(1)"});
        let records = records_from_payload(&single, "s.md", 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reference_answer.as_deref(), Some("print(1)"));
    }

    #[test]
    fn unrecognized_shapes_yield_nothing() {
        assert!(records_from_payload(&json!({"foo": 1}), "s.md", 0).is_empty());
        assert!(records_from_payload(&json!("text"), "s.md", 0).is_empty());
        assert!(records_from_payload(&json!(null), "s.md", 0).is_empty());
    }

    #[test]
    fn unknown_difficulty_defaults_to_medium() {
        let records = records_from_payload(&json!([{"title": "A", "difficulty": "legendary"}]), "s.md", 0);
        assert_eq!(records[0].difficulty, Difficulty::Medium);
    }
}
