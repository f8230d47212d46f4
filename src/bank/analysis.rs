use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{write_bytes_atomic, write_json_atomic, BankStore, ANALYSIS_FILE, REPORT_FILE};
use super::StorageError;
use crate::models::{Difficulty, ExerciseRecord};

/// Identifies the record set an analysis was computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankFingerprint {
    pub record_files: usize,
    pub newest_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseStats {
    pub min: usize,
    pub avg: f64,
    pub max: usize,
    pub total: usize,
    pub ai_generated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Aggregate view of a bank; always derivable from the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAnalysis {
    pub bank_name: String,
    pub total_questions: usize,
    pub difficulty_counts: BTreeMap<Difficulty, usize>,
    /// Most frequent first; ties by name.
    pub tag_counts: Vec<TagCount>,
    pub test_cases: TestCaseStats,
    pub ai_generated_share: f64,
    pub patterns: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub fingerprint: BankFingerprint,
}

fn coverage_pattern(avg: f64) -> String {
    if avg < 3.0 {
        format!("Sparse test coverage: {avg:.1} cases per question on average")
    } else if avg < 5.0 {
        format!("Moderate test coverage: {avg:.1} cases per question on average")
    } else {
        format!("Thorough test coverage: {avg:.1} cases per question on average")
    }
}

fn tag_pattern(distinct: usize) -> String {
    if distinct > 10 {
        format!("Rich topic variety: {distinct} distinct tags")
    } else if distinct > 5 {
        format!("Moderate topic variety: {distinct} distinct tags")
    } else {
        format!("Narrow topic focus: {distinct} distinct tags")
    }
}

fn difficulty_pattern(counts: &BTreeMap<Difficulty, usize>, total: usize) -> String {
    let skewed = counts
        .iter()
        .find(|(_, n)| **n * 2 > total)
        .map(|(d, n)| (d, *n * 100 / total.max(1)));
    match skewed {
        Some((level, pct)) => format!("Difficulty skewed toward {level} ({pct}% of questions)"),
        None => "Balanced difficulty distribution".to_string(),
    }
}

/// Pure aggregation over `records`. The fingerprint is left empty.
pub fn analyze(bank_name: &str, records: &[ExerciseRecord]) -> BankAnalysis {
    let total = records.len();

    let mut difficulty_counts: BTreeMap<Difficulty, usize> =
        Difficulty::all().iter().map(|d| (*d, 0)).collect();
    let mut tags: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *difficulty_counts.entry(record.difficulty).or_default() += 1;
        for tag in &record.tags {
            *tags.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut tag_counts: Vec<TagCount> = tags
        .into_iter()
        .map(|(tag, count)| TagCount { tag: tag.to_string(), count })
        .collect();
    tag_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));

    let case_counts: Vec<usize> = records.iter().map(|r| r.test_cases.len()).collect();
    let total_cases: usize = case_counts.iter().sum();
    let ai_generated: usize = records.iter().map(ExerciseRecord::generated_case_count).sum();
    let test_cases = TestCaseStats {
        min: case_counts.iter().copied().min().unwrap_or(0),
        avg: if total == 0 { 0.0 } else { total_cases as f64 / total as f64 },
        max: case_counts.iter().copied().max().unwrap_or(0),
        total: total_cases,
        ai_generated,
    };
    let ai_generated_share = if total_cases == 0 {
        0.0
    } else {
        ai_generated as f64 / total_cases as f64
    };

    let patterns = if total == 0 {
        vec!["Bank is empty".to_string()]
    } else {
        let mut p = vec![
            coverage_pattern(test_cases.avg),
            tag_pattern(tag_counts.len()),
            difficulty_pattern(&difficulty_counts, total),
        ];
        if ai_generated * 2 > total_cases {
            p.push(format!(
                "Most test cases are AI-generated ({:.0}%); review them before relying on results",
                ai_generated_share * 100.0
            ));
        }
        p
    };

    BankAnalysis {
        bank_name: bank_name.to_string(),
        total_questions: total,
        difficulty_counts,
        tag_counts,
        test_cases,
        ai_generated_share,
        patterns,
        generated_at: Utc::now(),
        fingerprint: BankFingerprint::default(),
    }
}

/// Human-readable report of an analysis.
pub fn render_markdown(analysis: &BankAnalysis) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Question bank analysis: {}\n", analysis.bank_name);
    let _ = writeln!(md, "Generated: {}\n", analysis.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md, "Total questions: **{}**\n", analysis.total_questions);

    let _ = writeln!(md, "## Difficulty\n");
    let _ = writeln!(md, "| Level | Questions |\n|---|---|");
    for (level, count) in &analysis.difficulty_counts {
        let _ = writeln!(md, "| {level} | {count} |");
    }

    let _ = writeln!(md, "\n## Tags\n");
    if analysis.tag_counts.is_empty() {
        let _ = writeln!(md, "_No tags._");
    }
    for tc in &analysis.tag_counts {
        let _ = writeln!(md, "- {} ({})", tc.tag, tc.count);
    }

    let stats = &analysis.test_cases;
    let _ = writeln!(md, "\n## Test cases\n");
    let _ = writeln!(md, "- Per question: min {}, avg {:.1}, max {}", stats.min, stats.avg, stats.max);
    let _ = writeln!(
        md,
        "- AI-generated: {} of {} ({:.0}%)",
        stats.ai_generated,
        stats.total,
        analysis.ai_generated_share * 100.0
    );

    let _ = writeln!(md, "\n## Patterns\n");
    for p in &analysis.patterns {
        let _ = writeln!(md, "- {p}");
    }
    md
}

/// Write `bank_analysis.json` and `analysis_report.md` into `bank_dir`.
pub fn save(analysis: &BankAnalysis, bank_dir: &Path) -> Result<(), StorageError> {
    write_json_atomic(&bank_dir.join(ANALYSIS_FILE), analysis)?;
    write_bytes_atomic(&bank_dir.join(REPORT_FILE), render_markdown(analysis).as_bytes())?;
    Ok(())
}

pub fn fingerprint(store: &BankStore, bank: &str) -> Result<BankFingerprint, StorageError> {
    let files = store.record_files(bank)?;
    let newest_modified = files
        .iter()
        .filter_map(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok())
        .max()
        .map(DateTime::<Utc>::from);
    Ok(BankFingerprint {
        record_files: files.len(),
        newest_modified,
    })
}

/// Recompute from the persisted records and save.
pub fn refresh(store: &BankStore, bank: &str) -> Result<BankAnalysis, StorageError> {
    let records: Vec<ExerciseRecord> = store
        .load_records(bank)?
        .into_iter()
        .map(|(_, r)| r)
        .collect();
    let mut analysis = analyze(bank, &records);
    analysis.fingerprint = fingerprint(store, bank)?;
    save(&analysis, &store.bank_dir(bank))?;
    tracing::info!(bank, questions = analysis.total_questions, "Bank analysis refreshed");
    Ok(analysis)
}

/// Saved analysis when its fingerprint still matches the bank, otherwise a
/// fresh one.
pub fn cached_analysis(store: &BankStore, bank: &str) -> Result<BankAnalysis, StorageError> {
    let path = store.bank_dir(bank).join(ANALYSIS_FILE);
    if path.is_file() {
        let current = fingerprint(store, bank)?;
        match std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<BankAnalysis>(&bytes).ok())
        {
            Some(saved) if saved.fingerprint == current => {
                tracing::debug!(bank, "Using cached bank analysis");
                return Ok(saved);
            }
            Some(_) => tracing::debug!(bank, "Bank analysis is stale"),
            None => tracing::warn!(bank, "Cached bank analysis unreadable, recomputing"),
        }
    }
    refresh(store, bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestCase;

    fn record(title: &str, difficulty: Difficulty, tags: &[&str], cases: usize, generated: usize) -> ExerciseRecord {
        let mut r = ExerciseRecord::new(title);
        r.difficulty = difficulty;
        for t in tags {
            r.push_tag(t);
        }
        for i in 0..cases {
            let case = TestCase::new(format!("[{i}, {i}, {i}, {i}]"), format!("{i}0"));
            r.test_cases.push(if i < generated { case.generated() } else { case });
        }
        r
    }

    #[test]
    fn empty_bank() {
        let a = analyze("b", &[]);
        assert_eq!(a.total_questions, 0);
        assert_eq!(a.test_cases.avg, 0.0);
        assert_eq!(a.patterns, vec!["Bank is empty"]);
        assert_eq!(a.difficulty_counts.values().sum::<usize>(), 0);
    }

    #[test]
    fn histograms_and_stats() {
        let records = vec![
            record("A", Difficulty::Easy, &["array", "dp"], 2, 0),
            record("B", Difficulty::Easy, &["array"], 4, 0),
            record("C", Difficulty::Hard, &["graph"], 6, 0),
        ];
        let a = analyze("algo", &records);
        assert_eq!(a.total_questions, 3);
        assert_eq!(a.difficulty_counts[&Difficulty::Easy], 2);
        assert_eq!(a.difficulty_counts[&Difficulty::Medium], 0);
        assert_eq!(a.tag_counts[0], TagCount { tag: "array".into(), count: 2 });
        assert_eq!(a.tag_counts[1].tag, "dp");
        assert_eq!((a.test_cases.min, a.test_cases.max), (2, 6));
        assert!((a.test_cases.avg - 4.0).abs() < f64::EPSILON);
        assert!(a.patterns[0].starts_with("Moderate test coverage"));
        assert!(a.patterns[1].starts_with("Narrow topic focus"));
        assert!(a.patterns[2].starts_with("Difficulty skewed toward easy"));
        assert_eq!(a.patterns.len(), 3);
    }

    #[test]
    fn coverage_thresholds() {
        assert!(coverage_pattern(2.9).starts_with("Sparse"));
        assert!(coverage_pattern(3.0).starts_with("Moderate"));
        assert!(coverage_pattern(4.9).starts_with("Moderate"));
        assert!(coverage_pattern(5.0).starts_with("Thorough"));
    }

    #[test]
    fn tag_thresholds() {
        assert!(tag_pattern(5).starts_with("Narrow"));
        assert!(tag_pattern(6).starts_with("Moderate"));
        assert!(tag_pattern(10).starts_with("Moderate"));
        assert!(tag_pattern(11).starts_with("Rich"));
    }

    #[test]
    fn balanced_and_ai_heavy() {
        let records = vec![
            record("A", Difficulty::Easy, &[], 3, 3),
            record("B", Difficulty::Medium, &[], 3, 2),
            record("C", Difficulty::Hard, &[], 3, 0),
        ];
        let a = analyze("b", &records);
        assert!(a.patterns.contains(&"Balanced difficulty distribution".to_string()));
        assert!(a.patterns.iter().any(|p| p.starts_with("Most test cases are AI-generated")));
        assert!((a.ai_generated_share - 5.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn markdown_report_sections() {
        let a = analyze("algo", &[record("A", Difficulty::Easy, &["array"], 1, 0)]);
        let md = render_markdown(&a);
        assert!(md.starts_with("# Question bank analysis: algo"));
        assert!(md.contains("| easy | 1 |"));
        assert!(md.contains("- array (1)"));
        assert!(md.contains("## Patterns"));
    }

    #[test]
    fn analysis_json_round_trips() {
        let a = analyze("algo", &[record("A", Difficulty::Hard, &["x"], 2, 1)]);
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("\"difficultyCounts\":{\"easy\":0,\"medium\":0,\"hard\":1}"));
        let back: BankAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn cache_reused_until_bank_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = BankStore::new(dir.path());
        store.persist(&record("A", Difficulty::Easy, &[], 1, 0), "b", "s", "A").unwrap();

        let first = cached_analysis(&store, "b").unwrap();
        assert!(dir.path().join("b").join(ANALYSIS_FILE).is_file());
        assert!(dir.path().join("b").join(REPORT_FILE).is_file());
        let second = cached_analysis(&store, "b").unwrap();
        assert_eq!(first.generated_at, second.generated_at);

        store.persist(&record("B", Difficulty::Hard, &[], 1, 0), "b", "s", "B").unwrap();
        let third = cached_analysis(&store, "b").unwrap();
        assert_eq!(third.total_questions, 2);
    }
}
