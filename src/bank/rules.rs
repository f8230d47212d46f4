use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{write_json_atomic, RULES_FILE};
use super::StorageError;
use crate::pipeline::heuristic::FormatProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRules {
    pub source: String,
    pub profile: FormatProfile,
}

/// Format detection results of one import run, per source and in aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRuleSummary {
    pub generated_at: DateTime<Utc>,
    pub sources: Vec<SourceRules>,
    /// How many sources matched each pattern family.
    pub family_counts: BTreeMap<String, usize>,
    pub front_matter_sources: usize,
    pub multi_question_sources: usize,
}

impl Default for ParseRuleSummary {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            sources: Vec::new(),
            family_counts: BTreeMap::new(),
            front_matter_sources: 0,
            multi_question_sources: 0,
        }
    }
}

impl ParseRuleSummary {
    pub fn add(&mut self, source: &str, profile: &FormatProfile) {
        self.count(profile);
        self.sources.push(SourceRules {
            source: source.to_string(),
            profile: profile.clone(),
        });
    }

    fn count(&mut self, profile: &FormatProfile) {
        for family in profile.all_families() {
            *self.family_counts.entry(family.to_string()).or_default() += 1;
        }
        if profile.is_front_matter {
            self.front_matter_sources += 1;
        }
        if profile.has_multiple_questions {
            self.multi_question_sources += 1;
        }
    }

    /// Fold a newer run into this summary. Sources seen again take the newer
    /// profile; aggregates are recounted over the merged source list.
    pub fn merge(&mut self, newer: &ParseRuleSummary) {
        for incoming in &newer.sources {
            match self.sources.iter_mut().find(|s| s.source == incoming.source) {
                Some(existing) => existing.profile = incoming.profile.clone(),
                None => self.sources.push(incoming.clone()),
            }
        }

        self.family_counts.clear();
        self.front_matter_sources = 0;
        self.multi_question_sources = 0;
        let profiles: Vec<FormatProfile> = self.sources.iter().map(|s| s.profile.clone()).collect();
        for profile in &profiles {
            self.count(profile);
        }
        self.generated_at = newer.generated_at;
    }

    /// The summary saved in `bank_dir`, if any. An unreadable file is logged
    /// and treated as absent.
    pub fn load(bank_dir: &Path) -> Option<Self> {
        let path = bank_dir.join(RULES_FILE);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable parse rules");
                None
            }
        }
    }

    /// Write `parse_rules.json` into `bank_dir`.
    pub fn save(&self, bank_dir: &Path) -> Result<(), StorageError> {
        write_json_atomic(&bank_dir.join(RULES_FILE), self)
    }
}
