//! Learned associations between event signals and projects.
//!
//! Counters grow each time an event is billed to a project and are later
//! used to rank catalog projects for a new event. The value is owned by the
//! caller and persisted per user by the storage layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pattern::PatternAnalysis;
use crate::store::Project;
use crate::types::Confidence;

const KEYWORD_WEIGHT: f64 = 0.4;
const COMPANY_WEIGHT: f64 = 0.3;
const MEETING_TYPE_WEIGHT: f64 = 0.2;
const TIME_WEIGHT: f64 = 0.1;
const MIN_SCORE: f64 = 0.3;
const MAX_SUGGESTIONS: usize = 3;
const MAX_REASONS: usize = 3;

/// Signal counters for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAssociations {
    pub keywords: BTreeMap<String, u32>,
    pub companies: BTreeMap<String, u32>,
    pub meeting_types: BTreeMap<String, u32>,
    pub time_buckets: BTreeMap<String, u32>,
    pub total_mappings: u32,
}

impl ProjectAssociations {
    fn weight(&self, count: u32, factor: f64) -> f64 {
        f64::from(count) / f64::from(self.total_mappings) * factor
    }

    fn score(&self, analysis: &PatternAnalysis) -> f64 {
        if self.total_mappings == 0 {
            return 0.0;
        }
        let mut score = 0.0;
        for keyword in &analysis.keywords {
            if let Some(&n) = self.keywords.get(keyword) {
                score += self.weight(n, KEYWORD_WEIGHT);
            }
        }
        for company in &analysis.company {
            if let Some(&n) = self.companies.get(&company.name) {
                score += self.weight(n, COMPANY_WEIGHT);
            }
        }
        for meeting in &analysis.meeting_type {
            if let Some(&n) = self.meeting_types.get(&meeting.name) {
                score += self.weight(n, MEETING_TYPE_WEIGHT);
            }
        }
        if let Some(&n) = self.time_buckets.get(analysis.time.bucket.as_str()) {
            score += self.weight(n, TIME_WEIGHT);
        }
        score.min(1.0)
    }

    fn reasons(&self, analysis: &PatternAnalysis) -> Vec<String> {
        let keyword_reasons = analysis.keywords.iter().filter_map(|keyword| {
            let n = *self.keywords.get(keyword)?;
            (n > 1).then(|| format!("Contains keyword '{keyword}' (used {n} times)"))
        });
        let company_reasons = analysis.company.iter().filter_map(|company| {
            let n = self.companies.get(&company.name)?;
            Some(format!("Related to {} (mapped {n} times)", company.name))
        });
        keyword_reasons
            .chain(company_reasons)
            .take(MAX_REASONS)
            .collect()
    }
}

/// A catalog project ranked by learned associations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedSuggestion {
    pub project: Project,
    pub score: Confidence,
    pub reasons: Vec<String>,
}

/// Per-project signal counters, keyed by lower-cased project name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearnedAssociations {
    projects: BTreeMap<String, ProjectAssociations>,
}

impl LearnedAssociations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn project(&self, project_name: &str) -> Option<&ProjectAssociations> {
        self.projects.get(&project_name.to_lowercase())
    }

    /// Iterates projects in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProjectAssociations)> {
        self.projects.iter().map(|(name, assoc)| (name.as_str(), assoc))
    }

    pub(crate) fn record(&mut self, project_name: &str, analysis: &PatternAnalysis) {
        let learned = self
            .projects
            .entry(project_name.to_lowercase())
            .or_default();
        learned.total_mappings += 1;

        for keyword in &analysis.keywords {
            *learned.keywords.entry(keyword.clone()).or_default() += 1;
        }
        for company in &analysis.company {
            *learned.companies.entry(company.name.clone()).or_default() += 1;
        }
        for meeting in &analysis.meeting_type {
            *learned.meeting_types.entry(meeting.name.clone()).or_default() += 1;
        }
        *learned
            .time_buckets
            .entry(analysis.time.bucket.as_str().to_string())
            .or_default() += 1;
    }

    /// Ranks `projects` for an event with the given analysis.
    ///
    /// Only projects with a learned history can score; results above 0.3
    /// are kept, best three first.
    pub fn suggest(&self, analysis: &PatternAnalysis, projects: &[Project]) -> Vec<LearnedSuggestion> {
        let mut suggestions: Vec<LearnedSuggestion> = projects
            .iter()
            .filter_map(|project| {
                let learned = self.project(&project.name)?;
                let score = learned.score(analysis);
                (score > MIN_SCORE).then(|| LearnedSuggestion {
                    project: project.clone(),
                    score: Confidence::clamped(score),
                    reasons: learned.reasons(analysis),
                })
            })
            .collect();
        suggestions.sort_by(|a, b| b.score.value().total_cmp(&a.score.value()));
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }
}
