//! Expertise catalog
//!
//! Binds inbound intent labels to service categories. Loaded once at
//! startup and shared read-only by the matcher, extractor and orchestrator.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::Result;

/// Intent label of the single-shot booking request itself.
pub const EASY_BOOK_INTENT: &str = "easy_book";

/// Category used when nothing more specific could be derived.
pub const GENERAL_CATEGORY: &str = "General";

/// Category used when a free-text problem matches no keyword.
pub const HANDYMAN_CATEGORY: &str = "Handyman";

const DEFAULT_BINDINGS: &[(&str, &str)] = &[
    ("report_issue_plumber", "Plumber"),
    ("report_issue_electrician", "Electrician"),
    ("report_issue_AC", "AC Repair"),
    ("report_issue_appliancetech", "Appliance Repair"),
    ("report_issue_carpenter", "Carpenter"),
    ("report_issue_painter", "Painter"),
    ("report_issue_locksmith", "Locksmith"),
    ("report_issue_roofer", "Roofer"),
    ("report_issue_pest", "Pest Control"),
    ("report_issue_tiler", "Tiler"),
    ("report_issue_glass", "Glass & Window"),
    ("report_issue_gardener", "Gardener"),
    ("report_issue_IT", "IT Support"),
    ("report_issue_fence", "Fence & Gate"),
    ("report_issue_cleaner", "Cleaner"),
];

/// Problem-text keywords used when no classified category is on hand.
/// First hit wins, so "ac" sits after the more specific words.
const PROBLEM_KEYWORDS: &[(&str, &str)] = &[
    ("pipe", "Plumber"),
    ("electric", "Electrician"),
    ("ac", "AC Repair"),
    ("appliance", "Appliance Repair"),
    ("carpenter", "Carpenter"),
    ("paint", "Painter"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBinding {
    pub intent: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertiseCatalog {
    bindings: Vec<CategoryBinding>,
}

impl Default for ExpertiseCatalog {
    fn default() -> Self {
        Self {
            bindings: DEFAULT_BINDINGS
                .iter()
                .map(|(intent, category)| CategoryBinding {
                    intent: intent.to_string(),
                    category: category.to_string(),
                })
                .collect(),
        }
    }
}

impl ExpertiseCatalog {
    pub fn new(bindings: Vec<CategoryBinding>) -> Self {
        Self { bindings }
    }

    /// Read a JSON array of `{ "intent", "category" }` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let bindings: Vec<CategoryBinding> = serde_json::from_str(&raw)?;
        info!(
            bindings = bindings.len(),
            path = %path.as_ref().display(),
            "Loaded expertise catalog"
        );
        Ok(Self { bindings })
    }

    /// Category bound to an intent label. The easy-book meta intent never
    /// maps to a category.
    pub fn category_for_intent(&self, intent: &str) -> Option<&str> {
        if intent == EASY_BOOK_INTENT {
            return None;
        }
        self.bindings
            .iter()
            .find(|b| b.intent == intent)
            .map(|b| b.category.as_str())
    }

    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.intent.as_str())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.category.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Coarse category guess from raw problem text, `Handyman` when no
    /// keyword appears.
    pub fn infer_from_problem(&self, problem: &str) -> String {
        let lowered = problem.to_lowercase();
        PROBLEM_KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, category)| category.to_string())
            .unwrap_or_else(|| HANDYMAN_CATEGORY.to_string())
    }
}
