//! Intent classification
//!
//! The NLU model is an external collaborator reached through
//! [`IntentClassifier`]. [`KeywordClassifier`] is the offline stand-in used
//! when no NLU server is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub const UNKNOWN_INTENT: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIntent {
    pub label: String,
    pub confidence: f32,
}

/// Outcome of one classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub ranking: Vec<RankedIntent>,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            ranking: Vec::new(),
        }
    }

    pub fn with_ranking(mut self, ranking: Vec<RankedIntent>) -> Self {
        self.ranking = ranking;
        self
    }

    /// What a failed or timed-out call degrades to.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_INTENT, 0.0)
    }
}

/// text → (label, confidence, ranked alternatives)
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;
}

/// Static keyword lists, one row per bound intent
const INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("report_issue_plumber", &["pipe", "leak", "plumb", "tap", "faucet", "drain", "toilet", "sink", "clog", "water heater"]),
    ("report_issue_electrician", &["electric", "wiring", "socket", "switch", "circuit", "fuse", "power trip", "light"]),
    ("report_issue_AC", &["ac", "aircon", "air con", "air conditioner", "air-cond", "cooling"]),
    ("report_issue_appliancetech", &["appliance", "washing machine", "fridge", "refrigerator", "oven", "microwave", "dryer"]),
    ("report_issue_carpenter", &["carpent", "wood", "cabinet", "door", "furniture", "shelf"]),
    ("report_issue_painter", &["paint", "repaint", "wall colour"]),
    ("report_issue_locksmith", &["lock", "key", "locked out"]),
    ("report_issue_roofer", &["roof", "gutter", "shingle"]),
    ("report_issue_pest", &["pest", "termite", "cockroach", "rat", "ants", "bed bug"]),
    ("report_issue_tiler", &["tile", "tiling", "grout"]),
    ("report_issue_glass", &["glass", "window", "mirror"]),
    ("report_issue_gardener", &["garden", "lawn", "grass", "hedge", "tree"]),
    ("report_issue_IT", &["wifi", "laptop", "computer", "printer", "router", "internet"]),
    ("report_issue_fence", &["fence", "gate"]),
    ("report_issue_cleaner", &["clean", "mop", "vacuum"]),
];

/// Keyword-scoring classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Score every intent by keyword hits, best first.
    pub fn rank(text: &str) -> Vec<RankedIntent> {
        let normalized: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { ' ' })
            .collect();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let padded = format!(" {} ", tokens.join(" "));

        let mut ranking: Vec<RankedIntent> = INTENT_KEYWORDS
            .iter()
            .filter_map(|(intent, keywords)| {
                let hits = keywords
                    .iter()
                    .filter(|kw| keyword_hit(kw, &tokens, &padded))
                    .count();
                (hits > 0).then(|| RankedIntent {
                    label: intent.to_string(),
                    confidence: confidence_for(hits),
                })
            })
            .collect();

        ranking.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranking
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        let ranking = Self::rank(text);
        let classification = match ranking.first() {
            Some(best) => Classification::new(best.label.clone(), best.confidence),
            None => Classification::unknown(),
        };
        Ok(classification.with_ranking(ranking))
    }
}

/// Multi-word keywords match as a phrase, short ones as a whole token,
/// the rest as a token prefix ("leak" hits "leaking").
fn keyword_hit(keyword: &str, tokens: &[&str], padded: &str) -> bool {
    if keyword.contains(' ') {
        padded.contains(&format!(" {} ", keyword))
    } else if keyword.len() <= 3 {
        tokens.iter().any(|t| *t == keyword)
    } else {
        tokens.iter().any(|t| t.starts_with(keyword))
    }
}

fn confidence_for(hits: usize) -> f32 {
    match hits {
        0 => 0.0,
        1 => 0.6,
        2 => 0.75,
        _ => 0.9,
    }
}
