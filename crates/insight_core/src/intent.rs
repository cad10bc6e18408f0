//! Keyword-scoring intent classification. Pure, deterministic, no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Performance,
    Comparison,
    Anomaly,
    Drilldown,
    General,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Intent::Performance => "Performance",
            Intent::Comparison => "Comparison",
            Intent::Anomaly => "Anomaly",
            Intent::Drilldown => "Drilldown",
            Intent::General => "General",
        };
        write!(f, "{label}")
    }
}

const PERFORMANCE_KEYWORDS: &[&str] = &[
    "sales", "revenue", "performance", "trend", "growth", "volume", "q1", "q2", "q3", "q4",
    "quarter", "month", "year",
];

const COMPARISON_KEYWORDS: &[&str] = &[
    "compare", "versus", "vs", "difference", "better", "worse", "than", "last year", "this year",
];

const ANOMALY_KEYWORDS: &[&str] = &[
    "underperforming", "overperforming", "outlier", "unusual", "anomaly", "spike", "drop",
    "concern", "problem",
];

const DRILLDOWN_KEYWORDS: &[&str] = &[
    "why", "what's driving", "cause", "reason", "breakdown", "detail", "explain", "factors",
];

/// Vocabularies scanned in a fixed order; ties keep the earliest intent.
const VOCABULARIES: &[(Intent, &[&str])] = &[
    (Intent::Performance, PERFORMANCE_KEYWORDS),
    (Intent::Comparison, COMPARISON_KEYWORDS),
    (Intent::Anomaly, ANOMALY_KEYWORDS),
    (Intent::Drilldown, DRILLDOWN_KEYWORDS),
];

/// Score each vocabulary by literal substring hits against the lower-cased
/// question and return the best intent. Zero hits everywhere means General;
/// equal non-zero scores resolve to the first vocabulary in declared order
/// (strictly-greater replacement, so the scan order is the tie-break).
pub fn classify(question: &str) -> Intent {
    let q = question.to_lowercase();
    let mut best = Intent::General;
    let mut best_score = 0usize;
    for (intent, keywords) in VOCABULARIES {
        let score = keywords.iter().filter(|kw| q.contains(*kw)).count();
        if score > best_score {
            best = *intent;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let q = "Why did revenue drop in Q3?";
        assert_eq!(classify(q), classify(q));
    }

    #[test]
    fn zero_hits_is_general() {
        assert_eq!(classify("hello there"), Intent::General);
        assert_eq!(classify(""), Intent::General);
    }

    #[test]
    fn keyword_hits_pick_the_right_intent() {
        assert_eq!(classify("show me sales growth by quarter"), Intent::Performance);
        assert_eq!(classify("compare north versus south"), Intent::Comparison);
        assert_eq!(classify("any unusual outlier stores?"), Intent::Anomaly);
        assert_eq!(classify("what is the breakdown of our costs"), Intent::Drilldown);
    }

    #[test]
    fn ties_resolve_to_declared_order() {
        // One hit each for performance ("revenue") and comparison ("compare"):
        // Performance is declared first and must win.
        assert_eq!(classify("compare revenue"), Intent::Performance);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(classify("REVENUE TREND"), Intent::Performance);
    }
}
