//! Consolidation of parallel chain results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ChainResult;

/// Separator placed between responses by `MergeStrategy::Merge`
pub const MERGE_DELIMITER: &str = "\n\n---\n\n";

/// How successful chain results become one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Average confidence, responses as a bullet list under a summary line
    Consensus,
    /// The single most confident response
    #[default]
    Best,
    /// Every response verbatim, confidence of the strongest
    Merge,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            MergeStrategy::Consensus => "consensus",
            MergeStrategy::Best => "best",
            MergeStrategy::Merge => "merge",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "consensus" => Ok(MergeStrategy::Consensus),
            "best" => Ok(MergeStrategy::Best),
            "merge" => Ok(MergeStrategy::Merge),
            other => Err(format!("unknown merge strategy '{}'", other)),
        }
    }
}

/// Consolidated answer
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub response: String,
    pub confidence: f64,
    /// Ids of the chains that contributed
    pub contributors: Vec<String>,
}

/// Combine successful results; `None` when there are none
///
/// Results without a response are ignored.
pub fn consolidate(strategy: MergeStrategy, results: &[ChainResult]) -> Option<Merged> {
    let ok: Vec<(&ChainResult, &str, f64)> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| {
            r.response
                .as_deref()
                .map(|text| (r, text, r.confidence.unwrap_or(0.0)))
        })
        .collect();

    if ok.is_empty() {
        return None;
    }

    let merged = match strategy {
        MergeStrategy::Best => {
            // ties go to the heavier chain, then the earlier one
            let mut best = ok[0];
            for candidate in &ok[1..] {
                let better = candidate.2 > best.2
                    || (candidate.2 == best.2 && candidate.0.weight > best.0.weight);
                if better {
                    best = *candidate;
                }
            }
            Merged {
                response: best.1.to_string(),
                confidence: best.2,
                contributors: vec![best.0.id.clone()],
            }
        }
        MergeStrategy::Consensus => {
            let average = ok.iter().map(|(_, _, c)| c).sum::<f64>() / ok.len() as f64;
            let mut response = format!(
                "Consensus of {} perspectives (average confidence {:.2}):",
                ok.len(),
                average
            );
            for (_, text, _) in &ok {
                response.push_str("\n- ");
                response.push_str(&text.trim().replace('\n', "\n  "));
            }
            Merged {
                response,
                confidence: average,
                contributors: ok.iter().map(|(r, _, _)| r.id.clone()).collect(),
            }
        }
        MergeStrategy::Merge => Merged {
            response: ok
                .iter()
                .map(|(_, text, _)| *text)
                .collect::<Vec<_>>()
                .join(MERGE_DELIMITER),
            confidence: ok.iter().map(|(_, _, c)| *c).fold(0.0, f64::max),
            contributors: ok.iter().map(|(r, _, _)| r.id.clone()).collect(),
        },
    };

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn result(id: &str, response: &str, confidence: f64, weight: f64) -> ChainResult {
        ChainResult {
            id: id.to_string(),
            success: true,
            required: false,
            response: Some(response.to_string()),
            confidence: Some(confidence),
            weight,
            error: None,
            duration_ms: 0,
        }
    }

    fn failed(id: &str) -> ChainResult {
        ChainResult {
            id: id.to_string(),
            success: false,
            required: false,
            response: None,
            confidence: None,
            weight: 1.0,
            error: Some("timed out".to_string()),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_best_picks_highest_confidence() {
        let results = vec![
            result("a", "A", 0.4, 1.0),
            result("b", "B", 0.9, 1.0),
            result("c", "C", 0.6, 1.0),
        ];
        let merged = consolidate(MergeStrategy::Best, &results).unwrap();
        assert_eq!(merged.response, "B");
        assert_eq!(merged.confidence, 0.9);
        assert_eq!(merged.contributors, vec!["b".to_string()]);
    }

    #[test]
    fn test_best_breaks_ties_by_weight() {
        let results = vec![result("a", "A", 0.7, 1.0), result("b", "B", 0.7, 2.0)];
        assert_eq!(consolidate(MergeStrategy::Best, &results).unwrap().response, "B");
    }

    #[test]
    fn test_consensus_averages_and_lists() {
        let results = vec![result("a", "cheap", 0.4, 1.0), failed("x"), result("b", "fast", 0.8, 1.0)];
        let merged = consolidate(MergeStrategy::Consensus, &results).unwrap();

        assert!((merged.confidence - 0.6).abs() < 1e-9);
        assert!(merged.response.starts_with("Consensus of 2 perspectives"));
        assert!(merged.response.contains("\n- cheap"));
        assert!(merged.response.contains("\n- fast"));
    }

    #[test]
    fn test_merge_joins_verbatim_with_max_confidence() {
        let results = vec![result("a", "one", 0.3, 1.0), result("b", "two", 0.7, 1.0)];
        let merged = consolidate(MergeStrategy::Merge, &results).unwrap();

        assert_eq!(merged.response, format!("one{}two", MERGE_DELIMITER));
        assert_eq!(merged.confidence, 0.7);
    }

    #[test]
    fn test_nothing_to_merge() {
        assert!(consolidate(MergeStrategy::Merge, &[failed("x")]).is_none());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Consensus".parse::<MergeStrategy>(), Ok(MergeStrategy::Consensus));
        assert!("vote".parse::<MergeStrategy>().is_err());
    }

    proptest! {
        #[test]
        fn prop_best_has_max_confidence(confs in prop::collection::vec(0.0f64..=1.0, 1..12)) {
            let results: Vec<ChainResult> = confs
                .iter()
                .enumerate()
                .map(|(i, c)| result(&format!("c{}", i), &format!("r{}", i), *c, 1.0))
                .collect();
            let merged = consolidate(MergeStrategy::Best, &results).unwrap();
            let max = confs.iter().cloned().fold(0.0, f64::max);
            prop_assert_eq!(merged.confidence, max);
        }

        #[test]
        fn prop_merge_keeps_every_response(n in 1usize..8) {
            let results: Vec<ChainResult> = (0..n)
                .map(|i| result(&format!("c{}", i), &format!("r{}", i), 0.5, 1.0))
                .collect();
            let merged = consolidate(MergeStrategy::Merge, &results).unwrap();
            prop_assert_eq!(merged.response.matches(MERGE_DELIMITER).count(), n - 1);
            prop_assert_eq!(merged.contributors.len(), n);
        }
    }
}
