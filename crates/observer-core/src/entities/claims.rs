//! Claim detection for disagreement analysis.
//!
//! A second, optional pass over the same text: instead of *who* a story is
//! about, this finds *what it asserts* — figures, quotes, attributions,
//! denials, predictions. Downstream consumers compare claims across a
//! cluster to flag sources that disagree.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Numeric,
    Quote,
    Attribution,
    Denial,
    Prediction,
}

/// One detected claim with its extraction confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub kind: ClaimKind,
    pub text: String,
    pub confidence: f64,
}

static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d[\d,]*(?:\.\d+)?\s*(?:%|percent|bps|basis points|million|billion|trillion|points?|dollars|euros|people|workers|jobs|deaths|cases|barrels|tonnes)\b",
    )
    .expect("numeric claim pattern")
});

static QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]{10,200})""#).expect("quote claim pattern"));

static ATTRIBUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:said|says|stated|told \w+|announced|claimed|warned|confirmed)\b")
        .expect("attribution claim pattern")
});

static DENIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:denied|denies|rejected|rejects|refuted|refutes|dismissed|dismisses|disputed|disputes)\b")
        .expect("denial claim pattern")
});

static PREDICTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:will|expects?|expected to|forecasts?|predicts?|projected|set to|poised to|on track to)\b")
        .expect("prediction claim pattern")
});

fn snippet(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(30)
        .last()
        .map_or(0, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .take(31)
        .last()
        .map_or(end, |(i, _)| end + i);
    text[from..to].trim().to_string()
}

/// Extract claims from a block of text. Deterministic, no side effects.
pub fn extract_claims(text: &str) -> Vec<Claim> {
    let mut claims = Vec::new();

    for m in NUMERIC.find_iter(text) {
        claims.push(Claim {
            kind: ClaimKind::Numeric,
            text: snippet(text, m.start(), m.end()),
            confidence: 0.8,
        });
    }
    for caps in QUOTE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            claims.push(Claim {
                kind: ClaimKind::Quote,
                text: m.as_str().to_string(),
                confidence: 0.7,
            });
        }
    }
    for m in DENIAL.find_iter(text) {
        claims.push(Claim {
            kind: ClaimKind::Denial,
            text: snippet(text, m.start(), m.end()),
            confidence: 0.7,
        });
    }
    for m in ATTRIBUTION.find_iter(text) {
        claims.push(Claim {
            kind: ClaimKind::Attribution,
            text: snippet(text, m.start(), m.end()),
            confidence: 0.6,
        });
    }
    for m in PREDICTION.find_iter(text) {
        claims.push(Claim {
            kind: ClaimKind::Prediction,
            text: snippet(text, m.start(), m.end()),
            confidence: 0.5,
        });
    }

    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<ClaimKind> {
        extract_claims(text).into_iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_numeric_claims() {
        let claims = extract_claims("Inflation rose 3.2% in March, costing 40 billion dollars");
        let numeric: Vec<_> = claims.iter().filter(|c| c.kind == ClaimKind::Numeric).collect();
        assert_eq!(numeric.len(), 2);
        assert!(numeric.iter().all(|c| c.confidence == 0.8));
    }

    #[test]
    fn test_quote_and_attribution() {
        let text = r#"The CEO said "we will not lower prices this year" on Monday"#;
        let kinds = kinds(text);
        assert!(kinds.contains(&ClaimKind::Quote));
        assert!(kinds.contains(&ClaimKind::Attribution));
        assert!(kinds.contains(&ClaimKind::Prediction), "quote contains 'will'");
    }

    #[test]
    fn test_denial() {
        assert!(kinds("The ministry denied the report").contains(&ClaimKind::Denial));
    }

    #[test]
    fn test_prediction() {
        assert!(kinds("Analysts expect rates to stay flat").contains(&ClaimKind::Prediction));
    }

    #[test]
    fn test_short_quotes_ignored() {
        assert!(!kinds(r#"the "best" option"#).contains(&ClaimKind::Quote));
    }

    #[test]
    fn test_no_claims_in_plain_title() {
        assert!(extract_claims("Boeing 737 MAX review").is_empty());
    }
}
