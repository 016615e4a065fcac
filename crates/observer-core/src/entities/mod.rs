//! Lightweight entity extraction.
//!
//! Regex and dictionary based, no external calls, deterministic, and fast
//! enough to run inline (<5 ms per item on realistic titles). Three passes:
//! cashtag tickers, geographic/bloc dictionary matches, and source
//! attribution ("according to X", "X reports", a trailing "(X)"), plus the
//! optional claim pass in [`claims`].

mod claims;
mod dictionary;

pub use claims::{extract_claims, Claim, ClaimKind};
pub use dictionary::{GeoAlias, GEO_ALIASES};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Entity, EntityType};

/// An entity found in one item, with the snippet it matched in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub entity: Entity,
    pub context: String,
}

/// Everything the extractor produces for one item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    /// True when the item cites another outlet, i.e. it aggregates.
    pub is_aggregating: bool,
    pub claims: Vec<Claim>,
}

impl Extraction {
    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.entity.id.clone()).collect()
    }
}

static TICKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$([A-Z]{1,5})(?:\.([A-Z]{1,2}))?\b").expect("ticker pattern")
});

static ACCORDING_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[Aa]ccording to\s+((?:[A-Z][A-Za-z0-9'&.-]*[ ]?){1,4})").expect("attribution pattern")
});

static REPORTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"((?:[A-Z][A-Za-z0-9'&.-]*[ ]){0,3}[A-Z][A-Za-z0-9'&.-]*)\s+reports?\b")
        .expect("reports pattern")
});

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(([A-Z][A-Za-z .]{1,24})\)\s*$").expect("parenthetical pattern")
});

const TICKER_SALIENCE: f64 = 0.9;
const ATTRIBUTION_SALIENCE: f64 = 0.5;
const CONTEXT_RADIUS: usize = 40;

/// Regex/dictionary extractor. Stateless; construct once and share.
#[derive(Default)]
pub struct EntityExtractor {
    /// When set, the claim pass runs too.
    pub detect_claims: bool,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claims() -> Self {
        Self { detect_claims: true }
    }

    /// Extract entities from an item's title and summary.
    pub fn extract(&self, title: &str, summary: &str) -> Extraction {
        let text = if summary.is_empty() {
            title.to_string()
        } else {
            format!("{title}\n{summary}")
        };

        let mut found: HashMap<String, ExtractedEntity> = HashMap::new();
        let mut is_aggregating = false;

        self.extract_tickers(&text, &mut found);
        self.extract_geo(&text, &mut found);
        self.extract_attributions(&text, &mut found, &mut is_aggregating);

        let mut entities: Vec<ExtractedEntity> = found.into_values().collect();
        entities.sort_by(|a, b| {
            b.entity
                .salience
                .partial_cmp(&a.entity.salience)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });

        let claims = if self.detect_claims {
            extract_claims(&text)
        } else {
            Vec::new()
        };

        Extraction {
            entities,
            is_aggregating,
            claims,
        }
    }

    fn extract_tickers(&self, text: &str, found: &mut HashMap<String, ExtractedEntity>) {
        for caps in TICKER.captures_iter(text) {
            let Some(symbol) = caps.get(1) else { continue };
            let normalized = match caps.get(2) {
                Some(suffix) => format!("{}.{}", symbol.as_str(), suffix.as_str()),
                None => symbol.as_str().to_string(),
            };
            let full = caps.get(0).map_or(symbol.as_str(), |m| m.as_str());
            let entity = Entity::new(EntityType::Ticker, &normalized, full, TICKER_SALIENCE);
            let context = context_around(text, symbol.start(), symbol.end());
            insert_highest(found, entity, context);
        }
    }

    fn extract_geo(&self, text: &str, found: &mut HashMap<String, ExtractedEntity>) {
        let lowered = text.to_lowercase();
        for alias in GEO_ALIASES.iter() {
            let mut from = 0;
            while let Some(offset) = lowered[from..].find(alias.alias) {
                let start = from + offset;
                let end = start + alias.alias.len();
                from = end;
                if !has_word_boundaries(&lowered, start, end) {
                    continue;
                }
                let entity = Entity::new(
                    alias.entity_type,
                    alias.normalized,
                    alias.display,
                    alias.salience,
                );
                let context = context_around(text, start, end);
                insert_highest(found, entity, context);
            }
        }
    }

    fn extract_attributions(
        &self,
        text: &str,
        found: &mut HashMap<String, ExtractedEntity>,
        is_aggregating: &mut bool,
    ) {
        let mut record = |name: &str, start: usize, end: usize, found: &mut HashMap<String, ExtractedEntity>| {
            let trimmed = name.trim().trim_end_matches(['.', ',']);
            if trimmed.is_empty() {
                return;
            }
            let normalized = trimmed.to_lowercase().replace([' ', '.'], "_");
            let entity = Entity::new(
                EntityType::Source,
                &normalized,
                trimmed,
                ATTRIBUTION_SALIENCE,
            );
            insert_highest(found, entity, context_around(text, start, end));
            *is_aggregating = true;
        };

        for caps in ACCORDING_TO.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                record(m.as_str(), m.start(), m.end(), found);
            }
        }
        for caps in REPORTS.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                record(m.as_str(), m.start(), m.end(), found);
            }
        }
        for caps in PARENTHETICAL.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                record(m.as_str(), m.start(), m.end(), found);
            }
        }
    }
}

/// Word boundary = non-alphanumeric (or text edge) on both sides.
fn has_word_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_alphanumeric());
    let after_ok = end >= text.len()
        || text[end..]
            .chars()
            .next()
            .is_some_and(|c| !c.is_alphanumeric());
    before_ok && after_ok
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    // Offsets may come from a lowercased copy whose byte length differs on
    // non-ASCII input; clamp before slicing.
    let start = start.min(text.len());
    let end = end.min(text.len());
    let mut from = start.saturating_sub(CONTEXT_RADIUS);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_RADIUS).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim().to_string()
}

/// Keep the highest-salience sighting per entity id.
fn insert_highest(found: &mut HashMap<String, ExtractedEntity>, entity: Entity, context: String) {
    match found.get(&entity.id) {
        Some(existing) if existing.entity.salience >= entity.salience => {}
        _ => {
            found.insert(entity.id.clone(), ExtractedEntity { entity, context });
        }
    }
}
