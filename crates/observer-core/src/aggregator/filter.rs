//! Separable filter policy applied before items enter the pool.

use regex::Regex;
use std::collections::HashMap;

use crate::models::Item;

/// URL/title/keyword filter. Evaluation is O(patterns) per item; pattern
/// counts are expected to stay in the tens.
#[derive(Debug, Default)]
pub struct ItemFilter {
    url_patterns: Vec<Regex>,
    title_patterns: Vec<Regex>,
    /// Case-insensitive substring keywords, stored lowercased.
    keywords: Vec<String>,
    /// Per-source-name title pattern sets.
    per_source: HashMap<String, Vec<Regex>>,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_url_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.url_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn add_title_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.title_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn add_keyword(&mut self, keyword: &str) {
        self.keywords.push(keyword.to_lowercase());
    }

    pub fn add_source_pattern(&mut self, source: &str, pattern: &str) -> Result<(), regex::Error> {
        self.per_source
            .entry(source.to_string())
            .or_default()
            .push(Regex::new(pattern)?);
        Ok(())
    }

    /// True when the item must not enter the pool. Empty titles are always
    /// dropped.
    pub fn blocks(&self, item: &Item) -> bool {
        if item.title.trim().is_empty() {
            return true;
        }
        if self.url_patterns.iter().any(|re| re.is_match(&item.url)) {
            return true;
        }
        if self.title_patterns.iter().any(|re| re.is_match(&item.title)) {
            return true;
        }
        if !self.keywords.is_empty() {
            let title = item.title.to_lowercase();
            if self.keywords.iter().any(|kw| title.contains(kw)) {
                return true;
            }
        }
        if let Some(patterns) = self.per_source.get(&item.source_name) {
            if patterns.iter().any(|re| re.is_match(&item.title)) {
                return true;
            }
        }
        false
    }
}
