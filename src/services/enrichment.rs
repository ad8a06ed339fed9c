//! Enrichment hooks.
//!
//! Best-effort post-fetch steps producing a short summary and a category
//! label for a page. Failures never affect the stored snapshot.

use async_trait::async_trait;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};
use crate::models::{Enrichment, EnrichmentConfig, FetchedPage};

/// Post-fetch enrichment of a page.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Produce summary and/or category, failing with `AppError::Enrichment`.
    async fn enrich(&self, page: &FetchedPage) -> Result<Enrichment>;
}

/// Local enricher: extractive summary plus regex category rules.
pub struct HeuristicEnricher {
    summary_words: usize,
    rules: Vec<(String, Regex)>,
}

impl HeuristicEnricher {
    pub fn new(summary_words: usize, rules: Vec<(String, Regex)>) -> Self {
        Self {
            summary_words,
            rules,
        }
    }

    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        Ok(Self::new(config.summary_words, config.compile_rules()?))
    }

    /// Leading sentences of the text, up to the word budget.
    ///
    /// A first sentence longer than the budget is cut at a word boundary.
    pub fn summarize(&self, text: &str) -> Option<String> {
        if self.summary_words == 0 || text.trim().is_empty() {
            return None;
        }

        let mut summary = String::new();
        let mut words = 0;
        for sentence in text.unicode_sentences() {
            let sentence_words = sentence.unicode_words().count();
            if words + sentence_words > self.summary_words {
                if summary.is_empty() {
                    return Some(truncate_words(sentence, self.summary_words));
                }
                break;
            }
            summary.push_str(sentence);
            words += sentence_words;
        }

        let summary = summary.trim().to_string();
        (!summary.is_empty()).then_some(summary)
    }

    /// First category whose pattern matches the title, description or text.
    pub fn categorize(&self, page: &FetchedPage) -> Option<String> {
        let haystack = format!("{}\n{}\n{}", page.title, page.description, page.text);
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(&haystack))
            .map(|(label, _)| label.clone())
    }
}

#[async_trait]
impl Enricher for HeuristicEnricher {
    async fn enrich(&self, page: &FetchedPage) -> Result<Enrichment> {
        if page.text.is_empty() && page.title.is_empty() {
            return Err(AppError::enrichment(&page.url, "page has no text"));
        }
        Ok(Enrichment {
            summary: self.summarize(&page.text),
            category: self.categorize(page),
        })
    }
}

fn truncate_words(sentence: &str, max_words: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for (idx, word) in sentence.unicode_word_indices() {
        if count == max_words {
            break;
        }
        out = sentence[..idx + word.len()].to_string();
        count += 1;
    }
    format!("{}…", out.trim_end())
}
