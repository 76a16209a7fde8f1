//! Content filtering against a blocked-term list.
//!
//! Terms are matched case-insensitively as substrings; optional regex
//! patterns are matched as-is. Messages are checked in portable emoji form,
//! so terms are normalized the same way. The list is replaced as a whole on
//! every update, so a concurrent check sees either the old or the new list.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use fancy_regex::Regex;
use tracing::{debug, info, warn};

use crate::bridge::emoji::EmojiNormalizer;
use crate::config::types::FilterConfig;

/// Result of a content check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterVerdict {
    pub allowed: bool,
    /// The term or pattern that blocked the message.
    pub matched_term: Option<String>,
}

impl FilterVerdict {
    fn allowed() -> Self {
        Self {
            allowed: true,
            matched_term: None,
        }
    }

    fn blocked(term: &str) -> Self {
        Self {
            allowed: false,
            matched_term: Some(term.to_string()),
        }
    }
}

/// A compiled regex pattern with its original string for debugging.
#[derive(Debug, Clone)]
struct CompiledPattern {
    original: String,
    regex: Regex,
}

/// Immutable snapshot of the blocked terms.
#[derive(Debug, Default)]
struct TermList {
    /// Portable-form, lowercased, trimmed, non-empty terms.
    terms: Vec<String>,
    patterns: Vec<CompiledPattern>,
}

impl TermList {
    fn new(terms: impl IntoIterator<Item = String>, patterns: Vec<CompiledPattern>) -> Self {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|t| normalize_term(&t))
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms, patterns }
    }

    fn len(&self) -> usize {
        self.terms.len() + self.patterns.len()
    }
}

/// Configured sources of the term list.
#[derive(Debug, Clone, Default)]
struct FilterSources {
    enabled: bool,
    /// Terms from the config file, kept across blocklist reloads.
    terms: Vec<String>,
    patterns: Vec<String>,
    blocklist_file: Option<PathBuf>,
}

impl FilterSources {
    fn from_config(config: &FilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            terms: config.terms.clone(),
            patterns: config.patterns.clone(),
            blocklist_file: config.blocklist_file.as_ref().map(PathBuf::from),
        }
    }

    /// Build the term list, reading the blocklist file if set.
    fn load(&self) -> std::io::Result<TermList> {
        let mut terms = self.terms.clone();
        if let Some(ref path) = self.blocklist_file {
            let content = std::fs::read_to_string(path)?;
            terms.extend(parse_blocklist(&content));
        }
        Ok(TermList::new(terms, compile_patterns(&self.patterns)))
    }
}

/// Classifies outgoing text as allowed or blocked.
#[derive(Debug)]
pub struct ContentFilter {
    enabled: AtomicBool,
    list: RwLock<Arc<TermList>>,
    sources: RwLock<FilterSources>,
}

impl ContentFilter {
    /// Build a filter from configuration, reading the blocklist file if set.
    ///
    /// A missing or unreadable blocklist file is logged and skipped.
    pub fn from_config(config: &FilterConfig) -> Self {
        let sources = FilterSources::from_config(config);
        let list = sources.load().unwrap_or_else(|e| {
            warn!("Failed to read blocklist file: {}", e);
            TermList::new(sources.terms.clone(), compile_patterns(&sources.patterns))
        });
        info!("Content filter loaded with {} entries", list.len());

        Self {
            enabled: AtomicBool::new(sources.enabled),
            list: RwLock::new(Arc::new(list)),
            sources: RwLock::new(sources),
        }
    }

    /// Create a filter with the given terms and no patterns.
    pub fn with_terms(terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let sources = FilterSources {
            enabled: true,
            terms: terms.into_iter().map(Into::into).collect(),
            ..FilterSources::default()
        };
        Self {
            enabled: AtomicBool::new(true),
            list: RwLock::new(Arc::new(TermList::new(sources.terms.clone(), Vec::new()))),
            sources: RwLock::new(sources),
        }
    }

    /// Create an empty filter that allows all messages.
    pub fn empty() -> Self {
        Self::with_terms(Vec::<String>::new())
    }

    /// Check a message against the current term list.
    ///
    /// Never panics; a pattern that fails to evaluate counts as no match.
    pub fn check(&self, text: &str) -> FilterVerdict {
        if !self.enabled.load(Ordering::Acquire) || text.is_empty() {
            return FilterVerdict::allowed();
        }

        let list = self.snapshot();
        let lowered = text.to_lowercase();

        if let Some(term) = list.terms.iter().find(|t| lowered.contains(t.as_str())) {
            return FilterVerdict::blocked(term);
        }

        for p in &list.patterns {
            match p.regex.is_match(text) {
                Ok(true) => return FilterVerdict::blocked(&p.original),
                Ok(false) => {}
                Err(e) => debug!("Filter pattern '{}' failed to evaluate: {}", p.original, e),
            }
        }

        FilterVerdict::allowed()
    }

    /// Check raw bytes; input that is not valid UTF-8 is allowed.
    #[cfg(test)]
    pub fn check_bytes(&self, bytes: &[u8]) -> FilterVerdict {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.check(text),
            Err(_) => FilterVerdict::allowed(),
        }
    }

    /// Add a term to the list. It survives blocklist reloads.
    pub fn add_term(&self, term: &str) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .terms
            .push(term.to_string());
        let mut guard = self.list.write().unwrap_or_else(PoisonError::into_inner);
        let mut terms = guard.terms.clone();
        terms.push(term.to_string());
        *guard = Arc::new(TermList::new(terms, guard.patterns.clone()));
    }

    /// Remove a term from the list. Returns whether it was present.
    pub fn remove_term(&self, term: &str) -> bool {
        let needle = normalize_term(term);
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .terms
            .retain(|t| normalize_term(t) != needle);
        let mut guard = self.list.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.terms.contains(&needle) {
            return false;
        }
        let terms = guard.terms.iter().filter(|t| **t != needle).cloned();
        *guard = Arc::new(TermList::new(terms, guard.patterns.clone()));
        true
    }

    /// Re-read the blocklist file and rebuild the term list.
    ///
    /// On error the current list is left untouched. Returns the number of
    /// terms now active.
    pub fn reload(&self) -> std::io::Result<usize> {
        let list = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .load()?;
        Ok(self.install(list))
    }

    /// Replace terms, patterns, blocklist file and the enabled flag.
    ///
    /// Nothing changes if the new blocklist file cannot be read.
    pub fn reconfigure(&self, config: &FilterConfig) -> std::io::Result<usize> {
        let sources = FilterSources::from_config(config);
        let list = sources.load()?;
        self.enabled.store(sources.enabled, Ordering::Release);
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = sources;
        Ok(self.install(list))
    }

    /// Number of active terms and patterns.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn install(&self, list: TermList) -> usize {
        let count = list.len();
        *self.list.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(list);
        info!("Content filter loaded with {} entries", count);
        count
    }

    fn snapshot(&self) -> Arc<TermList> {
        Arc::clone(&self.list.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A term in the form messages are checked in: `:shortcode:` emoji,
/// lowercased.
fn normalize_term(term: &str) -> String {
    EmojiNormalizer::new().to_portable(term.trim()).to_lowercase()
}

/// Parse a blocklist file: one term per line, `#` starts a comment line.
fn parse_blocklist(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
}

/// Compile a list of regex pattern strings, skipping invalid ones.
fn compile_patterns(patterns: &[String]) -> Vec<CompiledPattern> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(CompiledPattern {
                original: pattern.clone(),
                regex,
            }),
            Err(e) => {
                warn!("Invalid filter regex pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}
