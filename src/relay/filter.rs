//! Blocked-term scanning for relayed text
//!
//! Matching is case-insensitive substring containment; each configured term
//! counts at most once per message.

/// Compiled block-list
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    words: Vec<String>,
}

impl WordFilter {
    pub fn new(words: &[String]) -> Self {
        Self {
            words: words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of distinct blocked terms contained in `text`
    pub fn matches(&self, text: &str) -> usize {
        if self.words.is_empty() {
            return 0;
        }
        let lowered = text.to_lowercase();
        self.words.iter().filter(|w| lowered.contains(w.as_str())).count()
    }
}
