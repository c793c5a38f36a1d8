/// Built-in vocabulary, in match order.
pub const DEFAULT_VOCABULARY: &[&str] = &[
    "tsunami",
    "high wave",
    "storm surge",
    "surge",
    "coastal flooding",
];

/// Matched vocabulary terms, in vocabulary order, each at most once.
pub type HazardMatch = Vec<String>;

/// Literal keyword matcher over post text.
///
/// Matching is plain case-insensitive substring containment: "storm surge"
/// matches both "storm surge" and "surge", and "surges" matches "surge".
#[derive(Debug, Clone)]
pub struct HazardDetector {
    vocabulary: Vec<String>,
}

impl Default for HazardDetector {
    fn default() -> Self {
        Self::new(DEFAULT_VOCABULARY.iter().copied())
    }
}

impl HazardDetector {
    /// Terms are lower-cased; blanks and repeats are dropped, order is kept.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !vocabulary.contains(&term) {
                vocabulary.push(term);
            }
        }

        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Empty result means the post is not hazardous.
    pub fn detect(&self, text: &str) -> HazardMatch {
        if text.is_empty() {
            return Vec::new();
        }

        let normalized = text.to_lowercase();

        self.vocabulary
            .iter()
            .filter(|term| normalized.contains(term.as_str()))
            .inspect(|term| tracing::trace!(term = %term, "hazard term matched"))
            .cloned()
            .collect()
    }
}
