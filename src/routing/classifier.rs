//! Keyword classification for the `rules` routing strategy

use crate::agent::Domain;
use crate::config::SemkerConfig;
use tracing::debug;

/// Scores request text against each domain's vocabulary
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    vocabulary: Vec<(Domain, Vec<String>)>,
}

impl KeywordClassifier {
    /// Classifier over the built-in vocabulary of `domains`
    pub fn new(domains: &[Domain]) -> Self {
        let vocabulary = domains
            .iter()
            .map(|&domain| {
                let words = domain.keywords().iter().map(|k| k.to_string()).collect();
                (domain, words)
            })
            .collect();
        Self { vocabulary }
    }

    /// Built-in vocabulary extended with each domain's configured keywords
    pub fn from_config(domains: &[Domain], config: &SemkerConfig) -> Self {
        let mut classifier = Self::new(domains);
        for (domain, words) in &mut classifier.vocabulary {
            words.extend(
                config
                    .responder(*domain)
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty()),
            );
        }
        classifier
    }

    /// Score of each domain for `text`, in vocabulary order
    pub fn scores(&self, text: &str) -> Vec<(Domain, usize)> {
        let normalized = text.to_lowercase();
        let tokens: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        self.vocabulary
            .iter()
            .map(|(domain, words)| {
                let score = words
                    .iter()
                    .filter(|word| {
                        if word.contains(' ') {
                            normalized.contains(word.as_str())
                        } else {
                            tokens.contains(&word.as_str())
                        }
                    })
                    .count();
                (*domain, score)
            })
            .collect()
    }

    /// Pick the highest-scoring domain
    ///
    /// No match at all, or a tie for the top score, falls back to FAQ.
    pub fn classify(&self, text: &str) -> Domain {
        let scores = self.scores(text);
        let best = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);

        let mut leaders = scores.iter().filter(|(_, score)| *score == best && best > 0);
        let chosen = match (leaders.next(), leaders.next()) {
            (Some((domain, _)), None) => *domain,
            _ => Domain::Faq,
        };

        debug!(domain = %chosen, top_score = best, "Keyword classification");
        chosen
    }
}
