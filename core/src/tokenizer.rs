use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fs;
use unicode_normalization::UnicodeNormalization;

use crate::config::{StemmerKind, TokenizerConfig, UnknownTokenPolicy};

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref DEFAULT: Tokenizer = Tokenizer::new(TokenizerConfig::default());
}

const STOPWORDS: &[&str] = &[
    "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
    "be","because","been","before","being","below","between","both","but","by",
    "can","can't","cannot","could","couldn't",
    "did","didn't","do","does","doesn't","doing","don't","down","during",
    "each","few","for","from","further",
    "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
    "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
    "let's","me","more","most","mustn't","my","myself",
    "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
    "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
    "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
    "under","until","up","very",
    "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
    "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
];

/// Words that flip the polarity of what follows. They survive stopword
/// removal and are never stemmed.
pub const NEGATIONS: &[&str] = &[
    "not", "no", "nor", "never", "none", "nobody", "nothing", "neither", "nowhere", "cannot",
];

/// The marker contractions such as `don't` are rewritten to.
pub const NEGATION_MARKER: &str = "not";

/// Turns raw text into index terms: NFKC normalization, lowercasing, word
/// splitting, stopword removal with negations kept, stemming, and bigrams.
pub struct Tokenizer {
    config: TokenizerConfig,
    stopwords: HashSet<String>,
    negations: HashSet<&'static str>,
    stemmer: Option<Stemmer>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("config", &self.config)
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let negations: HashSet<&'static str> = NEGATIONS.iter().copied().collect();
        let mut stopwords: HashSet<String> = STOPWORDS
            .iter()
            .filter(|w| !(config.retain_negations && is_negation(&negations, w)))
            .map(|w| w.to_string())
            .collect();

        if let Some(path) = &config.extra_stopwords_file {
            match fs::read_to_string(path) {
                Ok(text) => {
                    let before = stopwords.len();
                    stopwords.extend(
                        text.lines()
                            .map(|l| l.trim().to_lowercase())
                            .filter(|w| !w.is_empty())
                            .filter(|w| !(config.retain_negations && is_negation(&negations, w))),
                    );
                    tracing::info!(path = %path.display(), added = stopwords.len() - before, "loaded extra stopwords");
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to load stopwords, using built-in list");
                }
            }
        }

        let stemmer = match config.stemmer {
            StemmerKind::English => Some(Stemmer::create(Algorithm::English)),
            StemmerKind::None => None,
        };

        Self { config, stopwords, negations, stemmer }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Normalize a single word: negation rewrite, stopword filter, length
    /// filter and stemming. `None` means the word is dropped.
    fn normalize_word(&self, word: &str) -> Option<String> {
        let word = word.trim_matches('\'');
        if word.is_empty() {
            return None;
        }
        if self.config.retain_negations && is_negation(&self.negations, word) {
            let marker = if self.negations.contains(word) { word } else { NEGATION_MARKER };
            return Some(marker.to_string());
        }
        if self.is_stopword(word) || word.chars().count() < self.config.min_token_len {
            return None;
        }
        match &self.stemmer {
            Some(stemmer) => {
                let stem = stemmer.stem(word);
                let stem = stem.trim_end_matches('\'');
                if stem.is_empty() {
                    None
                } else {
                    Some(stem.to_string())
                }
            }
            None => Some(word.to_string()),
        }
    }

    /// Unigrams in text order.
    pub fn unigrams(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let normalized = text.nfkc().collect::<String>().to_lowercase().replace('\u{2019}', "'");
        let mut out = Vec::new();
        for chunk in normalized.split_whitespace() {
            let mut matched = false;
            for mat in RE.find_iter(chunk) {
                matched = true;
                if let Some(term) = self.normalize_word(mat.as_str()) {
                    out.push(term);
                }
            }
            if !matched && self.config.unknown_tokens == UnknownTokenPolicy::PassThrough {
                let symbol = chunk.trim_matches(|c: char| c.is_ascii_punctuation());
                if !symbol.is_empty() {
                    out.push(symbol.to_string());
                }
            }
        }
        out
    }

    /// Full term stream: each unigram followed by the bigram it closes.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let unigrams = self.unigrams(text);
        if !self.config.bigrams {
            return unigrams;
        }
        let mut terms = Vec::with_capacity(unigrams.len() * 2);
        for (i, term) in unigrams.iter().enumerate() {
            terms.push(term.clone());
            if i > 0 {
                terms.push(format!("{} {}", unigrams[i - 1], term));
            }
        }
        terms
    }
}

fn is_negation(negations: &HashSet<&'static str>, word: &str) -> bool {
    negations.contains(word) || word.ends_with("n't")
}

/// Tokenize with the default configuration.
pub fn tokenize(text: &str) -> Vec<String> {
    DEFAULT.tokenize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn contractions_become_negation_marker() {
        let t = Tokenizer::default().unigrams("I didn't like it, it isn\u{2019}t good");
        assert_eq!(t.iter().filter(|w| *w == NEGATION_MARKER).count(), 2);
    }

    #[test]
    fn negations_are_stopwords_when_not_retained() {
        let cfg = TokenizerConfig { retain_negations: false, ..TokenizerConfig::default() };
        let t = Tokenizer::new(cfg).unigrams("not good");
        assert_eq!(t, vec!["good".to_string()]);
    }

    #[test]
    fn unknown_chunks_follow_policy() {
        let text = "great read \u{1F600} !!! :)";
        let dropped = Tokenizer::default().unigrams(text);
        assert_eq!(dropped, vec!["great".to_string(), "read".to_string()]);

        let cfg = TokenizerConfig { unknown_tokens: UnknownTokenPolicy::PassThrough, ..TokenizerConfig::default() };
        let kept = Tokenizer::new(cfg).unigrams(text);
        assert_eq!(kept, vec!["great".to_string(), "read".to_string(), "\u{1F600}".to_string()]);
    }

    #[test]
    fn bigrams_interleave() {
        let cfg = TokenizerConfig { stemmer: StemmerKind::None, ..TokenizerConfig::default() };
        let t = Tokenizer::new(cfg).tokenize("quick brown fox");
        assert_eq!(t, vec!["quick", "brown", "quick brown", "fox", "brown fox"]);
    }
}
