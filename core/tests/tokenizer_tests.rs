use reviewdex_core::config::{StemmerKind, TokenizerConfig};
use reviewdex_core::tokenizer::{tokenize, Tokenizer, NEGATION_MARKER};
use std::io::Write;

#[test]
fn it_normalizes_and_stems() {
    let words = Tokenizer::default().unigrams("Running Runners RUN! The ＢＯＯＫ club.");
    assert!(words.contains(&"run".to_string()));
    // NFKC folds fullwidth letters
    assert!(words.contains(&"book".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = Tokenizer::default().unigrams("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(words.contains(&"fox".to_string()));
}

#[test]
fn negations_survive_stopword_removal() {
    let words = Tokenizer::default().unigrams("This is not a good book, and I never laughed");
    assert_eq!(words, vec!["not", "good", "book", "never", "laugh"]);

    let terms = tokenize("not a good book");
    assert!(terms.contains(&"not good".to_string()));
    assert!(terms.contains(&"good".to_string()));
}

#[test]
fn negation_words_are_not_stemmed() {
    let words = Tokenizer::default().unigrams("nothing nobody");
    assert_eq!(words, vec!["nothing", "nobody"]);
}

#[test]
fn contractions_rewrite_to_marker() {
    let words = Tokenizer::default().unigrams("Don't buy it. It WON'T work");
    assert_eq!(words.iter().filter(|w| *w == NEGATION_MARKER).count(), 2);
}

#[test]
fn noisy_input_never_fails() {
    let t = Tokenizer::default();
    assert!(t.tokenize("").is_empty());
    assert!(t.tokenize("!!! ??? ...").is_empty());
    assert_eq!(t.unigrams("great book 🔥🔥 !!!1"), vec!["great", "book", "1"]);
}

#[test]
fn tokenization_is_deterministic() {
    let text = "Loved it!! Couldn't put it down. Best book of 2019 - five stars ⭐⭐⭐⭐⭐";
    let first = tokenize(text);
    for _ in 0..5 {
        assert_eq!(tokenize(text), first);
    }
}

#[test]
fn extra_stopwords_file_is_applied() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "book\n\nNever").unwrap();
    let config = TokenizerConfig {
        stemmer: StemmerKind::None,
        extra_stopwords_file: Some(file.path().to_path_buf()),
        ..TokenizerConfig::default()
    };
    let words = Tokenizer::new(config).unigrams("never a dull book");
    // negations are kept even when listed
    assert_eq!(words, vec!["never", "dull"]);
}

#[test]
fn missing_stopwords_file_falls_back() {
    let config = TokenizerConfig {
        extra_stopwords_file: Some("/definitely/not/here.txt".into()),
        ..TokenizerConfig::default()
    };
    let words = Tokenizer::new(config).unigrams("the plot");
    assert_eq!(words, vec!["plot"]);
}
