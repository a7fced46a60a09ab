//! Text processing utilities for tokenization and matching
//!
//! Handles mixed-script input: Latin runs are split on non-alphanumeric
//! boundaries and stop-word filtered; CJK runs are segmented per character
//! as a fallback, since no dictionary segmenter is available.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Common English stop words to filter out during tokenization
static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

/// Porter stemmer for English text
static STEMMER: OnceLock<Stemmer> = OnceLock::new();

fn get_stop_words() -> &'static HashSet<&'static str> {
    STOP_WORDS.get_or_init(|| {
        [
            "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into",
            "is", "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then",
            "there", "these", "they", "this", "to", "was", "will", "with",
        ]
        .iter()
        .copied()
        .collect()
    })
}

fn get_stemmer() -> &'static Stemmer {
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Whether a character belongs to the CJK ideograph/kana/hangul ranges
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'    // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'  // CJK Extension A
        | '\u{F900}'..='\u{FAFF}'  // CJK Compatibility Ideographs
        | '\u{3040}'..='\u{30FF}'  // Hiragana + Katakana
        | '\u{AC00}'..='\u{D7AF}'  // Hangul Syllables
    )
}

/// Tokenize mixed-script text
///
/// Latin/numeric runs become lowercased words with stop words removed;
/// each CJK character becomes its own token.
pub fn tokenize(text: &str) -> Vec<String> {
    let stop_words = get_stop_words();
    let mut tokens = Vec::new();
    let mut word = String::new();

    let mut flush = |word: &mut String, tokens: &mut Vec<String>| {
        if !word.is_empty() {
            let lower = word.to_lowercase();
            if !stop_words.contains(lower.as_str()) {
                tokens.push(lower);
            }
            word.clear();
        }
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush(&mut word, &mut tokens);
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.push(c);
        } else {
            flush(&mut word, &mut tokens);
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

/// Tokenize text with optional Porter stemming
///
/// Stemming applies only to non-CJK tokens; single-character CJK tokens
/// pass through unchanged.
pub fn tokenize_with_stemming(text: &str, stem: bool) -> Vec<String> {
    let tokens = tokenize(text);
    if !stem {
        return tokens;
    }

    let stemmer = get_stemmer();
    tokens
        .iter()
        .map(|t| {
            if t.chars().any(is_cjk) {
                t.clone()
            } else {
                stemmer.stem(t).to_string()
            }
        })
        .collect()
}

/// Prepare text for full-text indexing by spacing out CJK runs
///
/// The FTS tokenizer treats a CJK run as a single token; inserting spaces
/// around each CJK character makes per-character matching work. Only the
/// indexed shadow text is transformed; snippets and highlights are always
/// computed from the original document text.
pub fn segment_for_index(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_cjk = false;
    for c in text.chars() {
        let cjk = is_cjk(c);
        if cjk && !out.is_empty() && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        } else if prev_cjk && !c.is_whitespace() {
            out.push(' ');
        }
        out.push(c);
        prev_cjk = cjk;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let text = "Hello world! This is a test.";
        let tokens = tokenize(text);
        // Should filter out "a", "is", "this"
        assert_eq!(tokens, vec!["hello", "world", "test"]);
    }

    #[test]
    fn test_tokenize_removes_stop_words() {
        let text = "the quick brown fox";
        let tokens = tokenize(text);
        assert_eq!(tokens, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn test_tokenize_cjk_per_character() {
        let tokens = tokenize("前端开发");
        assert_eq!(tokens, vec!["前", "端", "开", "发"]);
    }

    #[test]
    fn test_tokenize_mixed_script() {
        let tokens = tokenize("JavaScript前端notes");
        assert_eq!(tokens, vec!["javascript", "前", "端", "notes"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert_eq!(tokenize(""), Vec::<String>::new());
    }

    #[test]
    fn test_tokenize_with_stemming_enabled() {
        let text = "Graph graphs network networks";
        let tokens = tokenize_with_stemming(text, true);
        assert_eq!(tokens, vec!["graph", "graph", "network", "network"]);
    }

    #[test]
    fn test_stemming_skips_cjk() {
        let tokens = tokenize_with_stemming("技术 notes", true);
        assert_eq!(tokens, vec!["技", "术", "note"]);
    }

    #[test]
    fn test_segment_for_index() {
        assert_eq!(segment_for_index("前端"), "前 端");
        assert_eq!(segment_for_index("see 前端 notes"), "see 前 端 notes");
        assert_eq!(segment_for_index("plain text"), "plain text");
    }
}
