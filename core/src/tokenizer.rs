use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\S+").expect("valid regex");
}

/// Tokenize text into (token, position) using NFKC normalization, lowercase and
/// trimming of non-alphanumeric characters at word boundaries.
///
/// Positions count emitted tokens, not characters, so a run of pure punctuation
/// does not consume a slot.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    for mat in WORD.find_iter(&normalized) {
        let token = mat.as_str().trim_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() { continue; }
        let pos = tokens.len();
        tokens.push((token.to_string(), pos));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        let words: Vec<&str> = t.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["running", "runner's", "run"]);
    }

    #[test]
    fn positions_skip_punctuation_runs() {
        let t = tokenize("alpha -- beta");
        assert_eq!(t, vec![("alpha".to_string(), 0), ("beta".to_string(), 1)]);
    }
}
