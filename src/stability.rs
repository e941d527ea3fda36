/// Filter specificity scoring
///
/// The stability of a pattern against a URL is the number of single-character
/// deletions of the URL that the pattern still matches. Lower is more specific:
/// a literal filter equal to the whole URL scores 0, a catch-all scores close
/// to the URL length.
use crate::filter::Pattern;

/// Score `pattern` against `url`. Only meaningful when the pattern already
/// matches `url`; callers must pre-filter.
///
/// Positions are chars, not bytes, so every mutation is valid UTF-8.
pub fn stability(pattern: &Pattern, url: &str) -> usize {
    let mut mutated = String::with_capacity(url.len());

    url.char_indices()
        .filter(|&(offset, ch)| {
            mutated.clear();
            mutated.push_str(&url[..offset]);
            mutated.push_str(&url[offset + ch.len_utf8()..]);
            pattern.is_match(&mutated)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{compile, FilterLine};

    fn pattern(line: &str) -> Pattern {
        match compile(line).unwrap() {
            FilterLine::Pattern(p) => p,
            FilterLine::Comment(_) => panic!("{line} compiled to a comment"),
        }
    }

    #[test]
    fn test_full_url_literal_is_zero() {
        let url = "https://example.com/path";

        assert_eq!(stability(&pattern(url), url), 0);
    }

    #[test]
    fn test_single_char_regex() {
        // deleting index 0 removes the only "a"
        assert_eq!(stability(&pattern("/a/"), "abc"), 2);
    }

    #[test]
    fn test_catch_all_counts_every_position() {
        let url = "https://x";

        assert_eq!(stability(&pattern("/.+/"), url), url.chars().count());
    }

    #[test]
    fn test_empty_url_scores_zero() {
        assert_eq!(stability(&pattern("/.*/"), ""), 0);
    }

    #[test]
    fn test_narrower_regex_scores_lower() {
        let url = "example.com/path";
        let broad = stability(&pattern("/example\\.com/"), url);
        let narrow = stability(&pattern("/example\\.com\\/path/"), url);

        assert_eq!(narrow, 0);
        assert_eq!(broad, 5);
        assert!(narrow < broad);
    }

    #[test]
    fn test_multibyte_positions() {
        // three chars, six bytes
        let url = "éàü";

        assert_eq!(stability(&pattern("/.+/"), url), 3);
        assert_eq!(stability(&pattern("é"), url), 2);
    }

    #[test]
    fn test_literal_substring_score() {
        // "cat" survives deletions outside its three characters
        let url = "https://cats.example.com/page";

        assert_eq!(stability(&pattern("cat"), url), url.len() - 3);
    }
}
