//! Turning a model reply into a list of search terms.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::FlowConfig;

lazy_static! {
    /// Line breaks, commas and semicolons, with an optional list marker after.
    static ref TERM_SEPARATOR: Regex =
        Regex::new(r"[\n,;]\s*(\d+[.)]|- )?").expect("separator pattern");
    /// The model talking about search terms instead of giving one.
    static ref META_COMMENTARY: Regex =
        Regex::new(r"(?i)search term|(search|best) keyword").expect("commentary pattern");
}

/// Split `reply` into candidate terms and keep the plausible ones.
pub fn extract_search_terms(reply: &str, config: &FlowConfig) -> Vec<String> {
    TERM_SEPARATOR
        .split(reply)
        .filter(|candidate| !META_COMMENTARY.is_match(candidate))
        .map(|candidate| {
            let candidate = candidate.trim();
            candidate.strip_prefix("- ").unwrap_or(candidate)
        })
        .filter(|term| {
            let len = term.chars().count();
            len >= config.min_term_chars && len <= config.max_term_chars
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(reply: &str) -> Vec<String> {
        extract_search_terms(reply, &FlowConfig::default())
    }

    #[test]
    fn test_bullets() {
        assert_eq!(extract("- Foo\n- Bar\n"), vec!["Foo", "Bar"]);
    }

    #[test]
    fn test_single_term() {
        assert_eq!(extract("Befunge"), vec!["Befunge"]);
    }

    #[test]
    fn test_numbered_and_inline_lists() {
        assert_eq!(
            extract("1. Brainfuck\n2) Befunge, Malbolge; INTERCAL"),
            vec!["1. Brainfuck", "Befunge", "Malbolge", "INTERCAL"]
        );
    }

    #[test]
    fn test_meta_commentary_dropped() {
        assert_eq!(
            extract("The best keyword is:\n- Foo\nSearch term: Bar"),
            vec!["Foo"]
        );
    }

    #[test]
    fn test_length_bounds() {
        let longest = "a".repeat(64);
        let too_long = "b".repeat(65);
        let reply = format!("x\nxy\n{longest}\n{too_long}");
        assert_eq!(extract(&reply), vec!["xy".to_string(), longest]);
    }

    #[test]
    fn test_length_in_characters() {
        assert_eq!(extract("ü\nλx"), vec!["λx"]);
    }
}
