//! Command-line tokenizer for SSH subsystem payloads.

use std::sync::LazyLock;

use regex_lite::Regex;

// A single-quoted run without embedded quotes, or a run of non-whitespace.
static TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"('[^']*')|(\S+)").ok());

/// Split a command line into tokens.
///
/// A token is either a single-quoted run of non-quote characters or a
/// maximal run of non-whitespace. Quotes are stripped only from tokens that
/// both start and end with `'` and are longer than two characters, so `''`
/// and an unterminated `'abc` pass through literally. There is no escaping.
///
/// ```
/// assert_eq!(
///     machined::tokenize("ls -a 'one two' three"),
///     vec!["ls", "-a", "one two", "three"],
/// );
/// ```
pub fn tokenize(line: &str) -> Vec<String> {
    let Some(pattern) = TOKEN.as_ref() else {
        return line.split_whitespace().map(str::to_string).collect();
    };
    pattern
        .find_iter(line)
        .map(|token| {
            let token = token.as_str();
            match token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
                Some(inner) if token.len() > 2 => inner.to_string(),
                _ => token.to_string(),
            }
        })
        .collect()
}
