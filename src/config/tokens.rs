// ABOUTME: Parser for the ";;"-delimited key:value token lists used in env vars.
// ABOUTME: Invalid records are logged and dropped, duplicate keys keep the first value.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

const VALUE_DELIMITER: &str = ";;";

fn token_pattern() -> &'static Regex {
    static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();
    TOKEN_PATTERN
        .get_or_init(|| Regex::new(r"^([A-Za-z0-9_./\- ]+):(.+)$").expect("valid token pattern"))
}

/// Parses a `key:value;;key:value` list into a map.
///
/// Blank records are skipped silently. Records not matching the token
/// pattern are dropped with a warning. Duplicate keys warn and retain the
/// first-seen value.
pub fn parse_token_map(input: &str) -> HashMap<String, String> {
    let mut target = HashMap::new();
    for group in input.split(VALUE_DELIMITER) {
        if group.trim().is_empty() {
            continue;
        }

        match token_pattern().captures(group) {
            Some(captures) => {
                let key = captures[1].to_string();
                let value = captures[2].to_string();
                if let Some(known) = target.get(&key) {
                    tracing::warn!(
                        "detected duplicate token key {key} (first value: {known}, current value: {value})"
                    );
                } else {
                    target.insert(key, value);
                }
            }
            None => {
                tracing::warn!(
                    "unexpected token encountered: {group} - should be in the format \"key:value;;\""
                );
            }
        }
    }
    target
}

/// Splits a `;;`-delimited value list, dropping blank entries.
pub fn split_values(input: &str) -> Vec<String> {
    input
        .split(VALUE_DELIMITER)
        .filter(|value| !value.trim().is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_records() {
        let parsed = parse_token_map("k1:v1;;k2:v2");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("k1"), Some(&"v1".to_string()));
        assert_eq!(parsed.get("k2"), Some(&"v2".to_string()));
    }

    #[test]
    fn blank_inputs_yield_empty_maps() {
        assert!(parse_token_map("").is_empty());
        assert!(parse_token_map(";;").is_empty());
        assert!(parse_token_map("   \t ").is_empty());
    }

    #[test]
    fn duplicate_keys_keep_first_value() {
        let parsed = parse_token_map("key:first;;key:second");
        assert_eq!(parsed.get("key"), Some(&"first".to_string()));
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn invalid_records_are_dropped() {
        let parsed = parse_token_map("no-colon-record;;ok:value");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("ok"), Some(&"value".to_string()));
    }

    #[test]
    fn keys_allow_spaces_dots_and_dashes() {
        let parsed = parse_token_map("shared config/link-v2. :/var/www");
        assert_eq!(
            parsed.get("shared config/link-v2. "),
            Some(&"/var/www".to_string())
        );
    }

    #[test]
    fn values_keep_embedded_colons() {
        let parsed = parse_token_map("key:va:lue");
        assert_eq!(parsed.get("key"), Some(&"va:lue".to_string()));
    }

    #[test]
    fn split_values_drops_blanks() {
        assert_eq!(split_values("v1;;v2"), vec!["v1", "v2"]);
        assert_eq!(split_values("v1;;;;v2;;"), vec!["v1", "v2"]);
        assert!(split_values("").is_empty());
        assert!(split_values(" ;; ").is_empty());
    }
}
