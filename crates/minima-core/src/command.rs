//! ============================================================================
//! Command Tokenizer
//! ============================================================================
//! Parses the node's `<verb> [key:value ...]` command syntax into a typed
//! structure. A value may contain embedded whitespace and runs up to the
//! next `key:` token or end of string; values are not quoted or escaped.
//! ============================================================================

/// A parsed command: base verb plus ordered `key:value` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// First whitespace-delimited token, lower-cased. Empty for an empty
    /// command string.
    pub verb: String,
    /// Parameters in the order written.
    pub params: Vec<(String, String)>,
}

impl ParsedCommand {
    /// Look up a parameter value by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// True for a token that opens a new parameter: `key:` where the key is a
/// word of letters, digits, or underscores. A token like `{"0":"x"}` or
/// `"a:1",` does not qualify, so JSON values survive intact.
fn is_key_token(token: &str) -> Option<(&str, &str)> {
    let idx = token.find(':')?;
    let (key, rest) = token.split_at(idx);
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, &rest[1..]))
}

/// Tokenize a command string.
pub fn parse(cmd: &str) -> ParsedCommand {
    let mut tokens = cmd.split_whitespace();

    let verb = match tokens.next() {
        Some(t) => t.to_lowercase(),
        None => {
            return ParsedCommand {
                verb: String::new(),
                params: Vec::new(),
            }
        }
    };

    let mut params: Vec<(String, String)> = Vec::new();
    for token in tokens {
        match is_key_token(token) {
            Some((key, value)) => params.push((key.to_string(), value.to_string())),
            None => {
                // Continuation of the previous value. Bare tokens before the
                // first key are not parameters and are dropped.
                if let Some((_, value)) = params.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(token);
                }
            }
        }
    }

    ParsedCommand { verb, params }
}

/// First token of a command string, lower-cased; empty if the string is
/// empty. This is the classification and dispatch key.
pub fn base_verb(cmd: &str) -> String {
    cmd.split_whitespace()
        .next()
        .map(|t| t.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_verb() {
        assert_eq!(base_verb("balance"), "balance");
        assert_eq!(base_verb("SEND address:Mx amount:1"), "send");
        assert_eq!(base_verb("  status  "), "status");
        assert_eq!(base_verb(""), "");
        assert_eq!(base_verb("   "), "");
    }

    #[test]
    fn test_parse_simple() {
        let parsed = parse("send address:MxABC amount:10");
        assert_eq!(parsed.verb, "send");
        assert_eq!(parsed.get("address"), Some("MxABC"));
        assert_eq!(parsed.get("amount"), Some("10"));
        assert_eq!(parsed.params.len(), 2);
    }

    #[test]
    fn test_parse_value_with_spaces() {
        let parsed = parse("record_onchain data:hello world out there label:my note");
        assert_eq!(parsed.verb, "record_onchain");
        assert_eq!(parsed.get("data"), Some("hello world out there"));
        assert_eq!(parsed.get("label"), Some("my note"));
    }

    #[test]
    fn test_parse_json_value_survives() {
        let parsed = parse(r#"send multi:["MxA:10","MxB:5"] split:2"#);
        assert_eq!(parsed.get("multi"), Some(r#"["MxA:10","MxB:5"]"#));
        assert_eq!(parsed.get("split"), Some("2"));
    }

    #[test]
    fn test_parse_empty() {
        let parsed = parse("");
        assert_eq!(parsed.verb, "");
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn test_parse_verb_lowercased_keys_case_insensitive() {
        let parsed = parse("Maxima Action:info");
        assert_eq!(parsed.verb, "maxima");
        assert_eq!(parsed.get("action"), Some("info"));
    }

    #[test]
    fn test_parse_ordered_params() {
        let parsed = parse("send address:Mx amount:1 tokenid:0x00 burn:0.1");
        let keys: Vec<&str> = parsed.params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["address", "amount", "tokenid", "burn"]);
    }

    #[test]
    fn test_parse_bare_token_before_first_key_dropped() {
        let parsed = parse("status compact");
        assert_eq!(parsed.verb, "status");
        assert!(parsed.params.is_empty());
    }
}
