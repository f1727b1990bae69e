use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

pub type IdentifierSet = BTreeSet<String>;

pub type AmbiguityMap = BTreeMap<String, String>;

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W*,\W*").unwrap());

/// Multi-token fields record each token in `ambiguous`; the first origin wins.
pub fn add_identifiers(
    identifiers: &mut IdentifierSet,
    ambiguous: Option<&mut AmbiguityMap>,
    raw: Option<&str>,
) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let tokens = split_identifiers(raw);
    identifiers.extend(tokens.iter().cloned());
    if let Some(ambiguous) = ambiguous {
        if tokens.len() > 1 {
            for token in &tokens {
                ambiguous
                    .entry(token.clone())
                    .or_insert_with(|| raw.to_string());
            }
        }
    }
    tokens
}

pub fn split_identifiers(raw: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in SEPARATOR.split(raw) {
        let token = token.trim();
        if token.is_empty() || tokens.iter().any(|seen| seen == token) {
            continue;
        }
        tokens.push(token.to_string());
    }
    tokens
}
