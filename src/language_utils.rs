use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Language list utilities
///
/// The language property of a package is the summary `Template` value,
/// `"<platforms>;<lang>,<lang>,..."`. A value without `;` is treated as a
/// bare language list. Identifiers are only ever appended; existing entries
/// keep their position.
/// Separator between language identifiers
pub const LANGUAGE_DELIMITER: char = ',';

/// Separator between the platform section and the language section
pub const PLATFORM_SEPARATOR: char = ';';

/// How an identifier is recognised as already registered
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Exact match against one comma-separated token of the language section
    #[default]
    Token,
    /// Raw substring search over the whole property value
    Substring,
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Substring => write!(f, "substring"),
        }
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "substring" => Ok(Self::Substring),
            _ => Err(anyhow!("Invalid match policy: {}", s)),
        }
    }
}

/// Result of merging an identifier into a language property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageMerge {
    /// The identifier was appended; holds the new property value
    Appended(String),
    /// The identifier is already registered; the value stays as it is
    AlreadyPresent,
}

/// Validate a language identifier before it is used as a storage entry name
/// and list token
pub fn validate_language_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(anyhow!("Language identifier must not be empty"));
    }

    if let Some(bad) = identifier
        .chars()
        .find(|c| *c == LANGUAGE_DELIMITER || *c == PLATFORM_SEPARATOR || c.is_whitespace() || c.is_control())
    {
        return Err(anyhow!(
            "Invalid language identifier {:?}: contains {:?}",
            identifier,
            bad
        ));
    }

    Ok(())
}

/// Split a template value into its platform section (if any) and language section
pub fn split_template(value: &str) -> (Option<&str>, &str) {
    match value.split_once(PLATFORM_SEPARATOR) {
        Some((platforms, languages)) => (Some(platforms), languages),
        None => (None, value),
    }
}

/// Iterate the identifiers of the language section, skipping empty tokens
pub fn language_tokens(value: &str) -> impl Iterator<Item = &str> {
    let (_, languages) = split_template(value);
    languages
        .split(LANGUAGE_DELIMITER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Check whether an identifier is already registered in a property value
pub fn contains_language(value: &str, identifier: &str, policy: MatchPolicy) -> bool {
    match policy {
        MatchPolicy::Token => language_tokens(value).any(|token| token == identifier),
        MatchPolicy::Substring => value.contains(identifier),
    }
}

/// Append an identifier to the end of the language section
pub fn append_language(value: &str, identifier: &str) -> String {
    let (_, languages) = split_template(value);

    let mut updated = String::with_capacity(value.len() + identifier.len() + 1);
    updated.push_str(value);
    if !languages.trim().is_empty() {
        updated.push(LANGUAGE_DELIMITER);
    }
    updated.push_str(identifier);
    updated
}

/// Merge an identifier into a property value without duplicating it
pub fn merge_language(value: &str, identifier: &str, policy: MatchPolicy) -> LanguageMerge {
    if contains_language(value, identifier, policy) {
        LanguageMerge::AlreadyPresent
    } else {
        LanguageMerge::Appended(append_language(value, identifier))
    }
}
