/*!
 * Tests for language list utilities
 */

use langembed::language_utils::{
    LanguageMerge, MatchPolicy, contains_language, merge_language, validate_language_identifier,
};

/// Appending keeps the original order and puts the new identifier last
#[test]
fn test_merge_language_withNewIdentifier_shouldAppendLast() {
    assert_eq!(
        merge_language("1033,1036", "1031", MatchPolicy::Token),
        LanguageMerge::Appended("1033,1036,1031".to_string())
    );
    assert_eq!(
        merge_language("Intel;1033,1036", "1031", MatchPolicy::Token),
        LanguageMerge::Appended("Intel;1033,1036,1031".to_string())
    );
}

/// A registered identifier leaves the value unchanged
#[test]
fn test_merge_language_withRegisteredIdentifier_shouldBeNoOp() {
    assert_eq!(merge_language("1033,1036", "1033", MatchPolicy::Token), LanguageMerge::AlreadyPresent);
    assert_eq!(merge_language("1033,1036", "1036", MatchPolicy::Substring), LanguageMerge::AlreadyPresent);
}

/// Empty language sections get no leading delimiter
#[test]
fn test_merge_language_withEmptyValue_shouldOmitDelimiter() {
    assert_eq!(
        merge_language("", "1033", MatchPolicy::Token),
        LanguageMerge::Appended("1033".to_string())
    );
    assert_eq!(
        merge_language("Intel;", "1033", MatchPolicy::Substring),
        LanguageMerge::Appended("Intel;1033".to_string())
    );
}

/// Token matching does not mistake a substring for a registered identifier
#[test]
fn test_contains_language_tokenPolicy_shouldIgnoreSubstrings() {
    assert!(!contains_language("1033,1031", "1", MatchPolicy::Token));
    assert!(!contains_language("1033,1031", "103", MatchPolicy::Token));
    assert_eq!(
        merge_language("1031", "1", MatchPolicy::Token),
        LanguageMerge::Appended("1031,1".to_string())
    );
}

/// Substring matching keeps the raw search, sharp edge included
#[test]
fn test_contains_language_substringPolicy_shouldMatchInsideOtherIdentifiers() {
    assert!(contains_language("1031", "1", MatchPolicy::Substring));
    assert_eq!(merge_language("1031", "1", MatchPolicy::Substring), LanguageMerge::AlreadyPresent);
}

/// Token matching only looks at the language section
#[test]
fn test_contains_language_tokenPolicy_shouldSkipPlatformSection() {
    assert!(!contains_language("x64;1033", "x64", MatchPolicy::Token));
    assert!(contains_language("x64;1033", "x64", MatchPolicy::Substring));
}

#[test]
fn test_validate_language_identifier_shouldRejectDelimiters() {
    assert!(validate_language_identifier("1031").is_ok());
    assert!(validate_language_identifier("de-DE").is_ok());
    assert!(validate_language_identifier("").is_err());
    assert!(validate_language_identifier("1031,1033").is_err());
    assert!(validate_language_identifier("Intel;1031").is_err());
    assert!(validate_language_identifier("10 31").is_err());
}

#[test]
fn test_match_policy_fromStr_shouldParseCaseInsensitively() {
    assert_eq!("TOKEN".parse::<MatchPolicy>().unwrap(), MatchPolicy::Token);
    assert_eq!("substring".parse::<MatchPolicy>().unwrap(), MatchPolicy::Substring);
    assert!("fuzzy".parse::<MatchPolicy>().is_err());
}
