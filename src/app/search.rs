use std::sync::Arc;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use neural_echo::model::Token;

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

/// One flag per token. Empty when the query is blank so views skip dimming.
pub(super) fn token_matches(tokens: &[Token], query: &str) -> Arc<[bool]> {
    let query = query.trim();
    if query.is_empty() {
        return Arc::from(Vec::new());
    }

    let matcher = SkimMatcherV2::default();
    tokens
        .iter()
        .map(|token| {
            fuzzy_match_score(&matcher, &token.label, query).is_some()
                || fuzzy_match_score(&matcher, &token.text, query).is_some()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use neural_echo::model::tokens_from;

    fn tokens(raw: &[&str]) -> Vec<Token> {
        tokens_from(&raw.iter().map(|text| text.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn blank_query_matches_nothing() {
        let tokens = tokens(&["[CLS]", "fox", "[SEP]"]);
        assert!(token_matches(&tokens, "   ").is_empty());
    }

    #[test]
    fn matches_cleaned_labels_case_insensitively() {
        let tokens = tokens(&["[CLS]", "Ġquick", "##fox", "dog", "[SEP]"]);
        let matches = token_matches(&tokens, "FOX");
        assert_eq!(&*matches, &[false, false, true, false, false]);
    }
}
