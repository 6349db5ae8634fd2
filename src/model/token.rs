const SPECIAL_TOKENS: [&str; 8] = [
    "[CLS]", "[SEP]", "[PAD]", "[MASK]", "[UNK]", "<s>", "</s>", "<pad>",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    Special,
    Capitalized,
    Numeric,
    Punctuation,
    Word,
}

impl TokenCategory {
    pub fn classify(text: &str) -> Self {
        let trimmed = text.trim();
        if SPECIAL_TOKENS.contains(&trimmed) {
            return Self::Special;
        }

        if trimmed.chars().any(|ch| ch.is_ascii_digit())
            && trimmed.chars().all(|ch| ch.is_ascii_digit() || ch == '.' || ch == ',')
        {
            return Self::Numeric;
        }

        if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_punctuation()) {
            return Self::Punctuation;
        }

        if trimmed.chars().next().is_some_and(char::is_uppercase) {
            return Self::Capitalized;
        }

        Self::Word
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Special => "special",
            Self::Capitalized => "capitalized",
            Self::Numeric => "numeric",
            Self::Punctuation => "punctuation",
            Self::Word => "word",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub index: usize,
    pub text: String,
    pub label: String,
    pub category: TokenCategory,
}

impl Token {
    pub fn new(index: usize, text: &str) -> Self {
        let label = clean_label(text);
        Self {
            index,
            text: text.to_owned(),
            category: TokenCategory::classify(&label),
            label,
        }
    }
}

/// Strips BERT (`##`) and GPT (`Ġ`) subword markers; special tokens are kept as-is.
pub fn clean_label(raw: &str) -> String {
    if SPECIAL_TOKENS.contains(&raw) {
        return raw.to_owned();
    }

    if let Some(rest) = raw.strip_prefix("##") {
        return rest.to_owned();
    }

    if let Some(rest) = raw.strip_prefix('Ġ') {
        return rest.to_owned();
    }

    raw.to_owned()
}

pub fn tokens_from(raw: &[String]) -> Vec<Token> {
    raw.iter()
        .enumerate()
        .map(|(index, text)| Token::new(index, text))
        .collect()
}

/// Point size for the embedding view, a function of token text only.
pub fn point_size(token: &Token) -> f32 {
    let base = match token.category {
        TokenCategory::Special => 7.0,
        TokenCategory::Punctuation => 3.5,
        _ => 4.5,
    };
    base + (token.label.chars().count().min(12) as f32 * 0.25)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_token_kinds() {
        assert_eq!(TokenCategory::classify("[CLS]"), TokenCategory::Special);
        assert_eq!(TokenCategory::classify("</s>"), TokenCategory::Special);
        assert_eq!(TokenCategory::classify("Paris"), TokenCategory::Capitalized);
        assert_eq!(TokenCategory::classify("42"), TokenCategory::Numeric);
        assert_eq!(TokenCategory::classify("3.14"), TokenCategory::Numeric);
        assert_eq!(TokenCategory::classify(","), TokenCategory::Punctuation);
        assert_eq!(TokenCategory::classify("..."), TokenCategory::Punctuation);
        assert_eq!(TokenCategory::classify("fox"), TokenCategory::Word);
    }

    #[test]
    fn strips_subword_markers() {
        assert_eq!(clean_label("##ing"), "ing");
        assert_eq!(clean_label("Ġworld"), "world");
        assert_eq!(clean_label("[SEP]"), "[SEP]");

        let token = Token::new(3, "ĠHello");
        assert_eq!(token.label, "Hello");
        assert_eq!(token.category, TokenCategory::Capitalized);
    }

    #[test]
    fn point_size_depends_only_on_text() {
        let a = Token::new(0, "attention");
        let b = Token::new(9, "attention");
        assert_eq!(point_size(&a), point_size(&b));
        assert!(point_size(&Token::new(0, "[CLS]")) > point_size(&Token::new(0, ",")));
    }
}
