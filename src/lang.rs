//! Script detection for routing and response validation.
//!
//! The routing and sampling layers only need to know one thing about a
//! text: does it contain Hebrew script? Detection is a plain codepoint
//! scan over the Unicode Hebrew block (U+0590–U+05FF). No tokenization,
//! no language model, no text mutation (Hebrew cleaning heuristics live
//! outside this crate).

/// Language classification for routing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Hebrew,
    Other,
}

impl Language {
    /// Classify a text by scanning for Hebrew-script codepoints.
    pub fn of(text: &str) -> Self {
        if contains_hebrew(text) {
            Language::Hebrew
        } else {
            Language::Other
        }
    }

    /// Parse a caller-supplied language hint ("hebrew"/"he" vs anything else).
    pub fn from_hint(hint: &str) -> Self {
        match hint.to_ascii_lowercase().as_str() {
            "hebrew" | "he" => Language::Hebrew,
            _ => Language::Other,
        }
    }

    pub fn is_hebrew(self) -> bool {
        self == Language::Hebrew
    }
}

/// True if any character falls inside the Unicode Hebrew block.
pub fn contains_hebrew(text: &str) -> bool {
    text.chars().any(is_hebrew_char)
}

/// True if any character is a Latin letter (used for language-mismatch
/// logging, where "the model answered in English" is the signal).
pub fn contains_latin(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

pub(crate) fn is_hebrew_char(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_hebrew_text() {
        assert!(contains_hebrew("שלום עולם"));
        assert_eq!(Language::of("יש לי בעיה עם האינטרנט"), Language::Hebrew);
    }

    #[test]
    fn ascii_is_not_hebrew() {
        assert!(!contains_hebrew("hello world"));
        assert_eq!(Language::of("hello"), Language::Other);
    }

    #[test]
    fn mixed_text_counts_as_hebrew() {
        // A single Hebrew character is enough to route to the Hebrew model.
        assert_eq!(Language::of("call about אינטרנט plan"), Language::Hebrew);
    }

    #[test]
    fn block_boundaries() {
        assert!(is_hebrew_char('\u{0590}'));
        assert!(is_hebrew_char('\u{05FF}'));
        assert!(!is_hebrew_char('\u{058F}'));
        assert!(!is_hebrew_char('\u{0600}'));
    }

    #[test]
    fn hint_parsing() {
        assert_eq!(Language::from_hint("hebrew"), Language::Hebrew);
        assert_eq!(Language::from_hint("He"), Language::Hebrew);
        assert_eq!(Language::from_hint("english"), Language::Other);
    }
}
