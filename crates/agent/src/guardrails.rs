//! Strips sentences that leak query-execution chatter from the final answer.
//!
//! Matching is by plain substring and sentences are split on every `.`, so a
//! legitimate sentence sharing a phrase is removed too and decimal numbers
//! are split apart when filtering kicks in.

pub const DEFAULT_DENYLIST: [&str; 5] = [
    "Note: The query executed successfully",
    "The results show that",
    "executed successfully and returned",
    "The query was executed",
    "successfully executed",
];

pub const EMPTY_ANSWER_MESSAGE: &str = "Não foi possível obter uma resposta clara.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SanitizedAnswer {
    Clean(String),
    /// Nothing survived filtering; the apology message is shown instead.
    Empty,
}

impl SanitizedAnswer {
    pub fn text(&self) -> &str {
        match self {
            Self::Clean(text) => text,
            Self::Empty => EMPTY_ANSWER_MESSAGE,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseSanitizer {
    phrases: Vec<String>,
}

impl Default for ResponseSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST)
    }
}

impl ResponseSanitizer {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { phrases: phrases.into_iter().map(Into::into).collect() }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn sanitize(&self, answer: &str) -> SanitizedAnswer {
        let filtered = filter_sentences(answer, self.phrases.as_slice());
        if filtered.is_empty() {
            SanitizedAnswer::Empty
        } else {
            SanitizedAnswer::Clean(filtered)
        }
    }
}

/// For every phrase still present, drops each `.`-delimited sentence containing
/// any phrase and rejoins the rest with `". "`. Text with no phrase is only trimmed.
pub fn filter_sentences<S: AsRef<str>>(text: &str, phrases: &[S]) -> String {
    let contaminated =
        |sentence: &str| phrases.iter().any(|phrase| sentence.contains(phrase.as_ref()));

    let mut output = text.to_string();
    for phrase in phrases {
        if !output.contains(phrase.as_ref()) {
            continue;
        }

        let kept =
            output.split('.').filter(|sentence| !contaminated(*sentence)).collect::<Vec<_>>();
        output = kept.join(". ").trim().to_string();
        if !output.is_empty() && !output.ends_with('.') {
            output.push('.');
        }
    }

    output.trim().to_string()
}
