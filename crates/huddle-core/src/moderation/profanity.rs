//! Profanity screening.
//!
//! Text is split into word tokens, each token is normalized (lowercase,
//! common digit/symbol substitutions undone, repeated letters collapsed) and
//! matched against three lists: words banned anywhere inside a token, word
//! stems, and whole words. Flagged tokens are masked with `*` in the cleaned
//! text.

use std::collections::HashSet;

/// Banned anywhere inside a token.
const INFIXES: &[&str] = &["fuck"];

/// Banned at the start of a token.
const PREFIXES: &[&str] = &[
    "asshole", "bastard", "bitch", "bollock", "bullshit", "cunt", "dickhead", "motherfuck",
    "prick", "shit", "slut", "twat", "wank", "whore",
];

/// Banned as whole tokens only.
const WORDS: &[&str] = &[
    "arse", "ass", "cock", "dick", "jackass", "piss", "pussy", "tits", "wtf", "stfu",
];

/// Outcome of screening a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screening {
    pub is_flagged: bool,
    pub cleaned: String,
}

/// Word-list profanity classifier.
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    words: HashSet<String>,
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfanityFilter {
    /// Create a filter with the built-in lists.
    #[must_use]
    pub fn new() -> Self {
        Self::with_words(std::iter::empty::<&str>())
    }

    /// Create a filter with extra whole-word entries.
    #[must_use]
    pub fn with_words<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = WORDS
            .iter()
            .map(|w| (*w).to_string())
            .chain(
                extra
                    .into_iter()
                    .map(|w| normalize(w.as_ref()))
                    .filter(|w| !w.is_empty()),
            )
            .collect();
        Self { words }
    }

    /// Screen a text.
    #[must_use]
    pub fn screen(&self, text: &str) -> Screening {
        let mut cleaned = String::with_capacity(text.len());
        let mut is_flagged = false;
        let mut token = String::new();

        for c in text.chars() {
            if is_word_char(c) {
                token.push(c);
                continue;
            }
            is_flagged |= self.flush(&mut token, &mut cleaned);
            cleaned.push(c);
        }
        is_flagged |= self.flush(&mut token, &mut cleaned);

        Screening {
            is_flagged,
            cleaned,
        }
    }

    /// Check a text without building the cleaned copy.
    #[cfg(test)]
    fn is_profane(&self, text: &str) -> bool {
        text.split(|c: char| !is_word_char(c))
            .filter(|t| !t.is_empty())
            .any(|t| self.is_profane_token(t))
    }

    fn flush(&self, token: &mut String, out: &mut String) -> bool {
        if token.is_empty() {
            return false;
        }
        let flagged = self.is_profane_token(token);
        if flagged {
            out.extend(std::iter::repeat('*').take(token.chars().count()));
        } else {
            out.push_str(token);
        }
        token.clear();
        flagged
    }

    fn is_profane_token(&self, token: &str) -> bool {
        let normalized = normalize(token);
        let collapsed = collapse_repeats(&normalized);
        [normalized.as_str(), collapsed.as_str()]
            .iter()
            .any(|candidate| self.matches(candidate))
    }

    fn matches(&self, candidate: &str) -> bool {
        self.words.contains(candidate)
            || PREFIXES.iter().any(|p| candidate.starts_with(p))
            || INFIXES.iter().any(|i| candidate.contains(i))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '@' || c == '$'
}

fn normalize(token: &str) -> String {
    token
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' | '@' => 'a',
            '5' | '$' => 's',
            '7' => 't',
            other => other,
        })
        .collect()
}

fn collapse_repeats(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut last = None;
    for c in token.chars() {
        if last != Some(c) {
            out.push(c);
        }
        last = Some(c);
    }
    out
}
