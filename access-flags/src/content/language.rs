//! Language-tagged content selection.
//!
//! Content lookups prefer the session language and fall back to English when
//! nothing is tagged with it. Unlike access decisions this fails open: a missing
//! translation should still show the user something.

use serde::{Deserialize, Serialize};

pub const FALLBACK_LANGUAGE: &str = "en";

/// Anything carrying a language code, such as FAQs or knowledge documents.
pub trait LanguageTagged {
    fn language(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LanguageSelection<T> {
    pub items: Vec<T>,
    /// Language actually served, which differs from the request after a fallback.
    pub language: String,
    pub fell_back: bool,
}

fn normalize(language: &str) -> String {
    language.trim().to_lowercase()
}

/// Selects the items tagged with `requested`, falling back to [`FALLBACK_LANGUAGE`].
///
/// When neither exists the selection is empty and reports the requested language.
pub fn select_by_language<T, I>(items: I, requested: &str) -> LanguageSelection<T>
where
    T: LanguageTagged,
    I: IntoIterator<Item = T>,
{
    let requested = normalize(requested);
    let (matching, fallback): (Vec<T>, Vec<T>) = items
        .into_iter()
        .filter(|item| {
            let language = normalize(item.language());
            language == requested || language == FALLBACK_LANGUAGE
        })
        .partition(|item| normalize(item.language()) == requested);

    if !matching.is_empty() {
        return LanguageSelection {
            items: matching,
            language: requested,
            fell_back: false,
        };
    }

    if !fallback.is_empty() {
        tracing::debug!(
            requested = %requested,
            "no content in requested language, serving fallback"
        );
        return LanguageSelection {
            items: fallback,
            language: FALLBACK_LANGUAGE.to_string(),
            fell_back: true,
        };
    }

    LanguageSelection {
        items: Vec::new(),
        language: requested,
        fell_back: false,
    }
}

/// Sorted, deduplicated language codes present in `items`.
pub fn available_languages<'a, T: LanguageTagged + 'a>(
    items: impl IntoIterator<Item = &'a T>,
) -> Vec<String> {
    let mut languages: Vec<String> = items
        .into_iter()
        .map(|item| normalize(item.language()))
        .filter(|language| !language.is_empty())
        .collect();
    languages.sort();
    languages.dedup();
    languages
}
