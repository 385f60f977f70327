//! Display resolution over locale-tagged texts.
//!
//! The preference chain is: text in the requested display language if one was
//! supplied, else the text flagged preferred for the repository's default
//! locale, else the first available text. The last step deliberately carries
//! no stronger guarantee; validate-code depends on trying *all* texts, not
//! just the resolved one.

use crate::model::LocalizedText;

/// Returns the display for a specific language: the locale-preferred text in
/// that language when one exists, else the first text in that language.
pub fn display_for_language(texts: &[LocalizedText], language: &str) -> Option<String> {
    let mut in_language = texts
        .iter()
        .filter(|t| t.locale.as_deref() == Some(language));
    let first = in_language.next()?;
    let preferred = std::iter::once(first)
        .chain(in_language)
        .find(|t| t.locale_preferred);
    Some(preferred.unwrap_or(first).name.clone())
}

/// Resolves a display for lookup-style output: requested language first, then
/// the repository default locale, then any available text.
pub fn display_for_lookup(
    texts: &[LocalizedText],
    requested_language: Option<&str>,
    default_locale: &str,
) -> Option<String> {
    if let Some(language) = requested_language.filter(|l| !l.is_empty()) {
        return display_for_language(texts, language);
    }
    display_for_language(texts, default_locale).or_else(|| any_display(texts))
}

/// Checks a caller-supplied display against the concept's texts. When a
/// language is given only texts in that locale are tried; otherwise every
/// text counts.
pub fn validate_display(
    texts: &[LocalizedText],
    display: &str,
    language: Option<&str>,
) -> bool {
    texts
        .iter()
        .filter(|t| match language.filter(|l| !l.is_empty()) {
            Some(l) => t.locale.as_deref() == Some(l),
            None => true,
        })
        .any(|t| t.name == display)
}

fn any_display(texts: &[LocalizedText]) -> Option<String> {
    texts.first().map(|t| t.name.clone())
}
