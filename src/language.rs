//! Supported conversation languages

/// A selectable conversation language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// BCP 47 tag passed to recognition and speech
    pub tag: &'static str,
    /// Name shown in the language picker
    pub name: &'static str,
}

/// Language used until the user picks another
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Languages offered for selection
pub const SUPPORTED_LANGUAGES: &[Language] = &[
    Language { tag: "en-US", name: "English (US)" },
    Language { tag: "es-ES", name: "Español" },
    Language { tag: "fr-FR", name: "Français" },
    Language { tag: "de-DE", name: "Deutsch" },
    Language { tag: "ja-JP", name: "日本語" },
    Language { tag: "hi-IN", name: "हिन्दी" },
    Language { tag: "ta-IN", name: "தமிழ்" },
    Language { tag: "pt-BR", name: "Português" },
];

/// Look up a supported language by tag, ignoring case
#[must_use]
pub fn find(tag: &str) -> Option<&'static Language> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| l.tag.eq_ignore_ascii_case(tag.trim()))
}

/// Primary language subtag (`"fr"` for `"fr-FR"`)
///
/// Accepts `_` as separator for locale names such as `en_US`.
#[must_use]
pub fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}
