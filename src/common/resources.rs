//! Static resources: the set of language codes the translation engine knows.

/// Language codes accepted for preferences and source languages.
pub const KNOWN_LANGUAGE_CODES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "bg", "bn", "bo", "bs", "ca", "cs", "cy", "da", "de", "dv",
    "el", "en", "es", "et", "eu", "fa", "fi", "fil", "fj", "fo", "fr", "fr-CA", "ga", "gl", "gu",
    "ha", "he", "hi", "hr", "hsb", "ht", "hu", "hy", "id", "ig", "ikt", "is", "it", "iu",
    "iu-Latn", "ja", "ka", "kk", "km", "kmr", "kn", "ko", "ku", "ky", "ln", "lo", "lt", "lug",
    "lv", "lzh", "mg", "mi", "mk", "ml", "mn-Cyrl", "mn-Mong", "mr", "ms", "mt", "mww", "my", "nb",
    "ne", "nl", "nso", "nya", "or", "otq", "pa", "pl", "prs", "ps", "pt", "pt-PT", "ro", "ru",
    "run", "rw", "sk", "sl", "sm", "sn", "so", "sq", "sr-Cyrl", "sr-Latn", "st", "sv", "sw", "ta",
    "te", "th", "ti", "tk", "tlh-Latn", "tlh-Piqd", "tn", "to", "tr", "tt", "ty", "ug", "uk", "ur",
    "uz", "vi", "xh", "yo", "yua", "yue", "zh-Hans", "zh-Hant", "zu",
];

/// Look up the canonical spelling of a language code (case-insensitive).
pub fn canonical_language_code(code: &str) -> Option<&'static str> {
    let code = code.trim();
    KNOWN_LANGUAGE_CODES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_code_case_insensitive() {
        assert_eq!(canonical_language_code("EN"), Some("en"));
        assert_eq!(canonical_language_code("zh-hans"), Some("zh-Hans"));
        assert_eq!(canonical_language_code(" es "), Some("es"));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(canonical_language_code("xx"), None);
        assert_eq!(canonical_language_code(""), None);
    }
}
