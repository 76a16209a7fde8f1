//! Emoji normalization between Unicode glyphs and `:shortcode:` text.
//!
//! The portable form is `:shortcode:`. It is what gets hashed for the
//! translation cache and checked by the content filter, so that the same
//! emoji typed on different platforms maps to one representation.

use crate::common::types::ChannelKind;

/// Longest emoji sequence (in chars) tried when scanning.
const MAX_EMOJI_CHARS: usize = 12;

/// Maps emoji glyphs to shortcodes and back.
#[derive(Debug, Clone, Default)]
pub struct EmojiNormalizer;

impl EmojiNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Convert Unicode emoji to `:shortcode:` form.
    ///
    /// ASCII input is returned unchanged; emoji without a shortcode and
    /// non-emoji characters pass through as-is.
    pub fn to_portable(&self, text: &str) -> String {
        if text.is_ascii() {
            return text.to_string();
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut result = String::with_capacity(text.len() + 16);
        let mut i = 0;

        while i < chars.len() {
            let (start, ch) = chars[i];
            let next_is_ascii = chars.get(i + 1).map_or(true, |&(_, c)| c.is_ascii());

            if ch.is_ascii() && next_is_ascii {
                result.push(ch);
                i += 1;
                continue;
            }

            // Longest match first so ZWJ sequences and modifiers stay whole
            let min_len = if ch.is_ascii() { 2 } else { 1 };
            let max_end = (i + MAX_EMOJI_CHARS).min(chars.len());
            let mut matched = None;
            for end in (i + min_len..=max_end).rev() {
                let end_byte = chars.get(end).map_or(text.len(), |&(b, _)| b);
                let candidate = &text[start..end_byte];
                if let Some(emoji) = emojis::get(candidate) {
                    matched = Some((end, candidate, emoji.shortcode()));
                    break;
                }
            }

            match matched {
                Some((end, _, Some(shortcode))) => {
                    result.push(':');
                    result.push_str(shortcode);
                    result.push(':');
                    i = end;
                }
                Some((end, glyph, None)) => {
                    result.push_str(glyph);
                    i = end;
                }
                None => {
                    result.push(ch);
                    i += 1;
                }
            }
        }

        result
    }

    /// Render portable text for a destination channel.
    ///
    /// Discord gets native glyphs; game channels keep shortcodes.
    pub fn from_portable(&self, text: &str, channel: ChannelKind) -> String {
        match channel {
            ChannelKind::ExternalPlatform => shortcodes_to_glyphs(text),
            ChannelKind::GameBroadcast
            | ChannelKind::StaffChannel
            | ChannelKind::PremiumChannel => text.to_string(),
        }
    }
}

/// Replace `:shortcode:` with the emoji glyph; unknown codes are kept.
fn shortcodes_to_glyphs(message: &str) -> String {
    let mut result = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != ':' {
            result.push(ch);
            continue;
        }

        let mut shortcode = String::new();
        let mut closed = false;

        while let Some(&next_ch) = chars.peek() {
            if next_ch == ':' {
                closed = true;
                break;
            } else if next_ch.is_alphanumeric() || matches!(next_ch, '_' | '-' | '+') {
                shortcode.push(next_ch);
                chars.next();
            } else {
                break;
            }
        }

        if !closed {
            result.push(':');
            result.push_str(&shortcode);
            continue;
        }

        match emojis::get_by_shortcode(&shortcode.to_lowercase()) {
            Some(emoji) if !shortcode.is_empty() => {
                chars.next(); // closing colon
                result.push_str(emoji.as_str());
            }
            _ => {
                // Leave the closing colon in place: it may open the next code
                result.push(':');
                result.push_str(&shortcode);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_identity() {
        let normalizer = EmojiNormalizer::new();
        for input in ["", "hello world", ":smile: already portable", "a:b:c", "<:custom:123>"] {
            assert_eq!(normalizer.to_portable(input), input);
        }
    }

    #[test]
    fn test_unicode_to_shortcode() {
        let normalizer = EmojiNormalizer::new();
        let output = normalizer.to_portable("Hello 😀 world 🎉");
        assert_eq!(output, "Hello :grinning: world :tada:");
    }

    #[test]
    fn test_non_emoji_unicode_passes_through() {
        let normalizer = EmojiNormalizer::new();
        assert_eq!(normalizer.to_portable("héllo wörld ñ"), "héllo wörld ñ");
        assert_eq!(normalizer.to_portable("日本語"), "日本語");
    }

    #[test]
    fn test_to_portable_idempotent() {
        let normalizer = EmojiNormalizer::new();
        let inputs = [
            "plain text",
            "😀😂👍",
            "mixed 🎉 party 🎊 time ñ 日本",
            "family 👨‍👩‍👧 and thumbs 👍🏽",
            "1️⃣ keycap and ❤️ heart",
            "\u{FE0F} stray selector \u{200D}",
        ];
        for input in inputs {
            let once = normalizer.to_portable(input);
            let twice = normalizer.to_portable(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_from_portable_external_renders_glyphs() {
        let normalizer = EmojiNormalizer::new();
        let output = normalizer.from_portable("gg :tada: :not_a_real_code:", ChannelKind::ExternalPlatform);
        assert_eq!(output, "gg 🎉 :not_a_real_code:");
    }

    #[test]
    fn test_from_portable_game_keeps_shortcodes() {
        let normalizer = EmojiNormalizer::new();
        let output = normalizer.from_portable("gg :tada:", ChannelKind::GameBroadcast);
        assert_eq!(output, "gg :tada:");
    }

    #[test]
    fn test_round_trip_through_external() {
        let normalizer = EmojiNormalizer::new();
        let portable = normalizer.to_portable("nice 👍");
        assert_eq!(
            normalizer.from_portable(&portable, ChannelKind::ExternalPlatform),
            "nice 👍"
        );
    }

    #[test]
    fn test_time_like_text_unchanged() {
        let normalizer = EmojiNormalizer::new();
        let output = normalizer.from_portable("meet at 10:30:00 ok", ChannelKind::ExternalPlatform);
        assert_eq!(output, "meet at 10:30:00 ok");
    }
}
