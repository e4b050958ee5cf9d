//! Greedy word wrapping

use crate::font::FontFace;

/// Width of a run of text at `font_size`, without jitter
pub fn measure(face: &dyn FontFace, text: &str, font_size: f32) -> f32 {
    text.chars().map(|ch| face.advance(ch, font_size)).sum()
}

/// Wrap text into lines no wider than `max_width`
///
/// Explicit line breaks are kept; blank paragraphs become empty lines.
/// Words wider than a whole line are broken between characters.
pub fn wrap_text(text: &str, face: &dyn FontFace, font_size: f32, max_width: f32) -> Vec<String> {
    let space = face.advance(' ', font_size);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();
        let mut width = 0.0f32;

        for word in paragraph.split_whitespace() {
            let word_width = measure(face, word, font_size);

            if word_width > max_width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                width = 0.0;
                for ch in word.chars() {
                    let advance = face.advance(ch, font_size);
                    if width + advance > max_width && !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                        width = 0.0;
                    }
                    current.push(ch);
                    width += advance;
                }
                continue;
            }

            if current.is_empty() {
                current.push_str(word);
                width = word_width;
            } else if width + space + word_width > max_width {
                lines.push(std::mem::replace(&mut current, word.to_string()));
                width = word_width;
            } else {
                current.push(' ');
                current.push_str(word);
                width += space + word_width;
            }
        }

        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::GlyphBitmap;

    /// Every character is 10px wide at any size
    struct Mono;

    impl FontFace for Mono {
        fn name(&self) -> &str {
            "mono"
        }
        fn advance(&self, _ch: char, _px: f32) -> f32 {
            10.0
        }
        fn rasterize(&self, _ch: char, _px: f32) -> GlyphBitmap {
            GlyphBitmap::default()
        }
    }

    #[test]
    fn test_wraps_greedily() {
        let lines = wrap_text("aaa bbb ccc ddd", &Mono, 16.0, 75.0);
        assert_eq!(lines, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn test_keeps_explicit_breaks_and_blank_lines() {
        let lines = wrap_text("one\n\ntwo\r\nthree", &Mono, 16.0, 200.0);
        assert_eq!(lines, vec!["one", "", "two", "three"]);
    }

    #[test]
    fn test_breaks_long_words() {
        let lines = wrap_text("ab abcdefghij", &Mono, 16.0, 40.0);
        assert_eq!(lines, vec!["ab", "abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_empty_text_is_one_empty_line() {
        assert_eq!(wrap_text("", &Mono, 16.0, 100.0), vec![String::new()]);
    }

    #[test]
    fn test_collapses_runs_of_spaces() {
        let lines = wrap_text("a    b", &Mono, 16.0, 100.0);
        assert_eq!(lines, vec!["a b"]);
        assert_eq!(measure(&Mono, "a b", 16.0), 30.0);
    }
}
