//! Column-aware string helpers for the horizontal viewport. All caret and
//! scroll math is done in display columns, never bytes, so multi-byte and
//! double-width glyphs cannot split mid-character or skew the layout.

use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

/// Display width of a string in terminal columns.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Byte offset of the `char_index`-th character. Clamps to the end of the
/// string when the index is past the last character.
pub fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Display width of the first `char_index` characters.
pub fn prefix_width(text: &str, char_index: usize) -> usize {
    text.chars()
        .take(char_index)
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

/// Slice a string by display columns rather than bytes or chars: skip
/// `start_cols` columns, then take up to `width_cols`. A glyph straddling
/// either boundary is excluded whole rather than split.
pub fn window_by_columns(text: &str, start_cols: usize, width_cols: usize) -> &str {
    if width_cols == 0 || text.is_empty() {
        return "";
    }

    let mut col = 0;
    let mut start_byte = None;
    let mut end_byte = text.len();
    let target_end = start_cols.saturating_add(width_cols);

    for (idx, ch) in text.char_indices() {
        let glyph = UnicodeWidthChar::width(ch).unwrap_or(0);
        if start_byte.is_none() && col >= start_cols {
            start_byte = Some(idx);
        }
        if col + glyph > target_end {
            end_byte = idx;
            break;
        }
        col += glyph;
    }

    match start_byte {
        Some(start) if start <= end_byte => &text[start..end_byte],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_index_respects_multibyte_chars() {
        let text = "héllo";
        assert_eq!(byte_index(text, 0), 0);
        assert_eq!(byte_index(text, 1), 1);
        assert_eq!(byte_index(text, 2), 3);
        assert_eq!(byte_index(text, 99), text.len());
    }

    #[test]
    fn prefix_width_counts_columns_not_bytes() {
        assert_eq!(prefix_width("héllo", 2), 2);
        // CJK glyphs are two columns wide.
        assert_eq!(prefix_width("日本語", 2), 4);
        assert_eq!(prefix_width("abc", 99), 3);
    }

    #[test]
    fn window_takes_a_middle_slice() {
        assert_eq!(window_by_columns("abcdef", 2, 3), "cde");
        assert_eq!(window_by_columns("abcdef", 0, 99), "abcdef");
        assert_eq!(window_by_columns("abcdef", 6, 3), "");
    }

    #[test]
    fn window_never_splits_a_wide_glyph() {
        // Window of width 3 cannot fit the second two-column glyph whole.
        assert_eq!(window_by_columns("日本語", 0, 3), "日");
        assert_eq!(window_by_columns("日本語", 2, 4), "本語");
    }

    #[test]
    fn zero_width_window_is_empty() {
        assert_eq!(window_by_columns("abc", 0, 0), "");
        assert_eq!(window_by_columns("", 0, 10), "");
    }
}
