//! Char-boundary-safe head+tail truncation, used to keep the text handed to
//! the summarizer under the safety cap (`spec.md` §4.3 step 2).

/// Find the nearest char boundary at or before `index`, so a `&str` slice
/// never panics on splitting a multi-byte character. Mirrors the teacher's
/// `contextpack::truncation` use of `str::floor_char_boundary`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// If `text` exceeds `cap_chars`, keep the first `head_ratio` and the last
/// `tail_ratio` fraction of `cap_chars`, dropping the middle with a marker.
/// Returns `text` unchanged when under the cap.
pub fn head_tail_truncate(text: &str, cap_chars: usize, head_ratio: f64, tail_ratio: f64) -> String {
    if text.chars().count() <= cap_chars {
        return text.to_string();
    }
    let head_chars = (cap_chars as f64 * head_ratio).round() as usize;
    let tail_chars = (cap_chars as f64 * tail_ratio).round() as usize;

    let head_byte_len = floor_char_boundary(text, nth_char_byte_offset(text, head_chars));
    let tail_start_char = text.chars().count().saturating_sub(tail_chars);
    let tail_byte_start = floor_char_boundary(text, nth_char_byte_offset(text, tail_start_char));

    let head = &text[..head_byte_len];
    let tail = &text[tail_byte_start..];
    format!("{head}\n\n[TRUNCATED]\n\n{tail}")
}

fn nth_char_byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_under_cap() {
        let text = "short text";
        assert_eq!(head_tail_truncate(text, 1000, 0.2, 0.3), text);
    }

    #[test]
    fn truncates_and_keeps_marker_when_over_cap() {
        let text = "a".repeat(1000);
        let out = head_tail_truncate(&text, 100, 0.2, 0.3);
        assert!(out.contains("[TRUNCATED]"));
        assert!(out.len() < text.len());
    }

    #[test]
    fn truncation_never_splits_multibyte_chars() {
        let text = "é".repeat(500); // 2 bytes per char
        let out = head_tail_truncate(&text, 100, 0.2, 0.3);
        assert!(std::str::from_utf8(out.as_bytes()).is_ok());
    }

    #[test]
    fn head_and_tail_respect_ratios_approximately() {
        let text = "x".repeat(10_000);
        let out = head_tail_truncate(&text, 1000, 0.2, 0.3);
        let head_part = out.split("[TRUNCATED]").next().unwrap();
        // ~200 chars of head plus surrounding whitespace/newlines.
        assert!(head_part.trim().len() <= 210);
    }
}
