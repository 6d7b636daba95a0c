//! Boundary-aware truncation for page text.
//!
//! Lengths are counted in chars, never bytes, so a cut never lands inside a UTF-8 sequence.
//! Boundary search is limited to a trailing window before the cap; the whole document is never
//! scanned except for the word-boundary fallback, which only looks at the prefix.

/// Appended when a cut could not land on a sentence/paragraph/line boundary.
pub const ELLIPSIS: &str = "...";

/// How far back from the cap to look for a sentence, paragraph, or line boundary.
const BOUNDARY_WINDOW_CHARS: usize = 500;

/// A word boundary further than this from the cap loses too much text; hard-cut instead.
const MAX_WORD_BACKOFF_CHARS: usize = 200;

/// Truncate `text` to at most `max_chars` chars (plus [`ELLIPSIS`] for word/hard cuts).
///
/// Returns `text` unchanged when it already fits. Otherwise, in priority order:
///
/// 1. last `.`/`!`/`?` followed by whitespace inside the window (kept, no ellipsis)
/// 2. last blank line (`\n\n`) inside the window
/// 3. last newline inside the window
/// 4. last space before the cap, if within 200 chars of it (ellipsis)
/// 5. hard cut at the cap (ellipsis)
///
/// Abbreviations ("e.g. ") and decimals followed by whitespace count as sentence ends.
pub fn truncate(text: &str, max_chars: usize) -> String {
    // Byte offset of every char up to and including index `max_chars`.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .take(max_chars + 1)
        .collect();
    if offsets.len() <= max_chars {
        return text.to_string();
    }

    let cap_byte = offsets[max_chars];
    let window_start = max_chars.saturating_sub(BOUNDARY_WINDOW_CHARS);
    let window_byte = offsets[window_start];
    let window = &text[window_byte..cap_byte];

    if let Some(end) = last_sentence_end(window) {
        return text[..window_byte + end].trim_end().to_string();
    }
    if let Some(p) = window.rfind("\n\n") {
        return text[..window_byte + p].trim_end().to_string();
    }
    if let Some(p) = window.rfind('\n') {
        return text[..window_byte + p].trim_end().to_string();
    }

    let prefix = &text[..cap_byte];
    if let Some(p) = prefix.rfind(' ') {
        let space_char_idx = prefix[..p].chars().count();
        if space_char_idx + MAX_WORD_BACKOFF_CHARS > max_chars {
            return format!("{}{ELLIPSIS}", prefix[..p].trim_end());
        }
    }

    format!("{}{ELLIPSIS}", prefix.trim_end())
}

/// Byte offset just past the last `[.!?]<whitespace>` pair in `s`.
fn last_sentence_end(s: &str) -> Option<usize> {
    let mut found = None;
    let mut chars = s.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(j, next)) = chars.peek() {
            if next.is_whitespace() {
                found = Some(j + next.len_utf8());
            }
        }
    }
    found
}
