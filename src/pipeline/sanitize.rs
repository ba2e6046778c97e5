//! Deterministic cleanup of raw model replies before JSON extraction.
//!
//! Even with "return ONLY JSON" in the prompt, Gemini regularly wraps its
//! answer in ```` ```json ```` fences, prefixes it with a sentence, or
//! emits a byte-order mark. None of that changes what the JSON *says*, but
//! each of them can trip the bracket scanner or the decoder. The rules here
//! remove that noise without touching content.
//!
//! ## Rule Order
//!
//! Normalise line endings first so the fence regex sees `\n`, strip fences
//! second, remove invisible characters last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all reply-cleanup rules.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer code fences, with or without a language tag
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
pub fn clean_reply(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    remove_invisible_chars(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip code fences ────────────────────────────────────────────────

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n(.*?)\n\s*```").unwrap());

/// Replace the first fenced block with its body, dropping surrounding prose.
fn strip_code_fences(input: &str) -> String {
    match RE_FENCED_BLOCK.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Repair: trailing commas ──────────────────────────────────────────────────
//
// Not part of `clean_reply`: a `,]` can legitimately occur inside a string.
// Parsers call this only after a first decode attempt has failed.

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[\]}])").unwrap());

/// Remove commas directly before a closing bracket.
pub fn repair_trailing_commas(input: &str) -> String {
    RE_TRAILING_COMMA.replace_all(input, "$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence_and_surrounding_prose() {
        let raw = "Here are the questions:\n```json\n[{\"a\":1}]\n```\nHope this helps!";
        assert_eq!(clean_reply(raw), "[{\"a\":1}]");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(clean_reply("```\n{\"x\":true}\n```"), "{\"x\":true}");
    }

    #[test]
    fn unfenced_text_passes_through() {
        assert_eq!(clean_reply("noise [1] trailing"), "noise [1] trailing");
    }

    #[test]
    fn crlf_fenced_reply() {
        assert_eq!(clean_reply("```json\r\n[]\r\n```"), "[]");
    }

    #[test]
    fn removes_bom_and_zero_width() {
        assert_eq!(clean_reply("\u{FEFF}[\u{200B}1]"), "[1]");
    }

    #[test]
    fn repairs_trailing_commas() {
        assert_eq!(
            repair_trailing_commas("[{\"a\": 1,}, {\"b\": 2},\n]"),
            "[{\"a\": 1}, {\"b\": 2}\n]"
        );
    }
}
