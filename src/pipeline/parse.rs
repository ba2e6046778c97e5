//! Response parsing: locate the JSON fragment in a free-text reply, decode
//! it, and attach the fields the model does not know (page, topic).
//!
//! ## Failure policy
//!
//! The four parsers deliberately differ in how they fail:
//!
//! | Parser       | No JSON / bad JSON                          |
//! |--------------|---------------------------------------------|
//! | extraction   | empty list, `warn!`                         |
//! | generation   | [`QuizError::GenerationParse`]              |
//! | solutions    | [`QuizError::SolutionParse`]                |
//! | validation   | "treat as correct" verdict, `degraded=true` |
//!
//! A page with no questions is a normal outcome of extraction, so an empty
//! result is safe there. Generation and solutions have no safe empty result.
//! Validation prefers not to block a review pipeline on a bad reply, but
//! marks the verdict so callers can tell.

use super::sanitize::{clean_reply, repair_trailing_commas};
use crate::error::QuizError;
use crate::question::{ExtractedQuestion, GeneratedSolution, PageMemory, ValidationVerdict};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Which bracket kind a JSON span must start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonAnchor {
    Array,
    Object,
    /// Whichever of `[` or `{` appears first.
    Any,
}

impl JsonAnchor {
    fn accepts(self, c: char) -> bool {
        match self {
            JsonAnchor::Array => c == '[',
            JsonAnchor::Object => c == '{',
            JsonAnchor::Any => c == '[' || c == '{',
        }
    }
}

/// Return the first balanced `[...]` / `{...}` span matching `anchor`.
///
/// Depth is tracked over both bracket kinds. Brackets inside string literals
/// (including escaped quotes) do not count. A closing bracket that does not
/// match the innermost opener ends the scan at that candidate, and scanning
/// resumes at the next opener. Returns `None` when no opener of the
/// requested kind is balanced.
pub fn find_json_span(text: &str, anchor: JsonAnchor) -> Option<&str> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(|c: char| anchor.accepts(c)) {
        let start = search_from + rel;
        match balanced_end(&text[start..]) {
            Some(len) => return Some(&text[start..start + len]),
            None => search_from = start + 1,
        }
    }
    None
}

/// Byte length of the balanced span at the start of `s`, if it closes.
fn balanced_end(s: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Clean the reply, find a span and decode it, retrying once with trailing
/// commas repaired.
fn decode_span<T: DeserializeOwned>(raw: &str, anchor: JsonAnchor) -> Result<T, String> {
    let cleaned = clean_reply(raw);
    let span = find_json_span(&cleaned, anchor)
        .ok_or_else(|| "no JSON fragment found in reply".to_string())?;

    match serde_json::from_str::<T>(span) {
        Ok(v) => Ok(v),
        Err(first) => {
            let repaired = repair_trailing_commas(span);
            serde_json::from_str::<T>(&repaired).map_err(|_| first.to_string())
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Parse an extraction reply. Never fails.
///
/// Every record is stamped with `page_number`; records with a blank statement
/// are dropped. When `memory` is given, the head of the raw reply is stored
/// under `page_number` whether or not decoding succeeded.
pub fn parse_extraction(
    raw: &str,
    page_number: u32,
    memory: Option<&mut PageMemory>,
) -> Vec<ExtractedQuestion> {
    if let Some(memory) = memory {
        memory.record(page_number, raw);
    }

    let records: Vec<Value> = match decode_span(raw, JsonAnchor::Array) {
        Ok(v) => v,
        Err(e) => {
            warn!("Page {}: could not parse extraction reply ({}); returning no questions", page_number, e);
            return Vec::new();
        }
    };

    // Decode record by record so one malformed entry costs only itself.
    let decoded: Vec<ExtractedQuestion> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(q) => Some(q),
            Err(e) => {
                warn!("Page {}: skipping record {} ({})", page_number, index, e);
                None
            }
        })
        .collect();

    let total = decoded.len();
    let questions: Vec<ExtractedQuestion> = decoded
        .into_iter()
        .filter(|q| !q.question_statement.trim().is_empty())
        .map(|q| q.with_page_number(page_number))
        .collect();

    if questions.len() < total {
        debug!(
            "Page {}: dropped {} record(s) with empty statements",
            page_number,
            total - questions.len()
        );
    }
    questions
}

// ── Generation ───────────────────────────────────────────────────────────

/// Parse a generation reply, requiring statement, type and answer on every
/// record, and stamp each with `topic_id`.
pub fn parse_generation(raw: &str, topic_id: &str) -> Result<Vec<ExtractedQuestion>, QuizError> {
    let decoded: Vec<ExtractedQuestion> =
        decode_span(raw, JsonAnchor::Array).map_err(QuizError::GenerationParse)?;

    if decoded.is_empty() {
        return Err(QuizError::GenerationParse(
            "reply contained an empty question array".into(),
        ));
    }

    decoded
        .into_iter()
        .enumerate()
        .map(|(index, q)| {
            if q.question_statement.trim().is_empty() {
                return Err(QuizError::IncompleteQuestion { index, field: "question_statement" });
            }
            if q.question_type.is_missing() {
                return Err(QuizError::IncompleteQuestion { index, field: "question_type" });
            }
            if q.answer.as_deref().map_or(true, |a| a.trim().is_empty()) {
                return Err(QuizError::IncompleteQuestion { index, field: "answer" });
            }
            Ok(q.with_topic_id(topic_id))
        })
        .collect()
}

// ── Solutions ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum SolutionReply {
    List(Vec<GeneratedSolution>),
    Wrapped { solutions: Vec<GeneratedSolution> },
}

/// Parse a solutions reply. `expected` is the number of questions sent.
pub fn parse_solutions(raw: &str, expected: usize) -> Result<Vec<GeneratedSolution>, QuizError> {
    let reply: SolutionReply =
        decode_span(raw, JsonAnchor::Any).map_err(QuizError::SolutionParse)?;

    let solutions = match reply {
        SolutionReply::List(v) | SolutionReply::Wrapped { solutions: v } => v,
    };

    if solutions.len() != expected {
        warn!(
            "Solution count mismatch: asked for {}, model returned {}",
            expected,
            solutions.len()
        );
    }
    Ok(solutions)
}

// ── Validation ───────────────────────────────────────────────────────────

/// Reason attached to the fallback verdict.
pub const DEGRADED_VALIDATION_REASON: &str =
    "Validation response could not be parsed; treating question as correct";

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(alias = "isWrong")]
    is_wrong: bool,
    #[serde(default)]
    reason: String,
    #[serde(default, alias = "correctAnswer")]
    correct_answer: Option<Value>,
}

/// Parse a validation reply, degrading to "treat as correct" on failure.
pub fn parse_validation(raw: &str) -> ValidationVerdict {
    match decode_span::<RawVerdict>(raw, JsonAnchor::Object) {
        Ok(v) => ValidationVerdict {
            is_wrong: v.is_wrong,
            reason: v.reason,
            correct_answer: v.correct_answer.and_then(|a| match a {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
            degraded: false,
        },
        Err(e) => {
            warn!("Could not parse validation reply ({}); treating question as correct", e);
            ValidationVerdict::degraded(DEGRADED_VALIDATION_REASON)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;

    #[test]
    fn span_finds_array_inside_noise() {
        let text = "noise [ {\"a\": [1, 2]} ] trailing ]";
        assert_eq!(find_json_span(text, JsonAnchor::Array), Some("[ {\"a\": [1, 2]} ]"));
    }

    #[test]
    fn span_ignores_brackets_in_strings() {
        let text = r#"{"s": "a ] b } \" ["} tail"#;
        assert_eq!(
            find_json_span(text, JsonAnchor::Object),
            Some(r#"{"s": "a ] b } \" ["}"#)
        );
    }

    #[test]
    fn span_skips_unbalanced_opener() {
        let text = "see [note here. Result: [1, 2]";
        assert_eq!(find_json_span(text, JsonAnchor::Array), Some("[1, 2]"));
    }

    #[test]
    fn span_respects_anchor_kind() {
        let text = "{\"x\": 1} then [2]";
        assert_eq!(find_json_span(text, JsonAnchor::Array), Some("[2]"));
        assert_eq!(find_json_span(text, JsonAnchor::Any), Some("{\"x\": 1}"));
        assert_eq!(find_json_span("no json", JsonAnchor::Any), None);
    }

    #[test]
    fn extraction_stamps_page_number() {
        let raw = "noise [ {\"question_statement\":\"x\",\"question_type\":\"NAT\"} ] trailing";
        let qs = parse_extraction(raw, 3, None);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].page_number, Some(3));
        assert_eq!(qs[0].question_type, QuestionType::Nat);
    }

    #[test]
    fn extraction_without_array_is_empty() {
        assert!(parse_extraction("I could not find any questions.", 1, None).is_empty());
        assert!(parse_extraction("[not json at all]", 1, None).is_empty());
    }

    #[test]
    fn extraction_records_memory_even_on_failure() {
        let mut memory = PageMemory::new();
        let raw = "x".repeat(1500);
        let qs = parse_extraction(&raw, 4, Some(&mut memory));
        assert!(qs.is_empty());
        assert_eq!(memory.get(4).unwrap().len(), 1000);
    }

    #[test]
    fn extraction_drops_blank_statements_and_repairs_commas() {
        let raw = "```json\n[{\"question_statement\":\"  \"},{\"question_statement\":\"ok\",\"question_type\":\"MCQ\",\"options\":[\"a\",\"b\",],},]\n```";
        let qs = parse_extraction(raw, 2, None);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].option_list(), ["a", "b"]);
    }

    #[test]
    fn extraction_keeps_good_records_next_to_bad_ones() {
        let raw = r#"[
            {"question_statement":"Q1","question_type":"MCQ","options":["a","b"]},
            {"question_statement":"Q2","question_type":null,"has_image":"false"},
            {"question_statement":null,"question_type":"NAT"},
            {"question_statement":"Q4","question_type":"NAT","options":{"a":1}},
            "not a record"
        ]"#;
        let qs = parse_extraction(raw, 5, None);
        let statements: Vec<&str> = qs.iter().map(|q| q.question_statement.as_str()).collect();
        assert_eq!(statements, ["Q1", "Q2", "Q4"]);
        assert!(qs[1].question_type.is_missing());
        assert_eq!(qs[1].has_image, Some(false));
        assert!(qs.iter().all(|q| q.page_number == Some(5)));
    }

    #[test]
    fn generation_requires_answer() {
        let ok = r#"[{"question_statement":"q","question_type":"MCQ","options":["1","2","3","4"],"answer":"B"}]"#;
        let qs = parse_generation(ok, "topic-9").unwrap();
        assert_eq!(qs[0].topic_id.as_deref(), Some("topic-9"));

        let missing = r#"[{"question_statement":"q","question_type":"MCQ","options":["1","2","3","4"]}]"#;
        assert!(matches!(
            parse_generation(missing, "t"),
            Err(QuizError::IncompleteQuestion { index: 0, field: "answer" })
        ));
    }

    #[test]
    fn generation_rejects_missing_type_and_empty_array() {
        let no_type = r#"[{"question_statement":"q","answer":"1"}]"#;
        assert!(matches!(
            parse_generation(no_type, "t"),
            Err(QuizError::IncompleteQuestion { field: "question_type", .. })
        ));
        assert!(matches!(parse_generation("[]", "t"), Err(QuizError::GenerationParse(_))));
        assert!(matches!(parse_generation("sorry", "t"), Err(QuizError::GenerationParse(_))));
    }

    #[test]
    fn solutions_accept_list_or_wrapper() {
        let list = r#"[{"answer":"A","solution":"because"}]"#;
        assert_eq!(parse_solutions(list, 1).unwrap()[0].answer, "A");

        let wrapped = r#"Sure! {"solutions": [{"answer": 42, "solution": "6*7"}]}"#;
        let sols = parse_solutions(wrapped, 1).unwrap();
        assert_eq!(sols[0].answer, "42");

        assert!(matches!(parse_solutions("nope", 1), Err(QuizError::SolutionParse(_))));
    }

    #[test]
    fn validation_parses_verdict() {
        let v = parse_validation(r#"{"is_wrong": true, "reason": "2+2 is 4", "correct_answer": 4}"#);
        assert!(v.is_wrong);
        assert_eq!(v.correct_answer.as_deref(), Some("4"));
        assert!(!v.degraded);
    }

    #[test]
    fn verdict_without_is_wrong_is_degraded() {
        let v = parse_validation(r#"{"reason":"The answer should be 4"}"#);
        assert!(!v.is_wrong);
        assert!(v.degraded);
        assert_eq!(v.reason, DEGRADED_VALIDATION_REASON);
    }

    #[test]
    fn validation_degrades_to_correct() {
        let v = parse_validation("The answer looks fine to me.");
        assert!(!v.is_wrong);
        assert!(v.degraded);
        assert_eq!(v.reason, DEGRADED_VALIDATION_REASON);
    }
}
