//! Question records and the small value types exchanged with callers.
//!
//! Field names on [`ExtractedQuestion`] are the snake_case keys the prompts
//! ask the model to emit, so a reply decodes straight into the record. The
//! model is not a strict JSON producer, though: question numbers arrive as
//! numbers or strings, MSQ answers as arrays, NAT answers as bare numbers.
//! The lenient deserialisers at the bottom of this file absorb those shapes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ── Question type ────────────────────────────────────────────────────────

/// Question taxonomy.
///
/// `Other` keeps whatever unrecognised string the model produced so the
/// structural validator can name it in its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuestionType {
    /// Single-correct multiple choice.
    Mcq,
    /// Multi-correct multiple choice.
    Msq,
    /// Numerical answer type.
    Nat,
    /// Free-form descriptive answer.
    Subjective,
    /// Anything the model produced that is none of the above.
    Other(String),
}

/// An absent type decodes as an empty `Other`, which validation rejects.
impl Default for QuestionType {
    fn default() -> Self {
        QuestionType::Other(String::new())
    }
}

impl QuestionType {
    /// Wire label, as sent to and expected from the model.
    pub fn as_str(&self) -> &str {
        match self {
            QuestionType::Mcq => "MCQ",
            QuestionType::Msq => "MSQ",
            QuestionType::Nat => "NAT",
            QuestionType::Subjective => "Subjective",
            QuestionType::Other(s) => s,
        }
    }

    /// True for the two multiple-choice kinds, which must carry options.
    pub fn requires_options(&self) -> bool {
        matches!(self, QuestionType::Mcq | QuestionType::Msq)
    }

    /// True for the four recognised kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, QuestionType::Other(_))
    }

    /// True when the model produced no type at all.
    pub fn is_missing(&self) -> bool {
        matches!(self, QuestionType::Other(s) if s.is_empty())
    }

    /// The four recognised kinds, in display order.
    pub fn all() -> [QuestionType; 4] {
        [
            QuestionType::Mcq,
            QuestionType::Msq,
            QuestionType::Nat,
            QuestionType::Subjective,
        ]
    }
}

impl From<String> for QuestionType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mcq" | "single" | "single_correct" | "multiple choice" => QuestionType::Mcq,
            "msq" | "multi" | "multiple_correct" | "multiple select" => QuestionType::Msq,
            "nat" | "numerical" | "numeric" | "integer" => QuestionType::Nat,
            "subjective" | "descriptive" | "long answer" | "short answer" => {
                QuestionType::Subjective
            }
            _ => QuestionType::Other(raw.trim().to_string()),
        }
    }
}

impl From<&str> for QuestionType {
    fn from(raw: &str) -> Self {
        QuestionType::from(raw.to_string())
    }
}

impl From<QuestionType> for String {
    fn from(t: QuestionType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuestionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(QuestionType::from(s))
    }
}

// ── Question record ──────────────────────────────────────────────────────

/// One question, as extracted from a page or produced by generation.
///
/// Library code never edits a record in place after handing it out; the
/// `with_*` methods consume and return a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuestion {
    #[serde(default, alias = "statement", deserialize_with = "lenient_required_string")]
    pub question_statement: String,

    #[serde(default, alias = "type", deserialize_with = "lenient_question_type")]
    pub question_type: QuestionType,

    #[serde(default, deserialize_with = "lenient_string_list", skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub question_number: Option<String>,

    #[serde(default, deserialize_with = "lenient_page", skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub has_image: Option<bool>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,

    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub continues_from_previous: Option<bool>,

    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub continues_on_next: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
}

impl ExtractedQuestion {
    pub fn new(statement: impl Into<String>, question_type: QuestionType) -> Self {
        Self {
            question_statement: statement.into(),
            question_type,
            ..Default::default()
        }
    }

    pub fn with_options<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: Some(options.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn with_answer(self, answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            ..self
        }
    }

    pub fn with_solution(self, solution: impl Into<String>) -> Self {
        Self {
            solution: Some(solution.into()),
            ..self
        }
    }

    pub fn with_page_number(self, page: u32) -> Self {
        Self {
            page_number: Some(page),
            ..self
        }
    }

    pub fn with_topic_id(self, topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: Some(topic_id.into()),
            ..self
        }
    }

    pub fn with_source_image(self, data_url: impl Into<String>) -> Self {
        Self {
            source_image: Some(data_url.into()),
            ..self
        }
    }

    /// Options as a slice; empty when absent.
    pub fn option_list(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }

    pub fn has_image(&self) -> bool {
        self.has_image.unwrap_or(false)
    }

    pub fn continues_on_next(&self) -> bool {
        self.continues_on_next.unwrap_or(false)
    }

    pub fn continues_from_previous(&self) -> bool {
        self.continues_from_previous.unwrap_or(false)
    }
}

// ── Solutions, verdicts, checks ──────────────────────────────────────────

/// Answer plus worked solution for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSolution {
    #[serde(default, deserialize_with = "lenient_required_string")]
    pub answer: String,
    #[serde(default, deserialize_with = "lenient_required_string")]
    pub solution: String,
}

/// Outcome of AI validation of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_wrong: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    /// Set when the model's reply could not be decoded and the verdict is
    /// the "treat as correct" fallback rather than a real judgement.
    #[serde(default)]
    pub degraded: bool,
}

impl ValidationVerdict {
    pub(crate) fn degraded(reason: impl Into<String>) -> Self {
        Self {
            is_wrong: false,
            reason: reason.into(),
            correct_answer: None,
            degraded: true,
        }
    }
}

/// Outcome of the local structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureCheck {
    pub is_valid: bool,
    pub reason: String,
}

// ── Generation inputs ────────────────────────────────────────────────────

/// The topic questions are generated for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicContext {
    /// Identifier stamped onto every generated record.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Everything a generation call needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: TopicContext,
    pub exam_name: String,
    pub course_name: String,
    pub question_type: QuestionType,
    /// Previous-year questions used as style and difficulty references.
    #[serde(default)]
    pub prior_questions: Vec<ExtractedQuestion>,
    /// Summary of questions already generated in this session.
    #[serde(default)]
    pub existing_context: String,
    /// Most recent generated statements, newest last.
    #[serde(default)]
    pub recent_questions: Vec<String>,
    pub count: usize,
    #[serde(default)]
    pub topic_notes: Option<String>,
}

// ── Page memory ──────────────────────────────────────────────────────────

/// Characters of raw reply stored per page.
pub const PAGE_MEMORY_STORE_CHARS: usize = 1000;

/// Characters of each stored entry replayed into the next prompt.
pub const PAGE_MEMORY_PROMPT_CHARS: usize = 200;

/// Caller-owned map from page number to a snapshot of that page's raw reply.
///
/// Only ever used as extra prompt context for later pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMemory(BTreeMap<u32, String>);

impl PageMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the head of `raw` for `page`, replacing any earlier entry.
    pub fn record(&mut self, page: u32, raw: &str) {
        self.0
            .insert(page, crate::prompts::head_chars(raw, PAGE_MEMORY_STORE_CHARS).to_string());
    }

    pub fn get(&self, page: u32) -> Option<&str> {
        self.0.get(&page).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in page order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(p, s)| (*p, s.as_str()))
    }
}

// ── Lenient deserialisers ────────────────────────────────────────────────

fn value_to_string(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(value_to_string).collect();
            Some(parts.join(", "))
        }
        other @ Value::Object(_) => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(v.and_then(value_to_string))
}

fn lenient_required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_question_type<'de, D>(deserializer: D) -> Result<QuestionType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?
        .map(QuestionType::from)
        .unwrap_or_default())
}

/// Accepts `true`, `"false"`, `"yes"`, `1` and friends; anything else is `None`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_page<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(Value::Number(n)) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.into_iter().filter_map(value_to_string).collect()),
        Some(other) => value_to_string(other).map(|s| vec![s]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_parses_case_insensitively() {
        assert_eq!(QuestionType::from("mcq"), QuestionType::Mcq);
        assert_eq!(QuestionType::from(" MSQ "), QuestionType::Msq);
        assert_eq!(QuestionType::from("Numerical"), QuestionType::Nat);
        assert_eq!(QuestionType::from("subjective"), QuestionType::Subjective);
        assert_eq!(
            QuestionType::from("Essay"),
            QuestionType::Other("Essay".into())
        );
    }

    #[test]
    fn all_lists_only_known_kinds() {
        let all = QuestionType::all();
        assert!(all.iter().all(QuestionType::is_known));
        let labels: Vec<&str> = all.iter().map(QuestionType::as_str).collect();
        assert_eq!(labels, ["MCQ", "MSQ", "NAT", "Subjective"]);
    }

    #[test]
    fn question_type_round_trips_wire_label() {
        let json = serde_json::to_string(&QuestionType::Nat).unwrap();
        assert_eq!(json, "\"NAT\"");
        let back: QuestionType = serde_json::from_str("\"Subjective\"").unwrap();
        assert_eq!(back, QuestionType::Subjective);
    }

    #[test]
    fn null_and_string_flags_do_not_reject_the_record() {
        let raw = r#"{
            "question_statement": null,
            "question_type": null,
            "page_number": "4",
            "has_image": "false",
            "continues_on_next": "yes",
            "continues_from_previous": null
        }"#;
        let q: ExtractedQuestion = serde_json::from_str(raw).unwrap();
        assert_eq!(q.question_statement, "");
        assert!(q.question_type.is_missing());
        assert_eq!(q.page_number, Some(4));
        assert_eq!(q.has_image, Some(false));
        assert!(q.continues_on_next());
        assert_eq!(q.continues_from_previous, None);
    }

    #[test]
    fn lenient_fields_accept_model_shapes() {
        let raw = r#"{
            "question_statement": "Pick all primes",
            "question_type": "MSQ",
            "options": ["2", 4, "5", 9],
            "answer": ["A", "C"],
            "question_number": 12
        }"#;
        let q: ExtractedQuestion = serde_json::from_str(raw).unwrap();
        assert_eq!(q.options.as_deref().unwrap(), ["2", "4", "5", "9"]);
        assert_eq!(q.answer.as_deref(), Some("A, C"));
        assert_eq!(q.question_number.as_deref(), Some("12"));
        assert_eq!(q.question_type, QuestionType::Msq);
    }

    #[test]
    fn null_options_stay_absent() {
        let q: ExtractedQuestion =
            serde_json::from_str(r#"{"question_statement":"x","question_type":"NAT","options":null}"#)
                .unwrap();
        assert!(q.options.is_none());
        assert!(q.option_list().is_empty());
    }

    #[test]
    fn with_methods_replace_whole_record() {
        let q = ExtractedQuestion::new("2+2?", QuestionType::Nat)
            .with_answer("4")
            .with_page_number(3)
            .with_topic_id("arith");
        assert_eq!(q.answer.as_deref(), Some("4"));
        assert_eq!(q.page_number, Some(3));
        assert_eq!(q.topic_id.as_deref(), Some("arith"));
    }

    #[test]
    fn page_memory_truncates_on_record() {
        let mut mem = PageMemory::new();
        let long = "x".repeat(PAGE_MEMORY_STORE_CHARS + 50);
        mem.record(2, &long);
        assert_eq!(mem.get(2).unwrap().chars().count(), PAGE_MEMORY_STORE_CHARS);
        assert_eq!(mem.len(), 1);
    }
}
