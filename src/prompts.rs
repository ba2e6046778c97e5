//! Prompt builders for extraction, generation, solutions and validation.
//!
//! Centralising every prompt here keeps the wording in one place and lets
//! unit tests inspect prompts directly without calling a model.
//!
//! Every builder is a pure function of its arguments. Each prompt ends with
//! the exact JSON shape the matching parser in [`crate::pipeline::parse`]
//! expects; changing a field name here means changing it there too.
//!
//! Long caller-supplied context is truncated on `char` boundaries:
//!
//! | Input                    | Kept            |
//! |--------------------------|-----------------|
//! | prior-page reply         | last 500 chars  |
//! | page-memory entry        | first 200 chars |
//! | existing generated text  | last 1500 chars |
//! | recent questions         | last 3          |
//! | notes (generation)       | first 2000 chars|
//! | notes (solutions)        | first 2500 chars|

use crate::config::PromptVersion;
use crate::question::{
    ExtractedQuestion, GenerationRequest, PageMemory, QuestionType, PAGE_MEMORY_PROMPT_CHARS,
};
use std::fmt::Write as _;

pub const PRIOR_CONTEXT_TAIL_CHARS: usize = 500;
pub const EXISTING_CONTEXT_TAIL_CHARS: usize = 1500;
pub const RECENT_QUESTIONS_KEPT: usize = 3;
pub const GENERATION_NOTES_HEAD_CHARS: usize = 2000;
pub const SOLUTION_NOTES_HEAD_CHARS: usize = 2500;

// ── Truncation helpers ───────────────────────────────────────────────────

/// First `n` characters of `s`.
pub fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Last `n` characters of `s`.
pub fn tail_chars(s: &str, n: usize) -> &str {
    let total = s.chars().count();
    if total <= n {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Context for a single-page extraction prompt.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub page_number: u32,
    /// Raw reply for the previous page; only its tail is used.
    pub prior_context: Option<&'a str>,
    pub memory: Option<&'a PageMemory>,
    pub version: PromptVersion,
}

const EXTRACTION_RULES: &str = r#"You are an expert at digitising printed exam papers. The attached image is one page of a question paper.

Extract EVERY question visible on this page.

Rules:
1. Copy each question statement exactly as printed. Use LaTeX ($...$) for mathematics.
2. Classify each question as one of: "MCQ" (single correct option), "MSQ" (multiple correct options), "NAT" (numerical answer, no options), "Subjective" (descriptive answer).
3. For MCQ and MSQ, list the option texts in printed order WITHOUT their labels (A), (B), ... For NAT and Subjective, options must be null.
4. Record the printed question number or label exactly (e.g. "Q.12", "5(b)").
5. If the question relies on a figure, diagram, graph or table image, set has_image to true and describe the image precisely in image_description.
6. If a question is cut off at the bottom of the page, set continues_on_next to true. If the page starts with the remainder of a question from the previous page, include that fragment as its own entry with continues_from_previous set to true.
7. Do NOT solve the questions. Do NOT include answers or solutions, even if an answer key is printed.
8. Ignore headers, footers, instructions, marking schemes and page numbers."#;

const EXTRACTION_SCHEMA: &str = r#"Return ONLY a JSON array, no commentary, in exactly this shape:
[
  {
    "question_statement": "string",
    "question_type": "MCQ" | "MSQ" | "NAT" | "Subjective",
    "options": ["string", ...] | null,
    "question_number": "string" | null,
    "has_image": true | false,
    "image_description": "string" | null,
    "continues_from_previous": true | false,
    "continues_on_next": true | false
  }
]
If the page contains no questions, return []."#;

/// Build the instruction text for extracting questions from one page image.
pub fn extraction_prompt(ctx: &ExtractionContext<'_>) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(EXTRACTION_RULES);
    let _ = write!(prompt, "\n\nThis is page {}.", ctx.page_number);

    if ctx.version == PromptVersion::Advanced {
        if let Some(prior) = ctx.prior_context.filter(|p| !p.trim().is_empty()) {
            let _ = write!(
                prompt,
                "\n\nThe previous page ended with the following extracted content. Use it only to \
                 recognise questions that continue onto this page:\n\"\"\"{}\"\"\"",
                tail_chars(prior, PRIOR_CONTEXT_TAIL_CHARS)
            );
        }

        if let Some(memory) = ctx.memory.filter(|m| !m.is_empty()) {
            prompt.push_str("\n\nEarlier pages of this paper (for numbering and continuity only):");
            for (page, snapshot) in memory.iter() {
                let _ = write!(
                    prompt,
                    "\n- Page {}: {}",
                    page,
                    head_chars(snapshot, PAGE_MEMORY_PROMPT_CHARS)
                );
            }
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(EXTRACTION_SCHEMA);
    prompt
}

// ── Generation ───────────────────────────────────────────────────────────

/// Structural rules for the requested question type.
pub fn type_rules(question_type: &QuestionType) -> &'static str {
    match question_type {
        QuestionType::Mcq => {
            "Each question is MCQ: exactly 4 options, exactly ONE of them correct. \
             The answer is the letter of the correct option (A, B, C or D)."
        }
        QuestionType::Msq => {
            "Each question is MSQ: exactly 4 options, 2 or 3 of them correct. \
             The answer lists every correct letter, comma-separated (e.g. \"A, C\")."
        }
        QuestionType::Nat => {
            "Each question is NAT: the answer is a single number (integer or decimal, \
             state rounding if needed). options must be null."
        }
        QuestionType::Subjective => {
            "Each question is Subjective: a descriptive question answered in prose or \
             derivation. options must be null. The answer is a concise model answer."
        }
        QuestionType::Other(_) => {
            "Use the question format most appropriate to the topic and state it in question_type."
        }
    }
}

/// Build the instruction text for generating new practice questions.
pub fn generation_prompt(req: &GenerationRequest, version: PromptVersion) -> String {
    let mut prompt = String::with_capacity(8192);

    let _ = write!(
        prompt,
        "You are an expert question setter for the {exam} examination, course \"{course}\".\n\n\
         Write {count} NEW {qtype} practice question(s) on the topic \"{topic}\".",
        exam = req.exam_name,
        course = req.course_name,
        count = req.count,
        qtype = req.question_type,
        topic = req.topic.name,
    );
    if let Some(desc) = req.topic.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = write!(prompt, "\nTopic scope: {desc}");
    }

    prompt.push_str("\n\nType rules:\n");
    prompt.push_str(type_rules(&req.question_type));

    if !req.prior_questions.is_empty() {
        prompt.push_str(
            "\n\nPrevious-year questions (PYQs) for style and difficulty reference. \
             Match their difficulty; do NOT copy or paraphrase them:",
        );
        for (i, q) in req.prior_questions.iter().enumerate() {
            let _ = write!(prompt, "\n{}. [{}] {}", i + 1, q.question_type, q.question_statement);
            if let Some(opts) = q.options.as_ref().filter(|o| !o.is_empty()) {
                let _ = write!(prompt, " Options: {}", opts.join(" | "));
            }
        }
    }

    if !req.existing_context.trim().is_empty() {
        let _ = write!(
            prompt,
            "\n\nQuestions already generated for this topic (avoid repeating their ideas):\n\"\"\"{}\"\"\"",
            tail_chars(&req.existing_context, EXISTING_CONTEXT_TAIL_CHARS)
        );
    }

    if version == PromptVersion::Advanced {
        let skip = req.recent_questions.len().saturating_sub(RECENT_QUESTIONS_KEPT);
        let recent: Vec<&String> = req.recent_questions.iter().skip(skip).collect();
        if !recent.is_empty() {
            prompt.push_str("\n\nMost recently generated questions (must be clearly different):");
            for q in recent {
                let _ = write!(prompt, "\n- {q}");
            }
        }

        if let Some(notes) = req.topic_notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = write!(
                prompt,
                "\n\nTopic notes. Questions must be solvable with the methods in these notes:\n\"\"\"{}\"\"\"",
                head_chars(notes, GENERATION_NOTES_HEAD_CHARS)
            );
        }
    }

    prompt.push_str(
        "\n\nEvery question must be self-contained, unambiguous and have exactly the answer you give. \
         Use LaTeX ($...$) for mathematics.\n\n\
         Return ONLY a JSON array, no commentary, in exactly this shape:\n\
         [\n  {\n    \"question_statement\": \"string\",\n    \"question_type\": \"",
    );
    prompt.push_str(req.question_type.as_str());
    prompt.push_str(
        "\",\n    \"options\": [\"string\", ...] | null,\n    \"answer\": \"string\",\n    \
         \"solution\": \"string\"\n  }\n]",
    );
    prompt
}

// ── Solutions ────────────────────────────────────────────────────────────

/// Build the instruction text for answering and solving a batch of questions.
pub fn solution_prompt(questions: &[ExtractedQuestion], topic_notes: Option<&str>) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(
        "You are an expert tutor. Solve each of the following exam questions.\n\
         For every question give the final answer and a clear step-by-step solution.\n\
         For MCQ give the correct option letter; for MSQ every correct letter, comma-separated; \
         for NAT the number; for Subjective a concise model answer.",
    );

    if let Some(notes) = topic_notes.filter(|n| !n.trim().is_empty()) {
        let _ = write!(
            prompt,
            "\n\nBase every solution on the methods in these topic notes:\n\"\"\"{}\"\"\"",
            head_chars(notes, SOLUTION_NOTES_HEAD_CHARS)
        );
    }

    prompt.push_str("\n\nQuestions:");
    for (i, q) in questions.iter().enumerate() {
        let _ = write!(prompt, "\n\n{}. [{}] {}", i + 1, q.question_type, q.question_statement);
        for (j, opt) in q.option_list().iter().enumerate() {
            let _ = write!(prompt, "\n   ({}) {}", option_label(j), opt);
        }
    }

    let _ = write!(
        prompt,
        "\n\nReturn ONLY a JSON array with exactly {} element(s), one per question, in the same order:\n\
         [\n  {{ \"answer\": \"string\", \"solution\": \"string\" }}\n]",
        questions.len()
    );
    prompt
}

// ── Validation ───────────────────────────────────────────────────────────

/// Build the instruction text for checking a question's stated answer.
pub fn validation_prompt(question: &ExtractedQuestion) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(
        "You are a meticulous examiner. Solve the question below independently, then decide \
         whether the provided answer is WRONG.\n\n",
    );

    let _ = write!(
        prompt,
        "Question type: {}\nQuestion: {}",
        question.question_type, question.question_statement
    );
    for (j, opt) in question.option_list().iter().enumerate() {
        let _ = write!(prompt, "\n({}) {}", option_label(j), opt);
    }
    let _ = write!(
        prompt,
        "\nProvided answer: {}",
        question.answer.as_deref().unwrap_or("(none)")
    );
    if let Some(sol) = question.solution.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = write!(prompt, "\nProvided solution: {sol}");
    }

    prompt.push_str(
        "\n\nCorrectness rules:\n\
         - MCQ: exactly one option is correct and the provided answer must identify it.\n\
         - MSQ: the provided answer must list exactly the full set of correct options, no more and no fewer.\n\
         - NAT: the provided numeric answer must be mathematically correct (allow stated rounding).\n\
         - Subjective: always treat as correct (is_wrong = false).\n\n\
         Return ONLY a JSON object, no commentary:\n\
         { \"is_wrong\": true | false, \"reason\": \"string\", \"correct_answer\": \"string\" | null }",
    );
    prompt
}

/// Option label for a 0-based index: A, B, C, …
fn option_label(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::TopicContext;

    #[test]
    fn head_and_tail_respect_char_boundaries() {
        let s = "αβγδε";
        assert_eq!(head_chars(s, 2), "αβ");
        assert_eq!(tail_chars(s, 2), "δε");
        assert_eq!(head_chars(s, 10), s);
        assert_eq!(tail_chars(s, 10), s);
        assert_eq!(tail_chars(s, 0), "");
    }

    #[test]
    fn extraction_prompt_never_asks_for_answers() {
        let p = extraction_prompt(&ExtractionContext {
            page_number: 1,
            prior_context: None,
            memory: None,
            version: PromptVersion::Advanced,
        });
        assert!(p.contains("\"question_statement\""));
        assert!(!p.contains("\"answer\""));
        assert!(!p.contains("\"solution\""));
    }

    #[test]
    fn extraction_prompt_uses_prior_tail_and_truncated_memory() {
        let prior = format!("{}TAIL-MARKER", "p".repeat(2000));
        let mut memory = PageMemory::new();
        memory.record(1, &format!("{}HIDDEN", "m".repeat(PAGE_MEMORY_PROMPT_CHARS)));

        let p = extraction_prompt(&ExtractionContext {
            page_number: 2,
            prior_context: Some(&prior),
            memory: Some(&memory),
            version: PromptVersion::Advanced,
        });
        assert!(p.contains("TAIL-MARKER"));
        assert!(!p.contains(&"p".repeat(PRIOR_CONTEXT_TAIL_CHARS + 1)));
        assert!(p.contains("- Page 1: "));
        assert!(!p.contains("HIDDEN"));
    }

    #[test]
    fn basic_extraction_prompt_omits_context() {
        let mut memory = PageMemory::new();
        memory.record(1, "earlier page");
        let p = extraction_prompt(&ExtractionContext {
            page_number: 2,
            prior_context: Some("previous"),
            memory: Some(&memory),
            version: PromptVersion::Basic,
        });
        assert!(!p.contains("earlier page"));
        assert!(!p.contains("previous page ended"));
    }

    fn request(qtype: QuestionType) -> GenerationRequest {
        GenerationRequest {
            topic: TopicContext {
                id: "t1".into(),
                name: "Kinematics".into(),
                description: None,
            },
            exam_name: "JEE".into(),
            course_name: "Physics".into(),
            question_type: qtype,
            prior_questions: vec![ExtractedQuestion::new("A ball is thrown…", QuestionType::Mcq)
                .with_options(["1", "2", "3", "4"])],
            existing_context: format!("{}RECENT-END", "e".repeat(3000)),
            recent_questions: vec!["q1".into(), "q2".into(), "q3".into(), "q4".into()],
            count: 5,
            topic_notes: Some(format!("{}NOTES-TAIL", "n".repeat(GENERATION_NOTES_HEAD_CHARS))),
        }
    }

    #[test]
    fn generation_prompt_applies_type_rules_and_truncation() {
        let p = generation_prompt(&request(QuestionType::Msq), PromptVersion::Advanced);
        assert!(p.contains("2 or 3 of them correct"));
        assert!(p.contains("Write 5 NEW MSQ"));
        assert!(p.contains("RECENT-END"));
        assert!(!p.contains(&"e".repeat(EXISTING_CONTEXT_TAIL_CHARS + 1)));
        // Only the last three recent questions survive.
        assert!(!p.contains("- q1"));
        assert!(p.contains("- q2") && p.contains("- q4"));
        assert!(!p.contains("NOTES-TAIL"));
        assert!(p.contains("\"answer\""));
    }

    #[test]
    fn basic_generation_prompt_omits_notes_and_recent() {
        let p = generation_prompt(&request(QuestionType::Nat), PromptVersion::Basic);
        assert!(!p.contains("Topic notes"));
        assert!(!p.contains("- q4"));
        assert!(p.contains("options must be null"));
    }

    #[test]
    fn solution_prompt_lists_questions_in_order_with_labels() {
        let qs = vec![
            ExtractedQuestion::new("First?", QuestionType::Mcq).with_options(["x", "y"]),
            ExtractedQuestion::new("Second?", QuestionType::Nat),
        ];
        let p = solution_prompt(&qs, Some("use energy conservation"));
        let first = p.find("1. [MCQ] First?").unwrap();
        let second = p.find("2. [NAT] Second?").unwrap();
        assert!(first < second);
        assert!(p.contains("(B) y"));
        assert!(p.contains("exactly 2 element(s)"));
        assert!(p.contains("energy conservation"));
    }

    #[test]
    fn validation_prompt_carries_answer_and_rules() {
        let q = ExtractedQuestion::new("2+2?", QuestionType::Nat).with_answer("5");
        let p = validation_prompt(&q);
        assert!(p.contains("Provided answer: 5"));
        assert!(p.contains("Subjective: always treat as correct"));
        assert!(p.contains("\"is_wrong\""));
    }
}
