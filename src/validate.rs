//! Local structural check for question records. No network, no model.

use crate::question::{ExtractedQuestion, StructureCheck};

/// Check that a record is well-formed enough to store or show.
///
/// Rules, first failure wins:
/// - the statement must not be blank
/// - the type must be present and one of MCQ, MSQ, NAT, Subjective
/// - MCQ and MSQ must carry at least one non-blank option
pub fn validate_question_structure(question: &ExtractedQuestion) -> StructureCheck {
    if question.question_statement.trim().is_empty() {
        return invalid("Question statement is empty");
    }

    let question_type = &question.question_type;
    if question_type.is_missing() {
        return invalid("Question type is missing");
    }
    if !question_type.is_known() {
        return invalid(format!("Unrecognised question type '{}'", question_type));
    }

    if question_type.requires_options()
        && !question
            .option_list()
            .iter()
            .any(|o| !o.trim().is_empty())
    {
        return invalid(format!("{} question has no options", question_type));
    }

    StructureCheck {
        is_valid: true,
        reason: "Question structure is valid".to_string(),
    }
}

fn invalid(reason: impl Into<String>) -> StructureCheck {
    StructureCheck {
        is_valid: false,
        reason: reason.into(),
    }
}
