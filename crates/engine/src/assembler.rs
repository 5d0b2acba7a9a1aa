//! Composite Assembler — builds the final text the user copies out.
//!
//! ```text
//! <enriched prompt>
//!
//! ADDITIONAL CONTEXT: <schema>; <schema> | <schema>
//!
//! SUPPLEMENTARY EXTRACTS:
//! <extract>
//!
//! <extract>
//!
//! Q&A CONTEXT:
//! Q: <question>
//! A: <answer>
//! ```
//!
//! Each section is present only when it has content.

use contextos_core::schema::ContextSchema;
use contextos_core::session::{PromptSession, QuestionAnswer};

const ADDITIONAL_CONTEXT: &str = "\n\nADDITIONAL CONTEXT: ";
const SUPPLEMENTARY_EXTRACTS: &str = "\n\nSUPPLEMENTARY EXTRACTS:\n";
const QA_CONTEXT: &str = "\n\nQ&A CONTEXT:\n";

/// Assemble the composite for `session`.
///
/// `schemas` is the catalog to resolve `selected_schema_ids` against; ids
/// with no matching schema are skipped. Pure: no I/O, no mutation.
pub fn assemble(
    session: &PromptSession,
    schemas: &[ContextSchema],
    answered: &[QuestionAnswer],
) -> String {
    let mut out = session.enriched_prompt.clone().unwrap_or_default();

    let parts: Vec<String> = schemas
        .iter()
        .filter(|s| session.selected_schema_ids.contains(&s.id))
        .map(describe_schema)
        .collect();
    if !parts.is_empty() {
        out.push_str(ADDITIONAL_CONTEXT);
        out.push_str(&parts.join(" | "));
    }

    let extracts: Vec<&str> = session
        .selected_extracts()
        .map(|e| e.content.as_str())
        .collect();
    if !extracts.is_empty() {
        out.push_str(SUPPLEMENTARY_EXTRACTS);
        out.push_str(&extracts.join("\n\n"));
    }

    let qa: Vec<String> = answered
        .iter()
        .filter_map(|q| {
            q.non_blank_answer()
                .and(q.answer.as_deref())
                .map(|a| format!("Q: {}\nA: {}", q.question, a))
        })
        .collect();
    if !qa.is_empty() {
        out.push_str(QA_CONTEXT);
        out.push_str(&qa.join("\n\n"));
    }

    out
}

/// `Business Name: X; Target Personas: a, b; Context Type: t; Key Goals: g`
fn describe_schema(schema: &ContextSchema) -> String {
    let mut fields = Vec::with_capacity(4);
    if !schema.company_name.is_empty() {
        fields.push(format!("Business Name: {}", schema.company_name));
    }
    if !schema.target_audience.is_empty() {
        fields.push(format!(
            "Target Personas: {}",
            schema.target_audience.join(", ")
        ));
    }
    fields.push(format!("Context Type: {}", schema.context_type));
    if !schema.key_goals.is_empty() {
        fields.push(format!("Key Goals: {}", schema.key_goals.join(", ")));
    }
    fields.join("; ")
}
