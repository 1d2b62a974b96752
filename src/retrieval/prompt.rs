use super::language::NOT_FOUND_ANSWER;

pub const SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant for an internal knowledge base.\n\
ONLY answer using the provided context below. Do not use outside knowledge.\n\
Do not include the raw [Source ...] tags or file paths in your answer; sources will be attached separately.\n\
If the answer is not present in the context, reply exactly:\n\
\"I couldn’t find this in the knowledge base.\"\n\
Be concise and factual.";

/// Deterministic answer used when no model is configured or the call fails.
pub fn stub_answer(context: &str, question: &str) -> String {
    if context.trim().is_empty() {
        return NOT_FOUND_ANSWER.to_string();
    }
    format!("Based on the provided documents: {}", question)
}

pub fn user_prompt(context: &str, question: &str) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer strictly from the context.",
        context, question
    )
}
