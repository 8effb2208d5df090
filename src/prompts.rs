//! Prompt construction for the conversational layer
//!
//! Three prompts drive the whole interaction: a resolution filter that
//! classifies whether the user already solved their bug, a rubber-duck prompt
//! that asks one guiding question grounded in retrieved code, and a
//! congratulations prompt for the solved path.

use crate::index::ScoredChunk;

/// Shown as the context block when nothing has been indexed.
pub const NO_DOCUMENTS_CONTEXT: &str = "No code documents loaded yet.";

/// Classifier prompt. The model is instructed to answer with a bare digit:
/// 1 when the issue reads as solved, 0 otherwise.
pub fn resolution_filter(question: &str) -> String {
    format!(
        "Determine whether or not it seems like this person has solved their issue. \
If so, output a 1, otherwise output a 0.\n\
User Query: {question}\n"
    )
}

/// Rubber-duck prompt: one guiding question over the retrieved context,
/// never the bug or the fix itself.
pub fn guiding_question(context: &str, question: &str) -> String {
    format!(
        "I want you to act as a rubber duck debugger. Your job is to help the user work through \n\
a bug in their codebase by asking 1 follow-up question that guides them to explain and reflect on their code. \n\
Ask questions that encourage the user to clarify their assumptions, walk through their logic, and examine \n\
specific parts of their code. Never reveal the bug or the fix. Your role is to guide, not solve. \n\
\n\
The user's input may contain irrelevant information, so focus your questions on the parts most likely \n\
related to the issue.\n\
\n\
Do not start your output with your questions. Start with a statement about the bug or trying to comfort the user. \n\
Additionally, your responses should sound human and curious, helping the user think aloud and debug by talking it through. \n\
Follow this format:\n\
\n\
[Statement about bug]\n\
Here is a question to start you off: \n\
1. [Question]\n\
\n\
Context: {context}\n\
\n\
User Query: {question}\n"
    )
}

/// Solved path: celebrate, referencing what the user was working on.
pub fn congratulations(question: &str) -> String {
    format!(
        "Write out a congratulation message for the user as he has just solved a very difficult bug.\n\
User Query: {question}"
    )
}

/// Render retrieved chunks into the context block of the rubber-duck prompt.
///
/// Chunks arrive in descending similarity order and are rendered in that
/// order, separated by blank lines.
pub fn render_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_DOCUMENTS_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|scored| match &scored.chunk.function_name {
            Some(name) => format!("// {name}\n{}", scored.chunk.content),
            None => scored.chunk.content.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Language;
    use crate::segmenter::CodeChunk;
    use std::sync::Arc;
    use uuid::Uuid;

    fn scored(name: Option<&str>, content: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Arc::new(CodeChunk {
                source_document_id: Uuid::new_v4(),
                function_name: name.map(String::from),
                content: content.to_string(),
                language: Language::Python,
            }),
            score,
        }
    }

    #[test]
    fn test_filter_prompt_contains_question() {
        let prompt = resolution_filter("my loop never ends");
        assert!(prompt.contains("my loop never ends"));
        assert!(prompt.contains("output a 0"));
    }

    #[test]
    fn test_guiding_prompt_embeds_context_and_question() {
        let prompt = guiding_question("def f(): pass", "why does f fail?");
        assert!(prompt.contains("Context: def f(): pass"));
        assert!(prompt.contains("User Query: why does f fail?"));
        assert!(prompt.contains("rubber duck"));
    }

    #[test]
    fn test_empty_context_uses_placeholder() {
        assert_eq!(render_context(&[]), NO_DOCUMENTS_CONTEXT);
    }

    #[test]
    fn test_context_preserves_ranking_order() {
        let rendered = render_context(&[
            scored(Some("first"), "def first(): pass", 0.9),
            scored(None, "def second(): pass", 0.5),
        ]);
        let first_pos = rendered.find("first").unwrap();
        let second_pos = rendered.find("second").unwrap();
        assert!(first_pos < second_pos);
        assert!(rendered.contains("// first"));
    }
}
