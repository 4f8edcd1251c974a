//! Prompt construction for grounded answers.

use std::fmt::Write;

use crate::document::RetrievedChunk;

/// Instruction placed at the top of every question-answering prompt.
pub const LEGAL_ASSISTANT_INSTRUCTION: &str = "You are a legal assistant. Answer the user's question \
using only the context below when it is sufficient. If the context does not contain the answer, \
say so and answer from general legal knowledge, making clear which parts are not supported by the \
context.";

/// Placeholder used when retrieval returned no passages.
pub const NO_CONTEXT: &str = "(no relevant context found)";

/// Concatenate passages, each preceded by its `[Source: .., Page: ..]` tag.
pub fn format_context(matches: &[RetrievedChunk]) -> String {
    if matches.is_empty() {
        return NO_CONTEXT.to_string();
    }
    let mut context = String::new();
    for (i, chunk) in matches.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        // Writing to a String cannot fail.
        let _ = write!(context, "{}\n{}", chunk.record.citation(), chunk.record.text);
    }
    context
}

/// Build the full prompt: instruction, context block, verbatim question.
pub fn build_prompt(question: &str, matches: &[RetrievedChunk]) -> String {
    format!(
        "{LEGAL_ASSISTANT_INSTRUCTION}\n\nContext:\n{}\n\nQuestion: {question}",
        format_context(matches)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkRecord;

    fn retrieved(source: &str, page: Option<u32>, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            position: 0,
            distance: 0.0,
            record: ChunkRecord { source: source.into(), page, text: text.into() },
        }
    }

    #[test]
    fn prompt_layout_is_instruction_context_question() {
        let matches = vec![
            retrieved("cpc.pdf", Some(12), "A suit shall be instituted by a plaint."),
            retrieved("memo.txt", None, "Check the court fee schedule."),
        ];
        let prompt = build_prompt("How is a civil suit filed?", &matches);
        let expected = format!(
            "{LEGAL_ASSISTANT_INSTRUCTION}\n\nContext:\n\
             [Source: cpc.pdf, Page: 12]\nA suit shall be instituted by a plaint.\n\n\
             [Source: memo.txt, Page: n/a]\nCheck the court fee schedule.\n\n\
             Question: How is a civil suit filed?"
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn empty_context_uses_placeholder() {
        let prompt = build_prompt("Anything?", &[]);
        assert!(prompt.contains(&format!("Context:\n{NO_CONTEXT}\n\nQuestion: Anything?")));
    }
}
