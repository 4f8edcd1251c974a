//! Property tests for sentence-window chunking.

use docket_rag::{Chunker, SentenceChunker, SourceDocument, split_sentences};
use proptest::prelude::*;

/// A capitalised sentence of lowercase words ending in a full stop.
fn arb_sentence() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,10}( [a-z]{2,10}){0,6}[.?!]"
}

fn document(text: String) -> SourceDocument {
    SourceDocument { source: "pleading.pdf".into(), page: Some(4), text }
}

/// Chunking is lossless, order-preserving and never splits a sentence.
mod prop_sentence_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_rejoin_to_the_original_sentences(
            sentences in proptest::collection::vec(arb_sentence(), 0..25),
            window in 1usize..6,
        ) {
            let text = sentences.join(" ");
            prop_assert_eq!(split_sentences(&text), sentences.iter().map(String::as_str).collect::<Vec<_>>());

            let chunker = SentenceChunker::new(window).unwrap();
            let chunks = chunker.chunk(&document(text.clone()));

            prop_assert_eq!(chunks.len(), sentences.len().div_ceil(window));
            let rejoined = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
            prop_assert_eq!(rejoined, text);

            for (i, chunk) in chunks.iter().enumerate() {
                let expected = sentences[i * window..((i + 1) * window).min(sentences.len())].join(" ");
                prop_assert_eq!(&chunk.text, &expected);
                prop_assert_eq!(chunk.source.as_str(), "pleading.pdf");
                prop_assert_eq!(chunk.page, Some(4));
            }
        }

        #[test]
        fn chunking_is_deterministic(
            sentences in proptest::collection::vec(arb_sentence(), 1..15),
            window in 1usize..5,
        ) {
            let chunker = SentenceChunker::new(window).unwrap();
            let doc = document(sentences.join(" "));
            prop_assert_eq!(chunker.chunk(&doc), chunker.chunk(&doc));
        }
    }
}
