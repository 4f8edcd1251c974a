//! End-to-end tests of the question-answering service with stub generators.

mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::write_pdf;
use docket_rag::persist::{self, ArtifactState};
use docket_rag::{
    DocumentQa, ErrorKind, GenerationProvider, HashEmbedder, IndexState, QueryStage, RagConfig,
    RagError, Result,
};

/// Records every prompt and replies with a fixed answer.
#[derive(Default)]
struct CapturingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl GenerationProvider for CapturingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(" Three years from the breach. ".into())
    }

    fn name(&self) -> &str {
        "capturing"
    }
}

struct FailingGenerator;

#[async_trait]
impl GenerationProvider for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation { provider: "failing".into(), message: "quota exceeded".into() })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct SlowGenerator;

#[async_trait]
impl GenerationProvider for SlowGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".into())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

const QUESTION: &str = "How long is the limitations period for contract claims?";

fn config(root: &Path) -> RagConfig {
    RagConfig::builder()
        .source_dir(root.join("docs"))
        .index_dir(root.join("index"))
        .build()
        .unwrap()
}

fn write_corpus(root: &Path) {
    let docs = root.join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    write_pdf(
        &docs.join("limitation_act.pdf"),
        &["The statute of limitations for contract claims is three years."],
    );
    std::fs::write(
        docs.join("family.txt"),
        "Custody disputes are heard by the family court. Maintenance orders may be varied.",
    )
    .unwrap();
}

fn service(
    config: RagConfig,
    dims: usize,
    generator: Arc<dyn GenerationProvider>,
) -> DocumentQa {
    DocumentQa::builder()
        .config(config)
        .embedding_provider(Arc::new(HashEmbedder::new(dims)))
        .generation_provider(generator)
        .build()
        .unwrap()
}

#[tokio::test]
async fn answers_from_the_relevant_cited_passage() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let generator = Arc::new(CapturingGenerator::default());
    let qa = service(config(temp.path()), 256, generator.clone());

    qa.ensure_ready().await.unwrap();
    assert!(qa.state().await.is_ready());
    assert_eq!(persist::artifact_state(&temp.path().join("index")), ArtifactState::Present);

    let answer = qa.answer_question(QUESTION).await.unwrap();
    assert_eq!(answer.question, QUESTION);
    assert_eq!(answer.answer, "Three years from the breach.");
    assert!(answer.sources.len() <= 3);
    assert_eq!(answer.sources[0].source, "limitation_act.pdf", "sources: {:?}", answer.sources);
    assert_eq!(answer.sources[0].page, Some(1));
    assert!(answer.sources.windows(2).all(|w| w[0].distance <= w[1].distance));

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("[Source: limitation_act.pdf, Page: 1]"));
    assert!(prompts[0].contains("three years"));
    assert!(prompts[0].ends_with(&format!("Question: {QUESTION}")));
}

#[tokio::test]
async fn questions_before_readiness_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let qa = service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()));

    assert!(matches!(qa.state().await, IndexState::Uninitialized));
    let err = qa.answer_question(QUESTION).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
}

#[tokio::test]
async fn blank_question_is_an_input_error() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let qa = service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()));
    qa.ensure_ready().await.unwrap();

    let err = qa.answer_question("   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[tokio::test]
async fn top_k_of_one_returns_only_the_closest_passage() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let config = RagConfig { top_k: 1, ..config(temp.path()) };
    let qa = service(config, 256, Arc::new(CapturingGenerator::default()));
    qa.ensure_ready().await.unwrap();

    let answer = qa.answer_question(QUESTION).await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source, "limitation_act.pdf");
}

#[tokio::test]
async fn punctuation_only_question_is_an_input_error() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let generator = Arc::new(CapturingGenerator::default());
    let qa = service(config(temp.path()), 64, generator.clone());
    qa.ensure_ready().await.unwrap();

    let err = qa.answer_question("???").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn persisted_index_is_reused_without_sources() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()))
        .ensure_ready()
        .await
        .unwrap();

    // A rebuild would now fail, so readiness proves the index was loaded.
    std::fs::remove_dir_all(temp.path().join("docs")).unwrap();
    let qa = service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()));
    let index = qa.ensure_ready().await.unwrap();
    assert_eq!(index.embedding_model(), "hash-v1-64");
    assert!(qa.answer_question(QUESTION).await.is_ok());
}

#[tokio::test]
async fn index_built_with_another_model_is_refused() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()))
        .ensure_ready()
        .await
        .unwrap();

    let qa = service(config(temp.path()), 32, Arc::new(CapturingGenerator::default()));
    let err = qa.ensure_ready().await.unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { .. }));
    assert!(matches!(qa.state().await, IndexState::Failed(_)));

    let rebuilding = RagConfig { rebuild_on_model_mismatch: true, ..config(temp.path()) };
    let qa = service(rebuilding, 32, Arc::new(CapturingGenerator::default()));
    let index = qa.ensure_ready().await.unwrap();
    assert_eq!(index.embedding_model(), "hash-v1-32");
}

#[tokio::test]
async fn lone_metadata_file_is_a_consistency_error() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()))
        .ensure_ready()
        .await
        .unwrap();
    std::fs::remove_file(temp.path().join("index").join(persist::VECTORS_FILE)).unwrap();

    let qa = service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()));
    let err = qa.ensure_ready().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);
}

#[tokio::test]
async fn generation_failure_is_tagged_with_its_stage() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let qa = service(config(temp.path()), 64, Arc::new(FailingGenerator));
    qa.ensure_ready().await.unwrap();

    let err = qa.answer_question(QUESTION).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalDependency);
    match err {
        RagError::Query { stage, source } => {
            assert_eq!(stage, QueryStage::AwaitingGeneration);
            assert!(source.to_string().contains("quota exceeded"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn slow_generation_times_out() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let config = RagConfig { generation_timeout: Duration::from_millis(50), ..config(temp.path()) };
    let qa = service(config, 64, Arc::new(SlowGenerator));
    qa.ensure_ready().await.unwrap();

    let err = qa.answer_question(QUESTION).await.unwrap_err();
    match err {
        RagError::Query { stage, source } => {
            assert_eq!(stage, QueryStage::AwaitingGeneration);
            assert!(matches!(*source, RagError::GenerationTimeout(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rebuild_swaps_in_new_documents_without_disturbing_readers() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let qa = service(config(temp.path()), 64, Arc::new(CapturingGenerator::default()));
    let before = qa.ensure_ready().await.unwrap();

    std::fs::write(
        temp.path().join("docs").join("appeals.txt"),
        "An appeal lies to the High Court. It must be filed within ninety days.",
    )
    .unwrap();
    let report = qa.rebuild().await.unwrap();

    let after = qa.handle().current().await.unwrap();
    assert_eq!(report.chunks, after.len());
    assert_eq!(after.len(), before.len() + 1);
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(before.records().iter().all(|r| r.source != "appeals.txt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_startup_builds_once() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path());
    let qa = Arc::new(service(config(temp.path()), 64, Arc::new(CapturingGenerator::default())));

    let (a, b) = tokio::join!(qa.ensure_ready(), qa.ensure_ready());
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
}
