//! The question-answering service and its shared index.
//!
//! [`DocumentQa`] is the single entry point the web layer calls. It owns an
//! [`IndexHandle`] holding the loaded index behind an explicit readiness
//! state, and decides whether to load the persisted index or rebuild it
//! from the source directory.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::builder::{BuildReport, IndexBuilder};
use crate::config::RagConfig;
use crate::document::{QaAnswer, SourceRef};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::index::VectorIndex;
use crate::loader::DirectoryLoader;
use crate::persist::{self, ArtifactState};
use crate::retriever::Retriever;
use crate::synthesizer::AnswerSynthesizer;

/// Steps of answering one question, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStage {
    /// Validating the request.
    Idle,
    /// Embedding the question.
    Embedding,
    /// Searching the index.
    Searching,
    /// Building the prompt from retrieved passages.
    AssemblingContext,
    /// Waiting on the generation backend.
    AwaitingGeneration,
    /// The answer has been produced.
    Done,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStage::Idle => "idle",
            QueryStage::Embedding => "embedding",
            QueryStage::Searching => "searching",
            QueryStage::AssemblingContext => "assembling context",
            QueryStage::AwaitingGeneration => "awaiting generation",
            QueryStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Readiness of the shared index.
#[derive(Debug, Clone)]
pub enum IndexState {
    /// Nothing has been loaded or built yet.
    Uninitialized,
    /// A load or build is in progress.
    Building,
    /// The index is serving queries.
    Ready(Arc<VectorIndex>),
    /// The last load or build failed.
    Failed(String),
}

impl IndexState {
    /// Whether queries can be served.
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexState::Ready(_))
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexState::Uninitialized => f.write_str("uninitialized"),
            IndexState::Building => f.write_str("building"),
            IndexState::Ready(index) => write!(f, "ready ({} chunks)", index.len()),
            IndexState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// The lazily initialised, shared index.
///
/// Readers take the read lock only long enough to clone the `Arc`; searches
/// run without holding any lock. Builds are serialised by a separate mutex so
/// a rebuild never blocks readers of the current index.
#[derive(Debug)]
pub struct IndexHandle {
    state: RwLock<IndexState>,
    build_lock: Mutex<()>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    /// Create an uninitialised handle.
    pub fn new() -> Self {
        Self { state: RwLock::new(IndexState::Uninitialized), build_lock: Mutex::new(()) }
    }

    /// A snapshot of the current state.
    pub async fn state(&self) -> IndexState {
        self.state.read().await.clone()
    }

    /// The serving index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotReady`] unless the state is `Ready`.
    pub async fn current(&self) -> Result<Arc<VectorIndex>> {
        match &*self.state.read().await {
            IndexState::Ready(index) => Ok(Arc::clone(index)),
            other => Err(RagError::IndexNotReady(other.to_string())),
        }
    }

    /// Atomically replace the serving index.
    pub async fn publish(&self, index: Arc<VectorIndex>) {
        *self.state.write().await = IndexState::Ready(index);
    }

    async fn set(&self, state: IndexState) {
        *self.state.write().await = state;
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> RagError {
    RagError::Io(std::io::Error::other(format!("blocking task failed: {e}")))
}

/// Answers questions over the indexed document corpus.
///
/// Construct one with [`DocumentQa::builder()`], call
/// [`ensure_ready`](DocumentQa::ensure_ready) at startup, then share it
/// (it is `Send + Sync`) between request handlers.
///
/// # Example
///
/// ```rust,ignore
/// use docket_rag::{DocumentQa, HashEmbedder, RagConfig};
///
/// let qa = DocumentQa::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(HashEmbedder::default()))
///     .generation_provider(Arc::new(GeminiGenerator::from_env()?))
///     .build()?;
///
/// qa.ensure_ready().await?;
/// let answer = qa.answer_question("What is the limitation period for contracts?").await?;
/// ```
pub struct DocumentQa {
    config: RagConfig,
    builder: IndexBuilder,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    handle: IndexHandle,
}

impl DocumentQa {
    /// Create a new [`DocumentQaBuilder`].
    pub fn builder() -> DocumentQaBuilder {
        DocumentQaBuilder::default()
    }

    /// The service configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The shared index handle.
    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    /// A snapshot of the index readiness state.
    pub async fn state(&self) -> IndexState {
        self.handle.state().await
    }

    /// Make the index ready, loading the persisted copy or building one.
    ///
    /// Concurrent callers wait for the same build; once ready this returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns the load or build failure; the state becomes `Failed` and a
    /// later call retries.
    #[instrument(skip(self), fields(index_dir = %self.config.index_dir.display()))]
    pub async fn ensure_ready(&self) -> Result<Arc<VectorIndex>> {
        if let Ok(index) = self.handle.current().await {
            return Ok(index);
        }

        let _guard = self.handle.build_lock.lock().await;
        if let Ok(index) = self.handle.current().await {
            return Ok(index);
        }

        self.handle.set(IndexState::Building).await;
        match self.load_or_build().await {
            Ok(index) => {
                let index = Arc::new(index);
                self.handle.publish(Arc::clone(&index)).await;
                Ok(index)
            }
            Err(e) => {
                warn!(error = %e, "index initialisation failed");
                self.handle.set(IndexState::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Rebuild the index from the source directory and swap it in.
    ///
    /// The current index keeps serving until the new one is persisted and
    /// published. If the rebuild fails a ready index stays in place.
    #[instrument(skip(self), fields(source_dir = %self.config.source_dir.display()))]
    pub async fn rebuild(&self) -> Result<BuildReport> {
        let _guard = self.handle.build_lock.lock().await;
        let was_ready = self.handle.state().await.is_ready();
        if !was_ready {
            self.handle.set(IndexState::Building).await;
        }

        match self.build_and_persist().await {
            Ok((index, report)) => {
                self.handle.publish(Arc::new(index)).await;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "index rebuild failed");
                if !was_ready {
                    self.handle.set(IndexState::Failed(e.to_string())).await;
                }
                Err(e)
            }
        }
    }

    /// Answer `question` from the indexed documents.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotReady`] if [`ensure_ready`](DocumentQa::ensure_ready)
    ///   has not completed.
    /// - [`RagError::Query`] tagged with the failing [`QueryStage`] for a
    ///   blank question, retrieval errors, generation errors or the
    ///   generation timeout.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn answer_question(&self, question: &str) -> Result<QaAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into())
                .at_stage(QueryStage::Idle));
        }

        let index = self.handle.current().await?;
        let matches = self.retriever.retrieve(&index, question).await?;
        let sources: Vec<SourceRef> = matches.iter().map(SourceRef::from).collect();

        let timeout = self.config.generation_timeout;
        let answer = tokio::time::timeout(timeout, self.synthesizer.synthesize(question, &matches))
            .await
            .map_err(|_| RagError::GenerationTimeout(timeout).at_stage(QueryStage::AwaitingGeneration))?
            .map_err(|e| e.at_stage(QueryStage::AwaitingGeneration))?;

        info!(stage = %QueryStage::Done, source_count = sources.len(), "question answered");
        Ok(QaAnswer { question: question.to_string(), answer, sources })
    }

    async fn load_or_build(&self) -> Result<VectorIndex> {
        let index_dir = self.config.index_dir.clone();
        match persist::artifact_state(&index_dir) {
            ArtifactState::Present => match self.load_persisted(index_dir).await {
                Err(RagError::ModelMismatch { expected, found })
                    if self.config.rebuild_on_model_mismatch =>
                {
                    warn!(%expected, %found, "persisted index uses another embedding model, rebuilding");
                    Ok(self.build_and_persist().await?.0)
                }
                other => other,
            },
            ArtifactState::Missing => {
                info!("no persisted index found, building from source documents");
                Ok(self.build_and_persist().await?.0)
            }
            ArtifactState::Partial { missing } => Err(RagError::Consistency(format!(
                "persisted index is incomplete: {} is missing",
                missing.display()
            ))),
        }
    }

    async fn load_persisted(&self, index_dir: PathBuf) -> Result<VectorIndex> {
        let model = self.builder.embedder().model_id().to_string();
        let index = tokio::task::spawn_blocking(move || persist::load(&index_dir, &model))
            .await
            .map_err(join_error)??;
        info!(chunk_count = index.len(), model = index.embedding_model(), "persisted index loaded");
        Ok(index)
    }

    async fn build_and_persist(&self) -> Result<(VectorIndex, BuildReport)> {
        let (index, report) = self.builder.build(&self.config.source_dir).await?;

        let index_dir = self.config.index_dir.clone();
        let index = tokio::task::spawn_blocking(move || {
            persist::save(&index, &index_dir)?;
            Ok::<_, RagError>(index)
        })
        .await
        .map_err(join_error)??;

        Ok((index, report))
    }
}

/// Builder for constructing a [`DocumentQa`].
///
/// The embedding and generation providers are required; the configuration
/// defaults to [`RagConfig::default()`].
#[derive(Default)]
pub struct DocumentQaBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    loader: Option<DirectoryLoader>,
}

impl DocumentQaBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both indexing and questions.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the answer generation backend.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Replace the default PDF/text loader.
    pub fn loader(mut self, loader: DirectoryLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Build the [`DocumentQa`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a provider is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<DocumentQa> {
        let config = self.config.unwrap_or_default();
        let embedder = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let generator = self
            .generation_provider
            .ok_or_else(|| RagError::Config("generation_provider is required".to_string()))?;
        if config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".into()));
        }
        if config.generation_timeout.is_zero() {
            return Err(RagError::Config("generation_timeout must be greater than zero".into()));
        }

        let mut builder = IndexBuilder::new(&config, Arc::clone(&embedder))?;
        if let Some(loader) = self.loader {
            builder = builder.with_loader(loader);
        }

        Ok(DocumentQa {
            retriever: Retriever::new(embedder, config.top_k),
            synthesizer: AnswerSynthesizer::new(generator),
            builder,
            handle: IndexHandle::new(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkRecord;

    fn tiny_index() -> Arc<VectorIndex> {
        let record = ChunkRecord { source: "a.txt".into(), page: None, text: "alpha".into() };
        Arc::new(VectorIndex::build("m", vec![vec![1.0, 0.0]], vec![record]).unwrap())
    }

    #[tokio::test]
    async fn handle_rejects_reads_until_published() {
        let handle = IndexHandle::new();
        let err = handle.current().await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotReady(ref s) if s == "uninitialized"));

        handle.publish(tiny_index()).await;
        assert_eq!(handle.current().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_a_swap() {
        let handle = IndexHandle::new();
        handle.publish(tiny_index()).await;
        let before = handle.current().await.unwrap();

        let record = ChunkRecord { source: "b.txt".into(), page: None, text: "beta".into() };
        let replacement =
            VectorIndex::build("m", vec![vec![0.0, 1.0], vec![1.0, 1.0]], vec![record.clone(), record])
                .unwrap();
        handle.publish(Arc::new(replacement)).await;

        assert_eq!(before.len(), 1);
        assert_eq!(handle.current().await.unwrap().len(), 2);
    }

    #[test]
    fn stage_names_read_naturally() {
        assert_eq!(QueryStage::AssemblingContext.to_string(), "assembling context");
        assert_eq!(IndexState::Failed("disk full".into()).to_string(), "failed: disk full");
    }
}
