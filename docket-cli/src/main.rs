//! docket - build and query the legal document index from the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docket_rag::persist::{self, ArtifactState};
use docket_rag::{
    DocumentAnalysis, DocumentAnalyzer, DocumentQa, IndexBuilder, QaAnswer, RagConfig,
};
use docket_telemetry::TelemetryFormat;
use tracing::info;

mod providers;

use providers::{EmbedderKind, GeneratorKind};

/// docket - question answering over a law office's documents
#[derive(Parser, Debug)]
#[command(name = "docket")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory scanned for PDF, .txt and .md documents
    #[arg(long, global = true, env = "DOCKET_SOURCE_DIR")]
    source_dir: Option<PathBuf>,

    /// Directory holding index.bin and index.meta.json
    #[arg(long, global = true, env = "DOCKET_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Passages retrieved per question
    #[arg(long, global = true, env = "DOCKET_TOP_K")]
    top_k: Option<usize>,

    /// Sentences grouped into one chunk
    #[arg(long, global = true, env = "DOCKET_SENTENCES_PER_CHUNK")]
    sentences_per_chunk: Option<usize>,

    /// Embedding backend
    #[arg(long, global = true, env = "DOCKET_EMBEDDER", value_enum, default_value = "hash")]
    embedder: EmbedderKind,

    /// Dimensions of the hash embedder
    #[arg(long, global = true, env = "DOCKET_HASH_DIMS", default_value_t = 384)]
    hash_dims: usize,

    /// Answer generation backend
    #[arg(long, global = true, env = "DOCKET_GENERATOR", value_enum, default_value = "gemini")]
    generator: GeneratorKind,

    /// Seconds to wait for the generation backend
    #[arg(long, global = true, env = "DOCKET_GENERATION_TIMEOUT")]
    timeout_secs: Option<f64>,

    /// Rebuild instead of failing when the index was built with another embedder
    #[arg(long, global = true, env = "DOCKET_REBUILD_ON_MODEL_MISMATCH")]
    rebuild_on_model_mismatch: bool,

    /// Log output format (pretty, json)
    #[arg(long, global = true, env = "DOCKET_LOG_FORMAT", default_value = "pretty")]
    log_format: TelemetryFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build and persist the index from the source directory
    Build {
        /// Rebuild even if a persisted index exists
        #[arg(long)]
        force: bool,
    },

    /// Show the persisted index manifest
    Status,

    /// Answer a question from the indexed documents
    Ask {
        /// The question
        question: String,

        /// Print the answer and sources as JSON
        #[arg(long)]
        json: bool,
    },

    /// Review a single document for strengths, weaknesses and next steps
    Analyze {
        /// PDF, .txt or .md file
        file: PathBuf,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn rag_config(&self) -> Result<RagConfig> {
        let mut builder =
            RagConfig::builder().rebuild_on_model_mismatch(self.rebuild_on_model_mismatch);
        if let Some(dir) = &self.source_dir {
            builder = builder.source_dir(dir);
        }
        if let Some(dir) = &self.index_dir {
            builder = builder.index_dir(dir);
        }
        if let Some(k) = self.top_k {
            builder = builder.top_k(k);
        }
        if let Some(n) = self.sentences_per_chunk {
            builder = builder.sentences_per_chunk(n);
        }
        if let Some(secs) = self.timeout_secs {
            let timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid --timeout-secs value {secs}"))?;
            builder = builder.generation_timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    docket_telemetry::init_telemetry(cli.log_format)?;

    let config = cli.rag_config()?;
    match &cli.command {
        Commands::Build { force } => build(&cli, &config, *force).await,
        Commands::Status => status(&config),
        Commands::Ask { question, json } => ask(&cli, config, question, *json).await,
        Commands::Analyze { file, json } => analyze(&cli, &config, file, *json).await,
    }
}

async fn build(cli: &Cli, config: &RagConfig, force: bool) -> Result<()> {
    let embedder = providers::embedder(cli.embedder, cli.hash_dims)?;

    if !force && persist::artifact_state(&config.index_dir) == ArtifactState::Present {
        let manifest = persist::read_manifest(&config.index_dir)?;
        if manifest.embedding_model == embedder.model_id() {
            println!(
                "Index in {} is present ({} chunks, {}); use --force to rebuild.",
                config.index_dir.display(),
                manifest.count,
                manifest.embedding_model
            );
            return Ok(());
        }
        bail!(
            "index in {} was built with '{}' but the configured embedder is '{}'; rerun with --force",
            config.index_dir.display(),
            manifest.embedding_model,
            embedder.model_id()
        );
    }

    let builder = IndexBuilder::new(config, embedder)?;
    let (index, report) = builder.build(&config.source_dir).await?;
    let manifest = persist::save(&index, &config.index_dir)?;
    info!(index_dir = %config.index_dir.display(), "index written");

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "Indexed {} chunks from {} files ({} failed) into {}",
        manifest.count,
        report.files_scanned,
        report.files_failed.len(),
        config.index_dir.display()
    );
    Ok(())
}

fn status(config: &RagConfig) -> Result<()> {
    match persist::artifact_state(&config.index_dir) {
        ArtifactState::Missing => {
            println!("No index in {}; run `docket build`.", config.index_dir.display());
        }
        ArtifactState::Partial { missing } => {
            println!(
                "Index in {} is incomplete: {} is missing.",
                config.index_dir.display(),
                missing.display()
            );
        }
        ArtifactState::Present => {
            let manifest = persist::read_manifest(&config.index_dir)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
    }
    Ok(())
}

async fn ask(cli: &Cli, config: RagConfig, question: &str, json: bool) -> Result<()> {
    let qa = DocumentQa::builder()
        .config(config)
        .embedding_provider(providers::embedder(cli.embedder, cli.hash_dims)?)
        .generation_provider(providers::generator(cli.generator)?)
        .build()?;

    qa.ensure_ready().await?;
    let answer = qa.answer_question(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print!("{}", render_answer(&answer));
    }
    Ok(())
}

async fn analyze(cli: &Cli, config: &RagConfig, file: &Path, json: bool) -> Result<()> {
    let analyzer = DocumentAnalyzer::new(providers::generator(cli.generator)?)
        .with_timeout(config.generation_timeout);
    let analysis = analyzer.analyze_file(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print!("{}", render_analysis(&analysis));
    }
    Ok(())
}

fn render_answer(answer: &QaAnswer) -> String {
    let mut out = format!("{}\n", answer.answer);
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &answer.sources {
            let page = source.page.map_or_else(|| "n/a".to_string(), |p| p.to_string());
            out.push_str(&format!(
                "  - {}, page {} (distance {:.4})\n",
                source.source, page, source.distance
            ));
        }
    }
    out
}

fn render_analysis(analysis: &DocumentAnalysis) -> String {
    let sections = [
        ("Positive aspects", &analysis.positive_aspects),
        ("Negative aspects", &analysis.negative_aspects),
        ("Strategic advice", &analysis.strategic_advice),
    ];
    let mut out = String::new();
    for (title, items) in sections {
        out.push_str(&format!("{title}:\n"));
        if items.is_empty() {
            out.push_str("  (none)\n");
        }
        for item in items {
            out.push_str(&format!("  - {item}\n"));
        }
    }
    out
}
