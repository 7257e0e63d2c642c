//! CLI command definitions and implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::RagConfig;
use crate::document::ChatMessage;
use crate::embedding::{has_api_key, EmbeddingProvider, GeminiEmbedding};
use crate::generation::GeminiGenerator;
use crate::knowledge::QdrantIndex;
use crate::pipeline::RagPipeline;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "mindvault")]
#[command(version, about = "Retrieval-augmented question answering over your documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a PDF file to the knowledge base
    IngestPdf {
        /// Path to the PDF file
        file: PathBuf,
    },

    /// Crawl a URL and add its pages to the knowledge base
    IngestUrl {
        /// Seed URL to crawl
        url: String,

        /// Link-following depth (0 = seed page only)
        #[arg(short, long)]
        depth: Option<usize>,

        /// URL path patterns to skip (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// Add free text to the knowledge base
    IngestText {
        /// The text to ingest
        text: String,

        /// Source label shown in answer citations
        #[arg(short, long)]
        label: Option<String>,

        /// Skip the language-model cleanup pass
        #[arg(long)]
        raw: bool,
    },

    /// Ask a question against the knowledge base
    Ask {
        /// The question
        question: String,
    },

    /// Show system status
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::IngestPdf { file } => cmd_ingest_pdf(file).await,
        Commands::IngestUrl {
            url,
            depth,
            exclude,
        } => cmd_ingest_url(&url, depth, exclude).await,
        Commands::IngestText { text, label, raw } => {
            cmd_ingest_text(&text, label.as_deref(), raw).await
        }
        Commands::Ask { question } => cmd_ask(&question).await,
        Commands::Status => cmd_status().await,
    }
}

/// Wires the live providers into a pipeline.
async fn build_pipeline(config: RagConfig) -> Result<RagPipeline> {
    if !has_api_key() {
        bail!(
            "No API key configured.\n\n\
             Set one of:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             Get a key at: https://aistudio.google.com/app/apikey"
        );
    }

    let embedder = GeminiEmbedding::from_env().context("Failed to build embedding provider")?;
    let generator = GeminiGenerator::from_env().context("Failed to build generation provider")?;

    let index = QdrantIndex::connect(&config, embedder.dimension())
        .await
        .with_context(|| format!("Failed to connect to Qdrant at {}", config.qdrant_url))?;

    Ok(RagPipeline::new(
        Arc::new(embedder),
        Arc::new(index),
        Arc::new(generator),
        config,
    ))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest_pdf(file: PathBuf) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();

    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read PDF: {:?}", file))?;

    let pipeline = build_pipeline(RagConfig::from_env()).await?;

    println!("[*] Ingesting PDF: {}", filename);
    let report = pipeline
        .ingest_pdf(bytes, &filename)
        .await
        .context("PDF ingestion failed")?;

    println!(
        "[OK] Indexed {} pages as {} chunks",
        report.pages_processed, report.chunks_created
    );

    Ok(())
}

async fn cmd_ingest_url(url: &str, depth: Option<usize>, exclude: Vec<String>) -> Result<()> {
    let mut config = RagConfig::from_env();
    if let Some(depth) = depth {
        config.crawl.max_depth = depth;
    }
    if !exclude.is_empty() {
        config.crawl.exclude = exclude;
    }

    let pipeline = build_pipeline(config).await?;

    println!(
        "[*] Crawling {} (depth {})",
        url,
        pipeline.config().crawl.max_depth
    );
    let report = pipeline
        .ingest_url(url)
        .await
        .context("URL ingestion failed")?;

    println!(
        "[OK] Indexed {} pages as {} chunks",
        report.pages_processed, report.chunks_created
    );

    Ok(())
}

async fn cmd_ingest_text(text: &str, label: Option<&str>, raw: bool) -> Result<()> {
    let mut config = RagConfig::from_env();
    if raw {
        config.normalize_text_input = false;
    }

    let pipeline = build_pipeline(config).await?;

    println!("[*] Ingesting text ({} chars)", text.chars().count());
    let report = pipeline
        .ingest_text(text, label)
        .await
        .context("Text ingestion failed")?;

    println!("[OK] Indexed {} chunks", report.chunks_created);

    Ok(())
}

async fn cmd_ask(question: &str) -> Result<()> {
    use std::io::Write;

    let pipeline = build_pipeline(RagConfig::from_env()).await?;

    println!("[*] Question: \"{}\"", truncate_text(question, 120));
    println!();

    let history = vec![ChatMessage::user(question)];
    let mut stream = pipeline
        .answer_query(&history)
        .await
        .context("Answer generation failed")?;

    let mut stdout = std::io::stdout();
    while let Some(delta) = stream.recv().await {
        let delta = delta.context("Answer stream failed")?;
        print!("{}", delta);
        stdout.flush().ok();
    }
    println!();

    Ok(())
}

async fn cmd_status() -> Result<()> {
    println!("mindvault v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = RagConfig::from_env();
    println!("[*] Qdrant URL: {}", config.qdrant_url);
    println!("[*] Collection: {}", config.collection);

    if has_api_key() {
        println!("[OK] API key: configured");
    } else {
        println!("[!] API key: missing");
        println!("    Set: export GEMINI_API_KEY=your-key");
        return Ok(());
    }

    match build_pipeline(config).await {
        Ok(pipeline) => match pipeline.indexed_chunks().await {
            Ok(count) => println!("[OK] Indexed chunks: {}", count),
            Err(e) => println!("[!] Failed to query index: {}", e),
        },
        Err(e) => println!("[!] Failed to connect: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 safe truncation for display.
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
