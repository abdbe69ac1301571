use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use docdrop::attach::{
    AttachResult, AttachSession, BuiltinEngine, FileSelection, LogNotifier, Outcome,
    PreviewCoordinator, PreviewEntry, RenderableUnit, UploadContext, UploadOrchestrator,
};
use docdrop::Config;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Attach documents to a conversation.
#[derive(Parser, Debug)]
#[command(name = "docdrop", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and upload files as one batch
    Upload {
        /// Conversation the files belong to
        #[arg(long)]
        chat_id: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print paginated previews of files
    Preview {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only this file (0-based position)
        #[arg(long)]
        file: Option<usize>,

        /// Only this page (1-based)
        #[arg(long, requires = "file")]
        page: Option<u32>,
    },
    /// Print the effective configuration
    Config {
        /// Print the JSON schema instead
        #[arg(long)]
        schema: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docdrop=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Upload { chat_id, files } => upload(&config, chat_id, &files).await,
        Command::Preview { files, file, page } => preview(&config, &files, file, page).await,
        Command::Config { schema } => {
            if schema {
                println!("{}", Config::json_schema()?);
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
    }
}

fn preview_coordinator(config: &Config) -> PreviewCoordinator {
    PreviewCoordinator::new(Arc::new(BuiltinEngine::new(config.preview.lines_per_page)))
}

async fn upload(config: &Config, chat_id: String, files: &[PathBuf]) -> Result<()> {
    let batch = FileSelection::new(config.accept_list())
        .from_paths(files)
        .await?;

    let orchestrator = UploadOrchestrator::new(
        Arc::new(config.http_transport()?),
        Arc::new(LogNotifier),
        config.upload_target(),
    );
    let session = AttachSession::new(
        config.validation_rules(),
        Arc::new(orchestrator),
        preview_coordinator(config),
    );

    let result = session
        .select(batch, &UploadContext::for_conversation(chat_id))
        .await;
    session.preview().settle().await;
    for (index, entry) in session.preview().index().entries() {
        match entry {
            PreviewEntry::Resolved(pages) => info!(file_index = index, pages, "preview ready"),
            PreviewEntry::Failed(err) => info!(file_index = index, error = %err, "no preview"),
        }
    }

    if let Some(notice) = result.notice() {
        eprintln!("{notice}");
    }
    match result {
        AttachResult::Uploaded(Outcome::Succeeded { receipt }) => {
            if let Some(message) = receipt.message {
                println!("{message}");
            }
            if let Some(text) = receipt.processed_text {
                println!("{text}");
            }
            Ok(())
        }
        AttachResult::Empty | AttachResult::Uploaded(Outcome::Skipped) => Ok(()),
        AttachResult::Uploaded(Outcome::Failed { error }) => {
            bail!("upload failed ({}): {error}", error.kind())
        }
        AttachResult::Rejected(err) => bail!("selection rejected ({}): {err}", err.reason()),
    }
}

async fn preview(
    config: &Config,
    files: &[PathBuf],
    only_file: Option<usize>,
    only_page: Option<u32>,
) -> Result<()> {
    let batch = FileSelection::new(config.accept_list())
        .from_paths(files)
        .await?;
    let coordinator = preview_coordinator(config);
    coordinator.load_batch(&batch);
    coordinator.settle().await;

    let index = coordinator.index();
    for (i, file) in batch.files().iter().enumerate() {
        if only_file.is_some_and(|f| f != i) {
            continue;
        }
        match index.get(i) {
            Some(PreviewEntry::Resolved(pages)) => println!("== {} ({pages} pages)", file.name),
            Some(PreviewEntry::Failed(err)) => {
                println!("== {} (no preview: {err})", file.name);
                continue;
            }
            None => continue,
        }
        if let Some(page) = only_page {
            print_unit(&coordinator.get_page(i, page).await?);
            continue;
        }
        let pages = coordinator.pages(i)?;
        tokio::pin!(pages);
        while let Some(unit) = pages.next().await {
            print_unit(&unit?);
        }
    }
    Ok(())
}

fn print_unit(unit: &RenderableUnit) {
    match unit {
        RenderableUnit::Text { page, body } => println!("-- page {page}\n{body}"),
        RenderableUnit::Image { data_uri } => println!("-- image\n{data_uri}"),
    }
}
