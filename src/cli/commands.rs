use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use code_ingest::{
    AnalysisTarget, Importer, IngestConfig, JsonLinesTarget, MemoryTarget, RepositorySettings,
};

#[derive(Parser)]
#[command(name = "code-ingest")]
#[command(about = "Ingest a source repository into projects, files and symbol spans")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Ingest the current directory and print a summary
    code-ingest index

    # Write every record as JSON lines
    code-ingest index ./repo --output ingest.jsonl

    # Use an explicit config and repository name
    code-ingest index ./repo --config ingest.yml --name shop
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a directory
    Index {
        /// Repository root (defaults to the config's root, then ".")
        path: Option<PathBuf>,

        /// Config file (defaults to .code-ingest.yml in the root)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Repository name (defaults to the root directory name)
        #[arg(long)]
        name: Option<String>,

        /// Write records as JSON lines to this file
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Skip finalizing the repository in the sink
        #[arg(long)]
        no_finalize: bool,
    },
}

pub async fn index_directory(
    path: Option<&Path>,
    config_path: Option<&Path>,
    name: Option<String>,
    output: Option<&Path>,
    no_finalize: bool,
) -> anyhow::Result<()> {
    let explicit = match config_path {
        Some(config_path) => Some(
            IngestConfig::load(config_path)
                .with_context(|| format!("Cannot load config {}", config_path.display()))?,
        ),
        None => None,
    };

    let requested = path
        .map(Path::to_path_buf)
        .or_else(|| explicit.as_ref().and_then(|c| c.root.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let root = requested
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", requested.display()))?;

    let mut config = match explicit {
        Some(config) => config,
        None => IngestConfig::discover(&root)?,
    };
    if name.is_some() {
        config.repository = name;
    }
    if no_finalize {
        config.finalize = false;
    }

    let target: Arc<dyn AnalysisTarget> = match output {
        Some(output) => Arc::new(
            JsonLinesTarget::create(output)
                .with_context(|| format!("Cannot create {}", output.display()))?,
        ),
        None => Arc::new(MemoryTarget::new()),
    };

    let importer = Importer::from_config(&config, &root, target)?;
    let settings = RepositorySettings::from_config(&config, &root)?;
    let outcome = importer.import(&settings).await?;

    let repo = &outcome.repository;
    let progress = &outcome.progress;
    println!("Repository: {} ({})", repo.name(), repo.root().display());
    println!(
        "Files: {} discovered, {} analyzed, {} uploaded, {} failed",
        progress.files_discovered, progress.files_analyzed, progress.files_uploaded, progress.files_failed
    );
    println!(
        "Projects: {} ({} analyzed), shadow files: {}",
        repo.all_projects().len(),
        progress.projects_analyzed,
        progress.shadow_files
    );
    for project in repo.projects() {
        println!("  {} [{}] {}", project.id(), project.kind().as_str(), project.directory());
    }
    if let Some(output) = output {
        println!("Records written to {}", output.display());
    }
    println!("Done in {} ms", progress.elapsed_ms);

    Ok(())
}
