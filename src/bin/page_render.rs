//! Page render command line interface
//!
//! Renders pre-parsed pages (JSON or YAML `PageContent` documents).
//!
//! # Usage
//!
//! ```bash
//! # Render a page with arguments
//! page_render render --page index.json --args '{"name":"ada"}'
//!
//! # Render with layouts and partials loaded from a directory
//! page_render render --page index.json --pages-dir shared/ --layout main
//!
//! # List the default filter catalog
//! page_render filters
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use page_ast::PageContent;
use page_render::{
    default_filters, CancelSignal, ConfigLoader, Page, PageResult, PageStore, RenderContext,
    Value,
};
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "page_render")]
#[command(version = "0.1.0")]
#[command(about = "Render pre-parsed template pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (overrides PAGE_RENDER_CONFIG)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a page to stdout
    Render {
        /// Parsed page document (.json, .yaml or .yml)
        #[arg(short, long)]
        page: PathBuf,

        /// Directory of layouts and partials, registered by relative path
        #[arg(long)]
        pages_dir: Option<PathBuf>,

        /// Layout name, overriding the page's declared layout
        #[arg(long, conflicts_with = "no_layout")]
        layout: Option<String>,

        /// Render without any layout
        #[arg(long)]
        no_layout: bool,

        /// Render arguments as a JSON object
        #[arg(long, env = "PAGE_RENDER_ARGS")]
        args: Option<String>,
    },

    /// List the default filter catalog as name/arity
    Filters,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            page,
            pages_dir,
            layout,
            no_layout,
            args,
        } => cmd_render(cli.config, page, pages_dir, layout, no_layout, args).await,
        Commands::Filters => cmd_filters(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn cmd_render(
    config: Option<PathBuf>,
    page: PathBuf,
    pages_dir: Option<PathBuf>,
    layout: Option<String>,
    no_layout: bool,
    args: Option<String>,
) -> Result<()> {
    let loader = match config {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::from_env(),
    };
    let config = loader.load()?;

    let store = Arc::new(PageStore::new());
    if let Some(dir) = &pages_dir {
        let count = load_pages_dir(&store, dir, dir)?;
        tracing::info!(dir = %dir.display(), pages = count, "Loaded pages");
    }

    let context = Arc::new(RenderContext::new(config).with_pages(store));
    let content = read_content(&page)?;
    let page = Page::from_content(page.display().to_string(), content);

    let mut result = PageResult::new(context, Arc::new(page));
    if let Some(layout) = layout {
        result = result.with_layout(layout);
    }
    if no_layout {
        result = result.no_layout();
    }
    if let Some(args) = args {
        let json: serde_json::Value =
            serde_json::from_str(&args).context("--args must be a JSON object")?;
        let Some(map) = json.as_object() else {
            bail!("--args must be a JSON object");
        };
        for (name, value) in map {
            result = result.with_arg(name.clone(), Value::from(value.clone()));
        }
    }

    let mut stdout = tokio::io::stdout();
    result.render_to(&mut stdout, &CancelSignal::new()).await?;
    stdout.flush().await?;
    Ok(())
}

fn cmd_filters() -> Result<()> {
    for signature in default_filters().signatures() {
        println!("{}", signature);
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn read_content(path: &Path) -> Result<PageContent> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let content = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
        _ => serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
    };
    Ok(content)
}

/// Register every page document under `dir`, named by path without extension
fn load_pages_dir(store: &PageStore, root: &Path, dir: &Path) -> Result<usize> {
    let mut count = 0;
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            count += load_pages_dir(store, root, &path)?;
            continue;
        }
        if !matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json" | "yaml" | "yml")
        ) {
            continue;
        }
        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");
        store.insert(Page::from_content(name, read_content(&path)?));
        count += 1;
    }
    Ok(count)
}
