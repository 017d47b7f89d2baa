//! # Review Harness CLI (`rh`)
//!
//! Runs the HTTP front-end or drives a page directly from the shell.
//!
//! ## Usage
//!
//! ```bash
//! rh --config ./config/harness.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rh serve` | Start the HTTP front-end |
//! | `rh pages` | List configured pages and their tabs |
//! | `rh status <page>` | Model, artifact counts and indexed chunks |
//! | `rh upload <page> --category code <files…>` | Store files, ingest if new |
//! | `rh ask <page> <tab> "<query>"` | Run a query on a tab |
//! | `rh clear <page>` | Delete the page's knowledge base |
//! | `rh generated <page>` | List (or `--delete`) generated files |
//! | `rh tools list` | List built-in tools |
//! | `rh tools run <tool> --param k=v` | Run a built-in tool locally |
//!
//! One-shot commands run in a fresh session, so history does not carry
//! over between invocations.
//!
//! ## Examples
//!
//! ```bash
//! rh upload code-analysis --category code ./driver.c ./driver.h
//! rh ask code-analysis "Code Analysis" "check for buffer overflow"
//! rh ask pynvme Orchestrated "4K random read at QD32" --option category=performance
//! rh tools run get_renode_template --param template_type=repl_uart
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;

use review_harness::artifacts::Category;
use review_harness::config;
use review_harness::controller::{App, UploadFile};
use review_harness::server;
use review_harness::session::SessionContext;
use review_harness::tools::ToolKind;

/// Review Harness: upload code and docs, index them, and ask local model
/// agents to analyse, review or generate code.
#[derive(Parser)]
#[command(
    name = "rh",
    about = "Review Harness — local code review and test generation over your own artifacts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harness.toml`.
    #[arg(long, global = true, default_value = "./config/harness.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP front-end on `[server].bind`.
    Serve,

    /// List configured pages, their tabs and accepted file types.
    Pages,

    /// Show model, artifact counts and indexed chunks for a page.
    Status {
        page: String,
    },

    /// Store files as artifacts and ingest them if anything new was written.
    ///
    /// Files whose name already exists are skipped (first write wins).
    Upload {
        page: String,

        /// Artifact category: `code` or `doc`.
        #[arg(long, short)]
        category: Category,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask a question on one of a page's tabs.
    Ask {
        page: String,

        /// Tab label, e.g. `"Code Analysis"`.
        tab: String,

        query: String,

        /// Template option, e.g. `--option category=stress`. Repeatable.
        #[arg(long = "option", value_parser = parse_key_val)]
        options: Vec<(String, String)>,
    },

    /// Delete the page's collection, uploads, index and generated files.
    Clear {
        page: String,
    },

    /// List generated files, or delete one.
    Generated {
        page: String,

        /// Path relative to the output directory.
        #[arg(long)]
        delete: Option<String>,
    },

    /// Inspect and run built-in tools.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List built-in tools with their parameters.
    List,

    /// Run a built-in tool and print its JSON result.
    Run {
        tool: String,

        /// Tool parameter as KEY=VALUE. Values starting with `{` or `[` are
        /// parsed as JSON. Repeatable.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Directory for `save_*` tools.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// Parse a `key=value` pair for `--param` and `--option` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_harness=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Tools run without a config.
    let command = match cli.command {
        Commands::Tools { action } => return run_tools(action).await,
        other => other,
    };

    let cfg = config::load_config(&cli.config)?;
    let app = Arc::new(App::from_config(cfg)?);

    match command {
        Commands::Serve => server::run_server(app).await?,
        Commands::Pages => {
            for page in app.pages() {
                let summary = page.summary();
                println!("{} — {}", summary.id, summary.title);
                for (category, globs) in &summary.categories {
                    println!("  upload {}: {}", category, globs.join(", "));
                }
                for tab in &summary.tabs {
                    let requires: Vec<&str> = tab.requires.iter().map(|c| c.as_str()).collect();
                    if requires.is_empty() {
                        println!("  tab \"{}\" → {}", tab.kind, tab.agent);
                    } else {
                        println!(
                            "  tab \"{}\" → {} (requires {})",
                            tab.kind,
                            tab.agent,
                            requires.join(", ")
                        );
                    }
                }
            }
        }
        Commands::Status { page } => {
            let status = app.page(&page)?.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Upload {
            page,
            category,
            files,
        } => {
            let page = app.page(&page)?;
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("Not a file: {}", path.display()))?;
                uploads.push(UploadFile { filename, bytes });
            }
            let session = SessionContext::new();
            let report = page.upload(&session, category, uploads).await?;

            for s in &report.stored {
                let note = if s.written { "stored" } else { "already exists, skipped" };
                println!("{}: {}", s.filename, note);
            }
            for f in &report.failures {
                println!("{}: failed ({})", f.filename, f.message);
            }
            for i in &report.ingestion {
                println!(
                    "ingest {}: {:?} — {} embedded, {} skipped, {} chunks{}",
                    i.source,
                    i.status,
                    i.files_embedded,
                    i.files_skipped,
                    i.chunks_upserted,
                    if i.detail.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", i.detail)
                    }
                );
            }
        }
        Commands::Ask {
            page,
            tab,
            query,
            options,
        } => {
            let page = app.page(&page)?;
            let options: BTreeMap<String, String> = options.into_iter().collect();
            let mut session = SessionContext::new();
            let submission = page.submit(&mut session, &tab, &query, &options).await?;
            println!("{}", submission.record.response);
            if !submission.tool_calls.is_empty() {
                eprintln!("tools called: {}", submission.tool_calls.join(", "));
            }
        }
        Commands::Clear { page } => {
            let page = app.page(&page)?;
            let mut session = SessionContext::new();
            let report = page.clear(&mut session).await;
            for r in &report.removed {
                println!("removed {}", r);
            }
            for f in &report.failures {
                println!("could not remove {}: {}", f.resource, f.reason);
            }
            if !report.is_complete() {
                bail!("knowledge base only partially cleared");
            }
        }
        Commands::Generated { page, delete } => {
            let page = app.page(&page)?;
            match delete {
                Some(rel) => {
                    let path = page.delete_generated(&rel)?;
                    println!("deleted {}", path.display());
                }
                None => {
                    let groups = page.generated()?;
                    if groups.is_empty() {
                        println!("No generated files.");
                    }
                    for (group, files) in &groups {
                        let label = if group.is_empty() { "(root)" } else { group };
                        println!("{} ({} files)", label, files.len());
                        for f in files {
                            println!("  {} ({} bytes)", f.path, f.size);
                        }
                    }
                }
            }
        }
        Commands::Tools { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

async fn run_tools(action: ToolsAction) -> anyhow::Result<()> {
    match action {
        ToolsAction::List => {
            for kind in ToolKind::ALL {
                let schema = kind.parameters_schema();
                let params: Vec<String> = schema["properties"]
                    .as_object()
                    .map(|p| p.keys().cloned().collect())
                    .unwrap_or_default();
                println!("{}({})", kind.name(), params.join(", "));
                println!("    {}", kind.description());
            }
        }
        ToolsAction::Run {
            tool,
            params,
            output_dir,
        } => {
            let kind = ToolKind::parse(&tool)
                .with_context(|| format!("Unknown tool: {} (see `rh tools list`)", tool))?;
            let mut args = serde_json::Map::new();
            for (k, v) in params {
                let value = if v.starts_with('{') || v.starts_with('[') {
                    serde_json::from_str(&v).unwrap_or(Value::String(v))
                } else {
                    Value::String(v)
                };
                args.insert(k, value);
            }
            let result = kind
                .build(output_dir.as_deref())
                .execute(Value::Object(args))
                .await?;
            match result {
                Value::String(s) => println!("{}", s),
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            }
        }
    }
    Ok(())
}
