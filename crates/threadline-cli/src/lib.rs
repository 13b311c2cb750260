//! `threadline`: run the thread-order engine against fixture files.
//!
//! - `reconcile` drives one controller pass over a fixture window
//! - `build` runs the canonical order builder over the fixture's posts
//! - `config` shows the effective configuration

#![forbid(unsafe_code)]

pub mod fixture;
pub mod output;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use threadline_core::{
    Config, DiscussionId, EntryKey, OrderRow, PostId, ThreadlineError, WindowEntry,
};
use threadline_order::{
    CanonicalOrderBuilder, CycleDiagnostic, NoOrderSource, OrderCache, OrderSource, ParentIndex,
    StaticOrderSource,
};
use threadline_window::{ListWindow, PassReport, ReconcileController, RedrawHint};
use tracing_subscriber::EnvFilter;

use crate::fixture::Fixture;
use crate::output::CliTable;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot load fixture {}: {source}", path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: ThreadlineError,
    },
    #[error(transparent)]
    Engine(#[from] ThreadlineError),
    #[error("cannot render output: {0}")]
    Output(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "threadline", version, about = "Thread-order engine fixture driver")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one reconciliation pass over a fixture window
    Reconcile {
        /// Fixture JSON file
        fixture: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Build a local order table from the fixture's posts
    Build {
        /// Fixture JSON file
        fixture: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show configuration
    Config {
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::from_env();
    if cli.verbose {
        tracing::debug!(?config, "configuration loaded");
    }
    match execute(&cli, &config) {
        Ok(out) => {
            print!("{out}");
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the parsed command and return what it would print.
pub fn execute(cli: &Cli, config: &Config) -> CliResult<String> {
    match &cli.command {
        Commands::Reconcile { fixture, json } => {
            let result = reconcile(&load(fixture)?, config)?;
            if *json {
                Ok(output::json(&result)?)
            } else {
                Ok(result.render_text(output::is_tty()))
            }
        }
        Commands::Build { fixture, json } => {
            let result = build(&load(fixture)?, config)?;
            if *json {
                Ok(output::json(&result)?)
            } else {
                Ok(result.render_text(output::is_tty()))
            }
        }
        Commands::Config { json } => {
            let pairs = config.describe();
            if *json {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), serde_json::Value::String(value)))
                    .collect();
                Ok(output::json(&map)?)
            } else {
                Ok(pairs
                    .into_iter()
                    .map(|(key, value)| format!("{key}={value}\n"))
                    .collect())
            }
        }
    }
}

fn load(path: &Path) -> CliResult<Fixture> {
    Fixture::load(path).map_err(|source| CliError::Fixture {
        path: path.to_path_buf(),
        source,
    })
}

// -----------------------------------------------------------------------------
// reconcile
// -----------------------------------------------------------------------------

/// One window entry after the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceItem {
    pub entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    pub locked: bool,
    pub event: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    pub discussion_id: DiscussionId,
    pub sequence: Vec<SequenceItem>,
    pub report: PassReport,
    pub redraw: Option<RedrawHint>,
}

/// Load the fixture's order (if any) through an [`OrderCache`], then force one
/// pass through a [`ReconcileController`] and flush its redraw.
pub fn reconcile(fixture: &Fixture, config: &Config) -> CliResult<ReconcileResult> {
    let id = fixture.discussion_id;
    let source: Arc<dyn OrderSource> = match &fixture.order {
        Some(rows) => Arc::new(StaticOrderSource::new().with_discussion(id, rows.clone())),
        None => Arc::new(NoOrderSource),
    };
    let cache = Arc::new(OrderCache::new(source, config));
    let outcome = cache.fetch(id, false);
    tracing::debug!(discussion_id = id, ?outcome, "order loaded");

    let mut window = ListWindow::new(fixture.window_entries()?);
    let mut controller = ReconcileController::new(id, Arc::clone(&cache), config);
    let report = controller.force_rebuild(&mut window).unwrap_or_default();

    let mut redraw = None;
    let mut viewer = |hint: &RedrawHint| redraw = Some(hint.clone());
    controller.on_frame(&mut window, &mut viewer, Instant::now());

    let classes: HashMap<PostId, (u32, bool)> = report
        .depth_changes
        .iter()
        .map(|c| (c.post_id, (c.depth, c.locked)))
        .collect();
    let parents = ParentIndex::from_posts(window.as_slice().iter().filter_map(WindowEntry::as_post));
    let sequence = window
        .as_slice()
        .iter()
        .map(|entry| match entry {
            WindowEntry::Post(post) => {
                let (depth, locked) = classes
                    .get(&post.id)
                    .copied()
                    .unwrap_or_else(|| (cache.depth_of(post, &parents), false));
                SequenceItem {
                    entry: entry.key().to_string(),
                    post_id: Some(post.id),
                    depth: Some(depth),
                    locked,
                    event: post.is_event(),
                }
            }
            WindowEntry::Opaque(_) => SequenceItem {
                entry: entry.key().to_string(),
                post_id: None,
                depth: None,
                locked: false,
                event: false,
            },
        })
        .collect();

    Ok(ReconcileResult {
        discussion_id: id,
        sequence,
        report,
        redraw,
    })
}

impl ReconcileResult {
    /// Post ids in window order.
    #[must_use]
    pub fn post_ids(&self) -> Vec<PostId> {
        self.sequence.iter().filter_map(|item| item.post_id).collect()
    }

    #[must_use]
    pub fn render_text(&self, tty: bool) -> String {
        let mut table = CliTable::new(&["#", "ENTRY", "DEPTH", "STATE"]);
        for (i, item) in self.sequence.iter().enumerate() {
            let depth = item.depth.unwrap_or(0);
            let indent = "  ".repeat(usize::try_from(depth).unwrap_or(0));
            let state = match (item.post_id, item.event, item.locked) {
                (None, ..) => "",
                (Some(_), true, _) => "event",
                (Some(_), false, true) => "frozen",
                (Some(_), false, false) => "movable",
            };
            table.add_row(vec![
                i.to_string(),
                format!("{indent}{}", item.entry),
                item.depth.map(|d| d.to_string()).unwrap_or_default(),
                state.to_string(),
            ]);
        }

        let r = &self.report;
        let mut out = table.render_to_string(tty);
        if r.disabled {
            out.push_str("reconciliation disabled\n");
            return out;
        }
        out.push_str(&format!(
            "discussion {}: run {}, eligible {}, locked {}, events {}, moved {}, failed {}\n",
            self.discussion_id, r.run_len, r.eligible, r.locked, r.events, r.moved, r.failed_moves
        ));
        if r.local_order {
            out.push_str(&format!("local order built ({} cycles broken)\n", r.cycles));
        }
        if r.anchor_fallback {
            out.push_str("anchor detached; moved entries appended\n");
        }
        if !r.missing_order.is_empty() {
            let ids: Vec<String> = r.missing_order.iter().map(ToString::to_string).collect();
            out.push_str(&format!("no order record: {}\n", ids.join(", ")));
        }
        out
    }
}

// -----------------------------------------------------------------------------
// build
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub discussion_id: DiscussionId,
    pub order: Vec<OrderRow>,
    pub cycles: Vec<CycleDiagnostic>,
}

pub fn build(fixture: &Fixture, config: &Config) -> CliResult<BuildResult> {
    let posts = fixture.posts()?;
    let built = CanonicalOrderBuilder::from_config(config).build(&posts);
    for cycle in &built.cycles {
        tracing::warn!(post_id = cycle.post_id, parent_id = cycle.parent_id, "reply cycle broken");
    }
    Ok(BuildResult {
        discussion_id: fixture.discussion_id,
        order: built.table.to_rows(),
        cycles: built.cycles,
    })
}

impl BuildResult {
    #[must_use]
    pub fn render_text(&self, tty: bool) -> String {
        let mut table = CliTable::new(&["ORDER", "POST", "DEPTH", "PARENT"]);
        for row in &self.order {
            let indent = "  ".repeat(usize::try_from(row.depth).unwrap_or(0));
            table.add_row(vec![
                row.order.to_string(),
                format!("{indent}{}", EntryKey::Post(row.post_id)),
                row.depth.to_string(),
                row.parent_post_id.map(|p| p.to_string()).unwrap_or_default(),
            ]);
        }
        let mut out = table.render_to_string(tty);
        for cycle in &self.cycles {
            out.push_str(&format!(
                "cycle: post {} -> {} (link dropped)\n",
                cycle.post_id, cycle.parent_id
            ));
        }
        out
    }
}
