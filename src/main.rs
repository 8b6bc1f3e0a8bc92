//! Gitscope - repository metadata engine CLI
//!
//! Run with `gitscope --help` for usage. Every read operation of the
//! engine is exposed as a subcommand; `--json` switches to machine output.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gitscope::{
    APP_NAME, Config, RepoSession, VERSION,
    git::{branches, graph, mailmap, pr, stats, tree},
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Repository metadata and history-graph engine")]
#[command(long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print JSON instead of human-readable output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List branches (basic fidelity by default)
    Branches {
        /// Repository path (default: current directory)
        repo: Option<PathBuf>,

        /// Refine every branch with ahead/behind counts, dates and commit
        /// counts (slow path, O(branches) subprocess calls)
        #[arg(long)]
        full: bool,
    },

    /// Show the lane-assigned commit graph
    Graph {
        /// Repository path (default: current directory)
        repo: Option<PathBuf>,

        /// Branch or revision to walk (default: detected main branch)
        #[arg(short, long)]
        reference: Option<String>,

        /// Maximum commits to read
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip per-commit diff stats (fast path)
        #[arg(long)]
        skip_stats: bool,
    },

    /// Show the merge tree of branches merged into the main line
    Tree {
        /// Repository path (default: current directory)
        repo: Option<PathBuf>,

        /// Maximum merge commits to walk
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show bucketed contributor statistics
    Contributors {
        /// Repository path (default: current directory)
        repo: Option<PathBuf>,

        /// Number of contributors to return
        #[arg(short, long)]
        top: Option<usize>,

        /// Bucket granularity
        #[arg(short, long, value_enum, default_value_t = BucketArg::Week)]
        bucket: BucketArg,
    },

    /// Inspect or edit the repository mailmap
    Mailmap {
        /// Repository path (default: current directory)
        repo: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<MailmapAction>,
    },

    /// List open pull requests via the gh CLI
    Prs {
        /// Repository path (default: current directory)
        repo: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MailmapAction {
    /// Propose alias entries for similar-looking authors
    Suggest,

    /// Add entries given in mailmap format, e.g. "Jane <jane@x> <old@x>"
    Add {
        /// Entries to add
        entries: Vec<String>,
    },

    /// Remove an entry given in mailmap format
    Remove {
        /// Entry to remove
        entry: String,
    },
}

/// CLI-facing bucket granularity
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BucketArg {
    Day,
    Week,
    Month,
}

impl From<BucketArg> for stats::BucketSize {
    fn from(value: BucketArg) -> Self {
        match value {
            BucketArg::Day => stats::BucketSize::Day,
            BucketArg::Week => stats::BucketSize::Week,
            BucketArg::Month => stats::BucketSize::Month,
        }
    }
}

fn setup_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info").add_directive("tokio=warn".parse()?)
    };

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::sync::Mutex::new(file)).with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn repo_path(repo: Option<PathBuf>) -> PathBuf {
    repo.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn print_branches(branches: &[branches::Branch]) {
    for branch in branches {
        let marker = if branch.is_current { "*" } else { " " };
        let merged = if branch.is_merged { " [merged]" } else { "" };
        let kind = if branch.is_remote { " (remote)" } else { "" };

        let mut line = format!("{} {}{}{}", marker, branch.name, merged, kind);
        if let (Some(ahead), Some(behind)) = (branch.ahead_count, branch.behind_count) {
            line.push_str(&format!("  +{}/-{}", ahead, behind));
        }
        if let Some(count) = branch.commit_count {
            line.push_str(&format!("  {} commits", count));
        }
        println!("{}", line);
    }
}

fn print_graph(commits: &[graph::GraphCommit]) {
    for entry in commits {
        let short = &entry.commit.hash[..entry.commit.hash.len().min(8)];
        let indent = "  ".repeat(entry.lane);
        let stats = entry
            .commit
            .stats
            .map(|s| format!("  (+{}/-{})", s.additions, s.deletions))
            .unwrap_or_default();
        println!("{}● [{}] {} {}{}", indent, entry.lane, short, entry.commit.message, stats);
    }
}

fn print_tree(merge_tree: &tree::MergeTree) {
    println!("Merged into {}:", merge_tree.master_branch);
    for node in &merge_tree.nodes {
        println!(
            "  {:?}/{:?} {}  (+{}/-{}, {} files, {} commits, {}d ago)",
            node.branch_type,
            node.size_tier,
            node.branch_name,
            node.stats.additions,
            node.stats.deletions,
            node.stats.files_changed,
            node.stats.commit_count,
            node.stats.days_since_merge,
        );
    }
}

fn print_contributors(report: &stats::ContributorReport) {
    for contributor in &report.contributors {
        println!(
            "{} <{}>: {} commits over {} buckets",
            contributor.author,
            contributor.email,
            contributor.total_commits,
            contributor.time_series.len()
        );
    }
}

/// Parse a single mailmap-format entry from the command line.
fn parse_entry(raw: &str) -> Result<mailmap::MailmapEntry> {
    let map = mailmap::Mailmap::parse(raw)
        .map_err(|e| color_eyre::eyre::eyre!("invalid mailmap entry: {}", e))?;
    map.entries()
        .first()
        .cloned()
        .ok_or_else(|| color_eyre::eyre::eyre!("empty mailmap entry: {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults: {}", e);
        Config::default()
    });

    setup_logging(cli.debug || config.debug, config.log_file.as_ref())?;

    let runner = config.runner();
    runner.check_installed().await?;

    // Ctrl-C cancels slow-path aggregations; in-flight subprocess calls may
    // finish but their results are discarded.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Cancellation requested");
            cancel.cancel();
        });
    }

    match cli.command {
        Commands::Branches { repo, full } => {
            let session = RepoSession::open(repo_path(repo), runner).await?;
            let list = if full {
                branches::list_full(&session, &cancel).await?
            } else {
                branches::list_basic(&session).await?
            };
            if cli.json {
                print_json(&list)?;
            } else {
                print_branches(&list);
            }
        }

        Commands::Graph {
            repo,
            reference,
            limit,
            skip_stats,
        } => {
            let session = RepoSession::open(repo_path(repo), runner).await?;
            let reference = match reference {
                Some(r) => r,
                None => session.main_branch().await?,
            };
            let limit = limit.unwrap_or(config.graph_limit);
            let commits = graph::history(&session, &reference, limit, skip_stats, &cancel).await?;
            if cli.json {
                print_json(&commits)?;
            } else {
                print_graph(&commits);
            }
        }

        Commands::Tree { repo, limit } => {
            let session = RepoSession::open(repo_path(repo), runner).await?;
            let limit = limit.unwrap_or(config.tree_limit);
            let merge_tree = tree::build(&session, limit, &cancel).await?;
            if cli.json {
                print_json(&merge_tree)?;
            } else {
                print_tree(&merge_tree);
            }
        }

        Commands::Contributors { repo, top, bucket } => {
            let session = RepoSession::open(repo_path(repo), runner).await?;
            let top = top.unwrap_or(config.top_contributors);
            let report = stats::collect(&session, Some(top), bucket.into()).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_contributors(&report);
            }
        }

        Commands::Mailmap { repo, action } => {
            let path = repo_path(repo);
            let session = RepoSession::open(&path, runner).await?;
            let mut map = mailmap::Mailmap::load(session.path()).await?;

            match action {
                None => {
                    if cli.json {
                        print_json(&map.entries())?;
                    } else {
                        print!("{}", map.format());
                    }
                }
                Some(MailmapAction::Suggest) => {
                    let report = stats::collect(&session, None, stats::BucketSize::Month).await?;
                    let authors: Vec<(String, String)> = report
                        .contributors
                        .iter()
                        .map(|c| (c.author.clone(), c.email.clone()))
                        .collect();
                    let suggestions = mailmap::suggest_entries(&authors, &map);
                    if cli.json {
                        print_json(&suggestions)?;
                    } else if suggestions.is_empty() {
                        println!("No suggestions.");
                    } else {
                        for entry in &suggestions {
                            println!(
                                "{} <{}> <- {} <{}>",
                                entry.canonical_name,
                                entry.canonical_email,
                                entry.alias_name.as_deref().unwrap_or("*"),
                                entry.alias_email
                            );
                        }
                    }
                }
                Some(MailmapAction::Add { entries }) => {
                    let parsed = entries
                        .iter()
                        .map(|raw| parse_entry(raw))
                        .collect::<Result<Vec<_>>>()?;
                    let added = map.add_entries(parsed);
                    map.save(session.path()).await?;
                    println!("Added {} entries.", added);
                }
                Some(MailmapAction::Remove { entry }) => {
                    let parsed = parse_entry(&entry)?;
                    if map.remove_entry(&parsed) {
                        map.save(session.path()).await?;
                        println!("Removed.");
                    } else {
                        println!("No matching entry.");
                    }
                }
            }
        }

        Commands::Prs { repo } => {
            let path = repo_path(repo);
            if !pr::is_gh_available().await {
                eprintln!("gh CLI not available");
                return Ok(());
            }
            let prs = pr::list_pull_requests(&path).await;
            if cli.json {
                print_json(&prs)?;
            } else {
                for item in &prs {
                    println!("#{} {} ({})", item.number, item.title, item.head_ref_name);
                }
            }
        }
    }

    Ok(())
}
