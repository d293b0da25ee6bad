use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use depscan::config::Config;
use depscan::error::ScanError;
use depscan::model::Severity;
use depscan::reports::{Report, format_summary, generate_markdown_report};
use depscan::scan::ScanProgress;
use depscan::tree::{DependencyTree, NodeId};
use depscan::workspace::{RefreshReport, Workspace};

#[derive(Parser)]
#[command(name = "depscan")]
#[command(about = "Dependency tree builder and vulnerability impact scanner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
    Markdown,
}

#[derive(clap::Args)]
struct WorkspaceArgs {
    /// Workspace directory to scan
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scan service URL, overrides the configuration file
    #[arg(long)]
    server: Option<String>,

    /// Reuse cached scan results that are still valid
    #[arg(short, long)]
    quick: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace dependency trees, scan them and report issues
    Scan {
        #[command(flatten)]
        args: WorkspaceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "summary")]
        output: OutputFormat,

        /// Minimum severity that fails the run (low, medium, high, critical)
        #[arg(short, long, default_value = "low")]
        min_severity: String,

        /// Exit with code 1 if issues at or above the minimum severity are found
        #[arg(long)]
        fail_on_issues: bool,
    },
    /// Print the scanned dependency trees
    Tree {
        #[command(flatten)]
        args: WorkspaceArgs,

        /// Maximum depth to print
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Print the dependency paths that lead to a vulnerable component
    Impacted {
        #[command(flatten)]
        args: WorkspaceArgs,

        /// Issue id, e.g. XRAY-123456
        #[arg(short, long)]
        issue: String,

        /// Affected component, with or without its `<type>://` prefix
        #[arg(long)]
        component: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Scan {
            args,
            output,
            min_severity,
            fail_on_issues,
        } => run_scan(args, output, &min_severity, fail_on_issues).await,
        Commands::Tree { args, depth } => run_tree(args, depth).await,
        Commands::Impacted {
            args,
            issue,
            component,
        } => run_impacted(args, &issue, &component).await,
    }
}

fn load_config(path: Option<&Path>, server: Option<String>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if let Some(url) = server {
        config.server.url = url;
    }
    Ok(config)
}

/// Build the workspace and run one refresh; Ctrl-C cancels it
async fn refresh(args: WorkspaceArgs) -> Result<(Arc<Workspace>, RefreshReport), ExitCode> {
    let config = match load_config(args.config.as_deref(), args.server) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            return Err(ExitCode::FAILURE);
        }
    };
    let workspace = match Workspace::from_config(&args.workspace, config) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            eprintln!("Error initializing workspace: {e:#}");
            return Err(ExitCode::FAILURE);
        }
    };

    let on_ctrl_c = Arc::clone(&workspace);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Cancelling scan");
            on_ctrl_c.cancel();
        }
    });

    let start = Instant::now();
    let progress = |p: ScanProgress| {
        eprintln!("Scanned page {}/{} ({} components)", p.page, p.pages, p.components);
    };
    let result = workspace.refresh_with_progress(args.quick, &progress).await;
    signal.abort();

    match result {
        Ok(report) => {
            eprintln!(
                "Scanned {} project(s) from {} descriptor(s) in {:?} ({} cached, {} submitted)",
                report.projects,
                report.descriptors,
                start.elapsed(),
                report.scan.cached,
                report.scan.submitted
            );
            if let Some(error) = &report.scan.last_error {
                eprintln!(
                    "Warning: {} of {} scan request(s) failed, results may be incomplete: {error:#}",
                    report.scan.failed_pages, report.scan.pages
                );
            }
            Ok((workspace, report))
        }
        Err(ScanError::Cancelled) => {
            eprintln!("Scan cancelled");
            Err(ExitCode::from(130))
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Err(ExitCode::FAILURE)
        }
    }
}

async fn run_scan(
    args: WorkspaceArgs,
    output: OutputFormat,
    min_severity: &str,
    fail_on_issues: bool,
) -> ExitCode {
    let root = args.workspace.clone();
    let (workspace, _) = match refresh(args).await {
        Ok(done) => done,
        Err(code) => return code,
    };
    let report = Report::from_snapshot(&root, &workspace.get_tree());

    match output {
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        },
        OutputFormat::Markdown => println!("{}", generate_markdown_report(&report)),
        OutputFormat::Summary => print!("{}", format_summary(&report)),
    }

    let min = Severity::from_str_loose(min_severity);
    let failing = report
        .entries
        .iter()
        .filter(|e| e.severity.meets_threshold(&min))
        .count();
    if fail_on_issues && failing > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_tree(tree: &DependencyTree, root: NodeId, max_depth: Option<usize>) {
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let node = tree.node(id);
        let name = if node.is_tree_root() {
            node.label.clone()
        } else {
            node.component_id()
        };
        let mut line = format!("{}{} [{}]", "  ".repeat(depth), name, node.top_severity());
        if let Some(error) = node.project().and_then(|p| p.build_error.as_ref()) {
            line.push_str(&format!(" ({error})"));
        }
        println!("{line}");
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        stack.extend(tree.children(id).iter().rev().map(|c| (*c, depth + 1)));
    }
}

async fn run_tree(args: WorkspaceArgs, depth: Option<usize>) -> ExitCode {
    let (workspace, _) = match refresh(args).await {
        Ok(done) => done,
        Err(code) => return code,
    };
    let snapshot = workspace.get_tree();
    for root in snapshot.tree.top_level_roots() {
        print_tree(&snapshot.tree, root, depth);
    }
    ExitCode::SUCCESS
}

async fn run_impacted(args: WorkspaceArgs, issue: &str, component: &str) -> ExitCode {
    let (workspace, _) = match refresh(args).await {
        Ok(done) => done,
        Err(code) => return code,
    };
    let graphs = workspace.get_impact_graphs(issue, component);
    if graphs.is_empty() {
        println!("{component} is not affected by {issue} in this workspace");
        return ExitCode::SUCCESS;
    }
    for graph in graphs {
        if let Some(tree) = graph.to_tree() {
            match serde_json::to_string_pretty(&tree) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Failed to serialize impact tree: {e}"),
            }
        }
        if graph.is_truncated() {
            println!(
                "Showing {} of {} paths",
                graph.paths.len(),
                graph.paths_count
            );
        }
    }
    ExitCode::SUCCESS
}
