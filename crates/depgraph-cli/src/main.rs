mod display;
mod graph_io;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use depgraph_core::detection::{DetectionInput, DetectionOrchestrator};
use depgraph_core::index::{
    ExternalObjectIndex, IndexBuildConfig, InMemoryIndexRepository, InMemoryL2Cache, L1Cache, L2Cache, LookupOptions, TieredCache,
};
use depgraph_core::model::DependencyGraph;
use depgraph_core::rollup::{
    blast_radius, build_matcher, execute_rollup, validate_rollup_config, BlastRadiusQuery, Direction, Matcher, MatcherSpec, MergeOptions,
    RepoGraph, RollupConfig, RollupStatus,
};

#[derive(Parser)]
#[command(
    name = "depgraph",
    version,
    about = "Cross-repository infrastructure dependency graphing and blast-radius analysis",
    long_about = "Scan repositories for infrastructure-as-code dependencies, roll up matching resources across repositories, and query the external object index they reference."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory of Terraform/GitLab CI files into a dependency graph
    Scan {
        /// Directory to scan
        path: PathBuf,

        /// Identifier for the resulting scan
        #[arg(long, default_value = "scan-1")]
        scan_id: String,

        /// Write the resulting graph as JSON to this path (prints a summary otherwise)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Cross-repository rollup operations
    Rollup {
        #[command(subcommand)]
        command: RollupCommands,
    },

    /// External object index operations
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
}

#[derive(Subcommand)]
enum RollupCommands {
    /// Build and validate a rollup config, writing it as JSON
    Create {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "default")]
        tenant: String,

        /// Repeatable: a repository id participating in the rollup (at least 2 required)
        #[arg(long = "repo")]
        repositories: Vec<String>,

        /// Repeatable: "kind:priority:min_confidence[:config_json]", e.g.
        /// "arn:100:0" or "tag:70:80:{\"required_tags\":[{\"key\":\"team\"}]}"
        #[arg(long = "matcher")]
        matchers: Vec<String>,

        #[arg(long)]
        schedule: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a rollup config against its source scan graphs
    Execute {
        /// Path to a rollup config produced by `rollup create`
        #[arg(long)]
        config: PathBuf,

        /// Repeatable: "repo_id:path/to/graph.json"
        #[arg(long = "source")]
        sources: Vec<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a blast-radius query over a merged or scan graph
    BlastRadius {
        #[arg(long)]
        graph: PathBuf,

        /// Repeatable: a node id to start from
        #[arg(long = "node")]
        node_ids: Vec<String>,

        #[arg(long, default_value = "both")]
        direction: String,

        #[arg(long, default_value_t = 10)]
        max_depth: u32,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Extract and index external object references from a scan graph
    Build {
        #[arg(long)]
        graph: PathBuf,

        #[arg(long, default_value = "default")]
        tenant: String,

        #[arg(long)]
        repository: String,

        /// Print the entries indexed for this external id after the build
        #[arg(long)]
        lookup: Option<String>,

        /// Print every indexed entry for this node id after the build
        #[arg(long)]
        reverse_lookup: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan { path, scan_id, output } => cmd_scan(&path, scan_id, output.as_deref()),
        Commands::Rollup { command } => match command {
            RollupCommands::Create { name, tenant, repositories, matchers, schedule, output } => {
                cmd_rollup_create(name, tenant, repositories, matchers, schedule, output.as_deref())
            }
            RollupCommands::Execute { config, sources, output } => cmd_rollup_execute(&config, sources, output.as_deref()),
            RollupCommands::BlastRadius { graph, node_ids, direction, max_depth } => cmd_blast_radius(&graph, node_ids, &direction, max_depth),
        },
        Commands::Index { command } => match command {
            IndexCommands::Build { graph, tenant, repository, lookup, reverse_lookup } => {
                cmd_index_build(&graph, &tenant, &repository, lookup, reverse_lookup).await
            }
        },
    }
}

/// Directory names the walk never descends into: hidden (`.`-prefixed) dirs,
/// build output, and vendored dependencies.
const IGNORED_DIRS: &[&str] = &["target", "node_modules", "vendor", "dist", "build", "__pycache__"];

/// Bounds how many directory levels below `root` the scan descends.
const MAX_WALK_DEPTH: usize = 20;

fn collect_scan_inputs(root: &Path) -> Result<Vec<(String, String)>> {
    let mut files = Vec::new();
    walk(root, 0, &mut files)?;
    let mut inputs = Vec::new();
    for path in files {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let is_terraform = name.ends_with(".tf");
        let is_gitlab_ci = name == ".gitlab-ci.yml" || name == ".gitlab-ci.yaml";
        let is_k8s_manifest = name == "Chart.yaml" || name == "values.yaml" || name.ends_with(".yaml") || name.ends_with(".yml");
        if !is_terraform && !is_gitlab_ci && !is_k8s_manifest {
            continue;
        }
        let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        inputs.push((path.to_string_lossy().to_string(), content));
    }
    inputs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(inputs)
}

fn walk(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        if dir.is_file() {
            out.push(dir.to_path_buf());
        }
        return Ok(());
    }
    if depth >= MAX_WALK_DEPTH {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref()) {
                continue;
            }
            walk(&path, depth + 1, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn cmd_scan(path: &Path, scan_id: String, output: Option<&Path>) -> Result<()> {
    let files = collect_scan_inputs(path)?;
    let inputs: Vec<DetectionInput> = files.iter().map(|(file, content)| DetectionInput { file, content }).collect();

    let mut graph = DependencyGraph::new(scan_id);
    let orchestrator = DetectionOrchestrator::new();
    orchestrator.run(&inputs, &mut graph);

    display::print_scan_summary(&graph);
    if let Some(output) = output {
        graph_io::save_graph(output, &graph)?;
        println!(" wrote {}", output.display());
    }
    Ok(())
}

/// Parses `kind[:priority[:min_confidence[:config_json]]]`, e.g.
/// `tag:70:80:{"required_tags":[{"key":"team"}]}`. `config_json`, if
/// present, may itself contain colons, so it's carved off whole rather
/// than split further.
fn parse_matcher_spec(raw: &str) -> Result<MatcherSpec> {
    let mut parts = raw.splitn(4, ':');
    let kind = parts.next().unwrap_or("name").to_string();
    let priority = parts.next().map(|p| p.parse()).transpose().context("matcher priority must be an integer")?.unwrap_or(50);
    let min_confidence = parts.next().map(|p| p.parse()).transpose().context("matcher min_confidence must be 0-255")?.unwrap_or(0);
    let config = match parts.next() {
        Some(raw_json) => serde_json::from_str(raw_json).context("matcher config must be valid JSON")?,
        None => serde_json::Value::Null,
    };
    Ok(MatcherSpec { kind, enabled: true, priority, min_confidence, config })
}

fn cmd_rollup_create(
    name: String,
    tenant: String,
    repositories: Vec<String>,
    matcher_specs: Vec<String>,
    schedule: Option<String>,
    output: Option<&Path>,
) -> Result<()> {
    let matchers: Vec<MatcherSpec> = if matcher_specs.is_empty() {
        vec![MatcherSpec { kind: "arn".to_string(), enabled: true, priority: 100, min_confidence: 0, config: serde_json::Value::Null }]
    } else {
        matcher_specs.iter().map(|raw| parse_matcher_spec(raw)).collect::<Result<_>>()?
    };

    let config = RollupConfig {
        id: format!("rollup-{}", name.to_lowercase().replace(' ', "-")),
        tenant_id: tenant,
        name,
        description: String::new(),
        repository_ids: repositories,
        matchers,
        merge_options: MergeOptions::default(),
        schedule,
        version: 1,
        status: RollupStatus::Active,
    };

    let built: Vec<Box<dyn Matcher>> = config.matchers.iter().map(build_matcher).collect();
    validate_rollup_config(&config, &built)?;

    let rendered = serde_json::to_string_pretty(&config)?;
    match output {
        Some(path) => {
            fs::write(path, rendered)?;
            println!(" wrote {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn cmd_rollup_execute(config_path: &Path, sources: Vec<String>, output: Option<&Path>) -> Result<()> {
    let raw = fs::read_to_string(config_path).with_context(|| format!("reading {}", config_path.display()))?;
    let config: RollupConfig = serde_json::from_str(&raw).context("parsing rollup config")?;

    let built: Vec<Box<dyn Matcher>> = config.matchers.iter().filter(|m| m.enabled).map(build_matcher).collect();
    validate_rollup_config(&config, &built)?;

    let mut repo_graphs = Vec::new();
    for (order, source) in sources.iter().enumerate() {
        let Some((repo_id, path)) = source.split_once(':') else {
            bail!("--source must be formatted as repo_id:path, got '{source}'");
        };
        let graph = graph_io::load_graph(Path::new(path))?;
        let scan_id = graph.scan_id.clone();
        repo_graphs.push(RepoGraph { repo_id: repo_id.to_string(), scan_id, graph, config_order: order, ingested_at_ms: order as u64 });
    }

    let result = execute_rollup(&config, &built, repo_graphs);
    display::print_execution_result(&result);

    if let Some(output) = output {
        graph_io::save_graph(output, &result.merged_graph)?;
        println!(" wrote {}", output.display());
    }
    Ok(())
}

fn cmd_blast_radius(graph_path: &Path, node_ids: Vec<String>, direction: &str, max_depth: u32) -> Result<()> {
    let graph = graph_io::load_graph(graph_path)?;
    let direction = match direction {
        "upstream" => Direction::Upstream,
        "downstream" => Direction::Downstream,
        "both" => Direction::Both,
        other => bail!("unknown direction '{other}', expected upstream/downstream/both"),
    };
    let query = BlastRadiusQuery { node_ids, direction, max_depth, include_edge_kinds: None };
    let result = blast_radius(&graph, &query);
    display::print_blast_radius(&result);
    Ok(())
}

async fn cmd_index_build(graph_path: &Path, tenant: &str, repository: &str, lookup: Option<String>, reverse_lookup: Option<String>) -> Result<()> {
    let graph = graph_io::load_graph(graph_path)?;

    let repository_store = Arc::new(InMemoryIndexRepository::default());
    let l1 = L1Cache::new(1000, 300_000);
    let l2: Arc<dyn L2Cache> = Arc::new(InMemoryL2Cache::new(3_600_000));
    let cache = TieredCache::new(l1, l2, "ext-idx:");
    let index = ExternalObjectIndex::new(repository_store.clone(), cache, IndexBuildConfig::default());

    let scan_id = graph.scan_id.clone();
    let result = index.build(tenant, &scan_id, repository, &graph).await?;
    display::print_index_build_result(&result);

    if let Some(external_id) = lookup {
        let found = index.lookup(tenant, &external_id, LookupOptions::default()).await?;
        println!("{}", serde_json::to_string_pretty(&found.entries)?);
    }
    if let Some(node_id) = reverse_lookup {
        let found = index.reverse_lookup(tenant, &node_id).await?;
        println!("{}", serde_json::to_string_pretty(&found)?);
    }
    Ok(())
}
