use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use opfuse_analysis::MatcherOptions;
use opfuse_opt::{DEFAULT_FAMILY, FusionConfig, PassManager};

/// opfuse: operator fusion for dataflow graphs
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input graph file in the opfuse text format
    input: PathBuf,

    /// Only run rules of these families (repeatable)
    #[arg(long = "family")]
    families: Vec<String>,

    /// Upper bound on mappings enumerated per head and pattern
    #[arg(long, default_value_t = opfuse_analysis::DEFAULT_MAX_MAPPINGS)]
    max_mappings: usize,

    /// Smallest group worth committing
    #[arg(long, default_value_t = opfuse_opt::DEFAULT_MIN_GROUP_SIZE)]
    min_group_size: usize,

    /// Skip a rule by name (repeatable)
    #[arg(long = "disable-rule")]
    disabled_rules: Vec<String>,

    /// Collapse the groups of this family and print the merged graph
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_FAMILY)]
    merge: Option<String>,

    /// Dump the annotated graph to stderr after fusion
    #[arg(long)]
    emit_graph: bool,

    /// Print the registered rules in run order and exit
    #[arg(long)]
    list_rules: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> FusionConfig {
        FusionConfig {
            min_group_size: self.min_group_size,
            matcher: MatcherOptions {
                max_mappings: self.max_mappings,
            },
            disabled_rules: self.disabled_rules.iter().cloned().collect(),
            families: (!self.families.is_empty())
                .then(|| self.families.iter().cloned().collect::<BTreeSet<_>>()),
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let manager = PassManager::with_builtins()
        .into_diagnostic()
        .wrap_err("failed to register built-in rules")?
        .with_config(cli.config());

    if cli.list_rules {
        for name in manager.rule_names() {
            println!("{name}");
        }
        return Ok(());
    }

    // 1. Read and parse the graph.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;
    let mut graph = opfuse_ir::parse_graph(&source)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to parse {}", cli.input.display()))?;
    log::info!("parsed graph '{}' with {} node(s)", graph.name, graph.len());

    // 2. Fuse.
    let report = manager
        .run(&mut graph)
        .into_diagnostic()
        .wrap_err("fusion failed")?;

    if cli.emit_graph {
        eprintln!("{}", opfuse_ir::dump_graph(&graph));
    }

    // 3. Report groups, or the merged graph.
    match &cli.merge {
        Some(family) => {
            let merged = opfuse_opt::merge_groups(&graph, family, &report.groups)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to merge family '{family}'"))?;
            print!("{}", opfuse_ir::dump_graph(&merged));
        }
        None => print!("{report}"),
    }

    Ok(())
}
