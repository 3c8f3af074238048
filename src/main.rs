//! uberts CLI: run forward-chaining inference over fact files.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use uberts::config::{InferenceMode, UbertsConfig};
use uberts::engine::{Step, StepOutcome, Uberts};
use uberts::facts::{FactLine, read_facts_file, split_documents};
use uberts::labels::Perf;
use uberts::rules::Rule;

#[derive(Parser)]
#[command(name = "uberts", version, about = "Incremental hypergraph inference engine")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run inference over every document of a fact file.
    Run {
        /// Fact file (`def`, `schema`, `startdoc`, `x`, `y` lines).
        #[arg(long)]
        facts: PathBuf,

        /// Rule file, one `lhs => rhs` rule per line.
        #[arg(long)]
        rules: PathBuf,

        /// Agenda priority, e.g. "easyfirst-linear" or "1*easyfirst + 0.5*leftright".
        #[arg(long)]
        priority: Option<String>,

        /// Commit candidates scoring above this threshold.
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Group constraint such as "AT_LEAST_ONE:ner3(i,t,b):i" (repeatable).
        #[arg(long)]
        decision: Vec<String>,

        /// Stop each document after this many pops.
        #[arg(long)]
        max_pops: Option<usize>,

        /// Commit exactly the gold (`y`) facts instead of asking the decision functions.
        #[arg(long)]
        oracle: bool,

        /// Also print every popped candidate with its score, label and outcome.
        #[arg(long)]
        trajectory: bool,

        /// Print one JSON object per document instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Compile rules and print the trie paths each one is entered through.
    Rules {
        /// Fact file supplying the `def` lines.
        #[arg(long)]
        facts: PathBuf,

        /// Rule file.
        #[arg(long)]
        rules: PathBuf,
    },

    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            facts,
            rules,
            priority,
            threshold,
            decision,
            max_pops,
            oracle,
            trajectory,
            json,
        } => {
            if let Some(priority) = priority {
                config.priority = priority;
            }
            if let Some(threshold) = threshold {
                config.default_threshold = threshold;
            }
            if max_pops.is_some() {
                config.max_pops = max_pops;
            }
            if oracle {
                config.mode = InferenceMode::Oracle;
            }
            config.decisions.extend(decision);
            run(config, &facts, &rules, Output { json, trajectory })?;
        }

        Commands::Rules { facts, rules } => {
            let mut u = Uberts::new(config)?;
            let defs: Vec<FactLine> = read_facts_file(&facts)?
                .into_iter()
                .filter(|l| matches!(l, FactLine::Def { .. }))
                .collect();
            u.load_facts(&defs)?;
            for rule in Rule::load(&rules)? {
                let compiled = u.add_parsed_rule(&rule)?;
                println!("{rule}");
                for path in compiled.describe_paths(u.graph().schema()) {
                    println!("  {path}");
                }
            }
            println!("trie nodes: {}", u.trie().size());
        }

        Commands::Config => {
            let text = toml::to_string_pretty(&config).into_diagnostic()?;
            print!("{text}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<UbertsConfig> {
    match path {
        Some(path) => Ok(UbertsConfig::load(path)?),
        None => Ok(UbertsConfig::default()),
    }
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    trajectory: bool,
}

fn outcome_name(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Committed(_) => "commit",
        StepOutcome::Rejected(_) => "reject",
        StepOutcome::AlreadyCommitted(_) => "already-committed",
    }
}

fn step_json(u: &Uberts, step: &Step) -> serde_json::Value {
    serde_json::json!({
        "fact": u.graph().format_edge(step.edge),
        "score": step.score.forwards(),
        "label": step.label,
        "predicted": step.predicted,
        "outcome": outcome_name(step.outcome),
    })
}

fn run(config: UbertsConfig, facts: &Path, rules: &Path, output: Output) -> Result<()> {
    let mode = config.mode;
    let mut u = Uberts::new(config)?;
    let (prelude, docs) = split_documents(read_facts_file(facts)?);
    u.load_facts(&prelude)?;
    for rule in Rule::load(rules)? {
        u.add_parsed_rule(&rule)?;
    }
    u.install_config_decisions()?;
    tracing::info!(
        documents = docs.len(),
        rules = u.rules().len(),
        trie_size = u.trie().size(),
        "loaded"
    );

    let mut total = Perf::default();
    let mut labeled = false;
    for doc in &docs {
        u.load_facts(&doc.lines)?;
        let (stats, steps) = if output.trajectory {
            u.run_recorded(mode)?
        } else {
            (u.run()?, Vec::new())
        };
        let facts: Vec<String> = u
            .committed_facts()
            .into_iter()
            .map(|id| u.graph().format_edge(id))
            .collect();
        let perf = (!u.labels().is_empty()).then(|| u.perf());
        if let Some(p) = perf {
            labeled = true;
            total.merge(p);
        }

        if output.json {
            let mut out = serde_json::json!({
                "doc": doc.id,
                "facts": facts,
                "stats": stats,
                "perf": perf,
            });
            if output.trajectory {
                out["steps"] = steps.iter().map(|s| step_json(&u, s)).collect();
            }
            println!("{}", serde_json::to_string(&out).into_diagnostic()?);
        } else {
            println!("# doc {}", doc.id.as_deref().unwrap_or("-"));
            for step in &steps {
                println!(
                    "# step {} score={:.3} label={:?} {}",
                    u.graph().format_edge(step.edge),
                    step.score.forwards(),
                    step.label,
                    outcome_name(step.outcome)
                );
            }
            for f in &facts {
                println!("{f}");
            }
            if let Some(p) = perf {
                println!("# perf {p}");
            }
        }
        tracing::info!(
            doc = doc.id.as_deref().unwrap_or("-"),
            pops = stats.pops,
            commits = stats.commits,
            rejects = stats.rejects,
            generated = stats.generated,
            hit_pop_limit = stats.hit_pop_limit,
            "document done"
        );
        u.clear_document();
    }

    if labeled {
        tracing::info!(perf = %total, "overall");
    }
    Ok(())
}
