//! `hotswap` - run replacement sessions over demo graphs

mod graphs;

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use hotswap_core::{Session, SessionConfig, SweepReport};
use hotswap_heap::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let workers = Arg::new("workers")
        .long("workers")
        .value_parser(value_parser!(usize))
        .help("Number of sweep worker threads (overrides the config file)");
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON");

    Command::new("hotswap")
        .version(hotswap_core::VERSION)
        .about("Replace a live object everywhere it is referenced")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Session configuration file (TOML)"),
        )
        .subcommand(
            Command::new("demo")
                .about("Replace the target of the shared-list / nested-mapping example")
                .arg(workers.clone())
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("stress")
                .about("Replace a target held by many objects and verify none is left")
                .arg(
                    Arg::new("objects")
                        .long("objects")
                        .default_value("10000")
                        .value_parser(value_parser!(usize))
                        .help("Number of holders to create"),
                )
                .arg(workers)
                .arg(json),
        )
}

/// `--config` is global, so it is read from the subcommand's matches
fn load_config(args: &ArgMatches) -> anyhow::Result<SessionConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SessionConfig::from_toml_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => SessionConfig::new(),
    };
    if let Some(workers) = args.get_one::<usize>("workers") {
        config = config.with_concurrency_limit(*workers);
    }
    Ok(config)
}

fn print_report(report: &SweepReport) {
    println!("Sweep Report:");
    println!("  Session: {}", report.session);
    println!(
        "  Items: {} scheduled, {} deduplicated, {} completed",
        report.items_scheduled, report.items_deduplicated, report.items_completed
    );
    println!("  Referrers Found: {}", report.referrers_found);
    println!("  Frames Seeded: {}", report.frames_seeded);
    println!("  Slots Rewritten: {}", report.slots_rewritten);
    println!("  Mutation Failures: {}", report.mutation_failures);
    println!("  Discovery Skips: {}", report.discovery_skips);
    println!("  Worker Panics: {}", report.worker_panics);
    println!("  Elapsed: {}ms", report.elapsed_ms);
}

fn demo(config: SessionConfig, json: bool) -> anyhow::Result<()> {
    let graph = graphs::demo();
    let shared = Value::from(&graph.shared);
    let nested = Value::from(&graph.nested);

    if !json {
        println!("Shared reference before: {}", graphs::render(&shared));
        println!("Nested reference before: {}", graphs::render(&nested));
        println!();
    }

    let report = Session::new(config, &graph.runtime)?
        .with_frames(&graph.runtime)
        .run(&Value::from(&graph.target), &Value::from(&graph.substitute))?;

    if json {
        let out = serde_json::json!({
            "report": report,
            "shared": graphs::render(&shared),
            "nested": graphs::render(&nested),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Replacement completed.");
        println!("Shared reference updated: {}", graphs::render(&shared));
        println!("Nested reference updated: {}", graphs::render(&nested));
        println!();
        print_report(&report);
    }
    Ok(())
}

fn stress(config: SessionConfig, objects: usize, json: bool) -> anyhow::Result<()> {
    let graph = graphs::wide(objects);
    let _frame = graph.runtime.stack().enter(graph.frame.clone());

    if !json {
        println!("Running stress test...");
        println!("Holders: {}", graph.holders.len());
        println!("Workers: {}", config.concurrency_limit);
        println!();
    }

    let report = Session::new(config, &graph.runtime)?
        .with_frames(&graph.runtime)
        .run(&Value::from(&graph.target), &Value::from(&graph.substitute))?;

    let remaining = graph
        .holders
        .iter()
        .filter(|holder| holder.holds(&graph.target))
        .count()
        + usize::from(graph.frame.local("config").is_some_and(|v| v.is(&graph.target)));

    if json {
        let out = serde_json::json!({ "report": report, "remaining": remaining });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(&report);
        println!("  Remaining Holders: {remaining}");
    }

    if remaining > 0 {
        bail!("{remaining} holders still reference the target");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("demo", args)) => demo(load_config(args)?, args.get_flag("json")),
        Some(("stress", args)) => {
            let objects = args.get_one::<usize>("objects").copied().unwrap_or(10_000);
            stress(load_config(args)?, objects, args.get_flag("json"))
        }
        _ => Ok(()),
    }
}
