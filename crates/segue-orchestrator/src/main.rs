use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use segue_core::{FailureCode, FailurePolicy, SegueConfig};
use segue_orchestrator::logging::init_tracing;
use segue_orchestrator::simulator::{Scenario, ScenarioReport};
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("segue")
        .version(segue_orchestrator::VERSION)
        .about("Scene transition orchestrator: simulate, inspect policy, validate config")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a scripted scenario against the simulated engine")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scenario TOML file"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Orchestrator config TOML file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("policy")
                .about("Print the failure recovery policy table")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Parse and validate a config file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Config TOML file"),
                ),
        )
}

fn load_config(args: &ArgMatches) -> Result<SegueConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => SegueConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(SegueConfig::default()),
    }
}

fn print_report(report: &ScenarioReport) {
    println!("Outcome: {}", report.outcome);
    if let Some(code) = report.code {
        println!("  Code: {}", code);
    }
    if let Some(step) = report.failed_step {
        println!("  Failed step: {}", step);
    }
    if let Some(error) = &report.error {
        println!("  Error: {}", error);
    }
    if let Some(origin) = &report.fell_back_from {
        println!("  Fell back from: {}", origin);
    }
    if let Some(policy) = &report.policy {
        println!(
            "  Policy: fallback={} retry={} clear_cache={} ({})",
            policy.do_fallback, policy.suggest_retry, policy.clear_cache_suggestion, policy.ui_message_key
        );
    }
    println!();
    println!("Statuses:");
    for status in &report.statuses {
        println!("  {:?}", status);
    }
    println!();
    match &report.active_scene {
        Some(active) => println!("Active scene: {}", active),
        None => println!("Active scene: none"),
    }
    let loaded: Vec<String> = report.loaded_scenes.iter().map(ToString::to_string).collect();
    println!("Loaded scenes: {}", loaded.join(", "));
    println!("Elapsed: {}ms", report.elapsed_ms);
    if let Some(cleanup) = &report.cleanup {
        println!("Cleanup clean: {}", cleanup.is_clean());
        for error in &cleanup.errors {
            println!("  {}", error);
        }
    }
}

fn print_policy_table() {
    println!("{:<26} {:<9} {:<6} {:<12} message key", "code", "fallback", "retry", "clear-cache");
    for code in FailureCode::ALL {
        let policy = FailurePolicy::get(code);
        println!(
            "{:<26} {:<9} {:<6} {:<12} {}",
            code.name(),
            policy.do_fallback,
            policy.suggest_retry,
            policy.clear_cache_suggestion,
            policy.ui_message_key
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("run", args)) => {
            let config = load_config(args)?;
            init_tracing(&config.log_filter, matches.get_flag("log-json"))?;

            let path = args.get_one::<PathBuf>("scenario").context("--scenario is required")?;
            let scenario =
                Scenario::load(path).with_context(|| format!("loading scenario {}", path.display()))?;
            let report = scenario.run(config).await;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            std::process::exit(if report.outcome == "complete" { 0 } else { 1 });
        }
        Some(("policy", args)) => {
            if args.get_flag("json") {
                let table: Vec<_> = FailurePolicy::table()
                    .into_iter()
                    .map(|(code, policy)| serde_json::json!({ "code": code, "policy": policy }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                print_policy_table();
            }
        }
        Some(("check-config", args)) => {
            let path = args.get_one::<PathBuf>("file").context("config file is required")?;
            let config = SegueConfig::load(path).with_context(|| format!("checking {}", path.display()))?;
            println!("{} is valid", path.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
        _ => {}
    }
    Ok(())
}
