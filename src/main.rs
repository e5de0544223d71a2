// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use the_corelet::config::{load_and_validate_config, EngineConfig, LoggingConfig};
use the_corelet::corelet::{is_worker_process, run_if_worker};
use the_corelet::engine::{EventEngine, ResultFilter};
use the_corelet::events::{Event, EventFactory, ExecutionMode};
use the_corelet::handlers::register_builtin_handlers;
use the_corelet::observability::init_tracing;

/// Pool size used when corelet events are requested without a config file.
const CLI_DEFAULT_POOL_SIZE: usize = 2;

struct CliArgs {
    config: Option<PathBuf>,
    list: bool,
    events: Vec<Event>,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--config FILE] <event_type> <mode> <payload-json> [<event_type> <mode> <payload-json> ...]\n\
         \x20      {program} --list\n\
         Modes: sync, thread, corelet, command\n\
         Example: {program} echo thread '{{\"hello\":\"world\"}}' whoami corelet null"
    )
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let program = args.first().map(String::as_str).unwrap_or("the-corelet");
    let mut config = None;
    let mut list = false;
    let mut positional = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config requires a file path")?;
                config = Some(PathBuf::from(path));
            }
            "--list" => list = true,
            "--help" | "-h" => bail!(usage(program)),
            _ => positional.push(arg.clone()),
        }
    }

    if list {
        return Ok(CliArgs {
            config,
            list,
            events: Vec::new(),
        });
    }
    if positional.is_empty() || positional.len() % 3 != 0 {
        bail!(usage(program));
    }

    let events = positional
        .chunks(3)
        .map(|triple| {
            let payload: Value = serde_json::from_str(&triple[2])
                .with_context(|| format!("payload for '{}' is not valid JSON", triple[0]))?;
            Ok(Event::try_new(triple[0].as_str(), &triple[1], payload)?)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CliArgs {
        config,
        list,
        events,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let factory = Arc::new(EventFactory::new());
    register_builtin_handlers(&factory)?;

    if is_worker_process() {
        init_tracing(&LoggingConfig::default());
    }
    if run_if_worker(Arc::clone(&factory)).await? {
        return Ok(());
    }

    let args: Vec<String> = env::args().collect();
    let cli = parse_args(&args)?;

    let mut config = match &cli.config {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_tracing(&config.logging);

    if cli.list {
        for event_type in factory.event_types() {
            let meta = factory.get_handler_meta(&event_type)?;
            println!("{}\t{}", event_type, meta.location());
        }
        return Ok(());
    }

    let wants_corelets = cli.events.iter().any(|e| e.mode() == ExecutionMode::Corelet);
    if wants_corelets && cli.config.is_none() {
        config.corelet.pool_size = CLI_DEFAULT_POOL_SIZE;
    }

    let started = Instant::now();
    let engine = EventEngine::start(config, Arc::clone(&factory)).await?;

    let mut ids = Vec::with_capacity(cli.events.len());
    for event in cli.events {
        ids.push(engine.publish(event).await?);
    }
    engine.join().await;

    let results = engine.take_results(&ids, ResultFilter::All);
    let failures = results.iter().filter(|r| !r.success).count();
    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }

    let metrics = engine.get_corelet_metrics();
    engine.shutdown(false).await;
    eprintln!(
        "{} event(s), {} failed, {:?} elapsed, corelets: {}",
        results.len(),
        failures,
        started.elapsed(),
        serde_json::to_string(&metrics)?
    );

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
