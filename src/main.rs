use clap::{Arg, Command};
use listing_guard::notify::LogEmailSink;
use listing_guard::worker::{enqueue_fraud_detection, TriggeredBy, Worker};
use listing_guard::{Config, JobQueue, RuleEngine, Store, Topic, ViolationProcessor};
use log::LevelFilter;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("listing-guard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fraud-detection rule engine and job pipeline for marketplace listings")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/listing-guard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .value_name("LISTING_ID")
                .help("Run fraud detection on one listing inline and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("enqueue")
                .long("enqueue")
                .value_name("LISTING_ID")
                .help("Enqueue a fraud-detection job for a listing and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("queue-stats")
                .long("queue-stats")
                .help("Show per-topic job counts and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        let config = Config::default();
        match config.to_file(path) {
            Ok(()) => {
                println!("Default configuration written to: {path}");
                println!("Edit database_path and topic budgets to suit your deployment.");
            }
            Err(e) => {
                eprintln!("Error writing configuration file: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("Configuration OK: {} seed rule(s)", config.seed_rules.len());
        for (i, rule) in config.seed_rules.iter().enumerate() {
            println!("  Rule {}: {} ({})", i + 1, rule.name, rule.rule_type);
        }
        return;
    }

    let store = match Store::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening database: {e}");
            process::exit(1);
        }
    };
    let queue = match JobQueue::new(store.handle(), config.backoff_base_secs) {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("Error initializing job queue: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = seed_rules(&store, &config) {
        eprintln!("Error seeding rules: {e}");
        process::exit(1);
    }

    if matches.get_flag("queue-stats") {
        println!("{:<24} {:>8} {:>8} {:>10} {:>8}", "topic", "queued", "active", "completed", "failed");
        for topic in Topic::ALL {
            match queue.stats(topic) {
                Ok(s) => println!(
                    "{:<24} {:>8} {:>8} {:>10} {:>8}",
                    topic.as_str(),
                    s.queued,
                    s.active,
                    s.completed,
                    s.failed
                ),
                Err(e) => eprintln!("{topic}: {e}"),
            }
        }
        return;
    }

    if let Some(listing_id) = matches.get_one::<String>("enqueue") {
        match enqueue_fraud_detection(&queue, &config, listing_id, TriggeredBy::Update) {
            Ok(job_id) => println!("Enqueued fraud-detection job {job_id} for listing {listing_id}"),
            Err(e) => {
                eprintln!("Error enqueueing job: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(listing_id) = matches.get_one::<String>("scan") {
        scan_listing(&store, listing_id).await;
        return;
    }

    log::info!("Starting listing-guard workers...");
    let worker = Arc::new(Worker::new(
        config,
        store,
        queue,
        Arc::new(LogEmailSink),
    ));
    let shutdown = worker.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, stopping workers...");
        shutdown.store(true, Ordering::Relaxed);
    }) {
        eprintln!("Error setting signal handler: {e}");
        process::exit(1);
    }
    worker.run().await;
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

/// Install the configured rules on first start; once the table has rows the
/// database is the source of truth and the config seeds are ignored.
fn seed_rules(store: &Store, config: &Config) -> anyhow::Result<()> {
    if store.rule_count()? > 0 {
        return Ok(());
    }
    for seed in &config.seed_rules {
        store.insert_rule(
            seed.rule_type,
            &seed.name,
            &seed.description,
            &seed.parameters,
            seed.severity,
            true,
        )?;
        log::info!("Seeded rule '{}' ({})", seed.name, seed.rule_type);
    }
    Ok(())
}

async fn scan_listing(store: &Store, listing_id: &str) {
    let engine = RuleEngine::new(store.clone());
    let violations = match engine.evaluate(listing_id).await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Evaluation failed: {e}");
            process::exit(1);
        }
    };
    if violations.is_empty() {
        println!("Listing {listing_id}: no violations");
        return;
    }
    println!("Listing {listing_id}: {} violation(s)", violations.len());
    for v in &violations {
        println!("  [{}] rule {} -> {}", v.severity.as_str(), v.rule_id, v.rule_type);
        println!("      {}", v.details);
    }
    let processor = ViolationProcessor::new(store.clone());
    match processor.process(listing_id, &violations).await {
        Ok(outcome) => {
            if let Some(status) = outcome.new_status {
                println!("Listing escalated to {}", status.as_str());
            }
            println!("Seller total violations: {}", outcome.total_violations);
            println!("{} effect(s) computed (not dispatched in scan mode)", outcome.effects.len());
            match store.violations_for_listing(listing_id) {
                Ok(trail) => {
                    println!("Violation trail ({} row(s)):", trail.len());
                    for v in trail {
                        let resolution = v
                            .resolution
                            .map(|r| r.as_str())
                            .unwrap_or("unresolved");
                        println!(
                            "  #{} [{}] rule {} at {} ({resolution})",
                            v.id,
                            v.severity.as_str(),
                            v.rule_id,
                            v.created_at.to_rfc3339()
                        );
                    }
                }
                Err(e) => eprintln!("Could not read violation trail: {e}"),
            }
        }
        Err(e) => {
            eprintln!("Processing failed: {e}");
            process::exit(1);
        }
    }
}
