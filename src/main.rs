mod curation;
mod db;
mod error;
mod settings;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use curation::classify::ContentRules;
use curation::report::Report;
use db::SqliteStore;
use settings::CurationConfig;
use store::CurationStore;

#[derive(Parser)]
#[command(name = "tos_curator", about = "Terms of Service corpus curation")]
struct Cli {
    /// Config file (default: ./curation.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and tables
    Init,
    /// Show corpus counts
    Stats,
    /// Classify companies and list defective documents without changing anything
    Scan {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset documents whose content is fabricated, placeholder or generic
    Clean {
        /// Only list what would be reset
        #[arg(long)]
        dry_run: bool,
    },
    /// Cascade-reset specific documents by id
    Reset {
        #[arg(required = true)]
        document_ids: Vec<i64>,
    },
    /// Reset every configured meta domain
    ResetMeta,
    /// Finish interrupted resets and fix inconsistent content columns
    Repair,
    /// Full curation pass: repair, meta resets, clean, classify
    Run {
        /// Classify only; no store writes
        #[arg(long)]
        dry_run: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = CurationConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Init => {
            SqliteStore::create(&cfg.database_path)
                .with_context(|| format!("Failed to create {:?}", cfg.database_path))?;
            println!("Initialized {}", cfg.database_path.display());
            Ok(())
        }
        Commands::Stats => {
            let store = open(&cfg)?;
            let s = store.corpus_stats()?;
            println!("Companies:     {}", s.companies);
            println!("Documents:     {}", s.documents);
            println!("With content:  {}", s.with_content);
            println!("Analyzed:      {}", s.analyzed);
            println!("Analyses:      {}", s.analyses);
            println!("Partial state: {}", s.partial);
            Ok(())
        }
        Commands::Scan { json } => {
            let store = open(&cfg)?;
            let report = pass(&store, &cfg, true)?;
            print_report(&report, json)
        }
        Commands::Clean { dry_run } => {
            let store = open(&cfg)?;
            let rules = rules(&cfg)?;
            let corpus = store.fetch_corpus()?;
            let pb = progress_bar();
            let outcome = curation::scan::clean_defective(&store, &corpus, &rules, dry_run, &pb);
            pb.finish_and_clear();
            if dry_run {
                println!(
                    "Examined {} documents; {} would be reset.",
                    outcome.examined,
                    outcome.would_reset.len()
                );
                for (id, defect) in &outcome.would_reset {
                    println!("  document {:>6}  {}", id, defect);
                }
            } else {
                println!(
                    "Examined {} documents; reset {} fabricated, {} placeholder, {} generic ({} analyses deleted).",
                    outcome.examined,
                    outcome.fabricated,
                    outcome.placeholder,
                    outcome.generic,
                    outcome.analyses_deleted
                );
            }
            print_failures(&outcome.failures);
            Ok(())
        }
        Commands::Reset { document_ids } => {
            let store = open(&cfg)?;
            let mut failures = Vec::new();
            for id in document_ids {
                match curation::reset::reset_document(&store, id) {
                    Ok(c) if c.documents_reset == 0 => println!("document {}: not found", id),
                    Ok(c) => println!(
                        "document {}: reset ({} analyses deleted)",
                        id, c.analyses_deleted
                    ),
                    Err(f) => failures.push(f),
                }
            }
            print_failures(&failures);
            Ok(())
        }
        Commands::ResetMeta => {
            let store = open(&cfg)?;
            if cfg.meta_domains.is_empty() {
                println!("No meta domains configured.");
                return Ok(());
            }
            let outcome = curation::meta::reset_meta(&store, &cfg.meta_domains);
            for e in &outcome.entries {
                println!("{:<32} {:?}", e.domain, e.status);
            }
            print_failures(&outcome.failures);
            Ok(())
        }
        Commands::Repair => {
            let store = open(&cfg)?;
            let r = curation::repair::repair(&store)?;
            println!("Interrupted resets finished: {}", r.interrupted_resets);
            println!("Partial nulls cleared:       {}", r.partial_nulls);
            println!("Lengths corrected:           {}", r.lengths_corrected);
            print_failures(&r.failures);
            Ok(())
        }
        Commands::Run { dry_run, json } => {
            let store = open(&cfg)?;
            let report = pass(&store, &cfg, dry_run)?;
            print_report(&report, json)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open(cfg: &CurationConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::connect(&cfg.database_path)
        .with_context(|| format!("Cannot open curation store {:?}", cfg.database_path))
}

fn rules(cfg: &CurationConfig) -> anyhow::Result<ContentRules> {
    ContentRules::from_config(cfg).context("Invalid indicator phrases")
}

fn pass(store: &SqliteStore, cfg: &CurationConfig, dry_run: bool) -> anyhow::Result<Report> {
    let rules = rules(cfg)?;
    let pb = progress_bar();
    let report = curation::run_pass(store, cfg, &rules, dry_run, &pb)?;
    pb.finish_and_clear();
    Ok(report)
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

fn print_failures(failures: &[curation::reset::Failure]) {
    if failures.is_empty() {
        return;
    }
    println!("\n{} failures:", failures.len());
    for f in failures {
        let action = if f.needs_manual {
            "needs manual remediation"
        } else {
            "will retry next pass"
        };
        println!("  {} ({:?}): {} -> {}", f.target, f.step, f.error, action);
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
