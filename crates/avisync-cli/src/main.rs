use std::sync::Arc;

use anyhow::{bail, Result};
use avisync_core::EntityKind;
use avisync_storage::ReferenceStore;
use avisync_sync::{
    connect_store, pipeline_from_config, FirstLoadOutcome, PassSummary, SyncConfig, SyncScheduler,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "avisync")]
#[command(about = "Aviation reference data sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one pass per entity type and exit.
    Sync {
        /// Limit the run to these entity types (repeatable).
        #[arg(long = "entity", value_name = "KIND")]
        entities: Vec<EntityKind>,
    },
    /// Apply migrations, then load every empty table.
    Migrate,
    /// Keep syncing on an interval until Ctrl-C or SIGTERM.
    Schedule,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn print_summary(summary: &PassSummary) {
    println!(
        "{}: fetched={} existing={} inserted={} run_id={}",
        summary.entity, summary.fetched, summary.existing, summary.inserted, summary.run_id
    );
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync { entities: Vec::new() }) {
        Commands::Sync { entities } => {
            let store = Arc::new(connect_store(&config).await?);
            let pipeline = pipeline_from_config(&config, store.clone()).await?;
            let outcomes = if entities.is_empty() {
                pipeline.run_once().await
            } else {
                pipeline.run_kinds(&entities).await
            };
            store.close().await;

            let mut failed = 0usize;
            for (kind, outcome) in &outcomes {
                match outcome {
                    Ok(summary) => print_summary(summary),
                    Err(err) => {
                        failed += 1;
                        eprintln!("{kind}: failed: {err}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} sync passes failed", outcomes.len());
            }
        }
        Commands::Migrate => {
            let store = Arc::new(connect_store(&config).await?);
            store.migrate().await?;
            info!("migrations applied");

            let pipeline = pipeline_from_config(&config, store.clone()).await?;
            let outcomes = pipeline.first_load_all().await;
            store.close().await;

            let mut failed = 0usize;
            for (kind, outcome) in &outcomes {
                match outcome {
                    Ok(FirstLoadOutcome::Loaded(summary)) => print_summary(summary),
                    Ok(FirstLoadOutcome::Skipped { existing_rows }) => {
                        println!("{kind}: skipped, {existing_rows} rows present");
                    }
                    Err(err) => {
                        failed += 1;
                        eprintln!("{kind}: first load failed: {err}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} first loads failed", outcomes.len());
            }
        }
        Commands::Schedule => {
            let store = Arc::new(connect_store(&config).await?);
            let pipeline = pipeline_from_config(&config, store).await?;
            let scheduler = SyncScheduler::new(pipeline, config.shutdown_grace());

            let token = scheduler.cancellation_token();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                info!("shutdown signal received");
                token.cancel();
            });
            scheduler.run_until_cancelled().await?;
        }
    }

    Ok(())
}
