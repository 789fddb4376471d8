//! `seqlab`: load an apparatus snapshot (spec §6.3) and either validate it,
//! discover instruments onto it, or run its sequence to completion.
//!
//! Grounded on `crates/bin/src/main.rs`'s `clap::Parser` + `Subcommand`
//! shape and its `#[tokio::main]` + `tracing_subscriber::fmt` setup; this
//! workspace's instrument stack is mock-only (no physical bus driver ships
//! by default, mirroring the teacher's own `serial`/hardware features being
//! off unless explicitly enabled), so `run` and `discover` always go through
//! `MockTransport` here rather than auto-detecting real hardware.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seqlab_apparatus::Apparatus;
use seqlab_instruments::models::{demo_dmm, demo_lockin, demo_source};
use seqlab_instruments::ModelRegistry;
use seqlab_runtime::{executor, snapshot, Controller};
use seqlab_transport::{MockTransport, Transport};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "seqlab")]
#[command(about = "Laboratory experiment sequence controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover instruments over the bus and write a fresh snapshot.
    Discover {
        /// Path to write the apparatus snapshot to.
        #[arg(long)]
        out: PathBuf,
    },
    /// Check a snapshot's structural invariants without running it.
    Validate {
        /// Path to an apparatus snapshot.
        snapshot: PathBuf,
    },
    /// Load a snapshot and run its sequence once.
    Run {
        /// Path to an apparatus snapshot.
        snapshot: PathBuf,
    },
}

/// The registry every mock run/discover consults: the two demonstration
/// models this workspace ships (spec §9 Open Question: real device tables
/// are out of scope without a physical bus to test against).
fn demo_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(demo_dmm());
    registry.register(demo_source());
    registry.register(demo_lockin());
    registry
}

/// A bench of one simulated instrument per demo model, addressed
/// `MOCK0`..`MOCKn`, standing in for whatever is physically present.
async fn demo_bench() -> MockTransport {
    let transport = MockTransport::new();
    transport.add_instrument("MOCK0", "DEMO,DMM-1000,SN1,1.0").await;
    transport.add_instrument("MOCK1", "DEMO,SRC-1,SN2,1.0").await;
    transport.add_instrument("MOCK2", "DEMO,LOCKIN-1,SN3,1.0").await;
    transport
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Discover { out } => discover(out).await,
        Commands::Validate { snapshot } => validate(snapshot).await,
        Commands::Run { snapshot } => run(snapshot).await,
    }
}

async fn discover(out: PathBuf) -> Result<()> {
    let transport = demo_bench().await;
    let registry = demo_registry();
    let mut apparatus = Apparatus::new();
    apparatus
        .find_instruments(&transport, &registry)
        .await
        .context("discovery failed")?;
    info!(found = apparatus.instruments().len(), "discovered instruments");
    snapshot::save(&out, &apparatus)
        .await
        .context("failed to write snapshot")?;
    println!("wrote {} instrument(s) to {}", apparatus.instruments().len(), out.display());
    Ok(())
}

async fn validate(path: PathBuf) -> Result<()> {
    let registry = demo_registry();
    let apparatus = snapshot::load(&path, &registry)
        .await
        .context("failed to load snapshot")?;
    if !apparatus.names_unique() {
        anyhow::bail!("instrument names are not unique");
    }
    if !apparatus.loops_well_formed() {
        anyhow::bail!("loop/loop-end pairing is not well-formed");
    }
    let plan = apparatus.column_plan();
    println!("{} step(s), {} column(s):", apparatus.steps().len(), plan.len());
    for header in &plan {
        println!("  {header}");
    }
    Ok(())
}

async fn run(path: PathBuf) -> Result<()> {
    let registry = demo_registry();
    let apparatus = snapshot::load(&path, &registry)
        .await
        .context("failed to load snapshot")?;
    if !apparatus.loops_well_formed() {
        anyhow::bail!("loop/loop-end pairing is not well-formed");
    }

    let transport = demo_bench().await;
    let (controller, writer) = Controller::new();

    let ctrl_c = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("abort requested");
            ctrl_c.abort();
        }
    });

    let finished = executor::run(apparatus, &transport, &controller)
        .await
        .context("sequence execution failed")?;
    info!(steps = finished.steps().len(), "sequence finished");

    controller.kill();
    writer.await.ok();
    Ok(())
}
