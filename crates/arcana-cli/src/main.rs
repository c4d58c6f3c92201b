use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use arcana_core::{draw, CatalogRegistry, DrawnCard, RitualSeed, StructuralGate};
use arcana_runtime::{
    LocalComposer, ReadingRequest, ReadingService, RitualInputs, RuntimeConfig,
};

#[derive(Parser)]
#[command(name = "arcana", about = "Ritual-seeded tarot readings with structural gating")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Ritual inputs shared by every subcommand. The same inputs always
/// reproduce the same draw.
#[derive(Args)]
struct RitualArgs {
    /// Deck id
    #[arg(long, default_value = "rws")]
    deck: String,

    /// Spread key
    #[arg(long, default_value = "three-card")]
    spread: String,

    /// The querent's question
    #[arg(long)]
    question: String,

    /// Knock timestamp in unix millis; repeat in ritual order
    #[arg(long = "knock", required = true)]
    knocks: Vec<i64>,

    /// Where the querent cut the deck
    #[arg(long)]
    cut: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the deterministic draw for a ritual
    Draw {
        #[command(flatten)]
        ritual: RitualArgs,
    },

    /// Generate a full offline reading via the local composer
    Read {
        #[command(flatten)]
        ritual: RitualArgs,

        /// Per-attempt generation timeout (e.g. "45s")
        #[arg(long, default_value = "45s", value_parser = humantime::parse_duration)]
        timeout: Duration,

        /// User id for quota accounting
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Run the structural gate over a narrative file
    Gate {
        #[command(flatten)]
        ritual: RitualArgs,

        /// Narrative text file to check
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Draw { ritual } => cmd_draw(ritual, cli.json),
        Commands::Read {
            ritual,
            timeout,
            user,
        } => cmd_read(ritual, *timeout, user, cli.json).await,
        Commands::Gate { ritual, file } => cmd_gate(ritual, file, cli.json),
    }
}

/// Reconstruct the draw a ritual produces.
fn draw_for(
    registry: &CatalogRegistry,
    ritual: &RitualArgs,
) -> Result<(RitualSeed, Vec<DrawnCard>)> {
    let deck = registry.deck(&ritual.deck)?;
    let spread = registry.spread(&ritual.spread)?;

    let seed = RitualSeed::new(
        ritual.knocks.clone(),
        ritual.cut,
        ritual.question.clone(),
        ritual.deck.clone(),
    );
    let drawn = draw::draw(&seed, deck, spread)?;
    Ok((seed, drawn))
}

#[derive(Serialize)]
struct DrawReport<'a> {
    seed: u64,
    deck: &'a str,
    spread: &'a str,
    cards: &'a [DrawnCard],
}

fn cmd_draw(ritual: &RitualArgs, json: bool) -> Result<()> {
    let registry = CatalogRegistry::builtin()?;
    let (seed, drawn) = draw_for(&registry, ritual)?;

    if json {
        let report = DrawReport {
            seed: seed.value(),
            deck: &ritual.deck,
            spread: &ritual.spread,
            cards: &drawn,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("seed: {}", seed.value());
    for dc in &drawn {
        println!(
            "{}. {} — {} ({})",
            dc.index + 1,
            dc.position.label,
            dc.card.name,
            dc.orientation
        );
    }
    Ok(())
}

async fn cmd_read(ritual: &RitualArgs, timeout: Duration, user: &str, json: bool) -> Result<()> {
    let service = ReadingService::builder()
        .registry(Arc::new(CatalogRegistry::builtin()?))
        .backend(Arc::new(LocalComposer::new()))
        .config(RuntimeConfig {
            attempt_timeout: timeout,
            ..RuntimeConfig::default()
        })
        .build()?;

    let request = ReadingRequest {
        user_id: user.to_string(),
        deck_id: ritual.deck.clone(),
        spread_key: ritual.spread.clone(),
        question: ritual.question.clone(),
        ritual: RitualInputs {
            knock_events: ritual.knocks.clone(),
            cut_index: ritual.cut,
        },
        references: Vec::new(),
    };

    let reading = service
        .generate(request, CancellationToken::new(), None)
        .await
        .context("reading failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reading)?);
        return Ok(());
    }

    println!("{}", reading.narrative_text);
    eprintln!(
        "--- reading {} via {} ---",
        reading.id,
        reading.accepted_backend_id.as_deref().unwrap_or("none")
    );
    Ok(())
}

fn cmd_gate(ritual: &RitualArgs, file: &std::path::Path, json: bool) -> Result<()> {
    let registry = CatalogRegistry::builtin()?;
    let deck = registry.deck(&ritual.deck)?;
    let spread = registry.spread(&ritual.spread)?;
    let (_, drawn) = draw_for(&registry, ritual)?;

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let gate = StructuralGate::default();
    let result = gate.evaluate(&text, &drawn, spread, deck);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "coverage {:.2}, hallucinations {}, spine {:.2}",
            result.metrics.coverage_ratio,
            result.metrics.hallucination_count,
            result.metrics.spine_completion_ratio
        );
        for issue in &result.issues {
            println!("[{:?}] {:?}: {}", issue.severity, issue.check, issue.detail);
        }
    }

    if !result.passed {
        bail!("structural gate failed");
    }
    if !json {
        println!("passed");
    }
    Ok(())
}
