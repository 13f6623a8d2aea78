//! evangelio-rs: daily liturgical readings with multi-voice narration.

mod audio;
mod config;
mod gemini;
mod model;
mod orchestrator;
mod player;
mod script;
mod server;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::gemini::GeminiClient;
use crate::model::LiturgicalDay;
use crate::orchestrator::{DisplayState, Orchestrator, Phase};
use crate::store::AudioStore;

#[derive(Parser, Debug)]
#[command(name = "evangelio-rs", about = "Daily Catholic readings with narrated audio")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Date to fetch (YYYY-MM-DD); defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Write the narration WAV to this path
    #[arg(short, long)]
    save: Option<PathBuf>,

    /// Play the narration on the default output device
    #[arg(short, long)]
    play: bool,

    /// Run the local HTTP API instead of a one-shot fetch
    #[arg(long)]
    serve: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy HTTP internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info,symphonia=warn")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn,symphonia=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("evangelio-rs starting");

    let config = config::Config::load(args.config.as_deref());
    info!(
        "Models: text={}, tts={}",
        config.gemini.text_model, config.gemini.tts_model
    );

    let client = GeminiClient::new(config.gemini.clone())?;
    let orchestrator = Arc::new(Orchestrator::new(
        client.clone(),
        client,
        AudioStore::new(),
        &config,
    ));

    let date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    if args.serve || config.server.enabled {
        // Present today's readings on startup, like a fresh page load
        let startup = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            startup.present(date).await;
        });

        let api_state = server::ApiState {
            orchestrator: Arc::clone(&orchestrator),
        };
        server::serve(api_state, config.server.port).await?;
        orchestrator.teardown();
        return Ok(());
    }

    orchestrator.present(date).await;
    let state = orchestrator.state();
    print_state(&state);

    if state.phase == Phase::Complete {
        let clip = state
            .readings
            .as_ref()
            .and_then(|day| day.audio.as_ref())
            .and_then(|handle| orchestrator.store().get(handle.id));

        match clip {
            Some(wav) => {
                if let Some(path) = &args.save {
                    tokio::fs::write(path, wav.as_slice()).await?;
                    info!("Saved narration to {}", path.display());
                }
                if args.play {
                    player::play_wav(wav.as_ref().clone()).await?;
                }
            }
            None if args.save.is_some() || args.play => {
                warn!("No narration audio was generated for {date}");
            }
            None => {}
        }
    }

    orchestrator.teardown();
    let (created, released) = orchestrator.store().totals();
    debug!("Audio clips created: {created}, released: {released}");

    if state.phase == Phase::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_state(state: &DisplayState) {
    println!("{}", state.title);
    println!();

    if let Some(error) = &state.error {
        eprintln!("{error}");
        return;
    }

    if let Some(day) = &state.readings {
        print_day(day);
    }
}

fn print_day(day: &LiturgicalDay) {
    let mut header = format!("{} - {}", day.date.format("%Y-%m-%d"), day.label);
    if let Some(cycle) = day.sunday_cycle {
        header.push_str(&format!(" (Ciclo {cycle:?})"));
    }
    if let Some(cycle) = day.weekday_cycle {
        header.push_str(&format!(" (Año {cycle:?})"));
    }
    println!("{header}");
    println!("{} · {}", day.season.label(), day.celebration.label());

    for (title, reading) in day.readings() {
        println!();
        println!("## {title} ({})", reading.citation);
        println!("{}", reading.text.trim());
    }

    match &day.audio {
        Some(handle) => println!("\n[audio: {}]", handle.url),
        None => println!("\n[audio: no disponible]"),
    }
}
