//! RayOS Gaze - intent fusion daemon
//!
//! - `run`: track gaze, read direction commands from stdin, select and act
//! - `calibrate`: guided gaze calibration against the scene targets
//! - `stats`: inspect a saved model

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use rayos_gaze::calibration::{CalibrationPhase, CalibrationSequence};
use rayos_gaze::source::udp_gaze_addr_from_env;
use rayos_gaze::{
    load_scene, CandidateObject, Direction, GazeConfig, GazeRuntime, LoggingExecutor, ModelState,
    Position, SelectionEvent, SimulatedGazeSource, UdpGazeSource,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

#[derive(Parser)]
#[command(name = "rayos-gaze")]
#[command(about = "RayOS Gaze - gaze + joystick intent fusion", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scene description (JSON array of objects); a demo scene is used otherwise
    #[arg(short, long, value_name = "FILE")]
    scene: Option<PathBuf>,

    /// Model file to load at start and save on exit
    #[arg(short, long, value_name = "FILE", default_value = "gaze_model.json")]
    model: PathBuf,

    /// Listen for tracker datagrams here instead of simulating gaze
    /// (falls back to RAYOS_GAZE_UDP_ADDR)
    #[arg(long, value_name = "ADDR")]
    udp: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selection loop
    ///
    /// Reads one command per line from stdin: a direction name (`up`,
    /// `down-left`, ...), raw axes (`0.8 -0.1`), `stats` or `quit`.
    Run,

    /// Calibrate gaze against the scene targets and save the fitted model
    Calibrate,

    /// Print the contents of a saved model
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GazeConfig::load(path)?,
        None => GazeConfig::default(),
    };

    match &cli.command {
        Commands::Stats => print_stats(&config, &cli.model),
        Commands::Run => {
            let scene = scene_from(&cli)?;
            let runtime = start_runtime(&cli, config, scene).await?;
            run_loop(&runtime).await?;
            shutdown(&runtime, &cli.model).await
        }
        Commands::Calibrate => {
            let scene = scene_from(&cli)?;
            let runtime = start_runtime(&cli, config, scene.clone()).await?;
            calibrate(&runtime, scene).await?;
            shutdown(&runtime, &cli.model).await
        }
    }
}

fn scene_from(cli: &Cli) -> Result<Vec<CandidateObject>> {
    match &cli.scene {
        Some(path) => load_scene(path)
            .with_context(|| format!("Failed to load scene {}", path.display())),
        None => {
            log::warn!("No scene given, using the demo scene");
            Ok(demo_scene())
        }
    }
}

fn demo_scene() -> Vec<CandidateObject> {
    vec![
        CandidateObject::new(0, Position::new(-0.5, -0.5, 0.0), "/cup"),
        CandidateObject::new(1, Position::new(0.5, -0.5, 0.0), "/box"),
        CandidateObject::new(2, Position::new(0.0, 0.0, 0.0), "/ball"),
        CandidateObject::new(3, Position::new(-0.5, 0.5, 0.0), "/can"),
        CandidateObject::new(4, Position::new(0.5, 0.5, 0.0), "/block"),
    ]
}

async fn start_runtime(
    cli: &Cli,
    config: GazeConfig,
    scene: Vec<CandidateObject>,
) -> Result<GazeRuntime> {
    log::info!("═══════════════════════════════════════");
    log::info!("  RayOS Gaze - intent fusion");
    log::info!("═══════════════════════════════════════");

    let runtime = GazeRuntime::new(config);

    if cli.model.exists() {
        match ModelState::load(&cli.model) {
            Ok(model) => runtime.restore_model(&model),
            Err(e) => log::warn!("Ignoring model {}: {}", cli.model.display(), e),
        }
    }

    let fixations: Vec<Position> = scene.iter().map(|o| o.position).collect();
    runtime.update_candidates(scene);

    let (tx, rx) = crossbeam_channel::unbounded::<SelectionEvent>();
    runtime.set_selection_sink(tx);
    std::thread::spawn(move || {
        for event in rx {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => log::warn!("Failed to encode selection: {e}"),
            }
        }
    });

    match cli.udp.or_else(udp_gaze_addr_from_env) {
        Some(addr) => {
            let source = UdpGazeSource::bind(addr, runtime.clock()).await?;
            runtime.spawn_pipeline(source);
        }
        None => {
            log::warn!("No gaze tracker configured, using simulated gaze");
            let period = Duration::from_millis(runtime.config().runtime.sample_period_ms.max(1));
            let source = SimulatedGazeSource::new(runtime.clock(), period, &fixations, 2.0);
            runtime.spawn_pipeline(source);
        }
    }

    log::info!("Calibration: {:?}", runtime.calibration_status());
    Ok(runtime)
}

fn ctrlc_channel() -> Result<tokio::sync::mpsc::Receiver<()>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal...");
        let _ = tx.blocking_send(());
    })?;
    Ok(rx)
}

/// Direction name or two raw axes
fn parse_axes(line: &str) -> Option<(f64, f64)> {
    if let Some(direction) = Direction::from_name(line) {
        return Some(direction.axes());
    }
    let mut parts = line.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((x, y))
}

async fn run_loop(runtime: &GazeRuntime) -> Result<()> {
    let mut ctrlc_rx = ctrlc_channel()?;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let executor = LoggingExecutor;

    log::info!("Enter directions (up, down-left, \"0.8 0.0\"), `stats` or `quit`; Ctrl+C to exit");

    loop {
        let line = tokio::select! {
            _ = ctrlc_rx.recv() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            log::info!("Input closed");
            break;
        };

        match line.trim() {
            "" => {}
            "quit" | "exit" => break,
            "stats" => {
                for stats in runtime.with_state(|s| s.agent.object_stats()) {
                    log::info!(
                        "{}: {} looks, mean Q {:.3}, max Q {:.3}, prefers {}",
                        stats.object,
                        stats.gaze_count,
                        stats.mean_value,
                        stats.max_value,
                        stats.preferred_direction
                    );
                }
            }
            cmd => match parse_axes(cmd) {
                Some((x, y)) => {
                    if runtime.handle_direction(x, y, &executor).await.is_none() {
                        log::info!("No object selected");
                    }
                }
                None => log::warn!("Unrecognized command: {cmd}"),
            },
        }
    }
    Ok(())
}

async fn calibrate(runtime: &GazeRuntime, scene: Vec<CandidateObject>) -> Result<()> {
    let mut ctrlc_rx = ctrlc_channel()?;
    let clock = runtime.clock();
    let names: Vec<(rayos_gaze::ObjectId, String)> =
        scene.iter().map(|o| (o.id, o.name.clone())).collect();
    let mut sequence = CalibrationSequence::new(
        runtime.config().calibration.sequence.clone(),
        scene,
        runtime.raw_feed(),
    );

    let mut progress = sequence.start(clock.now(), &mut runtime.calibration().write());
    let mut announced = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    while !sequence.is_finished() {
        tokio::select! {
            _ = ctrlc_rx.recv() => {
                sequence.cancel();
                log::warn!("Calibration aborted");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        if progress.target != announced {
            if let Some(target) = progress.target {
                let name = names
                    .iter()
                    .find(|(id, _)| *id == target)
                    .map(|(_, n)| n.as_str())
                    .unwrap_or("?");
                log::info!(
                    "Look at {} ({}/{})",
                    name,
                    progress.target_index.map_or(0, |i| i + 1),
                    progress.total_targets
                );
            }
            announced = progress.target;
        }

        progress = sequence.tick(clock.now(), &mut runtime.calibration().write());
    }

    match progress.phase {
        CalibrationPhase::Completed => log::info!(
            "Calibration complete: {:?}",
            runtime.calibration_status()
        ),
        _ => log::warn!(
            "Calibration failed ({} of {} targets accepted)",
            progress.accepted_targets,
            progress.total_targets
        ),
    }
    Ok(())
}

async fn shutdown(runtime: &GazeRuntime, model: &Path) -> Result<()> {
    runtime.shutdown().await;
    let dropped = runtime.dropped_samples();
    if dropped > 0 {
        log::info!("{dropped} gaze samples dropped under backpressure");
    }
    runtime.model_state().save(model)?;
    log::info!("Goodbye!");
    Ok(())
}

fn print_stats(config: &GazeConfig, model_path: &Path) -> Result<()> {
    let model = ModelState::load(model_path)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;

    let runtime = GazeRuntime::new(config.clone());
    runtime.restore_model(&model);

    println!("Model: {}", model_path.display());
    println!("Calibration: {:?}", runtime.calibration_status());
    println!("Parameters: {:?}", model.params);
    println!();
    println!("{:>6}  {:>8}  {:>8}  {:<10}", "object", "mean Q", "max Q", "prefers");

    for (id, row) in model.q_table.iter().enumerate() {
        if row.iter().all(|v| *v == 0.0) {
            continue;
        }
        let mean = row.iter().sum::<f64>() / row.len() as f64;
        let mut best = 0;
        for (j, v) in row.iter().enumerate() {
            if *v > row[best] {
                best = j;
            }
        }
        let preferred = Direction::from_index(best).map_or("?", |d| d.as_str());
        println!("{:>6}  {:>8.3}  {:>8.3}  {:<10}", id, mean, row[best], preferred);
    }
    Ok(())
}
