//! Example: simulated gaze on one object, then a few joystick commands

use anyhow::Result;
use rayos_gaze::{
    CandidateObject, GazeConfig, GazeRuntime, LoggingExecutor, Position, SimulatedGazeSource,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let runtime = GazeRuntime::new(GazeConfig::default());
    runtime.update_candidates(vec![
        CandidateObject::new(0, Position::new(-0.5, 0.0, 0.0), "/cup"),
        CandidateObject::new(1, Position::new(0.5, 0.0, 0.0), "/box"),
    ]);

    // Stare at the box, with a slightly shaky tracker
    let source = SimulatedGazeSource::new(
        runtime.clock(),
        Duration::from_millis(33),
        &[Position::new(0.5, 0.0, 0.0)],
        10.0,
    )
    .with_jitter(0.05);
    runtime.spawn_pipeline(source);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    for (x, y) in [(1.0, 0.0), (0.0, -1.0), (-0.7, 0.7)] {
        match runtime.handle_direction(x, y, &LoggingExecutor).await {
            Some(event) => println!(
                "({x}, {y}) -> {} [{}] p={:.3}",
                event.name, event.direction, event.probability
            ),
            None => println!("({x}, {y}) -> nothing"),
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
    }

    runtime.shutdown().await;
    Ok(())
}
