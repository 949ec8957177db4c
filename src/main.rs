//! link-probe
//!
//! Attaches to a running voice client's link segment and walks a listener
//! around a circle, so positional audio can be checked without the game.

use anyhow::{Context, Result};
use clap::Parser;
use positional_link::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "link-probe", version, about = "Drive the MumbleLink segment with a test listener")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of updates to publish
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Updates per second
    #[arg(long, default_value_t = 60)]
    rate: u32,

    /// Orbit radius in host world units
    #[arg(long, default_value_t = 16.0)]
    radius: f32,

    /// Context token shared with other players
    #[arg(long)]
    context: Option<String>,

    /// Identity string for this player
    #[arg(long)]
    identity: Option<String>,

    /// Log level filter
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,
}

/// Listener walking counter-clockwise around a fixed centre, facing along its path
#[derive(Debug, Clone)]
struct OrbitingListener {
    centre: Vec3,
    radius: f32,
    angle: f32,
}

impl OrbitingListener {
    /// Radians per second
    const ANGULAR_SPEED: f32 = 0.5;

    fn new(centre: Vec3, radius: f32) -> Self {
        Self {
            centre,
            radius,
            angle: 0.0,
        }
    }

    fn advance(&mut self, dt: f32) {
        self.angle = (self.angle + Self::ANGULAR_SPEED * dt) % std::f32::consts::TAU;
    }
}

impl Listener for OrbitingListener {
    fn position(&self) -> Vec3 {
        self.centre + Vec3::new(self.angle.cos(), self.angle.sin(), 0.0) * self.radius
    }

    fn front(&self) -> Vec3 {
        Vec3::new(-self.angle.sin(), self.angle.cos(), 0.0)
    }

    fn up(&self) -> Vec3 {
        Vec3::new(0.0, 0.0, 1.0)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    if cli.verbose {
        cli.log_level = "debug".to_string();
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .init();

    let config = match &cli.config {
        Some(path) => LinkConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LinkConfig::default(),
    };

    let mut link = PositionalLink::with_config(config);
    if !link.attach() {
        warn!(
            "No voice client link segment at {}; positional audio unavailable",
            link.segment_name()
        );
        return Ok(());
    }

    if let Some(context) = &cli.context {
        link.set_context(context);
    }
    if let Some(identity) = &cli.identity {
        link.set_identity(identity);
    }

    let rate = cli.rate.max(1);
    let period = Duration::from_secs_f64(1.0 / f64::from(rate));
    let mut interval = tokio::time::interval(period);
    let mut listener = OrbitingListener::new(Vec3::new(256.0, 256.0, 32.0), cli.radius);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Publishing {} updates at {} Hz to {}", cli.ticks, rate, link.segment_name());

    for tick in 0..cli.ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted after {} updates", tick);
                break;
            }
        }

        listener.advance(period.as_secs_f32());
        link.update(Some(&listener));

        if tick % u64::from(rate) == 0 {
            let p = listener.position();
            info!("tick {}: listener at ({:.1}, {:.1}, {:.1})", tick, p.x, p.y, p.z);
        }
    }

    link.release();
    info!("Done");
    Ok(())
}
