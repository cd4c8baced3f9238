use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use pendulum_sim::config::Config;
use pendulum_sim::settle::SettleSignal;
use pendulum_sim::simulation::ModelVariant;
use pendulum_sim::ui;

#[derive(Parser, Debug)]
#[command(name = "pendulum-sim")]
#[command(author, version, about = "Lagrangian pendulum simulator with looping playback")]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Play one simulation in the terminal instead of serving HTTP
    #[arg(long)]
    headless: bool,

    /// Model variant for headless playback
    #[arg(long, value_enum, default_value = "damped")]
    variant: ModelVariant,

    /// Playback frame rate
    #[arg(long)]
    fps: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pendulum_sim=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(fps) = args.fps {
        config.playback.fps = fps;
    }

    if args.headless {
        play(&config, args.variant).await
    } else {
        serve(config).await
    }
}

/// Frame loop paced by a tokio interval; stops on the settle rule or Ctrl-C.
async fn play(config: &Config, variant: ModelVariant) -> Result<()> {
    let scenario = config.scenario(variant);
    let mut simulation = scenario.build().context("Failed to prepare simulation")?;
    info!(?variant, samples = simulation.playback().len(), fps = scenario.fps, "starting playback");

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / scenario.fps));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(frames = simulation.frames(), "interrupted");
                break;
            }
            _ = ticker.tick() => {
                let frame = simulation.tick();
                debug!(frame = frame.number, angle = frame.angle, x = frame.bob.x, y = frame.bob.y, "frame");
                if frame.signal == SettleSignal::Stop {
                    info!(frames = frame.number, "simulation ended");
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let address = (config.server.bind.clone(), config.server.port);
    let static_dir = config.server.static_dir.clone();
    info!("Serving on http://{}:{}", address.0, address.1);

    let data = web::Data::new(config);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(ui::routes)
            .service(Files::new("/", static_dir.clone()).index_file("index.html"))
    })
    .bind(address)
    .context("Failed to bind HTTP server")?
    .run()
    .await?;
    Ok(())
}
