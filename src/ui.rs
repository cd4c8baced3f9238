// src/ui.rs
use crate::config::{Config, ServerConfig}; // Defaults that request fields override, request limits
use crate::error::SimulationError; // Fatal model/config errors reported back as JSON
use crate::logic::Solution; // Integrated time/angle/velocity samples
use crate::simulation::{BobPosition, ModelVariant, Scenario}; // Run inputs and renderer contract
use actix_web::{http::StatusCode, web, HttpResponse, Result}; // Actix-web types for request handling and HTTP responses
use base64::{engine::general_purpose, Engine as _}; // Base64 encoder for embedding image data
use image::ImageFormat; // Image encoding utilities for PNG output
use plotters::prelude::*; // Plotters plotting library prelude
use serde::{Deserialize, Serialize}; // Serde traits for JSON (de)serialization
use std::io::{self, Cursor}; // IO utilities and Cursor for in-memory byte writing
use tracing::{info, warn};

/// Request body; every field is optional and falls back to the server config.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SimParams {
    pub variant: ModelVariant,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub length: Option<f64>,
    pub damping: Option<f64>,
    pub t_end: Option<f64>,
    pub n_points: Option<usize>,
    pub initial_angle: Option<f64>, // Degrees, converted to radians before solving
    pub initial_velocity: Option<f64>,
    pub fps: Option<f64>,
}

impl SimParams {
    fn scenario(&self, config: &Config) -> Scenario {
        let mut scenario = config.scenario(self.variant);
        if let Some(width) = self.width {
            scenario.width = width;
        }
        if let Some(height) = self.height {
            scenario.height = height;
        }
        if let Some(length) = self.length {
            scenario.length = length;
        }
        if let Some(damping) = self.damping {
            scenario.damping = damping;
        }
        if let Some(t_end) = self.t_end {
            scenario.t_end = t_end;
        }
        if let Some(n_points) = self.n_points {
            scenario.samples = n_points;
        }
        if let Some(degrees) = self.initial_angle {
            scenario.initial_angle = degrees.to_radians();
        }
        if let Some(velocity) = self.initial_velocity {
            scenario.initial_velocity = velocity;
        }
        if let Some(fps) = self.fps {
            scenario.fps = fps;
        }
        scenario
    }
}

/// Keeps one request from monopolising a worker: integration cost grows with t_end / max_step and samples.
fn check_limits(scenario: &Scenario, server: &ServerConfig) -> Result<(), SimulationError> {
    if scenario.t_end > server.max_t_end {
        return Err(SimulationError::LimitExceeded {
            field: "t_end",
            value: scenario.t_end,
            limit: server.max_t_end,
        });
    }
    if scenario.samples > server.max_samples {
        return Err(SimulationError::LimitExceeded {
            field: "n_points",
            value: scenario.samples as f64,
            limit: server.max_samples as f64,
        });
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimResponse {
    pub success: bool,               // Whether the simulation succeeded
    pub error: Option<String>,       // Fatal error message when it did not
    pub trajectory_image: String,    // Base64-encoded PNG of θ(t)
    pub animation_data: AnimationData, // Per-sample bob positions for the canvas renderer
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnimationData {
    pub positions: Vec<[f64; 2]>, // Bob centre per trajectory sample, screen coordinates
    pub angles: Vec<f64>,         // Raw angle samples (radians)
    pub origin: [f64; 2],         // Pivot point
    pub width: u32,
    pub height: u32,
    pub length: f64,
    pub fps: f64,
    pub settle_frame: Option<u64>, // Frame on which playback stops, None = loop forever
}

impl SimResponse {
    fn failure(err: &SimulationError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            trajectory_image: String::new(),
            animation_data: AnimationData::default(),
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/simulate", web::post().to(simulate_handler));
}

pub async fn simulate_handler(config: web::Data<Config>, params: web::Json<SimParams>) -> Result<HttpResponse> {
    let scenario = params.scenario(&config);
    info!(variant = ?scenario.variant, samples = scenario.samples, "simulate request");
    if let Err(err) = check_limits(&scenario, &config.server) {
        return Ok(reject(&err));
    }

    // Solve once; the same samples feed the plot and the playback buffer
    let solution = match scenario.solve() {
        Ok(solution) => solution,
        Err(err) => return Ok(reject(&err)),
    };
    let simulation = solution
        .clone()
        .into_trajectory()
        .and_then(|trajectory| scenario.start(trajectory));
    let mut simulation = match simulation {
        Ok(simulation) => simulation,
        Err(err) => return Ok(reject(&err)),
    };

    // Renderer contract: bob = origin + length·(sin θ, cos θ)
    let origin = simulation.origin();
    let positions: Vec<[f64; 2]> = solution
        .angles
        .iter()
        .map(|&angle| {
            let bob = BobPosition::from_angle(origin, scenario.length, angle);
            [bob.x, bob.y]
        })
        .collect();

    // Replay headlessly to find where the settle rule ends playback
    let settle_frame = simulation
        .run_until_settled(config.playback.max_replay_frames)
        .and_then(|frames| frames.last().map(|frame| frame.number));

    // The plot is decorative; a host without fonts still gets the animation data
    let plot_url = render_trajectory_plot(&solution, &scenario).unwrap_or_else(|err| {
        warn!(error = %err, "trajectory plot failed");
        String::new()
    });

    Ok(HttpResponse::Ok().json(SimResponse {
        success: true,
        error: None,
        trajectory_image: plot_url,
        animation_data: AnimationData {
            positions,
            angles: solution.angles,
            origin: [origin.0, origin.1],
            width: scenario.width,
            height: scenario.height,
            length: scenario.length,
            fps: scenario.fps,
            settle_frame,
        },
    }))
}

fn reject(err: &SimulationError) -> HttpResponse {
    warn!(error = %err, "simulation rejected");
    HttpResponse::build(StatusCode::UNPROCESSABLE_ENTITY).json(SimResponse::failure(err))
}

/// Plots θ(t) with the settle window marked and returns it as a PNG data URL.
pub fn render_trajectory_plot(solution: &Solution, scenario: &Scenario) -> io::Result<String> {
    const W: u32 = 640;
    const H: u32 = 360;

    let t_max = solution.times.last().copied().unwrap_or(0.0).max(f64::EPSILON);
    let window = scenario.settle_angle_degrees.to_radians();
    let peak = solution.angles.iter().fold(window, |m, a| m.max(a.abs()));
    let limit = peak * 1.1;

    // Allocate RGB pixel buffer (3 bytes per pixel)
    let mut pixel_buffer = vec![0u8; (W * H * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut pixel_buffer, (W, H)).into_drawing_area();
        root.fill(&WHITE).map_err(io::Error::other)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Angle over time ({:?}, damping {})", scenario.variant, scenario.damping),
                ("sans-serif", 18).into_font(),
            )
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(0.0..t_max, -limit..limit)
            .map_err(io::Error::other)?;

        chart
            .configure_mesh()
            .x_desc("t")
            .y_desc("θ (rad)")
            .draw()
            .map_err(io::Error::other)?;

        if scenario.auto_stop {
            // Settle window edges
            for edge in [window, -window] {
                chart
                    .draw_series(LineSeries::new(
                        [(0.0, edge), (t_max, edge)],
                        BLUE.mix(0.4).stroke_width(1),
                    ))
                    .map_err(io::Error::other)?;
            }
        }

        chart
            .draw_series(LineSeries::new(
                solution.times.iter().copied().zip(solution.angles.iter().copied()),
                RED.mix(0.85).stroke_width(2),
            ))
            .map_err(io::Error::other)?;

        root.present().map_err(io::Error::other)?;
    }

    let img_buffer = image::ImageBuffer::from_raw(W, H, pixel_buffer)
        .ok_or_else(|| io::Error::other("Failed to create image buffer"))?;
    let dynamic_image = image::DynamicImage::ImageRgb8(img_buffer);

    let mut png_buffer = Cursor::new(Vec::new());
    dynamic_image
        .write_to(&mut png_buffer, ImageFormat::Png)
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png_buffer.into_inner())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_defaults() {
        let params = SimParams {
            variant: ModelVariant::Undamped,
            length: Some(120.0),
            initial_angle: Some(90.0),
            n_points: Some(10),
            ..Default::default()
        };
        let scenario = params.scenario(&Config::default());
        assert_eq!(scenario.length, 120.0);
        assert_eq!(scenario.samples, 10);
        assert_eq!(scenario.initial_angle, std::f64::consts::FRAC_PI_2);
        assert_eq!(scenario.t_end, 10.0);
        assert!(!scenario.auto_stop);
    }

    #[test]
    fn oversized_requests_are_refused() {
        let config = Config::default();
        let mut scenario = config.scenario(ModelVariant::Damped);
        assert_eq!(check_limits(&scenario, &config.server), Ok(()));

        scenario.t_end = 1e9;
        assert_eq!(
            check_limits(&scenario, &config.server),
            Err(SimulationError::LimitExceeded {
                field: "t_end",
                value: 1e9,
                limit: 600.0
            })
        );

        scenario.t_end = 30.0;
        scenario.samples = 100_001;
        assert!(matches!(
            check_limits(&scenario, &config.server),
            Err(SimulationError::LimitExceeded { field: "n_points", .. })
        ));
    }

    #[test]
    fn plot_is_a_png_data_url() {
        let scenario = Config::default().scenario(ModelVariant::Undamped);
        let solution = scenario.solve().unwrap();
        // text rendering needs a system font, which minimal hosts may lack
        if let Ok(url) = render_trajectory_plot(&solution, &scenario) {
            assert!(url.starts_with("data:image/png;base64,"));
            assert!(url.len() > 100);
        }
    }
}
