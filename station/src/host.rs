use std::{
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::Mutex,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use weather_common::{
    sample, summary, ClimateReading, ClimateSensor, CycleOutcome, DisplayFrame, PressureSensor,
    ReportError, ReportTemplate, SamplingSchedule, SensorError, StationConfig, WeatherHistory,
    ROUTE_READ, TEMPLATE_FILE,
};

const HOST_HTTP_PORT: u16 = 8080;
const DEFAULT_CONFIG_PATH: &str = "./.weather/station.json";

#[derive(Clone)]
struct AppState {
    history: Arc<Mutex<WeatherHistory>>,
    template_path: Arc<PathBuf>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("WEATHER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = match load_config(&config_path).await {
        Ok(Some(config)) => config,
        Ok(None) => host_defaults(),
        Err(err) => {
            warn!(
                "failed to load station config from {}: {err:#}",
                config_path.display()
            );
            host_defaults()
        }
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    let state = AppState {
        history: Arc::new(Mutex::new(WeatherHistory::new(
            config.sampling.history_capacity,
        ))),
        template_path: Arc::new(PathBuf::from(&config.report.template_path)),
    };

    match load_report_template(&state.template_path).await {
        Ok(template) => {
            for token in template.missing_placeholders() {
                warn!("report template has no {token} placeholder");
            }
        }
        Err(err) => warn!("{err}; {ROUTE_READ} will answer 500 until it is readable"),
    }

    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], config.network.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind station server at {addr}"))?;

    let simulate_failure_every = std::env::var("WEATHER_SIMULATE_CLIMATE_FAILURE_EVERY")
        .ok()
        .and_then(|value| value.parse::<u64>().ok());

    let shown_address = reachable_address(addr).await;
    info!("station reachable at http://{shown_address}{ROUTE_READ}");

    spawn_sampling_loop(
        state.clone(),
        SamplingSchedule::from_config(&config.sampling),
        shown_address.to_string(),
        SimulatedBarometer::default(),
        SimulatedClimate::new(simulate_failure_every),
    );

    info!(
        "station listening on http://{addr}{ROUTE_READ}, sampling every {}ms",
        config.sampling.interval_ms
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(ROUTE_READ, get(handle_read))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn spawn_sampling_loop<P, C>(
    state: AppState,
    schedule: SamplingSchedule,
    address: String,
    mut barometer: P,
    mut climate: C,
) where
    P: PressureSensor + Send + 'static,
    C: ClimateSensor + Send + 'static,
{
    tokio::spawn(async move {
        let mut display = ConsoleDisplay::default();
        let mut interval = tokio::time::interval(schedule.interval());

        loop {
            interval.tick().await;
            run_cycle(
                &state.history,
                &mut barometer,
                &mut climate,
                &mut display,
                &address,
            )
            .await;
        }
    });
}

async fn run_cycle<P, C>(
    history: &Mutex<WeatherHistory>,
    barometer: &mut P,
    climate: &mut C,
    display: &mut ConsoleDisplay,
    address: &str,
) -> CycleOutcome
where
    P: PressureSensor,
    C: ClimateSensor,
{
    let outcome = sample(barometer, climate);
    if outcome.is_complete() {
        info!("{}", summary(&outcome));
    } else {
        warn!("{}", summary(&outcome));
    }

    history.lock().await.record(&outcome);
    display.present(&DisplayFrame::for_cycle(address, &outcome));
    outcome
}

async fn handle_read(State(state): State<AppState>) -> Response {
    info!("HTTP GET {ROUTE_READ}");

    let template = match load_report_template(&state.template_path).await {
        Ok(template) => template,
        Err(err) => {
            warn!("report generation failed: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
        }
    };

    let snapshot = { state.history.lock().await.snapshot() };
    Html(template.render(&snapshot)).into_response()
}

async fn load_report_template(path: &Path) -> Result<ReportTemplate, ReportError> {
    let display = path.display().to_string();
    let html = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ReportError::TemplateUnavailable {
            path: display.clone(),
            reason: err.to_string(),
        })?;
    ReportTemplate::from_contents(&display, html)
}

async fn load_config(path: &Path) -> anyhow::Result<Option<StationConfig>> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(StationConfig::from_json(&raw)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn host_defaults() -> StationConfig {
    let mut config = StationConfig::default();
    config.network.http_port = HOST_HTTP_PORT;
    config.report.template_path = bundled_template_path();
    config
}

fn bundled_template_path() -> String {
    format!("{}/data{TEMPLATE_FILE}", env!("CARGO_MANIFEST_DIR"))
}

fn apply_overrides(config: &mut StationConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(interval_ms) = lookup("WEATHER_SAMPLE_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        config.sampling.interval_ms = interval_ms;
    }
    if let Some(port) = lookup("WEATHER_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.network.http_port = port;
    }
    if let Some(path) = lookup("WEATHER_TEMPLATE_PATH").filter(|v| !v.trim().is_empty()) {
        config.report.template_path = path;
    }
}

async fn reachable_address(listen: SocketAddr) -> SocketAddr {
    if !listen.ip().is_unspecified() {
        return listen;
    }

    let ip = match outbound_ip().await {
        Ok(ip) => ip,
        Err(err) => {
            debug!("no outbound route, showing loopback: {err}");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    };
    SocketAddr::new(ip, listen.port())
}

// Connecting a UDP socket only selects a route; nothing is sent.
async fn outbound_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).await?;
    Ok(socket.local_addr()?.ip())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}

#[derive(Default)]
struct ConsoleDisplay {
    last: Option<DisplayFrame>,
}

impl ConsoleDisplay {
    fn present(&mut self, frame: &DisplayFrame) {
        if self.last.as_ref() == Some(frame) {
            debug!(target: "display", "repaint with unchanged content");
        }
        for line in frame.text() {
            info!(target: "display", "{line}");
        }
        self.last = Some(frame.clone());
    }
}

// Hardware integration point: the esp32 build reads a BMP280 and an SHT4x
// instead of these generators.
#[derive(Default)]
struct SimulatedBarometer {
    tick: u64,
}

impl PressureSensor for SimulatedBarometer {
    fn read_pressure_pa(&mut self) -> Result<f32, SensorError> {
        self.tick = self.tick.saturating_add(1);
        Ok(101_325.0 + ((self.tick % 12) as f32 - 6.0) * 15.0)
    }
}

struct SimulatedClimate {
    tick: u64,
    fail_every: Option<u64>,
}

impl SimulatedClimate {
    fn new(fail_every: Option<u64>) -> Self {
        Self {
            tick: 0,
            fail_every: fail_every.filter(|every| *every > 0),
        }
    }
}

impl ClimateSensor for SimulatedClimate {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError> {
        self.tick = self.tick.saturating_add(1);
        if let Some(every) = self.fail_every {
            if self.tick % every == 0 {
                return Err(SensorError::Bus {
                    sensor: "SHT4x",
                    details: "simulated read failure".to_string(),
                });
            }
        }

        Ok(ClimateReading {
            temperature_c: 21.0 + (self.tick % 8) as f32 * 0.2,
            humidity_pct: 42.0 + (self.tick % 6) as f32 * 0.5,
        })
    }
}
