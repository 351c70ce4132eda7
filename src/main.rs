//! fieldscand entrypoint

#[cfg(not(feature = "camera"))]
compile_error!("fieldscand requires the `camera` feature");

use clap::Parser;
use fieldscan::config::MetricsFormat;
use fieldscan::output::{self, RenderedReport};
use fieldscan::{
    Error, FieldscanConfig, HeadingMonitor, HeadingSource, IioHeadingSource, LifecycleEvent,
    QrDecoder, Result, ScanOptions, ScanOutcome, ScanSession, SolutionLogger, SolutionPayload,
    camera, json_stringify, logging, metrics,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "fieldscand",
    version,
    about = "Magnetometer field-strength monitor with QR solution logging"
)]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to fieldscan.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override camera by name (takes precedence over config file)
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// Override camera by index (/dev/videoN)
    #[arg(long, value_name = "INDEX")]
    device_index: Option<usize>,

    /// Override the IIO magnetometer sysfs directory
    #[arg(long, value_name = "PATH")]
    sensor: Option<PathBuf>,

    /// Capture a single camera frame and print the decoded QR contents
    #[arg(long)]
    scan_once: bool,

    /// Scan a QR code and submit it to the logbook application
    #[arg(long)]
    log_solution: bool,

    /// Capture a still image bound to the detection and write it to PATH
    #[arg(long, value_name = "PATH")]
    capture_image: Option<PathBuf>,

    /// Task name submitted with the solution
    #[arg(long, value_name = "NAME")]
    task: Option<String>,

    /// Skip the confirmation prompt before submitting
    #[arg(long)]
    yes: bool,

    /// Output results as formatted JSON instead of human-readable text
    #[arg(long)]
    json: bool,

    /// Enable metrics output regardless of configuration file settings
    #[arg(long)]
    metrics: bool,

    /// Override metrics endpoint bind address (e.g. 127.0.0.1:9900)
    #[arg(long, value_name = "ADDR")]
    metrics_bind: Option<String>,

    /// Override metrics endpoint format (`json` or `prometheus`)
    #[arg(long, value_name = "FORMAT")]
    metrics_format: Option<String>,

    /// List detected cameras and exit
    #[arg(long)]
    list_cameras: bool,
}

impl Cli {
    /// Flags win over both the configuration file and the environment.
    fn apply_overrides(&self, config: &mut FieldscanConfig) -> Result<()> {
        if let Some(name) = &self.device {
            config.camera.device_name = Some(name.clone());
            config.camera.device_index = None;
        } else if let Some(index) = self.device_index {
            config.camera.device_index = Some(index);
            config.camera.device_name = None;
        }

        if let Some(sensor) = &self.sensor {
            config.sensor.device_dir = Some(sensor.clone());
        }

        if let Some(task) = &self.task {
            config.logbook.task = task.clone();
        }

        if self.metrics {
            config.logging.metrics = true;
        }

        if let Some(bind) = &self.metrics_bind {
            config.logging.metrics_endpoint = Some(bind.clone());
            config.logging.metrics = true;
        }

        if let Some(format) = &self.metrics_format {
            config.logging.metrics_format =
                format.parse::<MetricsFormat>().map_err(Error::Config)?;
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_cameras {
        return list_cameras();
    }

    let mut config = FieldscanConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config)?;

    logging::init(&config.logging)?;
    start_observability(&config)?;

    if cli.scan_once {
        handle_scan_once(&config, cli.json).await
    } else if cli.log_solution {
        handle_log_solution(&config, &cli).await
    } else {
        run_monitor(&config, cli.json).await
    }
}

fn start_observability(config: &FieldscanConfig) -> Result<()> {
    let logging = &config.logging;
    if !logging.metrics && logging.metrics_endpoint.is_none() {
        return Ok(());
    }

    metrics::enable(logging.metrics_interval_secs);

    if let Some(endpoint) = &logging.metrics_endpoint {
        let addr = SocketAddr::from_str(endpoint)
            .map_err(|e| Error::Config(format!("Invalid metrics endpoint '{endpoint}': {e}")))?;
        metrics::spawn_http_endpoint(addr, logging.metrics_format)?;
    }

    Ok(())
}

fn list_cameras() -> Result<()> {
    let devices = camera::list_devices()?;
    println!("Discovered cameras:");
    for dev in devices {
        println!("  [{}] {} ({})", dev.index, dev.name, dev.path);
    }
    Ok(())
}

fn emit(rendered: &RenderedReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&rendered.json)?);
    } else {
        for line in &rendered.human {
            println!("{line}");
        }
    }
    Ok(())
}

fn open_sensor(config: &FieldscanConfig) -> Result<IioHeadingSource> {
    let interval = config.sensor.poll_interval();
    match config.sensor.device_dir {
        Some(ref dir) => IioHeadingSource::open(dir, interval),
        None => IioHeadingSource::discover(interval),
    }
}

/// Default mode: show field strength until interrupted.
async fn run_monitor(config: &FieldscanConfig, json: bool) -> Result<()> {
    let source = open_sensor(config)?;
    run_monitor_with(source, json).await
}

async fn run_monitor_with<S: HeadingSource + 'static>(source: S, json: bool) -> Result<()> {
    let (monitor, mut display_rx) = HeadingMonitor::new(source);
    let (event_tx, event_rx) = mpsc::channel(8);
    let monitor_task = tokio::spawn(monitor.run(event_rx));

    event_tx
        .send(LifecycleEvent::Shown)
        .await
        .map_err(|_| Error::Other("heading monitor exited early".to_string()))?;

    if !json {
        println!("Monitoring field strength (Ctrl-C to stop)...");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = display_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let display = *display_rx.borrow_and_update();
                if let Some(display) = display {
                    metrics::record_heading(display.strength);
                    emit(&output::render_heading(&display), json)?;
                }
            }
        }
    }

    // Closing the event channel shuts the monitor down.
    drop(event_tx);
    let _ = monitor_task.await;

    info!("heading monitor stopped");
    Ok(())
}

/// Capture one frame and print whatever QR symbol it contains.
async fn handle_scan_once(config: &FieldscanConfig, json: bool) -> Result<()> {
    let camera = camera::Camera::open(config.camera_config()?).await?;
    let frame = camera.capture_frame().await?;

    let symbol = QrDecoder::new().decode(&frame)?;
    emit(&output::render_symbol(&symbol), json)
}

/// Scan a QR code, confirm, and submit it to the logbook.
async fn handle_log_solution(config: &FieldscanConfig, cli: &Cli) -> Result<()> {
    let options = ScanOptions {
        capture_image: cli.capture_image.is_some(),
    };

    let started = Instant::now();
    let (session, handle) = ScanSession::with_camera(config.camera_config()?, options).await?;

    if !cli.json {
        println!("Point the camera at a QR code (Ctrl-C to cancel)...");
    }

    // Ctrl-C dismisses the session instead of killing the process.
    let canceller = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = session.run().await;
    canceller.abort();

    let detection = match outcome {
        Ok(ScanOutcome::Detected(detection)) => {
            metrics::record_scan(started.elapsed(), metrics::ScanEvent::Detected);
            detection
        }
        Ok(ScanOutcome::Cancelled) => {
            metrics::record_scan(started.elapsed(), metrics::ScanEvent::Cancelled);
            if !cli.json {
                println!("Scan cancelled.");
            }
            return Ok(());
        }
        Err(err) => {
            metrics::record_scan(started.elapsed(), metrics::ScanEvent::Failed);
            return Err(err);
        }
    };

    emit(&output::render_detection(&detection), cli.json)?;

    if let (Some(path), Some(image)) = (cli.capture_image.as_ref(), detection.image.as_ref()) {
        image
            .save(path)
            .map_err(|e| Error::Image(format!("Failed to write {}: {e}", path.display())))?;
        if !cli.json {
            println!("Still image written to {}", path.display());
        }
    }

    if !cli.yes && !confirm_submission(&detection.code).await? {
        info!("submission declined");
        return Ok(());
    }

    let payload = SolutionPayload::new(config.logbook.task.clone(), detection.code.clone());
    let solution = json_stringify(&payload);
    if solution.is_empty() {
        warn!("empty solution payload, submission degrades to a no-op");
    }

    let logger = SolutionLogger::with_endpoint(&config.logbook.scheme, &config.logbook.opener);
    logger.log_solution(&solution)?;

    if !cli.json {
        println!("Solution submitted for task '{}'.", config.logbook.task);
    }

    Ok(())
}

async fn confirm_submission(code: &str) -> Result<bool> {
    println!("Log solution \"{code}\"? [y/N]");

    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .map_err(|e| Error::Other(format!("stdin task failed: {e}")))??;

    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
