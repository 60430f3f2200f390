mod analysis;
mod camera;
mod config;
mod console;
mod core;
mod endpoint;
mod session;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use analysis::{AnalysisResult, AnalysisStage, LogProgress, ProgressObserver};
use anyhow::{Context, Result, anyhow, bail};
use camera::{ffmpeg_backend::FfmpegBackend, service::CameraService};
use config::AppConfig;
use endpoint::{EndpointResolver, HttpProbe};
use reqwest::Client;
use session::QuizSession;
use tracing::{error, info, warn};
use tokio::io::BufReader;
use tracing_appender::rolling;

use crate::core::state::Facing;

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    probe_cameras: bool,
    check_endpoints: bool,
    interactive: bool,
    facing: Facing,
    image: Option<PathBuf>,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--probe-cameras" => options.probe_cameras = true,
                "--check-endpoints" => options.check_endpoints = true,
                "-i" | "--interactive" => options.interactive = true,
                "--front" => options.facing = Facing::Front,
                "--back" => options.facing = Facing::Back,
                "--image" => {
                    let path = args.next().context("--image needs a file path")?;
                    options.image = Some(PathBuf::from(path));
                }
                other => bail!(
                    "unknown argument: {other}\nusage: quizcam [--interactive] [--front] [--image <path>] | --probe-cameras | --check-endpoints"
                ),
            }
        }
        Ok(options)
    }
}

/// Mirrors progress on stderr while also logging it.
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn report(&self, stage: AnalysisStage) {
        eprintln!("[{:>3}%] {}", stage.percent(), stage.label());
        LogProgress.report(stage);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let options = CliOptions::parse(std::env::args().skip(1))?;

    if options.probe_cameras {
        let inputs = camera::discovery::probe_video_inputs().await?;
        println!("{}", serde_json::to_string_pretty(&inputs)?);
        return Ok(());
    }

    let config = AppConfig::from_env()?;
    let http = Client::builder()
        .build()
        .context("failed to build http client")?;
    let resolver = EndpointResolver::from_config(&config, Box::new(HttpProbe::new(http.clone())));
    let camera = CameraService::new(
        FfmpegBackend::from_config(&config),
        config.capture_width,
        config.capture_height,
    );
    let analyzer = analysis::AnalysisClient::new(http, config.analyze_timeout);
    let mut session = QuizSession::new(camera, resolver, analyzer);

    if options.check_endpoints {
        let reports = session.check_endpoints().await;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    tokio::fs::create_dir_all(&config.log_dir)
        .await
        .with_context(|| format!("failed to create {}", config.log_dir.display()))?;
    let file_appender = rolling::daily(&config.log_dir, "quizcam.log");
    let (non_blocking, log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("{} started", config.app_name);

    let mut interrupted = false;
    let outcome = tokio::select! {
        result = drive(&mut session, &options) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, releasing camera");
            interrupted = true;
            Ok(None)
        }
    };
    session.shutdown().await;
    if interrupted && options.interactive {
        // A pending stdin read would keep the runtime from shutting down.
        drop(log_guard);
        std::process::exit(130);
    }

    match outcome {
        Ok(Some(result)) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let AnalysisResult::Failure { message, .. } = &result {
                bail!("{message}");
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            error!("{err:#}");
            Err(err)
        }
    }
}

async fn drive(
    session: &mut QuizSession<FfmpegBackend>,
    options: &CliOptions,
) -> Result<Option<AnalysisResult>> {
    if !options.interactive {
        return run(session, options).await.map(Some);
    }

    eprint!("{}", console::HELP);
    if let Some(path) = &options.image {
        let image = session.load_image(path).await?;
        eprintln!("loaded {}x{} {} image", image.width(), image.height(), image.mime());
    }
    let mut stdout = tokio::io::stdout();
    console::run_console(
        session,
        BufReader::new(tokio::io::stdin()),
        &mut stdout,
        &ConsoleProgress,
    )
    .await?;
    Ok(None)
}

async fn run(
    session: &mut QuizSession<FfmpegBackend>,
    options: &CliOptions,
) -> Result<AnalysisResult> {
    match &options.image {
        Some(path) => {
            session.load_image(path).await?;
        }
        None => {
            session
                .start_camera(options.facing)
                .await
                .map_err(|err| anyhow!("{} ({err})", err.user_message()))?;
            let status = session.camera_status();
            eprintln!(
                "{} camera live at {}x{}",
                status.facing, status.width, status.height
            );
            session.snap().await?;
        }
    }
    Ok(session.analyze(&ConsoleProgress).await)
}
