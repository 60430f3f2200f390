//! Line-based interactive driver over a [`QuizSession`].
//!
//! An empty line does the next obvious step, like the capture page's Space and
//! Enter shortcuts: open the camera, take the photo, then analyze it.

use std::{path::Path, time::SystemTime};

use anyhow::{Result, bail};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::{
    analysis::{AnalysisResult, ProgressObserver},
    camera::traits::CameraBackend,
    core::state::{CaptureStatus, Facing},
    endpoint::Tier,
    session::QuizSession,
};

pub const HELP: &str = "\
commands:
  <enter>               next step: start camera, snap, or analyze
  start [front|back]    open the camera
  snap                  take the photo
  s | switch            switch between front and back camera
  retake | new          discard the photo and reopen the camera
  load <path|data url>  use an image instead of the camera
  a | analyze           send the photo for analysis
  status                camera, image and endpoint state as JSON
  endpoints             check every analysis endpoint
  help                  show this text
  q | quit              leave
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Start(Option<Facing>),
    Snap,
    Switch,
    Retake,
    Load(String),
    Analyze,
    Status,
    Endpoints,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        let command = match word.to_lowercase().as_str() {
            "" => Self::Next,
            "start" => Self::Start(match rest.to_lowercase().as_str() {
                "" => None,
                "front" => Some(Facing::Front),
                "back" => Some(Facing::Back),
                other => bail!("unknown camera: {other} (front or back)"),
            }),
            "snap" | "capture" => Self::Snap,
            "s" | "switch" => Self::Switch,
            "retake" | "new" => Self::Retake,
            "load" if rest.is_empty() => bail!("load needs a file path or data url"),
            "load" => Self::Load(rest.to_owned()),
            "a" | "analyze" => Self::Analyze,
            "status" => Self::Status,
            "endpoints" => Self::Endpoints,
            "help" | "?" => Self::Help,
            "q" | "quit" | "exit" => Self::Quit,
            other => bail!("unknown command: {other} (type help)"),
        };
        Ok(command)
    }
}

#[derive(Serialize)]
struct StatusReport<'a> {
    camera: CaptureStatus,
    image: Option<ImageSummary<'a>>,
    endpoint: Option<EndpointSummary>,
}

#[derive(Serialize)]
struct ImageSummary<'a> {
    mime: &'a str,
    width: u32,
    height: u32,
    bytes: usize,
}

#[derive(Serialize)]
struct EndpointSummary {
    tier: Tier,
    analyze_url: String,
    health_url: String,
    resolved_secs_ago: u64,
}

/// Reads commands from `input` until `quit` or end of input.
pub async fn run_console<B, R, W>(
    session: &mut QuizSession<B>,
    input: R,
    output: &mut W,
    progress: &dyn ProgressObserver,
) -> Result<()>
where
    B: CameraBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(session, command, progress).await?,
            Err(err) => format!("{err}"),
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    info!("console closed");
    Ok(())
}

async fn execute<B: CameraBackend>(
    session: &mut QuizSession<B>,
    command: Command,
    progress: &dyn ProgressObserver,
) -> Result<String> {
    let command = match command {
        Command::Next if session.camera_status().active => Command::Snap,
        Command::Next if session.captured().is_some() => Command::Analyze,
        Command::Next => Command::Start(None),
        other => other,
    };

    let reply = match command {
        Command::Start(facing) => {
            let facing = facing.unwrap_or(session.camera_status().facing);
            match session.start_camera(facing).await {
                Ok(()) => live_message(&session.camera_status()),
                Err(err) => format!("{} ({err})", err.user_message()),
            }
        }
        Command::Snap => match session.snap().await {
            Ok(image) => format!(
                "captured {}x{} photo ({} KB), press enter to analyze",
                image.width(),
                image.height(),
                image.approximate_size_bytes() / 1024
            ),
            Err(err) => format!("cannot take a photo: {err}"),
        },
        Command::Switch => match session.switch_camera().await {
            Ok(facing) => format!("switched to {facing} camera"),
            Err(err) => {
                let status = session.camera_status();
                if status.active {
                    format!("{} ({err}), still using {} camera", err.user_message(), status.facing)
                } else {
                    format!("{} ({err}), camera stopped", err.user_message())
                }
            }
        },
        Command::Retake => match session.retake().await {
            Ok(()) => format!("ready for a new photo, {}", live_message(&session.camera_status())),
            Err(err) => format!("{} ({err})", err.user_message()),
        },
        Command::Load(source) => {
            let loaded = if source.starts_with("data:") {
                session.load_data_url(&source).await
            } else {
                session.load_image(Path::new(&source)).await
            };
            match loaded {
                Ok(image) => format!(
                    "loaded {}x{} {} image, press enter to analyze",
                    image.width(),
                    image.height(),
                    image.mime()
                ),
                Err(err) => format!("cannot load image: {err:#}"),
            }
        }
        Command::Analyze => match session.analyze(progress).await {
            AnalysisResult::Success { text } => text,
            AnalysisResult::Failure { message, .. } => format!("analysis failed: {message}"),
        },
        Command::Status => serde_json::to_string_pretty(&status_report(session))?,
        Command::Endpoints => serde_json::to_string_pretty(&session.check_endpoints().await)?,
        Command::Help => HELP.trim_end().to_owned(),
        Command::Next | Command::Quit => String::new(),
    };
    Ok(reply)
}

fn live_message(status: &CaptureStatus) -> String {
    format!(
        "{} camera live at {}x{}, press enter to snap",
        status.facing, status.width, status.height
    )
}

fn status_report<B: CameraBackend>(session: &QuizSession<B>) -> StatusReport<'_> {
    StatusReport {
        camera: session.camera_status(),
        image: session.captured().map(|image| ImageSummary {
            mime: image.mime(),
            width: image.width(),
            height: image.height(),
            bytes: image.approximate_size_bytes(),
        }),
        endpoint: session.endpoint().map(|endpoint| EndpointSummary {
            tier: endpoint.tier(),
            analyze_url: endpoint.analyze_url().to_string(),
            health_url: endpoint.config().health_url.to_string(),
            resolved_secs_ago: SystemTime::now()
                .duration_since(endpoint.resolved_at())
                .unwrap_or_default()
                .as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use serde_json::Value;

    use crate::{
        analysis::LogProgress,
        camera::still::CapturedImage,
        core::state::Facing,
        test_support::{ANSWER_TEXT, StillBackend, answering_server, session_for},
    };

    use super::{Command, run_console};

    async fn drive(backend: StillBackend, script: &str) -> String {
        let mut session = session_for(backend, answering_server().await);
        let mut output = Vec::new();
        run_console(&mut session, script.as_bytes(), &mut output, &LogProgress)
            .await
            .expect("console should run");
        String::from_utf8(output).expect("console output is utf-8")
    }

    #[test]
    fn parses_commands_and_shortcuts() {
        assert_eq!(Command::parse("").expect("enter"), Command::Next);
        assert_eq!(Command::parse("   ").expect("space"), Command::Next);
        assert_eq!(Command::parse("S").expect("s key"), Command::Switch);
        assert_eq!(
            Command::parse("start Front").expect("start"),
            Command::Start(Some(Facing::Front))
        );
        assert_eq!(
            Command::parse("load /tmp/quiz 1.png").expect("load"),
            Command::Load("/tmp/quiz 1.png".to_owned())
        );
        assert_eq!(Command::parse("new").expect("new"), Command::Retake);
        assert_eq!(Command::parse("q").expect("quit"), Command::Quit);
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(Command::parse("load").is_err());
        assert!(Command::parse("start sideways").is_err());
        assert!(Command::parse("zap").is_err());
    }

    #[tokio::test]
    async fn enter_walks_from_camera_to_answer() {
        let backend = StillBackend::default();
        let output = drive(backend.clone(), "\n\n\nquit\nstart\n").await;

        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("back camera live at 640x480"), "{output}");
        assert!(lines[1].starts_with("captured 640x480 photo"), "{output}");
        assert_eq!(lines[2], ANSWER_TEXT);
        assert_eq!(lines.len(), 3, "nothing runs after quit");
        assert_eq!(backend.opened(), 1);
    }

    #[tokio::test]
    async fn switch_retake_and_status_drive_the_session() {
        let backend = StillBackend::default();
        let output = drive(backend.clone(), "start\nswitch\nstatus\nretake\n").await;

        assert!(output.contains("switched to front camera"), "{output}");
        assert!(output.contains("ready for a new photo, front camera live"), "{output}");
        assert_eq!(backend.opened(), 3);

        let json_start = output.find('{').expect("status prints json");
        let json_end = output.rfind('}').expect("status prints json");
        let status: Value =
            serde_json::from_str(&output[json_start..=json_end]).expect("status is json");
        assert_eq!(status["camera"]["facing"], "front");
        assert_eq!(status["camera"]["state"], "live");
        assert!(status["image"].is_null());
        assert!(status["endpoint"].is_null());
    }

    #[tokio::test]
    async fn failed_switch_reports_the_camera_still_in_use() {
        let output = drive(StillBackend::without(Facing::Front), "start\ns\n").await;
        assert!(output.contains("still using back camera"), "{output}");
    }

    #[tokio::test]
    async fn loaded_image_is_analyzed_and_endpoint_is_reported() {
        let upload = CapturedImage::encode_jpeg(&RgbImage::new(40, 30), 80).expect("jpeg");
        let script = format!("load {}\nanalyze\nstatus\n", upload.data_url());
        let output = drive(StillBackend::default(), &script).await;

        assert!(output.contains("loaded 40x30 image/jpeg image"), "{output}");
        assert!(output.contains(ANSWER_TEXT), "{output}");
        assert!(output.contains("\"tier\": \"primary\""), "{output}");
        assert!(output.contains("\"mime\": \"image/jpeg\""), "{output}");
    }

    #[tokio::test]
    async fn analyze_without_image_explains_what_to_do() {
        let output = drive(StillBackend::default(), "analyze\nsnap\n").await;
        assert!(output.contains("analysis failed: There is no image to analyze"), "{output}");
        assert!(output.contains("cannot take a photo: no active camera session"), "{output}");
    }
}
