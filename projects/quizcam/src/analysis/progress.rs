use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Steps of one analysis request, reported strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Resolving,
    Sending,
    AwaitingResponse,
    Complete,
}

impl AnalysisStage {
    pub fn percent(self) -> u8 {
        match self {
            Self::Resolving => 10,
            Self::Sending => 20,
            Self::AwaitingResponse => 40,
            Self::Complete => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Resolving => "Finding an analysis server...",
            Self::Sending => "Sending image...",
            Self::AwaitingResponse => "Waiting for the answer...",
            Self::Complete => "Analysis complete",
        }
    }
}

pub trait ProgressObserver: Send + Sync {
    fn report(&self, stage: AnalysisStage);
}

/// Writes each stage to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn report(&self, stage: AnalysisStage) {
        info!(percent = stage.percent(), "{}", stage.label());
    }
}

impl ProgressObserver for UnboundedSender<AnalysisStage> {
    fn report(&self, stage: AnalysisStage) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.send(stage);
    }
}
