use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Front,
    #[default]
    Back,
}

impl Facing {
    pub fn flipped(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Front => f.write_str("front"),
            Self::Back => f.write_str("back"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Starting,
    Live,
    Switching,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub facing: Facing,
    pub active: bool,
    pub state: CaptureState,
    pub width: u32,
    pub height: u32,
    pub label: Option<String>,
}
