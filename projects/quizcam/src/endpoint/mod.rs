pub mod probe;
pub mod resolver;

use std::{fmt, time::SystemTime};

use reqwest::Url;
use serde::Serialize;

pub use probe::{HealthProbe, HttpProbe};
pub use resolver::EndpointResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Fallback,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub analyze_url: Url,
    pub health_url: Url,
    pub tier: Tier,
}

/// An endpoint that answered its health check. Only the resolver creates these.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    config: EndpointConfig,
    resolved_at: SystemTime,
}

impl ResolvedEndpoint {
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn analyze_url(&self) -> &Url {
        &self.config.analyze_url
    }

    pub fn tier(&self) -> Tier {
        self.config.tier
    }

    pub fn resolved_at(&self) -> SystemTime {
        self.resolved_at
    }
}
