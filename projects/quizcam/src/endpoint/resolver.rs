//! Endpoint discovery.
//!
//! Candidates are probed one at a time in configured order and the first one
//! whose health check passes is cached until [`EndpointResolver::invalidate`]
//! is called. Probes never run concurrently.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{config::AppConfig, core::errors::ResolveError};

use super::{EndpointConfig, HealthProbe, ResolvedEndpoint, Tier};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub config: EndpointConfig,
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum ResolverState {
    Unresolved,
    Resolving,
    Resolved(ResolvedEndpoint),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub tier: Tier,
    pub health_url: String,
    pub analyze_url: String,
    pub reachable: bool,
    pub detail: Option<String>,
}

pub struct EndpointResolver {
    probe: Box<dyn HealthProbe>,
    candidates: Vec<Candidate>,
    state: ResolverState,
}

impl EndpointResolver {
    pub fn new(probe: Box<dyn HealthProbe>, candidates: Vec<Candidate>) -> Self {
        Self {
            probe,
            candidates,
            state: ResolverState::Unresolved,
        }
    }

    /// Primary then fallback, each with its own probe timeout.
    pub fn from_config(config: &AppConfig, probe: Box<dyn HealthProbe>) -> Self {
        let candidates = config
            .endpoints()
            .into_iter()
            .map(|endpoint| Candidate {
                probe_timeout: config.probe_timeout(endpoint.tier),
                config: endpoint,
            })
            .collect();
        Self::new(probe, candidates)
    }

    /// Returns the cached endpoint, or probes candidates in order until one answers.
    pub async fn resolve(&mut self) -> Result<ResolvedEndpoint, ResolveError> {
        if let ResolverState::Resolved(endpoint) = &self.state {
            debug!(tier = %endpoint.tier(), "using cached endpoint");
            return Ok(endpoint.clone());
        }

        self.state = ResolverState::Resolving;
        let mut tried = Vec::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            let health_url = &candidate.config.health_url;
            match self.probe.check(health_url, candidate.probe_timeout).await {
                Ok(()) => {
                    let endpoint = ResolvedEndpoint {
                        config: candidate.config.clone(),
                        resolved_at: SystemTime::now(),
                    };
                    info!(
                        tier = %endpoint.tier(),
                        url = %endpoint.analyze_url(),
                        "analysis endpoint resolved"
                    );
                    self.state = ResolverState::Resolved(endpoint.clone());
                    return Ok(endpoint);
                }
                Err(err) => {
                    warn!(tier = %candidate.config.tier, url = %health_url, "{err}");
                    tried.push(health_url.to_string());
                }
            }
        }

        self.state = ResolverState::Unresolved;
        Err(ResolveError::NoEndpointReachable { tried })
    }

    pub fn invalidate(&mut self) {
        if let ResolverState::Resolved(endpoint) = &self.state {
            info!(tier = %endpoint.tier(), "cached endpoint invalidated");
        }
        self.state = ResolverState::Unresolved;
    }

    pub fn cached(&self) -> Option<&ResolvedEndpoint> {
        match &self.state {
            ResolverState::Resolved(endpoint) => Some(endpoint),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    /// Checks every candidate without touching the cache.
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            let result = self
                .probe
                .check(&candidate.config.health_url, candidate.probe_timeout)
                .await;
            reports.push(ProbeReport {
                tier: candidate.config.tier,
                health_url: candidate.config.health_url.to_string(),
                analyze_url: candidate.config.analyze_url.to_string(),
                reachable: result.is_ok(),
                detail: result.err().map(|err| err.to_string()),
            });
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use reqwest::{StatusCode, Url};

    use crate::{
        core::errors::ResolveError,
        endpoint::{
            EndpointConfig, HealthProbe, Tier,
            probe::ProbeFailure,
        },
    };

    use super::{Candidate, EndpointResolver, ResolverState};

    /// Answers from a fixed table and records every probe in order.
    #[derive(Clone, Default)]
    struct ScriptedProbe {
        healthy: Arc<Mutex<HashMap<String, bool>>>,
        calls: Arc<Mutex<Vec<(String, Duration)>>>,
    }

    impl ScriptedProbe {
        fn set(&self, url: &str, healthy: bool) {
            self.healthy
                .lock()
                .expect("probe table lock")
                .insert(url.to_string(), healthy);
        }

        fn calls(&self) -> Vec<(String, Duration)> {
            self.calls.lock().expect("probe calls lock").clone()
        }

        fn urls(&self) -> Vec<String> {
            self.calls().into_iter().map(|(url, _)| url).collect()
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn check(&self, url: &Url, timeout: Duration) -> Result<(), ProbeFailure> {
            self.calls
                .lock()
                .expect("probe calls lock")
                .push((url.to_string(), timeout));
            let healthy = self
                .healthy
                .lock()
                .expect("probe table lock")
                .get(url.as_str())
                .copied()
                .unwrap_or(false);
            if healthy {
                Ok(())
            } else {
                Err(ProbeFailure::Status(StatusCode::SERVICE_UNAVAILABLE))
            }
        }
    }

    const PRIMARY_HEALTH: &str = "http://primary.test/health";
    const FALLBACK_HEALTH: &str = "http://fallback.test/health";

    fn candidates() -> Vec<Candidate> {
        let parse = |s: &str| Url::parse(s).expect("url");
        vec![
            Candidate {
                config: EndpointConfig {
                    analyze_url: parse("http://primary.test/api/quiz"),
                    health_url: parse(PRIMARY_HEALTH),
                    tier: Tier::Primary,
                },
                probe_timeout: Duration::from_secs(5),
            },
            Candidate {
                config: EndpointConfig {
                    analyze_url: parse("http://fallback.test/api/quiz"),
                    health_url: parse(FALLBACK_HEALTH),
                    tier: Tier::Fallback,
                },
                probe_timeout: Duration::from_secs(3),
            },
        ]
    }

    fn resolver(probe: &ScriptedProbe) -> EndpointResolver {
        EndpointResolver::new(Box::new(probe.clone()), candidates())
    }

    #[tokio::test]
    async fn healthy_primary_wins_without_probing_fallback() {
        let probe = ScriptedProbe::default();
        probe.set(PRIMARY_HEALTH, true);
        probe.set(FALLBACK_HEALTH, true);
        let mut resolver = resolver(&probe);

        let endpoint = resolver.resolve().await.expect("primary should resolve");
        assert_eq!(endpoint.tier(), Tier::Primary);
        assert_eq!(probe.urls(), vec![PRIMARY_HEALTH.to_string()]);
    }

    #[tokio::test]
    async fn falls_back_and_caches_the_fallback() {
        let probe = ScriptedProbe::default();
        probe.set(FALLBACK_HEALTH, true);
        let mut resolver = resolver(&probe);

        let endpoint = resolver.resolve().await.expect("fallback should resolve");
        assert_eq!(endpoint.tier(), Tier::Fallback);
        assert_eq!(endpoint.analyze_url().as_str(), "http://fallback.test/api/quiz");
        assert_eq!(
            probe.calls(),
            vec![
                (PRIMARY_HEALTH.to_string(), Duration::from_secs(5)),
                (FALLBACK_HEALTH.to_string(), Duration::from_secs(3)),
            ]
        );

        let again = resolver.resolve().await.expect("cached endpoint");
        assert_eq!(again.tier(), Tier::Fallback);
        assert_eq!(probe.calls().len(), 2, "cached resolve must not probe");
    }

    #[tokio::test]
    async fn total_failure_returns_to_unresolved() {
        let probe = ScriptedProbe::default();
        let mut resolver = resolver(&probe);

        let err = resolver.resolve().await.expect_err("nothing is reachable");
        let ResolveError::NoEndpointReachable { tried } = err;
        assert_eq!(tried, vec![PRIMARY_HEALTH.to_string(), FALLBACK_HEALTH.to_string()]);
        assert!(matches!(resolver.state(), ResolverState::Unresolved));
        assert!(resolver.cached().is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_full_reprobe_in_order() {
        let probe = ScriptedProbe::default();
        probe.set(FALLBACK_HEALTH, true);
        let mut resolver = resolver(&probe);
        resolver.resolve().await.expect("fallback should resolve");

        resolver.invalidate();
        assert!(resolver.cached().is_none());
        probe.set(PRIMARY_HEALTH, true);

        let endpoint = resolver.resolve().await.expect("primary should resolve");
        assert_eq!(endpoint.tier(), Tier::Primary);
        assert_eq!(
            probe.urls(),
            vec![
                PRIMARY_HEALTH.to_string(),
                FALLBACK_HEALTH.to_string(),
                PRIMARY_HEALTH.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn probe_all_reports_each_tier_and_keeps_cache_empty() {
        let probe = ScriptedProbe::default();
        probe.set(FALLBACK_HEALTH, true);
        let resolver = resolver(&probe);

        let reports = resolver.probe_all().await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].reachable);
        assert!(reports[0].detail.is_some());
        assert!(reports[1].reachable);
        assert!(resolver.cached().is_none());
    }
}
