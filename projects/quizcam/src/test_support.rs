use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Json, Router,
    routing::{get, post},
};
use image::{Rgb, RgbImage};
use reqwest::{Client, Url};
use serde_json::json;
use tokio::net::TcpListener;

use crate::{
    analysis::AnalysisClient,
    camera::{
        service::CameraService,
        traits::{CameraBackend, StreamRequest, VideoTrack},
    },
    core::{errors::DeviceError, state::Facing},
    endpoint::{EndpointConfig, EndpointResolver, HttpProbe, Tier, resolver::Candidate},
    session::QuizSession,
};

/// Serves `router` on an ephemeral local port for the lifetime of the test runtime.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    drop(listener);
    addr
}

pub fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).expect("test url should parse")
}

pub const ANSWER_TEXT: &str = "✅ 정답: 3";

/// A healthy quiz server that answers every image with [`ANSWER_TEXT`].
pub async fn answering_server() -> SocketAddr {
    serve(
        Router::new()
            .route("/health", get(|| async { Json(json!({"status": "OK"})) }))
            .route(
                "/api/quiz",
                post(|| async { Json(json!({"choices": [{"message": {"content": ANSWER_TEXT}}]})) }),
            ),
    )
    .await
}

/// A track that always shows the same flat frame.
pub struct StillTrack {
    size: (u32, u32),
}

#[async_trait]
impl VideoTrack for StillTrack {
    fn label(&self) -> &str {
        "still"
    }

    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    async fn current_frame(&mut self) -> Result<RgbImage> {
        Ok(RgbImage::from_pixel(self.size.0, self.size.1, Rgb([90, 120, 150])))
    }

    async fn stop(&mut self) {}
}

/// Opens [`StillTrack`]s at the requested size, except for the `missing` facing.
#[derive(Clone, Default)]
pub struct StillBackend {
    pub opened: Arc<AtomicUsize>,
    pub missing: Option<Facing>,
}

impl StillBackend {
    pub fn without(facing: Facing) -> Self {
        Self {
            missing: Some(facing),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraBackend for StillBackend {
    async fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn VideoTrack>, DeviceError> {
        if self.missing == Some(request.facing) {
            return Err(DeviceError::DeviceNotFound(format!("no {} camera", request.facing)));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StillTrack {
            size: (request.ideal_width, request.ideal_height),
        }))
    }
}

/// A 640x480 session whose only endpoint is `addr`.
pub fn session_for(backend: StillBackend, addr: SocketAddr) -> QuizSession<StillBackend> {
    let resolver = EndpointResolver::new(
        Box::new(HttpProbe::new(Client::new())),
        vec![Candidate {
            config: EndpointConfig {
                analyze_url: url(addr, "/api/quiz"),
                health_url: url(addr, "/health"),
                tier: Tier::Primary,
            },
            probe_timeout: Duration::from_secs(1),
        }],
    );
    QuizSession::new(
        CameraService::new(backend, 640, 480),
        resolver,
        AnalysisClient::new(Client::new(), Duration::from_secs(5)),
    )
}
