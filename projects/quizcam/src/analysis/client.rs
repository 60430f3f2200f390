use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    camera::still::CapturedImage,
    core::errors::{AnalysisError, AnalysisErrorKind},
    endpoint::{EndpointResolver, ResolvedEndpoint},
};

use super::{
    progress::{AnalysisStage, ProgressObserver},
    response::{error_detail, extract_answer},
};

/// Ceiling on the base64 payload sent to the inference endpoint.
pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

#[derive(Serialize)]
struct QuizRequestBody<'a> {
    image: &'a str,
}

/// An image bound to the endpoint that will receive it.
pub struct AnalysisRequest<'a> {
    image: &'a CapturedImage,
    endpoint: &'a ResolvedEndpoint,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(endpoint: &'a ResolvedEndpoint, image: &'a CapturedImage) -> Self {
        Self { image, endpoint }
    }

    pub fn url(&self) -> &Url {
        self.endpoint.analyze_url()
    }

    fn body(&self) -> QuizRequestBody<'a> {
        QuizRequestBody {
            image: self.image.payload(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: Client,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Sends `image` to the resolved endpoint and returns the answer text.
    ///
    /// Connectivity failures drop the cached endpoint so the next call probes again.
    pub async fn analyze(
        &self,
        image: Option<&CapturedImage>,
        resolver: &mut EndpointResolver,
        progress: &dyn ProgressObserver,
    ) -> Result<String, AnalysisError> {
        let image = image.ok_or(AnalysisError::NoImage)?;
        let size = image.payload().len();
        if size > MAX_PAYLOAD_BYTES {
            return Err(AnalysisError::ImageTooLarge {
                size,
                limit: MAX_PAYLOAD_BYTES,
            });
        }

        progress.report(AnalysisStage::Resolving);
        let endpoint = resolver.resolve().await?;

        let request = AnalysisRequest::new(&endpoint, image);
        progress.report(AnalysisStage::Sending);
        match self.send(&request, progress).await {
            Ok(text) => {
                progress.report(AnalysisStage::Complete);
                info!(tier = %endpoint.tier(), "analysis finished");
                Ok(text)
            }
            Err(err) => {
                if err.is_connectivity() {
                    resolver.invalidate();
                }
                warn!(tier = %endpoint.tier(), "analysis failed: {err}");
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        request: &AnalysisRequest<'_>,
        progress: &dyn ProgressObserver,
    ) -> Result<String, AnalysisError> {
        let url = request.url().to_string();
        let connectivity = |source| AnalysisError::Connectivity {
            url: url.clone(),
            source,
        };

        let response = self
            .client
            .post(request.url().clone())
            .timeout(self.timeout)
            .json(&request.body())
            .send()
            .await
            .map_err(connectivity)?;
        progress.report(AnalysisStage::AwaitingResponse);

        let status = response.status();
        let body = response.text().await.map_err(connectivity)?;
        if !status.is_success() {
            return Err(AnalysisError::Status {
                kind: AnalysisErrorKind::from_status(status),
                status,
                url,
                detail: error_detail(&body),
            });
        }

        extract_answer(&body).map_err(|reason| AnalysisError::MalformedResponse { url, reason })
    }
}
