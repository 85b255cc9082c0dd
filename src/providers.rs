use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin};

use crate::config::{ImageSize, Quality, DEFAULT_MODEL};

/// Style preset sent with every request.
pub const STYLE_PRESET: &str = "vivid";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 400 / 403: malformed payload or content-policy refusal.
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("image API returned status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Body of one image-generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: ImageSize,
    pub n: u8,
    pub quality: Quality,
    pub style: String,
}

impl ImageRequest {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// One image per request, vivid style, quality label folded into two tiers.
pub fn build_request(prompt: &str, size: ImageSize, quality: &str) -> ImageRequest {
    ImageRequest {
        model: DEFAULT_MODEL.to_string(),
        prompt: prompt.to_string(),
        size,
        n: 1,
        quality: Quality::from_label(quality),
        style: STYLE_PRESET.to_string(),
    }
}

pub trait ImageProvider: Send + Sync {
    /// Submits `req` and returns the URL of the generated image.
    fn generate<'a>(
        &'a self,
        req: &'a ImageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

#[derive(Deserialize)]
struct GenerateResp {
    data: Vec<GeneratedData>,
}

#[derive(Deserialize)]
struct GeneratedData {
    url: Option<String>,
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        // No client timeout: generation may take as long as the API needs.
        Self { client: reqwest::Client::new(), api_key, base_url: base_url.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url.trim_end_matches('/'))
    }
}

impl ImageProvider for OpenAIProvider {
    fn generate<'a>(
        &'a self,
        req: &'a ImageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::to_string_pretty(req).unwrap_or_default();
            tracing::debug!(">>> {}\n{}", req.model, body);

            let resp = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(req)
                .send()
                .await?;
            let status = resp.status();
            let text = resp.text().await?;

            if status.as_u16() == 400 || status.as_u16() == 403 {
                tracing::error!(
                    "✗ {} {}\nrequest: {}\nresponse: {}",
                    req.model,
                    status.as_u16(),
                    body,
                    text
                );
                return Err(ProviderError::Rejected { status: status.as_u16(), body: text });
            }
            if !status.is_success() {
                tracing::error!("✗ {} {}\n{}", req.model, status.as_u16(), text);
                return Err(ProviderError::Http { status: status.as_u16(), body: text });
            }

            let parsed: GenerateResp = serde_json::from_str(&text)
                .map_err(|e| ProviderError::MalformedResponse(format!("{e}: {text}")))?;
            let url = parsed
                .data
                .into_iter()
                .find_map(|d| d.url)
                .ok_or_else(|| {
                    ProviderError::MalformedResponse("no image url in response".into())
                })?;

            tracing::info!("✓ {} ok", req.model);
            Ok(url)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn request_maps_quality_tiers() {
        let hd = build_request("a cat", ImageSize::Square, "HD");
        assert_eq!(hd.quality, Quality::Hd);
        let standard = build_request("a cat", ImageSize::Square, "standard");
        assert_eq!(standard.quality, Quality::Standard);
    }

    #[test]
    fn request_serializes_fixed_fields() {
        let req = build_request("a cat", ImageSize::Landscape, "high").with_model("dall-e-3");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "model": "dall-e-3",
                "prompt": "a cat",
                "size": "1792x1024",
                "n": 1,
                "quality": "hd",
                "style": "vivid",
            })
        );
    }

    #[tokio::test]
    async fn returns_first_image_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/images/generations")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"prompt":"a cat","n":1,"style":"vivid"}"#);
                then.status(200).json_body(json!({
                    "created": 1,
                    "data": [{"url": "https://img.example/cat.png"}],
                }));
            })
            .await;

        let provider = OpenAIProvider::new("sk-test".into(), server.url("/v1"));
        let req = build_request("a cat", ImageSize::Square, "hd");
        let url = provider.generate(&req).await.unwrap();

        assert_eq!(url, "https://img.example/cat.png");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bad_request_and_forbidden_are_rejections() {
        for code in [400u16, 403] {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/images/generations");
                    then.status(code).body(r#"{"error":{"code":"content_policy_violation"}}"#);
                })
                .await;

            let provider = OpenAIProvider::new("sk-test".into(), server.base_url());
            let err = provider
                .generate(&build_request("bad", ImageSize::Square, "hd"))
                .await
                .unwrap_err();
            match err {
                ProviderError::Rejected { status, body } => {
                    assert_eq!(status, code);
                    assert!(body.contains("content_policy_violation"));
                }
                other => panic!("expected rejection, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn other_statuses_are_http_errors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/images/generations");
                then.status(500).body("upstream broke");
            })
            .await;

        let provider = OpenAIProvider::new("sk-test".into(), format!("{}/", server.base_url()));
        let err = provider
            .generate(&build_request("x", ImageSize::Square, "hd"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 500, .. }));
        // no retry
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn response_without_url_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/images/generations");
                then.status(200).json_body(json!({"created": 1, "data": []}));
            })
            .await;

        let provider = OpenAIProvider::new("sk-test".into(), server.base_url());
        let err = provider
            .generate(&build_request("x", ImageSize::Square, "hd"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
