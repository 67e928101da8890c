use async_trait::async_trait;
use bytes::Bytes;
use engine::assets::{AssetCandidate, AssetKind};
use std::sync::Arc;

use super::{AssetProvider, AssetQuery, Payload};
use crate::config::Aspect;
use crate::error::ProviderError;
use crate::llm::GeminiClient;

/// Generative stills. There is exactly one candidate per request: the prompt
/// itself, sized to the target frame.
pub struct GeminiImageProvider {
    gemini: Arc<GeminiClient>,
    model: String,
}

impl GeminiImageProvider {
    pub fn new(gemini: Arc<GeminiClient>, model: String) -> Self {
        Self { gemini, model }
    }
}

#[async_trait]
impl AssetProvider for GeminiImageProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn candidates(
        &self,
        kind: AssetKind,
        query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError> {
        if kind != AssetKind::Image {
            return Err(ProviderError::Unsupported {
                provider: "gemini".to_string(),
                kind,
            });
        }
        let frame = query.target.frame;
        Ok(vec![AssetCandidate::new("gemini", query.prompt.clone())
            .with_size(frame.width, frame.height)])
    }

    async fn download(&self, candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
        let aspect = match candidate.size {
            Some(size) if !size.is_landscape() => Aspect::Vertical,
            _ => Aspect::Horizontal,
        };
        let ratio = match aspect {
            Aspect::Horizontal => "16:9",
            Aspect::Vertical => "9:16",
        };
        let image = self
            .gemini
            .generate_image(&self.model, &candidate.locator, ratio)
            .await?;
        Ok(Payload {
            bytes: Bytes::from(image.bytes),
            content_type: image.mime_type,
        })
    }
}
