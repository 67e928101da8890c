use async_trait::async_trait;
use bytes::Bytes;
use engine::assets::{AssetCandidate, AssetKind, TargetHint};
use std::sync::Arc;

use crate::config::{Aspect, ProviderMode, Settings};
use crate::error::{PipelineError, ProviderError};
use crate::llm::GeminiClient;

pub mod freesound;
pub mod gemini;
pub mod pixabay;

/// What a slot asks providers for.
#[derive(Debug, Clone)]
pub struct AssetQuery {
    /// Keyword search text for stock catalogues.
    pub search: String,
    /// Descriptive prompt for generative providers.
    pub prompt: String,
    pub aspect: Aspect,
    pub target: TargetHint,
}

/// Raw bytes fetched for a candidate, not yet validated.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// An asset source. Listing candidates is separate from downloading one so
/// the resolver can rank and fall through a provider's own alternatives.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn candidates(
        &self,
        kind: AssetKind,
        query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError>;

    async fn download(&self, candidate: &AssetCandidate) -> Result<Payload, ProviderError>;
}

/// One step of a fallback chain: a provider asked for a particular kind.
#[derive(Clone)]
pub struct ChainStep {
    pub provider: Arc<dyn AssetProvider>,
    pub kind: AssetKind,
}

impl ChainStep {
    pub fn new(provider: Arc<dyn AssetProvider>, kind: AssetKind) -> Self {
        Self { provider, kind }
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.provider.name(), self.kind)
    }
}

/// Providers available to jobs, by role. A role is `None` when its
/// credentials are not configured.
#[derive(Clone, Default)]
pub struct ProviderSet {
    pub generative_image: Option<Arc<dyn AssetProvider>>,
    pub stock_video: Option<Arc<dyn AssetProvider>>,
    pub stock_image: Option<Arc<dyn AssetProvider>>,
    /// Tried in order for background music.
    pub music: Vec<Arc<dyn AssetProvider>>,
    pub sound_effects: Vec<Arc<dyn AssetProvider>>,
}

impl ProviderSet {
    pub fn from_settings(settings: &Settings, client: reqwest::Client) -> Self {
        let mut set = ProviderSet::default();

        if let Some(key) = &settings.google_api_key {
            let gemini = Arc::new(GeminiClient::new(key.clone(), client.clone()));
            set.generative_image = Some(Arc::new(gemini::GeminiImageProvider::new(
                gemini,
                settings.gemini_image_model.clone(),
            )));
        }

        let freesound: Option<Arc<dyn AssetProvider>> = settings
            .freesound_key
            .as_ref()
            .map(|key| Arc::new(freesound::FreesoundProvider::new(key.clone(), client.clone())) as Arc<dyn AssetProvider>);
        let pixabay: Option<Arc<dyn AssetProvider>> = settings
            .pixabay_key
            .as_ref()
            .map(|key| Arc::new(pixabay::PixabayProvider::new(key.clone(), client.clone())) as Arc<dyn AssetProvider>);

        if let Some(p) = &pixabay {
            set.stock_video = Some(p.clone());
            set.stock_image = Some(p.clone());
        }
        set.music = freesound.iter().chain(pixabay.iter()).cloned().collect();
        set.sound_effects = freesound.into_iter().collect();
        set
    }

    /// Ordered visual chain for a job mode. Fails when the mode has nothing
    /// configured to run; modes never borrow providers outside their chain.
    pub fn visual_chain(&self, mode: ProviderMode) -> Result<Vec<ChainStep>, PipelineError> {
        let generative = self
            .generative_image
            .clone()
            .map(|p| ChainStep::new(p, AssetKind::Image));
        let stock = [
            self.stock_video
                .clone()
                .map(|p| ChainStep::new(p, AssetKind::Video)),
            self.stock_image
                .clone()
                .map(|p| ChainStep::new(p, AssetKind::Image)),
        ];

        let chain: Vec<ChainStep> = match mode {
            ProviderMode::Generative => generative.into_iter().collect(),
            ProviderMode::Stock => stock.into_iter().flatten().collect(),
            ProviderMode::Mixed => generative.into_iter().chain(stock.into_iter().flatten()).collect(),
        };

        if chain.is_empty() {
            let needs = match mode {
                ProviderMode::Generative => "GOOGLE_API_KEY",
                ProviderMode::Stock => "PIXABAY_KEY",
                ProviderMode::Mixed => "GOOGLE_API_KEY or PIXABAY_KEY",
            };
            return Err(PipelineError::Configuration(format!(
                "{mode} provider mode requires {needs}"
            )));
        }
        Ok(chain)
    }

    pub fn music_chain(&self) -> Vec<ChainStep> {
        self.music
            .iter()
            .map(|p| ChainStep::new(p.clone(), AssetKind::Music))
            .collect()
    }

    pub fn sound_effect_chain(&self) -> Vec<ChainStep> {
        self.sound_effects
            .iter()
            .map(|p| ChainStep::new(p.clone(), AssetKind::SoundEffect))
            .collect()
    }
}

/// Plain GET of a candidate URL.
pub(crate) async fn fetch_bytes(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
) -> Result<Payload, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::request(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: format!("download of {url} failed"),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProviderError::request(provider, e))?;

    Ok(Payload {
        bytes,
        content_type,
    })
}

/// GET a JSON search endpoint, mapping non-2xx responses to `Status`.
pub(crate) async fn fetch_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::request(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::malformed(provider, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl AssetProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn candidates(
            &self,
            _kind: AssetKind,
            _query: &AssetQuery,
        ) -> Result<Vec<AssetCandidate>, ProviderError> {
            Ok(Vec::new())
        }

        async fn download(&self, _candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
            Err(ProviderError::malformed(self.0, "unused"))
        }
    }

    fn full_set() -> ProviderSet {
        let stock: Arc<dyn AssetProvider> = Arc::new(Named("pixabay"));
        ProviderSet {
            generative_image: Some(Arc::new(Named("gemini"))),
            stock_video: Some(stock.clone()),
            stock_image: Some(stock),
            music: Vec::new(),
            sound_effects: Vec::new(),
        }
    }

    fn labels(chain: &[ChainStep]) -> Vec<String> {
        chain.iter().map(ChainStep::label).collect()
    }

    #[test]
    fn mixed_prefers_generative_then_stock_video_then_image() {
        let chain = full_set().visual_chain(ProviderMode::Mixed).unwrap();
        assert_eq!(
            labels(&chain),
            vec!["gemini image", "pixabay video", "pixabay image"]
        );
    }

    #[test]
    fn single_source_modes_do_not_cross_over() {
        let set = full_set();
        assert_eq!(
            labels(&set.visual_chain(ProviderMode::Generative).unwrap()),
            vec!["gemini image"]
        );
        assert_eq!(
            labels(&set.visual_chain(ProviderMode::Stock).unwrap()),
            vec!["pixabay video", "pixabay image"]
        );
    }

    #[test]
    fn missing_credentials_are_a_configuration_error() {
        let mut set = full_set();
        set.generative_image = None;
        let err = set.visual_chain(ProviderMode::Generative).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
        assert!(set.visual_chain(ProviderMode::Mixed).is_ok());
    }

    #[test]
    fn from_settings_wires_only_configured_providers() {
        let settings = Settings {
            freesound_key: Some("fs".into()),
            ..Settings::default()
        };
        let set = ProviderSet::from_settings(&settings, reqwest::Client::new());
        assert!(set.generative_image.is_none());
        assert!(set.stock_video.is_none());
        assert_eq!(set.music.len(), 1);
        assert_eq!(set.sound_effects.len(), 1);
    }
}
