use async_trait::async_trait;
use engine::assets::{AssetCandidate, AssetKind};
use serde::Deserialize;
use std::collections::HashMap;

use super::{fetch_bytes, fetch_json, AssetProvider, AssetQuery, Payload};
use crate::error::ProviderError;

const FREESOUND_SEARCH_URL: &str = "https://freesound.org/apiv2/search/text/";
const NAME: &str = "freesound";

/// Freesound text search; downloads the high-quality MP3 preview, which
/// needs only a token rather than OAuth.
pub struct FreesoundProvider {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Sound>,
}

#[derive(Debug, Deserialize)]
struct Sound {
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    previews: HashMap<String, String>,
}

impl Sound {
    fn preview_url(&self) -> Option<&str> {
        ["preview-hq-mp3", "preview-lq-mp3"]
            .iter()
            .find_map(|key| self.previews.get(*key))
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

/// Duration window for each kind of sound.
fn duration_filter(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::SoundEffect => "duration:[0.5 TO 15]",
        _ => "duration:[20 TO 600]",
    }
}

impl FreesoundProvider {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { api_key, client }
    }
}

#[async_trait]
impl AssetProvider for FreesoundProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn candidates(
        &self,
        kind: AssetKind,
        query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError> {
        if !matches!(kind, AssetKind::Music | AssetKind::SoundEffect) {
            return Err(ProviderError::Unsupported {
                provider: NAME.to_string(),
                kind,
            });
        }

        let request = self.client.get(FREESOUND_SEARCH_URL).query(&[
            ("query", query.search.as_str()),
            ("token", self.api_key.as_str()),
            ("fields", "id,name,duration,previews"),
            ("filter", duration_filter(kind)),
            ("sort", "rating_desc"),
            ("page_size", "5"),
        ]);
        let body: SearchResponse = fetch_json(request, NAME).await?;

        let candidates: Vec<AssetCandidate> = body
            .results
            .iter()
            .filter_map(|sound| {
                let url = sound.preview_url()?;
                let candidate = AssetCandidate::new(format!("{NAME} '{}'", sound.name), url);
                Some(match sound.duration {
                    Some(d) => candidate.with_duration(d),
                    None => candidate,
                })
            })
            .collect();

        if candidates.is_empty() {
            return Err(ProviderError::NoResults {
                provider: NAME.to_string(),
                query: query.search.clone(),
            });
        }
        Ok(candidates)
    }

    async fn download(&self, candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
        fetch_bytes(&self.client, NAME, &candidate.locator).await
    }
}
