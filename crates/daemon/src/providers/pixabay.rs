use async_trait::async_trait;
use engine::assets::{AssetCandidate, AssetKind};
use serde::Deserialize;

use super::{fetch_bytes, fetch_json, AssetProvider, AssetQuery, Payload};
use crate::config::Aspect;
use crate::error::ProviderError;

const PIXABAY_API_BASE: &str = "https://pixabay.com/api";
const NAME: &str = "pixabay";

/// Pixabay stock catalogue: photos, videos (several resolution tiers per
/// hit), and music.
pub struct PixabayProvider {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Hits<T> {
    #[serde(default)]
    hits: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageHit {
    #[serde(default, rename = "largeImageURL")]
    large_image_url: Option<String>,
    #[serde(default, rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
}

#[derive(Debug, Deserialize)]
struct VideoHit {
    #[serde(default)]
    duration: Option<f64>,
    videos: VideoTiers,
}

#[derive(Debug, Deserialize)]
struct VideoTiers {
    large: Option<VideoFile>,
    medium: Option<VideoFile>,
    small: Option<VideoFile>,
    tiny: Option<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct AudioHit {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl PixabayProvider {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { api_key, client }
    }

    fn search(&self, endpoint: &str, query: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{PIXABAY_API_BASE}{endpoint}"))
            .query(&[("key", self.api_key.as_str()), ("q", query)])
    }

    async fn images(&self, query: &AssetQuery) -> Result<Vec<AssetCandidate>, ProviderError> {
        let orientation = match query.aspect {
            Aspect::Horizontal => "horizontal",
            Aspect::Vertical => "vertical",
        };
        let request = self.search("/", &query.search).query(&[
            ("image_type", "photo"),
            ("orientation", orientation),
            ("safesearch", "true"),
            ("per_page", "5"),
        ]);
        let body: Hits<ImageHit> = fetch_json(request, NAME).await?;
        Ok(body
            .hits
            .into_iter()
            .filter_map(|hit| {
                let url = hit.large_image_url.or(hit.webformat_url)?;
                let candidate = AssetCandidate::new(NAME, url);
                Some(if hit.image_width > 0 && hit.image_height > 0 {
                    candidate.with_size(hit.image_width, hit.image_height)
                } else {
                    candidate
                })
            })
            .collect())
    }

    async fn videos(&self, query: &AssetQuery) -> Result<Vec<AssetCandidate>, ProviderError> {
        let request = self
            .search("/videos/", &query.search)
            .query(&[("safesearch", "true"), ("per_page", "3")]);
        let body: Hits<VideoHit> = fetch_json(request, NAME).await?;
        Ok(body.hits.into_iter().flat_map(video_candidates).collect())
    }

    async fn music(&self, query: &AssetQuery) -> Result<Vec<AssetCandidate>, ProviderError> {
        let request = self.search("/audio/", &query.search).query(&[
            ("order", "popular"),
            ("category", "music"),
            ("per_page", "3"),
        ]);
        let body: Hits<AudioHit> = fetch_json(request, NAME).await?;
        Ok(body
            .hits
            .into_iter()
            .filter_map(|hit| {
                let url = hit.url.filter(|u| !u.is_empty())?;
                let candidate = AssetCandidate::new(NAME, url);
                Some(match hit.duration {
                    Some(d) => candidate.with_duration(d),
                    None => candidate,
                })
            })
            .collect())
    }
}

fn video_candidates(hit: VideoHit) -> Vec<AssetCandidate> {
    let VideoTiers {
        large,
        medium,
        small,
        tiny,
    } = hit.videos;
    [large, medium, small, tiny]
        .into_iter()
        .flatten()
        .filter(|file| !file.url.is_empty())
        .map(|file| {
            let mut candidate = AssetCandidate::new(NAME, file.url);
            if file.width > 0 && file.height > 0 {
                candidate = candidate.with_size(file.width, file.height);
            }
            if let Some(d) = hit.duration {
                candidate = candidate.with_duration(d);
            }
            candidate
        })
        .collect()
}

#[async_trait]
impl AssetProvider for PixabayProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn candidates(
        &self,
        kind: AssetKind,
        query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError> {
        let candidates = match kind {
            AssetKind::Image => self.images(query).await?,
            AssetKind::Video => self.videos(query).await?,
            AssetKind::Music => self.music(query).await?,
            AssetKind::SoundEffect => {
                return Err(ProviderError::Unsupported {
                    provider: NAME.to_string(),
                    kind,
                })
            }
        };
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_video_tier_becomes_a_candidate() {
        let body: Hits<VideoHit> = serde_json::from_value(json!({
            "hits": [{
                "duration": 14,
                "videos": {
                    "large": { "url": "https://cdn/large.mp4", "width": 3840, "height": 2160, "size": 1 },
                    "medium": { "url": "https://cdn/medium.mp4", "width": 1920, "height": 1080, "size": 1 },
                    "small": { "url": "https://cdn/small.mp4", "width": 1280, "height": 720, "size": 1 },
                    "tiny": { "url": "", "width": 0, "height": 0, "size": 0 }
                }
            }]
        }))
        .unwrap();
        let candidates: Vec<_> = body.hits.into_iter().flat_map(video_candidates).collect();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[1].size.unwrap().width, 1920);
        assert_eq!(candidates[2].duration_secs, Some(14.0));
    }

    #[test]
    fn image_hits_parse_with_missing_fields() {
        let body: Hits<ImageHit> = serde_json::from_value(json!({
            "total": 2,
            "hits": [
                { "largeImageURL": "https://cdn/a.jpg", "imageWidth": 4000, "imageHeight": 2500 },
                { "webformatURL": "https://cdn/b.jpg" }
            ]
        }))
        .unwrap();
        assert_eq!(body.hits.len(), 2);
        assert_eq!(body.hits[0].large_image_url.as_deref(), Some("https://cdn/a.jpg"));
        assert_eq!(body.hits[1].webformat_url.as_deref(), Some("https://cdn/b.jpg"));
    }
}
