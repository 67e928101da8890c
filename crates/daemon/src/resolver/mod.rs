//! Fills asset slots by walking provider chains.
//!
//! Two levels of fallback: inside a provider, its ranked candidates (stock
//! video tiers, search hits); across providers, the ordered chain steps of
//! the slot. A rejected payload counts as a failed candidate and the walk
//! moves on. Only when every candidate of every step has failed does the
//! slot fail, with one aggregated error.

use engine::assets::{rank_candidates, validate_payload, AssetCandidate, AssetKind};
use engine::fallback::first_success;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::media::AssetDigest;
use crate::providers::{AssetProvider, AssetQuery, ChainStep};

#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub candidate: AssetCandidate,
    pub digest: AssetDigest,
}

/// Tries one provider's candidates for `kind`, best match first, and writes
/// the first valid payload to `dest`.
pub async fn fetch_into(
    provider: &dyn AssetProvider,
    kind: AssetKind,
    query: &AssetQuery,
    dest: &Path,
) -> Result<ResolvedAsset, ProviderError> {
    let mut candidates = provider.candidates(kind, query).await?;
    rank_candidates(&mut candidates, &query.target);
    debug!(
        provider = provider.name(),
        %kind,
        count = candidates.len(),
        "ranked candidates"
    );

    let (candidate, digest) = first_success(candidates, AssetCandidate::label, |candidate| async move {
        let payload = provider.download(&candidate).await?;
        if let Err(rejected) =
            validate_payload(&payload.bytes, kind.media_class(), payload.content_type.as_deref())
        {
            warn!(candidate = %candidate.label(), error = %rejected, "rejected payload");
            return Err(rejected.into());
        }
        tokio::fs::write(dest, &payload.bytes).await?;
        Ok::<_, ProviderError>((candidate, AssetDigest::of(&payload.bytes)))
    })
    .await
    .map_err(|err| ProviderError::Exhausted {
        slot: format!("{} from {}", kind, provider.name()),
        attempts: err.attempts(),
        summary: err.summary(),
    })?;

    Ok(ResolvedAsset {
        path: dest.to_path_buf(),
        kind,
        candidate,
        digest,
    })
}

/// Walks the chain for one slot. Each step writes to `stem` with the
/// extension of the kind it fetches.
pub async fn resolve_slot(
    slot: &str,
    chain: &[ChainStep],
    query: &AssetQuery,
    stem: &Path,
) -> Result<ResolvedAsset, ProviderError> {
    let result = first_success(chain, |step| step.label(), |step| async move {
        let dest = stem.with_extension(step.kind.file_extension());
        let outcome = fetch_into(step.provider.as_ref(), step.kind, query, &dest).await;
        if let Err(e) = &outcome {
            warn!(slot, step = %step.label(), error = %e, "provider failed, trying next");
        }
        outcome
    })
    .await;

    match result {
        Ok(asset) => {
            info!(
                slot,
                source = %asset.candidate.source,
                kind = %asset.kind,
                sha256 = %asset.digest.sha256,
                bytes = asset.digest.size_bytes,
                "resolved asset"
            );
            Ok(asset)
        }
        Err(err) => Err(ProviderError::Exhausted {
            slot: slot.to_string(),
            attempts: err.attempts(),
            summary: if err.attempts() == 0 {
                "no providers configured".to_string()
            } else {
                err.summary()
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Aspect;
    use crate::providers::Payload;
    use async_trait::async_trait;
    use bytes::Bytes;
    use engine::assets::TargetHint;
    use engine::timeline::Resolution;
    use std::sync::{Arc, Mutex};

    /// Offers `count` candidates; those listed in `bad` return a truncated payload.
    struct Scripted {
        name: &'static str,
        count: usize,
        bad: Vec<usize>,
        downloads: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(name: &'static str, count: usize, bad: Vec<usize>) -> Arc<Self> {
            Arc::new(Scripted {
                name,
                count,
                bad,
                downloads: Mutex::new(Vec::new()),
            })
        }

        fn downloads(&self) -> Vec<String> {
            self.downloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AssetProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn candidates(
            &self,
            _kind: AssetKind,
            _query: &AssetQuery,
        ) -> Result<Vec<AssetCandidate>, ProviderError> {
            Ok((0..self.count)
                .map(|i| AssetCandidate::new(self.name, i.to_string()))
                .collect())
        }

        async fn download(&self, candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
            self.downloads.lock().unwrap().push(candidate.locator.clone());
            let index: usize = candidate.locator.parse().unwrap();
            let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
            let len = if self.bad.contains(&index) { 100 } else { 4096 };
            bytes.resize(len, 7);
            Ok(Payload {
                bytes: Bytes::from(bytes),
                content_type: Some("image/png".to_string()),
            })
        }
    }

    fn query() -> AssetQuery {
        AssetQuery {
            search: "beach".into(),
            prompt: "a sunny beach".into(),
            aspect: Aspect::Horizontal,
            target: TargetHint {
                frame: Resolution::new(1920, 1080),
                duration_secs: None,
            },
        }
    }

    #[tokio::test]
    async fn takes_the_first_valid_candidate_without_retrying_failures() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new("stock", 5, vec![0, 1, 2]);
        let asset = fetch_into(provider.as_ref(), AssetKind::Image, &query(), &dir.path().join("s.png"))
            .await
            .unwrap();
        assert_eq!(asset.candidate.locator, "3");
        assert_eq!(provider.downloads(), vec!["0", "1", "2", "3"]);
        assert_eq!(std::fs::metadata(&asset.path).unwrap().len(), 4096);
        assert_eq!(asset.digest.size_bytes, 4096);
        assert_eq!(asset.digest, AssetDigest::of(&std::fs::read(&asset.path).unwrap()));
    }

    #[tokio::test]
    async fn chain_falls_through_to_the_next_provider() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Scripted::new("generative", 2, vec![0, 1]);
        let stock = Scripted::new("stock", 1, vec![]);
        let chain = vec![
            ChainStep::new(broken.clone(), AssetKind::Image),
            ChainStep::new(stock.clone(), AssetKind::Image),
        ];
        let asset = resolve_slot("scene 0 visual", &chain, &query(), &dir.path().join("scene_0"))
            .await
            .unwrap();
        assert_eq!(asset.candidate.source, "stock");
        assert_eq!(asset.path, dir.path().join("scene_0.png"));
        assert_eq!(broken.downloads().len(), 2);
    }

    #[tokio::test]
    async fn exhausting_every_provider_is_one_aggregated_error() {
        let dir = tempfile::tempdir().unwrap();
        let chain = vec![
            ChainStep::new(Scripted::new("a", 2, vec![0, 1]), AssetKind::Image),
            ChainStep::new(Scripted::new("b", 1, vec![0]), AssetKind::Image),
        ];
        let err = resolve_slot("scene 2 visual", &chain, &query(), &dir.path().join("scene_2"))
            .await
            .unwrap_err();
        match err {
            ProviderError::Exhausted {
                slot,
                attempts,
                summary,
            } => {
                assert_eq!(slot, "scene 2 visual");
                assert_eq!(attempts, 2);
                assert!(summary.contains("a image"));
                assert!(summary.contains("b image"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("scene_2.png").exists());
    }

    #[tokio::test]
    async fn empty_chain_reports_no_providers() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_slot("music", &[], &query(), &dir.path().join("music"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no providers configured"));
    }
}
