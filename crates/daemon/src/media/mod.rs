pub mod ffmpeg;
pub mod fonts;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Content fingerprint of a fetched asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetDigest {
    pub sha256: String,
    pub size_bytes: u64,
}

impl AssetDigest {
    pub fn of(payload: &[u8]) -> Self {
        AssetDigest {
            sha256: hex::encode(Sha256::digest(payload)),
            size_bytes: payload.len() as u64,
        }
    }
}

/// Moves a file, falling back to copy + remove across filesystems.
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_records_hash_and_length() {
        let digest = AssetDigest::of(b"abc");
        assert_eq!(
            digest.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.size_bytes, 3);
        assert_eq!(AssetDigest::of(b"").size_bytes, 0);
    }

    #[tokio::test]
    async fn move_file_creates_the_destination_directory() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("render.mp4");
        let to = dir.path().join("renders/out.mp4");
        tokio::fs::write(&from, b"video").await.unwrap();
        move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"video");
    }
}
