use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the speech endpoint accepts in one request.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Text to speech. Writes an audio file whose duration sets the scene's
/// length floor.
#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str, dest: &Path) -> Result<()>;
}

/// Google Translate speech endpoint. MP3 frames concatenate cleanly, so
/// chunks are fetched in order and appended.
pub struct GoogleTranslateTts {
    client: reqwest::Client,
}

impl GoogleTranslateTts {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NarrationSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str, language: &str, dest: &Path) -> Result<()> {
        let chunks = split_for_speech(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            anyhow::bail!("nothing to synthesize");
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx_str = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(TRANSLATE_TTS_URL)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx_str.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .context("speech request failed")?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("speech endpoint returned {} for chunk {}", status, idx);
            }
            let bytes = response.bytes().await.context("speech download failed")?;
            debug!(chunk = idx, bytes = bytes.len(), "synthesized narration chunk");
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            anyhow::bail!("speech endpoint returned no audio");
        }
        tokio::fs::write(dest, &audio)
            .await
            .with_context(|| format!("writing narration to {}", dest.display()))?;
        Ok(())
    }
}

/// Splits text at word boundaries into chunks of at most `max_chars`
/// characters. A single word longer than the limit is hard-split.
pub fn split_for_speech(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
