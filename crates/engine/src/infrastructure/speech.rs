//! Text-to-speech via the OpenAI audio API, with a local file cache.
//!
//! Synthesized clips are content-addressed: the cache key is a SHA-256 of
//! the text and voice, so repeated narration never pays for a second API
//! call. Callers get back a relative URL served by the audio endpoint.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::infrastructure::ports::SpeechPort;

pub const DEFAULT_TTS_VOICE: &str = "onyx";

const TTS_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";
const TTS_MODEL: &str = "tts-1";

// Keys shipped in .env templates that were never replaced.
const PLACEHOLDER_KEYS: [&str; 2] = ["your-key-here", "your_api_key_here"];

/// Preset voices for recurring speakers. Unknown speakers get the narrator voice.
pub fn voice_for_speaker(speaker: &str) -> &'static str {
    match speaker {
        "narrator" => "onyx",
        "gundren_rockseeker" => "echo",
        "sildar_hallwinter" => "fable",
        "goblin" => "shimmer",
        "bugbear" => "onyx",
        _ => DEFAULT_TTS_VOICE,
    }
}

fn cache_key(text: &str, voice: &str) -> String {
    let digest = Sha256::digest(format!("{text}:{voice}").as_bytes());
    hex::encode(digest)
}

fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
}

/// Speech synthesis backed by OpenAI `tts-1`.
///
/// Constructed disabled when the API key is missing or still a template
/// placeholder; a disabled instance synthesizes nothing but keeps serving
/// previously cached audio.
pub struct OpenAiSpeech {
    client: Client,
    api_key: String,
    default_voice: String,
    cache_dir: PathBuf,
    enabled: bool,
}

impl OpenAiSpeech {
    pub fn new(
        api_key: Option<String>,
        default_voice: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        let api_key = api_key.unwrap_or_default();
        let enabled = !api_key.is_empty() && !PLACEHOLDER_KEYS.contains(&api_key.as_str());
        Self {
            client: Client::new(),
            api_key,
            default_voice: default_voice.into(),
            cache_dir: cache_dir.into(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cached_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.mp3"))
    }
}

#[async_trait]
impl SpeechPort for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Option<String> {
        if !self.enabled || text.trim().is_empty() {
            return None;
        }

        let voice = voice.unwrap_or(self.default_voice.as_str());
        let key = cache_key(text, voice);
        let path = self.cached_path(&key);
        let url = format!("/api/audio/{key}.mp3");

        if fs::try_exists(&path).await.unwrap_or(false) {
            return Some(url);
        }

        let response = self
            .client
            .post(TTS_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": TTS_MODEL, "voice": voice, "input": text}))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "TTS request rejected");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "TTS request failed");
                return None;
            }
        };

        let bytes = response.bytes().await.ok()?;
        if let Err(e) = fs::create_dir_all(&self.cache_dir).await {
            tracing::warn!(error = %e, "Failed to create audio cache directory");
            return None;
        }
        if let Err(e) = fs::write(&path, &bytes).await {
            tracing::warn!(error = %e, "Failed to cache synthesized audio");
            return None;
        }

        Some(url)
    }

    async fn audio(&self, filename: &str) -> Option<Vec<u8>> {
        if !is_safe_filename(filename) {
            return None;
        }
        fs::read(self.cache_dir.join(filename)).await.ok()
    }

    async fn clear_cache(&self) -> usize {
        let mut removed = 0;
        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return removed;
        };
        while let Some(entry) = entries.next_entry().await.ok().flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("mp3")
                && fs::remove_file(&path).await.is_ok()
            {
                removed += 1;
            }
        }
        removed
    }
}

/// Speech backend that produces nothing. Used in tests.
pub struct NullSpeech;

#[async_trait]
impl SpeechPort for NullSpeech {
    async fn synthesize(&self, _text: &str, _voice: Option<&str>) -> Option<String> {
        None
    }

    async fn audio(&self, _filename: &str) -> Option<Vec<u8>> {
        None
    }

    async fn clear_cache(&self) -> usize {
        0
    }
}
