//! Phoneme cue extraction.
//!
//! Cue extraction is optional and best effort: the orchestrator is handed
//! an extractor (or none) and treats errors, empty results and absence the
//! same way. [`RhubarbExtractor`] drives the Rhubarb Lip Sync CLI.

use crate::audio::decode::{decode_bytes, write_wav_i16_mono};
use crate::config::CueConfig;
use crate::cue::CueTrack;
use crate::error::{LipSyncError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Produces a cue track for an encoded clip.
#[async_trait]
pub trait CueExtractor: Send + Sync {
    /// Analyse the same bytes handed to `speak`. Cue times must be on the
    /// clip's own playback clock. `Ok(None)` means "no cues".
    ///
    /// # Errors
    ///
    /// Returns an error if analysis fails.
    async fn extract(&self, audio: Bytes) -> Result<Option<CueTrack>>;
}

/// Runs `rhubarb -f json` on a scratch WAV copy of the clip.
#[derive(Debug, Clone)]
pub struct RhubarbExtractor {
    binary: PathBuf,
    recognizer: String,
    scratch_dir: PathBuf,
}

impl RhubarbExtractor {
    /// Use the given `rhubarb` binary with the phonetic recognizer.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            recognizer: "phonetic".to_owned(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Locate `rhubarb` from config: the explicit path if set, else `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::CueExtraction`] if no usable binary is found.
    pub fn discover(config: &CueConfig) -> Result<Self> {
        let binary = match config.rhubarb_path {
            Some(ref path) if path.is_file() => path.clone(),
            Some(ref path) => {
                return Err(LipSyncError::CueExtraction(format!(
                    "rhubarb not found at {}",
                    path.display()
                )));
            }
            None => which::which("rhubarb").map_err(|e| {
                LipSyncError::CueExtraction(format!("rhubarb not found on PATH: {e}"))
            })?,
        };
        info!("using rhubarb at {}", binary.display());
        Ok(Self::new(binary).with_recognizer(&config.recognizer))
    }

    /// Choose the Rhubarb recognizer (`phonetic` or `pocketSphinx`).
    pub fn with_recognizer(mut self, recognizer: &str) -> Self {
        self.recognizer = recognizer.to_owned();
        self
    }

    /// Directory for the temporary WAV handed to Rhubarb.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Path of the binary in use.
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl CueExtractor for RhubarbExtractor {
    async fn extract(&self, audio: Bytes) -> Result<Option<CueTrack>> {
        let wav_path = self
            .scratch_dir
            .join(format!("lipsync-{}.wav", uuid::Uuid::new_v4()));

        // Rhubarb only reads WAV/OGG, so transcode the MP3 first. The blocking
        // task owns the guard, so an abandoned transcode still removes its file.
        let wav = tokio::task::spawn_blocking(move || -> Result<ScratchFile> {
            let wav = ScratchFile(wav_path);
            let decoded = decode_bytes(audio)?;
            write_wav_i16_mono(&wav.0, &decoded.samples, decoded.sample_rate)?;
            Ok(wav)
        })
        .await
        .map_err(|e| LipSyncError::CueExtraction(format!("transcode task failed: {e}")))??;

        let output = Command::new(&self.binary)
            .arg("--exportFormat")
            .arg("json")
            .arg("--recognizer")
            .arg(&self.recognizer)
            .arg("--quiet")
            .arg(&wav.0)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LipSyncError::CueExtraction(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LipSyncError::CueExtraction(format!(
                "rhubarb exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let track = CueTrack::from_rhubarb_json(&String::from_utf8_lossy(&output.stdout))?;
        debug!("rhubarb cue count: {}", track.len());
        Ok((!track.is_empty()).then_some(track))
    }
}

/// Temporary file removed on drop.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}
