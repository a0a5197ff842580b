//! Audio playback to system speakers via cpal.

use crate::audio::decode::DecodedAudio;
use crate::audio::output::{AudioOutput, PlaybackCursor, PlaybackHandle, PlaybackStatus};
use crate::config::AudioConfig;
use crate::error::{LipSyncError, Result};
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// How often the stream thread checks whether the clip has drained.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Audio output to the system speakers.
///
/// Each clip gets its own output stream, owned by a dedicated thread
/// because cpal streams are not `Send` on every platform.
#[derive(Debug, Clone)]
pub struct CpalOutput {
    config: AudioConfig,
}

impl CpalOutput {
    /// Create a new output, checking that the configured device exists.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let device = select_device(config)?;
        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");
        Ok(Self {
            config: config.clone(),
        })
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| LipSyncError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn open(&self, audio: DecodedAudio) -> Result<Arc<dyn PlaybackHandle>> {
        let audio = audio.resampled(self.config.output_sample_rate);
        let handle: Arc<dyn PlaybackHandle> = Arc::new(CpalPlayback {
            cursor: Arc::new(PlaybackCursor::new(&audio)),
            config: self.config.clone(),
            control: Mutex::new(None),
        });
        Ok(handle)
    }
}

/// One clip playing on a cpal output stream.
pub struct CpalPlayback {
    cursor: Arc<PlaybackCursor>,
    config: AudioConfig,
    /// Stop signal for the stream thread. Dropping it also ends the thread.
    control: Mutex<Option<Sender<()>>>,
}

#[async_trait]
impl PlaybackHandle for CpalPlayback {
    async fn play(&self) -> Result<()> {
        if self.cursor.status().is_finished() {
            return Err(LipSyncError::Playback("clip already stopped".into()));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let cursor = Arc::clone(&self.cursor);
        let config = self.config.clone();

        std::thread::Builder::new()
            .name("lipsync-playback".into())
            .spawn(move || run_stream(&config, cursor, stop_rx, ready_tx))
            .map_err(|e| LipSyncError::Playback(format!("failed to spawn stream thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| LipSyncError::Playback("stream thread exited before starting".into()))??;

        *self.control.lock().unwrap_or_else(|e| e.into_inner()) = Some(stop_tx);
        Ok(())
    }

    fn stop(&self) {
        self.cursor.set_status(PlaybackStatus::Stopped);
        if let Some(tx) = self.control.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.try_send(());
        }
    }

    fn current_time(&self) -> f64 {
        self.cursor.current_time()
    }

    fn status(&self) -> PlaybackStatus {
        self.cursor.status()
    }

    fn read_window(&self, buf: &mut [f32]) {
        self.cursor.read_window(buf);
    }
}

/// Body of the stream thread: build and start the stream, report back,
/// then keep the stream alive until the clip drains or a stop arrives.
fn run_stream(
    config: &AudioConfig,
    cursor: Arc<PlaybackCursor>,
    stop_rx: Receiver<()>,
    ready_tx: oneshot::Sender<Result<()>>,
) {
    let stream = match build_stream(config, Arc::clone(&cursor)) {
        Ok(s) => s,
        Err(e) => {
            cursor.set_status(PlaybackStatus::Stopped);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    cursor.set_status(PlaybackStatus::Playing);
    if let Err(e) = stream.play() {
        cursor.set_status(PlaybackStatus::Stopped);
        let _ = ready_tx.send(Err(LipSyncError::Playback(format!(
            "failed to start output stream: {e}"
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        match stop_rx.recv_timeout(DRAIN_POLL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if cursor.status().is_finished() {
                    break;
                }
            }
        }
    }

    debug!("releasing output stream at {:.3}s", cursor.current_time());
    drop(stream);
}

fn build_stream(config: &AudioConfig, cursor: Arc<PlaybackCursor>) -> Result<cpal::Stream> {
    let device = select_device(config)?;
    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: config.output_sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                if cursor.status() == PlaybackStatus::Playing {
                    cursor.fill(data);
                } else {
                    data.fill(0.0);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| LipSyncError::Playback(format!("failed to build output stream: {e}")))
}

fn select_device(config: &AudioConfig) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(ref name) = config.output_device {
        host.output_devices()
            .map_err(|e| LipSyncError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| LipSyncError::Audio(format!("output device '{name}' not found")))
    } else {
        host.default_output_device()
            .ok_or_else(|| LipSyncError::Audio("no default output device".into()))
    }
}
