//! Decoding of encoded speech clips (MP3 from the TTS service, WAV, AAC)
//! into mono `f32` PCM, plus the small sample-level helpers around it.

use crate::error::{LipSyncError, Result};
use bytes::Bytes;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// A decoded, mono clip ready for playback.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in `[-1, 1]`.
    pub samples: Arc<[f32]>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Wrap already-decoded samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Resample to `to_sr`, returning `self` unchanged if the rate already matches.
    pub fn resampled(self, to_sr: u32) -> Self {
        if self.sample_rate == to_sr {
            return self;
        }
        Self::new(
            resample_linear_mono(&self.samples, self.sample_rate, to_sr),
            to_sr,
        )
    }
}

/// Decode an encoded clip into mono PCM, downmixing multichannel audio.
///
/// # Errors
///
/// Returns [`LipSyncError::Decode`] if the container or codec is not
/// recognised or the stream is corrupt, and when no samples come out.
pub fn decode_bytes(payload: Bytes) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    if payload.is_empty() {
        return Err(LipSyncError::Decode("empty audio payload".into()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(payload)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| LipSyncError::Decode(format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| LipSyncError::Decode("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sr = codec_params
        .sample_rate
        .ok_or_else(|| LipSyncError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| LipSyncError::Decode(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(LipSyncError::Decode(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip corrupt frames; MP3 streams from TTS services often start with one.
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(LipSyncError::Decode(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);

        if sample_buf.as_ref().is_none_or(|b| b.capacity() < required) {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(b) = sample_buf.as_mut() {
            b.clear();
        }

        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        let data = buf.samples();

        if channels <= 1 {
            out.extend_from_slice(data);
        } else {
            out.extend(
                data.chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if out.is_empty() {
        return Err(LipSyncError::Decode("audio contained no samples".into()));
    }

    Ok(DecodedAudio::new(out, sr))
}

/// Write mono samples as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_wav_i16_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| LipSyncError::Audio(format!("failed to create wav writer: {e}")))?;

    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let v = (clamped * i16::MAX as f32).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| LipSyncError::Audio(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| LipSyncError::Audio(format!("failed to finalize wav: {e}")))?;
    Ok(())
}

/// Linear-interpolation resampler for mono audio.
pub fn resample_linear_mono(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if input.is_empty() || from_sr == to_sr || from_sr == 0 || to_sr == 0 {
        return input.to_vec();
    }

    let ratio = f64::from(to_sr) / f64::from(from_sr);
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let src_pos = (i as f64) / ratio;
            let i0 = (src_pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (src_pos - i0 as f64).clamp(0.0, 1.0) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    /// Encode a sine tone as an in-memory 16-bit WAV.
    pub(crate) fn sine_wav(secs: f32, sample_rate: u32, channels: u16, amplitude: f32) -> Bytes {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut data = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut data), spec).unwrap();
            let frames = (secs * sample_rate as f32) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let s = (t * 220.0 * std::f32::consts::TAU).sin() * amplitude;
                for _ in 0..channels {
                    writer
                        .write_sample((s * i16::MAX as f32) as i16)
                        .unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        Bytes::from(data)
    }

    #[test]
    fn decodes_mono_wav() {
        let audio = decode_bytes(sine_wav(0.5, 16_000, 1, 0.5)).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.samples.len(), 8_000);
        let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.45 && peak <= 0.51, "peak {peak}");
    }

    #[test]
    fn downmixes_stereo() {
        let audio = decode_bytes(sine_wav(0.25, 24_000, 2, 0.5)).unwrap();
        assert_eq!(audio.samples.len(), 6_000);
    }

    #[test]
    fn rejects_garbage_and_empty_payloads() {
        assert!(matches!(
            decode_bytes(Bytes::from_static(b"definitely not audio")),
            Err(LipSyncError::Decode(_))
        ));
        assert!(matches!(
            decode_bytes(Bytes::new()),
            Err(LipSyncError::Decode(_))
        ));
    }

    #[test]
    fn resample_changes_length_by_ratio() {
        let input = vec![0.25f32; 16_000];
        let out = resample_linear_mono(&input, 16_000, 24_000);
        assert_eq!(out.len(), 24_000);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn resampled_keeps_duration() {
        let audio = DecodedAudio::new(vec![0.0; 22_050], 22_050).resampled(24_000);
        assert_eq!(audio.sample_rate, 24_000);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn wav_export_round_trips_through_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let samples: Vec<f32> = (0..1600).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        write_wav_i16_mono(&path, &samples, 16_000).unwrap();

        let bytes = Bytes::from(std::fs::read(&path).unwrap());
        let audio = decode_bytes(bytes).unwrap();
        assert_eq!(audio.samples.len(), 1600);
        assert!((audio.samples[0] - 0.5).abs() < 1e-3);
    }
}
