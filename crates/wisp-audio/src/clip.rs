//! Decode an uploaded clip to 16kHz mono PCM16.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::errors::AudioError;

/// Sample rate the live model ingests.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// A decoded, normalized voice clip.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Mono PCM16 samples at [`TARGET_SAMPLE_RATE`].
    pub samples: Vec<i16>,
    /// Always [`TARGET_SAMPLE_RATE`]; carried for wire payload metadata.
    pub sample_rate: u32,
    /// Duration in seconds, measured from the decoded source.
    pub duration_secs: f64,
}

impl AudioClip {
    /// Little-endian byte view of the samples, ready for base64.
    #[must_use]
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Decode clip bytes into a normalized [`AudioClip`].
///
/// `mime_type` only seeds the container probe hint; the real format is
/// sniffed from the bytes. The duration ceiling `max_secs` is enforced
/// from decoded frame counts, and oversized clips are rejected as early
/// as the container metadata allows.
pub fn decode_clip(data: &[u8], mime_type: &str, max_secs: f64) -> Result<AudioClip, AudioError> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    match mime_type {
        "audio/wav" | "audio/wave" | "audio/x-wav" => {
            let _ = hint.with_extension("wav");
        }
        "audio/m4a" | "audio/mp4" | "audio/x-m4a" | "audio/aac" => {
            let _ = hint.with_extension("m4a");
        }
        _ => {}
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(format!("probe failed: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("no audio track found".into()))?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("source sample rate unknown".into()))?;
    let channels = codec_params.channels.map_or(1, |c| c.count());

    // Containers that carry a frame count let us reject before decoding
    // a single packet.
    if let Some(frames) = codec_params.n_frames {
        let secs = frames as f64 / f64::from(source_rate);
        if secs > max_secs {
            return Err(AudioError::TooLong {
                duration_secs: secs,
                limit_secs: max_secs,
            });
        }
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("codec init failed: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(AudioError::Decode(format!("packet read: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // A corrupt frame is skippable; anything else is fatal.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(AudioError::Decode(format!("decode: {e}"))),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        if channels > 1 {
            for frame in samples.chunks(channels) {
                mono.push(frame.iter().sum::<f32>() / channels as f32);
            }
        } else {
            mono.extend_from_slice(samples);
        }

        // Streams without container metadata get bounded here instead.
        let secs = mono.len() as f64 / f64::from(source_rate);
        if secs > max_secs {
            return Err(AudioError::TooLong {
                duration_secs: secs,
                limit_secs: max_secs,
            });
        }
    }

    if mono.is_empty() {
        return Err(AudioError::Empty);
    }
    let duration_secs = mono.len() as f64 / f64::from(source_rate);

    let resampled = if source_rate == TARGET_SAMPLE_RATE {
        mono
    } else {
        resample_to_target(&mono, source_rate)?
    };

    Ok(AudioClip {
        samples: to_pcm16(&resampled),
        sample_rate: TARGET_SAMPLE_RATE,
        duration_secs,
    })
}

/// Resample mono f32 audio from `from_rate` to [`TARGET_SAMPLE_RATE`].
fn resample_to_target(samples: &[f32], from_rate: u32) -> Result<Vec<f32>, AudioError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(TARGET_SAMPLE_RATE) / f64::from(from_rate);
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AudioError::Resample(format!("init: {e}")))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);
    let mut chunks = samples.chunks_exact(chunk_size);
    for chunk in chunks.by_ref() {
        let resampled = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resample(format!("process: {e}")))?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }

    // Short tail, then drain what the sinc window is still holding.
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let resampled = resampler
            .process_partial(Some(&[tail]), None)
            .map_err(|e| AudioError::Resample(format!("tail: {e}")))?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }
    let flushed = resampler
        .process_partial(None::<&[Vec<f32>]>, None)
        .map_err(|e| AudioError::Resample(format!("flush: {e}")))?;
    if let Some(channel) = flushed.first() {
        output.extend_from_slice(channel);
    }

    Ok(output)
}

fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_rejected() {
        let result = decode_clip(b"definitely not audio", "audio/m4a", 5.5);
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }

    #[test]
    fn empty_input_is_rejected() {
        let result = decode_clip(b"", "audio/wav", 5.5);
        assert!(result.is_err());
    }

    #[test]
    fn zero_frame_wav_is_empty() {
        let wav = test_wav(16_000, 1, 0, 0.0);
        let result = decode_clip(&wav, "audio/wav", 5.5);
        assert!(matches!(result, Err(AudioError::Empty)));
    }

    #[test]
    fn native_rate_wav_passes_through() {
        // 0.1s of tone at the target rate already
        let wav = test_wav(16_000, 1, 1_600, 0.5);
        let clip = decode_clip(&wav, "audio/wav", 5.5).unwrap();
        assert_eq!(clip.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(clip.samples.len(), 1_600);
        assert!((clip.duration_secs - 0.1).abs() < 0.01);
        assert!(clip.samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn stereo_44khz_is_mixed_and_resampled() {
        // 0.5s stereo at 44.1kHz → ~8000 mono samples at 16kHz
        let wav = test_wav(44_100, 2, 22_050, 0.5);
        let clip = decode_clip(&wav, "audio/wav", 5.5).unwrap();
        assert_eq!(clip.sample_rate, TARGET_SAMPLE_RATE);
        assert!((clip.duration_secs - 0.5).abs() < 0.01);
        let ratio = clip.samples.len() as f64 / 8_000.0;
        assert!((ratio - 1.0).abs() < 0.2, "got {} samples", clip.samples.len());
    }

    #[test]
    fn over_ceiling_clip_is_rejected() {
        // 3s clip against a 2.5s ceiling
        let wav = test_wav(16_000, 1, 48_000, 0.1);
        let err = decode_clip(&wav, "audio/wav", 2.5).unwrap_err();
        match err {
            AudioError::TooLong {
                duration_secs,
                limit_secs,
            } => {
                assert!(duration_secs > 2.5);
                assert!((limit_secs - 2.5).abs() < f64::EPSILON);
            }
            other => panic!("expected TooLong, got {other:?}"),
        }
    }

    #[test]
    fn exactly_at_ceiling_is_allowed() {
        let wav = test_wav(16_000, 1, 40_000, 0.1);
        let clip = decode_clip(&wav, "audio/wav", 2.5).unwrap();
        assert!((clip.duration_secs - 2.5).abs() < 0.01);
    }

    #[test]
    fn pcm_bytes_are_little_endian_pairs() {
        let clip = AudioClip {
            samples: vec![1, -2],
            sample_rate: TARGET_SAMPLE_RATE,
            duration_secs: 0.0,
        };
        assert_eq!(clip.pcm_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
    }

    #[test]
    fn pcm16_conversion_clamps_overdrive() {
        let out = to_pcm16(&[2.0, -2.0, 0.0]);
        assert_eq!(out[0], i16::MAX);
        assert_eq!(out[1], -i16::MAX);
        assert_eq!(out[2], 0);
    }

    /// Minimal PCM16 WAV with a 440Hz tone at the given amplitude.
    fn test_wav(sample_rate: u32, channels: u16, frames: u32, amp: f32) -> Vec<u8> {
        let bits_per_sample: u16 = 16;
        let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let block_align = channels * bits_per_sample / 8;
        let data_size = frames * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let file_size = 36 + data_size;

        let mut buf = Vec::with_capacity(file_size as usize + 8);
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&file_size.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = (amp * (t * 440.0 * std::f32::consts::TAU).sin() * 32_000.0) as i16;
            for _ in 0..channels {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        buf
    }
}
