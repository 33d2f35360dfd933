//! Streams a WAV file over an outbound `PCMU` track.
//!
//! The file is decoded up front, folded to mono, resampled to 8 kHz with
//! nearest-sample picking and companded to G.711 μ-law, then written in 20 ms
//! frames once the connection is up.

use crate::error::RtcError;
use crate::peer::PeerState;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub const PCMU_SAMPLE_RATE: u32 = 8_000;

pub const FRAME_DURATION: Duration = Duration::from_millis(20);

const SAMPLES_PER_FRAME: usize = (PCMU_SAMPLE_RATE as usize) / 50;

/// Decodes a WAV file into ready-to-send μ-law frames.
pub fn load_pcmu_frames(path: &Path) -> Result<Vec<Bytes>, RtcError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| RtcError::Audio(format!("failed to open {:?}: {}", path, e)))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(RtcError::Audio(format!("unsupported WAV header: {:?}", spec)));
    }

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let shift = i32::from(spec.bits_per_sample) - 16;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if shift >= 0 {
                            (v >> shift) as i16
                        } else {
                            (v << -shift) as i16
                        }
                    })
                })
                .collect::<Result<_, _>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<Result<_, _>>(),
    }
    .map_err(|e| RtcError::Audio(format!("failed to decode {:?}: {}", path, e)))?;

    let mono = downmix(&samples, usize::from(spec.channels));
    let resampled = resample(&mono, spec.sample_rate, PCMU_SAMPLE_RATE);

    Ok(resampled
        .chunks(SAMPLES_PER_FRAME)
        .map(|frame| Bytes::from(frame.iter().map(|&s| linear_to_ulaw(s)).collect::<Vec<u8>>()))
        .collect())
}

/// Waits for the connection to come up, then writes one frame per tick.
/// Returns early if the connection fails or closes first.
pub(crate) async fn play(
    track: Arc<TrackLocalStaticSample>,
    frames: Vec<Bytes>,
    mut state: watch::Receiver<PeerState>,
) {
    loop {
        let current = *state.borrow_and_update();
        match current {
            PeerState::Connected => break,
            PeerState::Failed | PeerState::Closed => return,
            _ => {}
        }
        if state.changed().await.is_err() {
            return;
        }
    }

    let mut ticker = tokio::time::interval(FRAME_DURATION);
    for data in frames {
        ticker.tick().await;
        let sample = Sample {
            data,
            duration: FRAME_DURATION,
            ..Default::default()
        };
        if let Err(e) = track.write_sample(&sample).await {
            tracing::warn!("audio track write failed, stopping playback: {}", e);
            return;
        }
    }
    tracing::debug!("audio track playback finished");
}

fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

fn resample(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * u64::from(to) / u64::from(from)) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * u64::from(from) / u64::from(to)) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}

/// G.711 μ-law compression of one 16-bit sample.
fn linear_to_ulaw(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32_635;

    let mut pcm = i32::from(sample);
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    pcm = pcm.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}
