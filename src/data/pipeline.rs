// ============================================================
// Layer 4 — Audio Pipeline
// ============================================================
// Contract: given a file path and a target sample rate, produce
// a mono, resampled 1-D signal ready for feature extraction.
//
//   decode (symphonia) → downmix to mono → resample (rubato)
//
// The resampler is the expensive part: constructing an FFT
// resampler allocates plans and buffers. Consecutive clips from
// the same dataset almost always share a source rate, so the
// pipeline keeps the last resampler in a small explicit cache
// keyed by the source rate it was built for, and rebuilds it
// only when a clip with a different rate shows up.
//
// A clip that cannot be decoded is a data error: it is
// propagated to the caller with context and never retried.
//
// Reference: symphonia crate documentation
//            rubato crate documentation (Fft, FixedSync)

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// Raw decoder output before any rate conversion.
pub struct DecodedAudio {
    /// Interleaved f32 samples, `channels` per frame
    pub interleaved: Vec<f32>,
    pub channels:    usize,
    pub sample_rate: u32,
}

// ─── ResamplerCache ───────────────────────────────────────────────────────────
/// One FFT resampler together with the source rate it was built
/// for. Owned by the pipeline; replaced, never mutated in place.
pub struct ResamplerCache {
    source_rate: u32,
    resampler:   Fft<f32>,
}

impl ResamplerCache {
    fn build(source_rate: u32, target_rate: u32) -> Result<Self> {
        // Fixed input chunking, output length varies; 1024-frame
        // chunks are plenty for offline clip processing.
        let resampler = Fft::<f32>::new(
            source_rate as usize,
            target_rate as usize,
            1024,
            1,
            1, // mono by this point
            FixedSync::Input,
        )
        .context("Failed to construct FFT resampler")?;

        Ok(Self { source_rate, resampler })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Run one whole mono clip through the resampler.
    fn resample(&mut self, mono: &[f32]) -> Result<Vec<f32>> {
        // Clear leftover state from the previous clip
        self.resampler.reset();

        let in_frames  = mono.len();
        let out_frames = self.resampler.process_all_needed_output_len(in_frames);
        let mut out    = vec![0.0f32; out_frames];

        // Mono interleaved == plain slice, the adapter just
        // carries the frame count
        let input = InterleavedSlice::new(mono, 1, in_frames)
            .context("Bad resampler input adapter")?;
        let mut output = InterleavedSlice::new_mut(&mut out, 1, out_frames)
            .context("Bad resampler output adapter")?;

        let (_read, written) = self
            .resampler
            .process_all_into_buffer(&input, &mut output, in_frames, None)
            .context("Resampling failed")?;

        out.truncate(written);
        Ok(out)
    }
}

/// Reuse `cache` when it matches `source_rate`, otherwise build a
/// fresh resampler. Returns the cache to install plus whether a
/// rebuild happened (the flag exists for instrumentation).
pub fn refresh_cache(
    cache:       Option<ResamplerCache>,
    source_rate: u32,
    target_rate: u32,
) -> Result<(ResamplerCache, bool)> {
    match cache {
        Some(c) if c.source_rate == source_rate => Ok((c, false)),
        _ => Ok((ResamplerCache::build(source_rate, target_rate)?, true)),
    }
}

// ─── AudioPipeline ────────────────────────────────────────────────────────────
/// Per-clip transform: path in, mono resampled signal out.
pub struct AudioPipeline {
    target_rate: u32,
    cache:       Option<ResamplerCache>,
    rebuilds:    usize,
}

impl AudioPipeline {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate, cache: None, rebuilds: 0 }
    }

    /// Decode one clip and bring it to the target rate.
    pub fn load(&mut self, path: &Path) -> Result<Vec<f32>> {
        let decoded = decode_audio(path)?;
        let mono = downmix(&decoded.interleaved, decoded.channels);
        self.convert(mono, decoded.sample_rate)
    }

    /// Rate-convert an already-mono signal. Split out from
    /// `load` so the cache behaviour is testable without files.
    pub fn convert(&mut self, mono: Vec<f32>, source_rate: u32) -> Result<Vec<f32>> {
        if source_rate == self.target_rate {
            return Ok(mono);
        }

        let (mut cache, rebuilt) =
            refresh_cache(self.cache.take(), source_rate, self.target_rate)?;
        if rebuilt {
            self.rebuilds += 1;
            tracing::debug!(
                "Rebuilt resampler: {} Hz → {} Hz",
                source_rate,
                self.target_rate
            );
        }

        let out = cache.resample(&mono);
        self.cache = Some(cache);
        out
    }

    /// How many times the resampler has been constructed so far
    pub fn resampler_rebuilds(&self) -> usize {
        self.rebuilds
    }
}

/// Average all channels of an interleaved buffer into mono.
/// A single-channel buffer passes through untouched.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let frames = interleaved.len() / channels;
    let mut out = Vec::with_capacity(frames);
    for f in 0..frames {
        let base = f * channels;
        let sum: f32 = interleaved[base..base + channels].iter().sum();
        out.push(sum / channels as f32);
    }
    out
}

/// Decode an audio file to interleaved f32 samples.
pub fn decode_audio(path: &Path) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open audio file '{}'", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Hint from the extension — optional but speeds up probing
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported or corrupt container '{}'", path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No supported audio track in '{}'", path.display()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Cannot create decoder for '{}'", path.display()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_rate: Option<u32>   = track.codec_params.sample_rate;
    let mut channels:    Option<usize> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            // End of stream shows up as an IO error in symphonia
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("Chained stream in '{}' is not supported", path.display()));
            }
            Err(e) => return Err(e).context("Error reading next packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip over isolated bad packets
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e).context("Unrecoverable decode error"),
        };

        sample_rate.get_or_insert(decoded.spec().rate);
        channels.get_or_insert(decoded.spec().channels.count());

        let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sbuf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sbuf.samples());
    }

    let sample_rate = sample_rate
        .ok_or_else(|| anyhow!("Could not determine sample rate of '{}'", path.display()))?;
    let channels = channels
        .ok_or_else(|| anyhow!("Could not determine channel count of '{}'", path.display()))?;

    if interleaved.is_empty() {
        return Err(anyhow!("Decoded no audio from '{}'", path.display()));
    }

    Ok(DecodedAudio { interleaved, channels, sample_rate })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_is_channel_mean() {
        // Two frames of stereo: (1,3) and (−2,4)
        let stereo = vec![1.0, 3.0, -2.0, 4.0];
        assert_eq!(downmix(&stereo, 2), vec![2.0, 1.0]);
    }

    #[test]
    fn test_mono_passthrough() {
        let mono = vec![0.5, -0.5, 0.25];
        assert_eq!(downmix(&mono, 1), mono);
    }

    #[test]
    fn test_matching_rate_skips_resampling() {
        let mut pipeline = AudioPipeline::new(16_000);
        let signal: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = pipeline.convert(signal.clone(), 16_000).unwrap();
        assert_eq!(out, signal);
        assert_eq!(pipeline.resampler_rebuilds(), 0);
    }

    #[test]
    fn test_resampler_rebuilt_only_on_rate_change() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let mut pipeline = AudioPipeline::new(16_000);
        let clip: Vec<f32> = (0..4096).map(|_| rng.gen_range(-1.0..1.0)).collect();

        pipeline.convert(clip.clone(), 44_100).unwrap();
        assert_eq!(pipeline.resampler_rebuilds(), 1);

        // Same novel rate again → cached resampler reused
        pipeline.convert(clip.clone(), 44_100).unwrap();
        pipeline.convert(clip.clone(), 44_100).unwrap();
        assert_eq!(pipeline.resampler_rebuilds(), 1);

        // Different rate → one more rebuild
        pipeline.convert(clip.clone(), 22_050).unwrap();
        assert_eq!(pipeline.resampler_rebuilds(), 2);

        // Back to the first rate: the cache only remembers the
        // last-seen rate, so this is a rebuild too
        pipeline.convert(clip, 44_100).unwrap();
        assert_eq!(pipeline.resampler_rebuilds(), 3);
    }

    #[test]
    fn test_upsampling_roughly_doubles_length() {
        let mut pipeline = AudioPipeline::new(16_000);
        let clip: Vec<f32> = (0..8000).map(|i| (i as f32 * 0.05).sin()).collect();
        let out = pipeline.convert(clip, 8_000).unwrap();

        let expected = 16_000.0;
        let actual   = out.len() as f64;
        assert!(
            (actual - expected).abs() / expected < 0.05,
            "expected ~{expected} output samples, got {actual}"
        );
    }
}
