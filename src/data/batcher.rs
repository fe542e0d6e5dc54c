// ============================================================
// Layer 4 — Clip Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<ClipSample>
// into GPU-ready tensors.
//
// Unlike pre-padded text samples, clips have genuinely different
// lengths, so padding happens here: every signal is right-padded
// with zeros up to the longest clip in the batch, and the true
// length survives as a relative fraction in (0, 1]. The model
// uses those fractions to mask padded frames out of the
// normalisation statistics, and the metrics receive them so
// padded positions are never scored.
//
// Input:  Vec of N ClipSamples with lengths L1..LN
// Output: ClipBatch with signals [N, max(L)], lengths [N],
//         labels [N]
//
// Reference: Burn Book §4 (Batcher)
//            Rust Book §8 (Vectors)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ClipSample;

// ─── ClipBatch ────────────────────────────────────────────────────────────────
/// A batch of clips ready for the model forward pass.
///
/// B is the Burn Backend (e.g. Wgpu, NdArray) —
/// generic so the same batcher works on any device.
#[derive(Debug, Clone)]
pub struct ClipBatch<B: Backend> {
    /// Zero-padded signals — shape: [batch_size, max_samples]
    pub signals: Tensor<B, 2>,

    /// Relative valid length per clip, in (0, 1] — shape: [batch_size]
    pub lengths: Tensor<B, 1>,

    /// Encoded class labels — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ClipBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.labels.dims()[0]
    }
}

// ─── ClipBatcher ──────────────────────────────────────────────────────────────
/// The batcher struct — holds the target device so tensors
/// are created on the correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct ClipBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClipBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ClipSample, ClipBatch<B>> for ClipBatcher<B> {
    /// Convert a Vec of ClipSamples into a single ClipBatch.
    fn batch(&self, items: Vec<ClipSample>) -> ClipBatch<B> {
        let batch_size = items.len();
        let max_len = items
            .iter()
            .map(|s| s.signal.len())
            .max()
            .unwrap_or(1)
            .max(1);

        // ── Pad and flatten signals ───────────────────────────────────────────
        let mut flat = Vec::with_capacity(batch_size * max_len);
        let mut lengths = Vec::with_capacity(batch_size);
        for item in &items {
            flat.extend_from_slice(&item.signal);
            flat.extend(std::iter::repeat(0.0f32).take(max_len - item.signal.len()));
            lengths.push(item.signal.len() as f32 / max_len as f32);
        }

        let labels: Vec<i32> = items.iter().map(|s| s.encoded_label as i32).collect();

        let signals = Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([batch_size, max_len]);
        let lengths = Tensor::<B, 1>::from_floats(lengths.as_slice(), &self.device);
        let labels  = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ClipBatch { signals, lengths, labels }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn sample(id: &str, signal: Vec<f32>, label: usize) -> ClipSample {
        ClipSample {
            id:            id.to_string(),
            signal,
            sample_rate:   16_000,
            class_name:    format!("class{label}"),
            encoded_label: label,
        }
    }

    #[test]
    fn test_padding_and_relative_lengths() {
        let device = Default::default();
        let batcher = ClipBatcher::<TestBackend>::new(device);

        let batch = batcher.batch(vec![
            sample("a", vec![1.0, 1.0, 1.0, 1.0], 0),
            sample("b", vec![2.0, 2.0], 2),
        ]);

        assert_eq!(batch.signals.dims(), [2, 4]);
        assert_eq!(batch.batch_size(), 2);

        let lengths: Vec<f32> = batch.lengths.into_data().iter::<f32>().collect();
        assert!((lengths[0] - 1.0).abs() < 1e-6);
        assert!((lengths[1] - 0.5).abs() < 1e-6);

        // Padded tail of the short clip is zero
        let signals: Vec<f32> = batch.signals.into_data().iter::<f32>().collect();
        assert_eq!(&signals[4..], &[2.0, 2.0, 0.0, 0.0]);

        let labels: Vec<i64> = batch.labels.into_data().iter::<i64>().collect();
        assert_eq!(labels, vec![0, 2]);
    }
}
