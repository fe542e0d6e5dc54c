use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::features::{amp_to_db, masked_time_mean, mean_var_norm};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct SoundClassifierConfig {
    pub num_classes: usize,
    /// Number of learned filterbank channels
    #[config(default = 40)]
    pub n_feats: usize,
    /// Analysis window in samples (25 ms at 16 kHz)
    #[config(default = 400)]
    pub frame_len: usize,
    /// Hop between windows in samples (10 ms at 16 kHz)
    #[config(default = 160)]
    pub hop: usize,
    #[config(default = 128)]
    pub embed_dim: usize,
    #[config(default = true)]
    pub amp_to_db: bool,
    #[config(default = true)]
    pub normalize: bool,
}

impl SoundClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SoundClassifier<B> {
        let filterbank = Conv1dConfig::new(1, self.n_feats, self.frame_len)
            .with_stride(self.hop)
            .with_bias(false)
            .init(device);
        let embed1     = LinearConfig::new(self.n_feats, self.embed_dim).init(device);
        let embed2     = LinearConfig::new(self.embed_dim, self.embed_dim).init(device);
        let classifier = LinearConfig::new(self.embed_dim, self.num_classes).init(device);
        SoundClassifier {
            filterbank, embed1, embed2, classifier,
            amp_to_db: self.amp_to_db,
            normalize: self.normalize,
        }
    }
}

#[derive(Module, Debug)]
pub struct SoundClassifier<B: Backend> {
    pub filterbank: Conv1d<B>,
    pub embed1:     Linear<B>,
    pub embed2:     Linear<B>,
    pub classifier: Linear<B>,
    pub amp_to_db:  bool,
    pub normalize:  bool,
}

impl<B: Backend> SoundClassifier<B> {
    /// signals: [batch, samples], lengths: [batch] in (0,1]
    /// → class logits [batch, 1, num_classes]
    pub fn forward(&self, signals: Tensor<B, 2>, lengths: Tensor<B, 1>) -> Tensor<B, 3> {
        let [batch_size, samples] = signals.dims();

        // Strided filterbank over the raw waveform, response power
        // as the feature value — [batch, frames, n_feats]
        let x = signals.reshape([batch_size, 1, samples]);
        let feats = self
            .filterbank
            .forward(x)
            .swap_dims(1, 2)
            .powf_scalar(2.0);

        let feats = if self.amp_to_db { amp_to_db(feats) } else { feats };
        let feats = if self.normalize { mean_var_norm(feats, &lengths) } else { feats };

        // Frame-wise embedding, pooled over valid frames only
        let hidden = relu(self.embed1.forward(feats));
        let pooled = masked_time_mean(hidden, &lengths);
        let embedding = relu(self.embed2.forward(pooled));

        // [batch, num_classes] → [batch, 1, num_classes]
        let logits = self.classifier.forward(embedding);
        let [b, c] = logits.dims();
        logits.reshape([b, 1, c])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_logit_shape() {
        let device = Default::default();
        let cfg = SoundClassifierConfig::new(3)
            .with_n_feats(4)
            .with_frame_len(16)
            .with_hop(8)
            .with_embed_dim(8);
        let model: SoundClassifier<TestBackend> = cfg.init(&device);

        let signals = Tensor::<TestBackend, 2>::zeros([2, 64], &device);
        let lengths = Tensor::<TestBackend, 1>::from_floats([1.0, 0.5], &device);

        let logits = model.forward(signals, lengths);
        assert_eq!(logits.dims(), [2, 1, 3]);

        let values: Vec<f32> = logits.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
