use burn::prelude::*;

/// Rescale a power tensor to decibels, clamped to at most 80 dB
/// below the loudest bin.
///
/// dB = 10 · log10(power), with the power floored at 1e-10 so
/// silence does not produce -inf.
pub fn amp_to_db<B: Backend>(power: Tensor<B, 3>) -> Tensor<B, 3> {
    let db = power
        .clamp_min(1e-10)
        .log()
        .mul_scalar(10.0 / std::f64::consts::LN_10);

    // Top clamp: keep an 80 dB window under the batch maximum
    let top: f64 = db.clone().max().into_scalar().elem();
    db.clamp_min(top - 80.0)
}

/// A [batch, frames] 0/1 mask of valid frames derived from the
/// relative lengths: frame t of example b is valid when
/// t < lengths[b] · frames.
fn frame_mask<B: Backend>(
    lengths: &Tensor<B, 1>,
    batch:   usize,
    frames:  usize,
) -> Tensor<B, 2> {
    let device = lengths.device();
    let idx = Tensor::<B, 1, Int>::arange(0..frames as i64, &device)
        .float()
        .unsqueeze::<2>()
        .expand([batch, frames]);
    let valid = lengths
        .clone()
        .mul_scalar(frames as f64)
        .unsqueeze_dim::<2>(1)
        .expand([batch, frames]);
    idx.lower(valid).float()
}

/// Per-example mean/variance normalisation over valid frames.
///
/// Padded frames contribute nothing to the statistics, so two
/// identical clips normalise identically no matter how much
/// padding the batch forced onto them.
pub fn mean_var_norm<B: Backend>(
    feats:   Tensor<B, 3>,
    lengths: &Tensor<B, 1>,
) -> Tensor<B, 3> {
    let [b, t, f] = feats.dims();

    let mask   = frame_mask(lengths, b, t);
    let count  = mask.clone().sum_dim(1).clamp_min(1.0);
    let mask3  = mask.unsqueeze_dim::<3>(2).expand([b, t, f]);
    let count3 = count.unsqueeze_dim::<3>(2).expand([b, 1, f]);

    let masked  = feats.clone() * mask3.clone();
    let mean    = masked.sum_dim(1) / count3.clone();
    let sq_mean = (feats.clone().powf_scalar(2.0) * mask3).sum_dim(1) / count3;

    // var = E[x²] − E[x]², floored before the square root
    let var = sq_mean - mean.clone().powf_scalar(2.0);
    let std = var.clamp_min(1e-10).sqrt();

    (feats - mean.expand([b, t, f])) / std.expand([b, t, f])
}

/// Mean over valid frames only — the pooling step that turns
/// [batch, frames, feats] into one vector per example.
pub fn masked_time_mean<B: Backend>(
    feats:   Tensor<B, 3>,
    lengths: &Tensor<B, 1>,
) -> Tensor<B, 2> {
    let [b, t, f] = feats.dims();

    let mask  = frame_mask(lengths, b, t);
    let count = mask.clone().sum_dim(1).clamp_min(1.0);
    let mask3 = mask.unsqueeze_dim::<3>(2).expand([b, t, f]);

    let sum = (feats * mask3).sum_dim(1).reshape([b, f]);
    sum / count.expand([b, f])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_amp_to_db_top_clamp() {
        let device = Default::default();
        // 1.0 → 0 dB (the batch max); 1e-12 floors at 1e-10 → -100 dB,
        // clamped to 80 dB under the max
        let power = Tensor::<TestBackend, 1>::from_floats([1.0, 1e-12], &device)
            .reshape([1, 2, 1]);
        let db: Vec<f32> = amp_to_db(power).into_data().iter::<f32>().collect();
        assert!((db[0] - 0.0).abs() < 1e-4);
        assert!((db[1] + 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_mean_var_norm_ignores_padding() {
        let device = Default::default();
        // 4 frames, only the first 2 valid (length 0.5).
        // Valid values 1 and 3 → mean 2, std 1 → normalised to −1 and 1.
        let feats = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0, 100.0, -7.0], &device)
            .reshape([1, 4, 1]);
        let lengths = Tensor::<TestBackend, 1>::from_floats([0.5], &device);

        let out: Vec<f32> = mean_var_norm(feats, &lengths).into_data().iter::<f32>().collect();
        assert!((out[0] + 1.0).abs() < 1e-3);
        assert!((out[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_masked_time_mean() {
        let device = Default::default();
        let feats = Tensor::<TestBackend, 1>::from_floats([2.0, 4.0, 999.0, 999.0], &device)
            .reshape([1, 4, 1]);
        let lengths = Tensor::<TestBackend, 1>::from_floats([0.5], &device);

        let pooled: Vec<f32> =
            masked_time_mean(feats, &lengths).into_data().iter::<f32>().collect();
        assert!((pooled[0] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_full_length_mask_covers_everything() {
        let device = Default::default();
        let feats = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device)
            .reshape([1, 4, 1]);
        let lengths = Tensor::<TestBackend, 1>::from_floats([1.0], &device);

        let pooled: Vec<f32> =
            masked_time_mean(feats, &lengths).into_data().iter::<f32>().collect();
        assert!((pooled[0] - 2.5).abs() < 1e-4);
    }
}
