use burn::data::dataset::Dataset;

/// One fully loaded clip: mono signal at the target rate plus
/// its encoded class label. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ClipSample {
    pub id:            String,
    pub signal:        Vec<f32>,
    pub sample_rate:   u32,
    pub class_name:    String,
    pub encoded_label: usize,
}

impl ClipSample {
    /// Clip duration in seconds, for sanity logging
    pub fn duration_secs(&self) -> f32 {
        self.signal.len() as f32 / self.sample_rate as f32
    }
}

pub struct ClipDataset {
    samples: Vec<ClipSample>,
}

impl ClipDataset {
    pub fn new(samples: Vec<ClipSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<ClipSample> for ClipDataset {
    fn get(&self, index: usize) -> Option<ClipSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
