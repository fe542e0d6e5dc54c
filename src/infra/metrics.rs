// ============================================================
// Layer 6 — Classification Metrics
// ============================================================
// The two accumulators the stage lifecycle carries:
//
//   RunningAccuracy — correct/total counts over a stage
//   ConfusionMatrix — true-class × predicted-class counts
//
// Both are plain CPU data structures fed with already-detached
// integer predictions, so they are testable without a backend.
//
// Per-class accuracy policy: a class absent from the stage has
// a zero row-sum; its accuracy is NaN, reported as-is rather
// than raised — an absent class is information, not an error.
//
// Reference: Rust Book §5 (Structs and Methods)

/// Running accuracy over one stage.
///
/// Fed with one scored position per clip; the relative lengths
/// accompany predictions through the call chain but a single
/// label per clip means each clip carries unit weight.
#[derive(Debug, Default)]
pub struct RunningAccuracy {
    correct: usize,
    total:   usize,
}

impl RunningAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, y_pred: &[usize], y_true: &[usize], lengths: &[f64]) {
        debug_assert_eq!(y_pred.len(), y_true.len());
        debug_assert_eq!(y_pred.len(), lengths.len());

        for (p, t) in y_pred.iter().zip(y_true) {
            if p == t {
                self.correct += 1;
            }
            self.total += 1;
        }
    }

    /// Fraction of correct predictions; 0.0 before any data
    pub fn summarize(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

// ─── ConfusionMatrix ──────────────────────────────────────────────────────────
/// Square count matrix indexed by true × predicted class id.
/// Zero-initialised at stage start, accumulated additively per
/// batch, read once at stage end.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    n:    usize,
    data: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self { n: num_classes, data: vec![0; num_classes * num_classes] }
    }

    pub fn class_count(&self) -> usize {
        self.n
    }

    /// Count at (true class, predicted class)
    pub fn get(&self, truth: usize, pred: usize) -> u64 {
        self.data[truth * self.n + pred]
    }

    /// Add one batch of outcomes. Indices outside
    /// [0, class_count) violate the encoder contract.
    pub fn accumulate(&mut self, y_true: &[usize], y_pred: &[usize]) {
        assert_eq!(y_true.len(), y_pred.len());
        for (&t, &p) in y_true.iter().zip(y_pred) {
            assert!(t < self.n && p < self.n, "class id out of range");
            self.data[t * self.n + p] += 1;
        }
    }

    pub fn row_sum(&self, truth: usize) -> u64 {
        self.data[truth * self.n..(truth + 1) * self.n].iter().sum()
    }

    /// Total number of accumulated outcomes
    pub fn total(&self) -> u64 {
        self.data.iter().sum()
    }

    /// Diagonal over row-sum per class. A class never seen in
    /// this stage yields NaN at its index.
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        (0..self.n)
            .map(|k| {
                let row = self.row_sum(k);
                if row == 0 {
                    f64::NAN
                } else {
                    self.get(k, k) as f64 / row as f64
                }
            })
            .collect()
    }
}

/// Text rendering of a confusion matrix with class labels on
/// both axes — the "figure" attached to dashboard records.
pub fn render_confusion(matrix: &ConfusionMatrix, labels: &[String]) -> String {
    let n = matrix.class_count();
    let name = |k: usize| -> String {
        labels.get(k).cloned().unwrap_or_else(|| format!("class{k}"))
    };
    let label_width = (0..n).map(|k| name(k).len()).max().unwrap_or(6).max(6);
    let cell_width = 8;

    let mut out = String::new();
    out.push_str(&format!("{:label_width$} │", "true\\pred"));
    for k in 0..n {
        let mut header = name(k);
        header.truncate(cell_width - 1);
        out.push_str(&format!("{header:>cell_width$}"));
    }
    out.push('\n');

    for t in 0..n {
        out.push_str(&format!("{:label_width$} │", name(t)));
        for p in 0..n {
            out.push_str(&format!("{:>cell_width$}", matrix.get(t, p)));
        }
        out.push('\n');
    }
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulation_is_additive() {
        let mut cm = ConfusionMatrix::new(3);
        cm.accumulate(&[0, 1], &[0, 2]);
        cm.accumulate(&[0, 1], &[0, 1]);

        assert_eq!(cm.get(0, 0), 2);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.total(), 4);

        // A fresh matrix starts at zero no matter what came before
        let fresh = ConfusionMatrix::new(3);
        assert_eq!(fresh.total(), 0);
    }

    #[test]
    fn test_per_class_accuracy_known_matrix() {
        // [[5,1,0],[0,4,2],[1,0,6]]
        let mut cm = ConfusionMatrix::new(3);
        for _ in 0..5 { cm.accumulate(&[0], &[0]); }
        cm.accumulate(&[0], &[1]);
        for _ in 0..4 { cm.accumulate(&[1], &[1]); }
        for _ in 0..2 { cm.accumulate(&[1], &[2]); }
        cm.accumulate(&[2], &[0]);
        for _ in 0..6 { cm.accumulate(&[2], &[2]); }

        let acc = cm.per_class_accuracy();
        assert!((acc[0] - 5.0 / 6.0).abs() < 1e-9);
        assert!((acc[1] - 4.0 / 6.0).abs() < 1e-9);
        assert!((acc[2] - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_absent_class_yields_nan() {
        let mut cm = ConfusionMatrix::new(3);
        cm.accumulate(&[0, 2], &[0, 2]);

        let acc = cm.per_class_accuracy();
        assert_eq!(acc[0], 1.0);
        assert!(acc[1].is_nan());
        assert_eq!(acc[2], 1.0);
    }

    #[test]
    fn test_running_accuracy() {
        let mut acc = RunningAccuracy::new();
        assert_eq!(acc.summarize(), 0.0);

        acc.append(&[0, 1, 2], &[0, 1, 1], &[1.0, 1.0, 0.5]);
        acc.append(&[1], &[1], &[1.0]);
        assert!((acc.summarize() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_render_contains_labels_and_counts() {
        let mut cm = ConfusionMatrix::new(2);
        cm.accumulate(&[0, 1, 1], &[0, 1, 0]);

        let labels = vec!["car_horn".to_string(), "dog_bark".to_string()];
        let figure = render_confusion(&cm, &labels);
        assert!(figure.contains("car_horn"));
        assert!(figure.contains("dog_bark"));
        assert!(figure.lines().count() == 3);
    }
}
