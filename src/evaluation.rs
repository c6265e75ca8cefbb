use serde::Serialize;

/// Binary metrics over home-win probabilities. `outcomes[i]` is true for a home win.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Accuracy restricted to predictions whose confidence clears a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceAccuracy {
    pub threshold: f64,
    pub count: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// Share of all samples that cleared the threshold.
    pub coverage: f64,
}

pub fn evaluate(probs: &[f64], outcomes: &[bool]) -> Metrics {
    if probs.is_empty() || probs.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, home_won) in probs.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let y = if *home_won { 1.0 } else { 0.0 };
        brier_sum += (p - y).powi(2);

        let actual_prob = if *home_won { p } else { 1.0 - p }.clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if (p >= 0.5) == *home_won {
            correct += 1;
        }
    }

    let n = probs.len() as f64;
    Metrics {
        samples: probs.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(probs: &[f64], outcomes: &[bool], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, home_won) in probs.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if *home_won {
            actual_sum[idx] += 1.0;
        }
    }

    let mut out = Vec::with_capacity(bins);
    for i in 0..bins {
        let count = counts[i];
        let (avg_pred, actual_rate) = if count > 0 {
            (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
        } else {
            (0.0, 0.0)
        };
        out.push(CalibrationBin {
            bucket_start: i as f64 / bins as f64,
            bucket_end: (i + 1) as f64 / bins as f64,
            count,
            avg_pred,
            actual_rate,
        });
    }
    out
}

/// Expected calibration error: count-weighted |avg_pred - actual_rate| over the bins.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    bins.iter()
        .map(|b| b.count as f64 * (b.avg_pred - b.actual_rate).abs())
        .sum::<f64>()
        / total as f64
}

pub fn accuracy_above(probs: &[f64], outcomes: &[bool], threshold: f64) -> ConfidenceAccuracy {
    let mut count = 0usize;
    let mut correct = 0usize;
    for (p, home_won) in probs.iter().zip(outcomes) {
        let confidence = p.max(1.0 - p);
        if confidence < threshold {
            continue;
        }
        count += 1;
        if (*p >= 0.5) == *home_won {
            correct += 1;
        }
    }
    let samples = probs.len().min(outcomes.len());
    ConfidenceAccuracy {
        threshold,
        count,
        correct,
        accuracy: if count > 0 {
            correct as f64 / count as f64
        } else {
            0.0
        },
        coverage: if samples > 0 {
            count as f64 / samples as f64
        } else {
            0.0
        },
    }
}
