//! Pearson and Spearman correlation over pairwise-complete observations.

use serde::{Deserialize, Serialize};

/// Similarity measure between two profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// Pearson product-moment correlation.
    Pearson,
    /// Pearson correlation of average ranks.
    #[default]
    Spearman,
}

impl Similarity {
    /// Correlate two equally long series.
    pub fn correlate(self, x: &[f64], y: &[f64]) -> f64 {
        match self {
            Similarity::Pearson => pearson(x, y),
            Similarity::Spearman => spearman(x, y),
        }
    }
}

/// Keep the positions where both series are finite.
fn complete_pairs(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

/// Pearson correlation.
///
/// Positions where either value is NaN are skipped. Returns NaN with fewer than
/// two complete pairs or when either series is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let (x, y) = complete_pairs(x, y);
    pearson_complete(&x, &y)
}

/// Spearman rank correlation (average ranks for ties).
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let (x, y) = complete_pairs(x, y);
    pearson_complete(&rank_average(&x), &rank_average(&y))
}

fn pearson_complete(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 || n != y.len() {
        return f64::NAN;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// 1-based ranks, ties sharing the average of their positions.
pub fn rank_average(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut indexed: Vec<(f64, usize)> = data.iter().copied().enumerate().map(|(i, v)| (v, i)).collect();
    indexed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && indexed[j].0 == indexed[i].0 {
            j += 1;
        }
        // Positions i..j (0-based) share ranks (i+1)..=j.
        let avg = (i + 1 + j) as f64 / 2.0;
        for item in &indexed[i..j] {
            ranks[item.1] = avg;
        }
        i = j;
    }
    ranks
}
