//! Small numeric helpers. All of them return 0 (or a neutral value) for empty
//! or degenerate input instead of NaN.

/// Guard added to every denominator.
pub const EPSILON: f32 = 1e-10;

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

pub fn mean_iter<I: IntoIterator<Item = f32>>(values: I) -> f32 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Population variance.
pub fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32
}

pub fn std_dev(values: &[f32]) -> f32 {
    variance(values).sqrt()
}

/// Standard deviation over mean, guarded.
pub fn coefficient_of_variation(values: &[f32]) -> f32 {
    std_dev(values) / (mean(values) + EPSILON)
}

/// Energy-weighted mean index. 0 when the input carries no energy.
pub fn centroid(values: &[f32]) -> f32 {
    let total: f32 = values.iter().sum();
    if total <= EPSILON {
        return 0.0;
    }
    values
        .iter()
        .enumerate()
        .map(|(i, v)| i as f32 * v)
        .sum::<f32>()
        / total
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= EPSILON || nb <= EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

/// Interior local maxima strictly above both neighbours and above `threshold`.
pub fn find_peaks(values: &[f32], threshold: f32) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] > values[i + 1] && values[i] > threshold)
        .collect()
}

/// Index of the first maximum; 0 for empty input.
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

/// Sum of absolute element-wise differences.
pub fn abs_diff_sum(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Mean of `values[start..end]` with the range clamped to the slice.
/// An empty range collapses to the single element at `start` (if any).
pub fn mean_range(values: &[f32], start: usize, end: usize) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let start = start.min(values.len() - 1);
    let end = end.clamp(start + 1, values.len());
    mean(&values[start..end])
}
