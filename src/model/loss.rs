use crate::model::matrix::Matrix;

/// Small epsilon added inside ln() to prevent ln(0) = -inf.
const EPS: f64 = 1e-12;

/// Categorical cross-entropy summed over the batch:
///   L = -Σ_items Σ_i expected[i] * ln(predicted[i] + eps)
pub fn cross_entropy_sum(predicted: &Matrix, expected: &Matrix) -> f64 {
    predicted
        .rows_iter()
        .zip(expected.rows_iter())
        .map(|(p, e)| p.iter().zip(e).map(|(p, e)| -e * (p + EPS).ln()).sum::<f64>())
        .sum()
}

/// Items whose highest-probability class matches the target's.
pub fn correct_count(predicted: &Matrix, expected: &Matrix) -> usize {
    predicted
        .rows_iter()
        .zip(expected.rows_iter())
        .filter(|(p, e)| argmax(p) == argmax(e))
        .count()
}

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_correct_prediction_has_low_loss() {
        let p = Matrix::from_rows(&[vec![0.99, 0.01], vec![0.6, 0.4]], 2).unwrap();
        let y = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]], 2).unwrap();
        let loss = cross_entropy_sum(&p, &y);
        assert!((loss - (-(0.99f64 + EPS).ln() - (0.4f64 + EPS).ln())).abs() < 1e-9);
        assert_eq!(correct_count(&p, &y), 1);
    }

    #[test]
    fn argmax_of_slices() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
