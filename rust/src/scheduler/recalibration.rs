//! Recalibration functions and the penalties that keep recalibration from
//! reordering the ranking on its own.

/// Fewer matched peaks than this leave the spectrum uncalibrated.
pub const MIN_RECALIBRATION_PEAKS: usize = 4;

/// Polynomial mapping measured masses to corrected masses.
///
/// `coefficients[i]` is the factor of `x^i`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecalibrationFunction {
    coefficients: Vec<f64>,
}

impl RecalibrationFunction {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    pub fn identity() -> Self {
        Self::new(vec![0.0, 1.0])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn is_identity(&self) -> bool {
        let mut expected = [0.0, 1.0].iter().chain(std::iter::repeat(&0.0));
        self.coefficients
            .iter()
            .all(|c| expected.next().is_some_and(|e| (c - e).abs() < 1e-12))
    }

    pub fn apply(&self, mass: f64) -> f64 {
        // Horner
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * mass + c)
    }

    /// Ordinary least squares fit of `reference = a + b * measured`.
    ///
    /// Falls back to the identity with too few pairs or when all measured
    /// masses coincide.
    pub fn fit_linear(pairs: &[(f64, f64)]) -> Self {
        if pairs.len() < MIN_RECALIBRATION_PEAKS {
            return Self::identity();
        }
        let n = pairs.len() as f64;
        let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for &(x, y) in pairs {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }
        if sxx <= f64::EPSILON {
            return Self::identity();
        }
        let slope = sxy / sxx;
        Self::new(vec![mean_y - slope * mean_x, slope])
    }
}

impl Default for RecalibrationFunction {
    fn default() -> Self {
        Self::identity()
    }
}

/// Penalties for a ranked list of `(recalibration_bonus, recalibrated_weight)`.
///
/// Exactly the first `ceiling_rank` trees are never penalized; the
/// smallest of their recalibrated weights caps what any lower ranked tree
/// may gain from recalibration.
pub fn recalibration_penalties(ranked: &[(f64, f64)], ceiling_rank: usize) -> Vec<f64> {
    let mut max_bonus = f64::INFINITY;
    ranked
        .iter()
        .enumerate()
        .map(|(i, &(bonus, weight))| {
            if i < ceiling_rank {
                max_bonus = max_bonus.min(weight);
                0.0
            } else {
                bonus.min((weight - max_bonus).max(0.0))
            }
        })
        .collect()
}
