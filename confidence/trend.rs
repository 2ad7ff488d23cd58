//! # Dispersion of a Risk Score Along Its Own Range
//!
//! Sorts a score column, cuts it into fixed-width bins and reports the standard
//! deviation inside each populated bin. This shows whether a calculator becomes
//! less stable as its predicted risk grows.

use crate::group::mean_and_std;
use thiserror::Error;

/// Width of the bins used when none is given.
pub const DEFAULT_BIN_WIDTH: f64 = 0.001;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrendError {
    #[error("Cannot compute a dispersion trend over an empty score column.")]
    EmptyInput,
    #[error("Bin width must be a positive finite number, got {0}.")]
    InvalidBinWidth(f64),
    #[error("Score at position {index} is not a finite number.")]
    NonFiniteScore { index: usize },
    #[error("Bin width {bin_width} is too fine to separate scores near {score}.")]
    BinWidthTooFine { bin_width: f64, score: f64 },
}

/// Populated bins in ascending boundary order, as three parallel sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionTrend {
    /// Inclusive upper edge of each bin.
    pub boundaries: Vec<f64>,
    pub counts: Vec<usize>,
    /// Population standard deviation of the scores in each bin.
    pub stds: Vec<f64>,
}

/// Number of decimals in the shortest representation of `width`.
fn decimal_places(width: f64) -> i32 {
    let text = width.to_string();
    text.split_once('.')
        .map_or(0, |(_, frac)| frac.len().min(15) as i32)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Smallest rounded multiple of `bin_width` that is `>=` `score`.
fn boundary_for(score: f64, bin_width: f64, decimals: i32) -> f64 {
    let steps = (score / bin_width).ceil();
    let below = round_to((steps - 1.0) * bin_width, decimals);
    if score <= below {
        return below;
    }
    let at = round_to(steps * bin_width, decimals);
    if score <= at {
        at
    } else {
        round_to((steps + 1.0) * bin_width, decimals)
    }
}

/// Bins `scores` by the smallest multiple of `bin_width` that is `>=` the score.
///
/// The first boundary is `bin_width` itself, so anything at or below it, negative
/// scores included, shares the first bin. Boundaries are rounded to the precision
/// of `bin_width` to keep accumulated float error out of the keys.
///
/// Each boundary is computed directly from its score. A width too small for the
/// scores' float precision yields [`TrendError::BinWidthTooFine`].
pub fn score_dispersion_by_bin(
    scores: &[f64],
    bin_width: f64,
) -> Result<DispersionTrend, TrendError> {
    if !(bin_width.is_finite() && bin_width > 0.0) {
        return Err(TrendError::InvalidBinWidth(bin_width));
    }
    if scores.is_empty() {
        return Err(TrendError::EmptyInput);
    }
    if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
        return Err(TrendError::NonFiniteScore { index });
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    // Neighbouring multiples of the width must stay distinct floats.
    let largest = sorted
        .iter()
        .map(|s| s.abs())
        .fold(0.0, f64::max);
    let too_fine = |score: f64| TrendError::BinWidthTooFine { bin_width, score };
    if largest * f64::EPSILON >= bin_width {
        return Err(too_fine(largest));
    }

    let decimals = decimal_places(bin_width);
    let mut boundary = round_to(bin_width, decimals);
    if boundary <= 0.0 {
        return Err(too_fine(sorted[0]));
    }
    let mut bins: Vec<(f64, Vec<f64>)> = vec![(boundary, Vec::new())];

    for score in sorted {
        if score > boundary {
            let next = boundary_for(score, bin_width, decimals);
            if !(next.is_finite() && next > boundary && next >= score) {
                return Err(too_fine(score));
            }
            boundary = next;
            bins.push((boundary, Vec::new()));
        }
        if let Some((_, members)) = bins.last_mut() {
            members.push(score);
        }
    }

    let mut trend = DispersionTrend {
        boundaries: Vec::with_capacity(bins.len()),
        counts: Vec::with_capacity(bins.len()),
        stds: Vec::with_capacity(bins.len()),
    };
    for (boundary, members) in bins.into_iter().filter(|(_, m)| !m.is_empty()) {
        let (_, std) = mean_and_std(&members);
        trend.boundaries.push(boundary);
        trend.counts.push(members.len());
        trend.stds.push(std);
    }
    Ok(trend)
}
