//! Volume/price ratio (VPR).
//!
//! Candles are split by the sign of their close-to-close return. For each
//! side, volume per unit of price move is `sum(volume) / sum(return)`. VPR is
//! the positive side's share of the combined magnitude, on a 0-100 scale:
//!
//! ```text
//! vpp = round(vol_pos / ret_pos, 3)
//! vpn = round(vol_neg / ret_neg, 3)
//! vpr = round(|vpp| * 100 / (|vpp| + |vpn|), 3)
//! ```
//!
//! A high VPR means up-moves needed a lot of volume per point: price is
//! "hard to grow". A low VPR means the same for down-moves.

use crate::domain::Candle;

/// Close-to-close returns. The first candle has none.
///
/// Non-finite differences (a NaN close on either side) are undefined as well.
pub fn candle_returns(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut returns = Vec::with_capacity(candles.len());
    if candles.is_empty() {
        return returns;
    }
    returns.push(None);
    for pair in candles.windows(2) {
        let r = pair[1].close - pair[0].close;
        returns.push(r.is_finite().then_some(r));
    }
    returns
}

/// Round to three decimals, exact ties to the even neighbour.
pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round_ties_even() / 1000.0
}

/// Running per-bucket sums for the VPR formula.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VprAccumulator {
    volume_pos: f64,
    return_pos: f64,
    volume_neg: f64,
    return_neg: f64,
    count_pos: usize,
    count_neg: usize,
}

impl VprAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one candle. Candles with no return join the negative side: their
    /// volume counts, their return is skipped.
    pub fn push(&mut self, ret: Option<f64>, volume: f64) {
        let volume = if volume.is_nan() { 0.0 } else { volume };
        match ret {
            Some(r) if r > 0.0 => {
                self.volume_pos += volume;
                self.return_pos += r;
                self.count_pos += 1;
            }
            Some(r) => {
                self.volume_neg += volume;
                self.return_neg += r;
                self.count_neg += 1;
            }
            None => {
                self.volume_neg += volume;
                self.count_neg += 1;
            }
        }
    }

    /// VPR for the candles pushed so far, `None` when undefined.
    pub fn finish(&self) -> Option<f64> {
        if self.count_pos == 0 || self.count_neg == 0 {
            return None;
        }
        volume_price_ratio(self.volume_pos, self.return_pos, self.volume_neg, self.return_neg)
    }
}

/// VPR from the four group sums. Any zero divisor gives `None`.
pub fn volume_price_ratio(
    volume_pos: f64,
    return_pos: f64,
    volume_neg: f64,
    return_neg: f64,
) -> Option<f64> {
    if return_pos == 0.0 || return_neg == 0.0 {
        return None;
    }
    let vpp = round3(volume_pos / return_pos).abs();
    let vpn = round3(volume_neg / return_neg).abs();
    let denominator = vpp + vpn;
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(round3(vpp * 100.0 / denominator))
}
