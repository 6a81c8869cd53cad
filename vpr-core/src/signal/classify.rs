//! Threshold classification and the alert decision.

use serde::{Deserialize, Serialize};

use crate::domain::Bucket;

/// VPR thresholds. Both comparisons are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub hard_to_grow: f64,
    pub hard_to_fall: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            hard_to_grow: 60.0,
            hard_to_fall: 40.0,
        }
    }
}

impl Thresholds {
    pub fn new(hard_to_grow: f64, hard_to_fall: f64) -> Self {
        Self {
            hard_to_grow,
            hard_to_fall,
        }
    }

    /// Overlapping bands let a single VPR raise both flags.
    pub fn overlap(&self) -> bool {
        self.hard_to_grow < self.hard_to_fall
    }

    pub fn classify(&self, vpr: Option<f64>) -> SignalFlags {
        match vpr {
            Some(v) if !v.is_nan() => SignalFlags {
                hard_to_grow: v >= self.hard_to_grow,
                hard_to_fall: v <= self.hard_to_fall,
            },
            _ => SignalFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalFlags {
    pub hard_to_grow: bool,
    pub hard_to_fall: bool,
}

impl SignalFlags {
    pub fn any(&self) -> bool {
        self.hard_to_grow || self.hard_to_fall
    }

    pub fn both(&self) -> bool {
        self.hard_to_grow && self.hard_to_fall
    }
}

impl From<&Bucket> for SignalFlags {
    fn from(bucket: &Bucket) -> Self {
        Self {
            hard_to_grow: bucket.hard_to_grow,
            hard_to_fall: bucket.hard_to_fall,
        }
    }
}

/// Buckets that are known to be closed: everything but the last one.
pub fn completed(buckets: &[Bucket]) -> &[Bucket] {
    match buckets.split_last() {
        Some((_, rest)) => rest,
        None => buckets,
    }
}

/// Outcome of evaluating the latest complete bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReport {
    pub bucket: Bucket,
    pub flags: SignalFlags,
    pub vpr: Option<f64>,
    /// Trailing complete buckets for the chart, oldest first, ending with `bucket`.
    pub window: Vec<Bucket>,
}

impl SignalReport {
    pub fn is_triggered(&self) -> bool {
        self.flags.any()
    }

    /// Alert text, one line per raised flag, or `None` when nothing fired.
    pub fn alert_caption(&self) -> Option<String> {
        if !self.is_triggered() {
            return None;
        }
        let vpr = format_vpr(self.vpr);
        let mut lines = Vec::with_capacity(2);
        if self.flags.hard_to_grow {
            lines.push(format!("\u{1F534}Hard to grow: {vpr}"));
        }
        if self.flags.hard_to_fall {
            lines.push(format!("\u{1F7E2}Hard to fall: {vpr}"));
        }
        Some(lines.join("\n"))
    }

    /// Caption for an on-demand report, sent whatever the flags say.
    pub fn summary_caption(&self) -> String {
        format!("VPR: {}", format_vpr(self.vpr))
    }
}

/// Drop the trailing (possibly open) bucket and report on the one before it.
///
/// Returns `None` when there is no complete bucket.
pub fn evaluate(buckets: &[Bucket], horizon: usize) -> Option<SignalReport> {
    let complete = completed(buckets);
    let bucket = complete.last()?.clone();
    let start = complete.len().saturating_sub(horizon.max(1));
    Some(SignalReport {
        flags: SignalFlags::from(&bucket),
        vpr: bucket.vpr,
        window: complete[start..].to_vec(),
        bucket,
    })
}

/// Format like a float repr: always at least one decimal, at most three.
pub fn format_vpr(vpr: Option<f64>) -> String {
    match vpr {
        Some(v) if v.is_finite() => {
            let s = format!("{:.3}", round_display(v));
            let trimmed = s.trim_end_matches('0');
            if trimmed.ends_with('.') {
                format!("{trimmed}0")
            } else {
                trimmed.to_string()
            }
        }
        _ => "n/a".to_string(),
    }
}

fn round_display(v: f64) -> f64 {
    // Avoid "-0.0".
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(start: i64, vpr: Option<f64>, th: &Thresholds) -> Bucket {
        let flags = th.classify(vpr);
        Bucket {
            symbol: "BTC/USDT".into(),
            start,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            candle_count: 12,
            vpr,
            hard_to_grow: flags.hard_to_grow,
            hard_to_fall: flags.hard_to_fall,
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        let th = Thresholds::default();
        assert!(th.classify(Some(60.0)).hard_to_grow);
        assert!(!th.classify(Some(59.999)).hard_to_grow);
        assert!(th.classify(Some(40.0)).hard_to_fall);
        assert!(!th.classify(Some(40.001)).hard_to_fall);
        assert!(!th.classify(Some(50.0)).any());
    }

    #[test]
    fn undefined_vpr_raises_nothing() {
        let th = Thresholds::new(0.0, 100.0);
        assert_eq!(th.classify(None), SignalFlags::default());
        assert_eq!(th.classify(Some(f64::NAN)), SignalFlags::default());
    }

    #[test]
    fn evaluate_skips_open_bucket() {
        let th = Thresholds::default();
        let buckets = vec![
            bucket(0, Some(50.0), &th),
            bucket(1, Some(75.0), &th),
            bucket(2, Some(10.0), &th),
        ];
        let report = evaluate(&buckets, 60).unwrap();
        assert_eq!(report.bucket.start, 1);
        assert!(report.flags.hard_to_grow);
        assert!(!report.flags.hard_to_fall);
        assert_eq!(report.window.len(), 2);
    }

    #[test]
    fn evaluate_needs_two_buckets() {
        let th = Thresholds::default();
        assert!(evaluate(&[], 10).is_none());
        assert!(evaluate(&[bucket(0, Some(90.0), &th)], 10).is_none());
    }

    #[test]
    fn window_is_limited_to_horizon() {
        let th = Thresholds::default();
        let buckets: Vec<Bucket> = (0..10).map(|i| bucket(i, Some(50.0), &th)).collect();
        let report = evaluate(&buckets, 3).unwrap();
        let starts: Vec<i64> = report.window.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![6, 7, 8]);
    }

    #[test]
    fn captions() {
        let th = Thresholds::default();
        let grow = evaluate(&[bucket(0, Some(75.0), &th), bucket(1, None, &th)], 5).unwrap();
        assert_eq!(grow.alert_caption().unwrap(), "\u{1F534}Hard to grow: 75.0");
        assert_eq!(grow.summary_caption(), "VPR: 75.0");

        let fall = evaluate(&[bucket(0, Some(12.345), &th), bucket(1, None, &th)], 5).unwrap();
        assert_eq!(fall.alert_caption().unwrap(), "\u{1F7E2}Hard to fall: 12.345");

        let quiet = evaluate(&[bucket(0, None, &th), bucket(1, None, &th)], 5).unwrap();
        assert_eq!(quiet.alert_caption(), None);
        assert_eq!(quiet.summary_caption(), "VPR: n/a");
    }

    #[test]
    fn overlapping_thresholds_emit_both_lines() {
        let th = Thresholds::new(40.0, 60.0);
        assert!(th.overlap());
        let report = evaluate(&[bucket(0, Some(50.0), &th), bucket(1, None, &th)], 5).unwrap();
        assert!(report.flags.both());
        assert_eq!(
            report.alert_caption().unwrap(),
            "\u{1F534}Hard to grow: 50.0\n\u{1F7E2}Hard to fall: 50.0"
        );
    }

    #[test]
    fn vpr_formatting() {
        assert_eq!(format_vpr(Some(75.0)), "75.0");
        assert_eq!(format_vpr(Some(66.667)), "66.667");
        assert_eq!(format_vpr(Some(12.5)), "12.5");
        assert_eq!(format_vpr(Some(0.0)), "0.0");
        assert_eq!(format_vpr(None), "n/a");
    }
}
