use std::fmt;
use std::str::FromStr;

use crate::util::{average, quantile, sample_std};

/// Outlier detection strategy. Each variant flags values independently;
/// callers pick exactly one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierMethod {
    /// Outside `[Q1 - k·IQR, Q3 + k·IQR]`.
    Iqr { multiplier: f64 },
    /// `|x - mean| / std > threshold`, using the sample standard deviation.
    ZScore { threshold: f64 },
}

impl OutlierMethod {
    pub fn iqr() -> Self {
        OutlierMethod::Iqr { multiplier: 1.5 }
    }

    pub fn zscore() -> Self {
        OutlierMethod::ZScore { threshold: 3.0 }
    }

    /// One flag per input row; nulls are never flagged.
    ///
    /// Returns `None` when the strategy cannot produce flags: no values at
    /// all, or a z-score over a column whose deviation is zero or undefined.
    pub fn detect(&self, values: &[Option<f64>]) -> Option<Vec<bool>> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        match *self {
            OutlierMethod::Iqr { multiplier } => {
                let q1 = quantile(&present, 0.25)?;
                let q3 = quantile(&present, 0.75)?;
                let iqr = q3 - q1;
                let (lower, upper) = (q1 - multiplier * iqr, q3 + multiplier * iqr);
                Some(flag(values, |v| v < lower || v > upper))
            }
            OutlierMethod::ZScore { threshold } => {
                let std = sample_std(&present).filter(|s| *s > 0.0)?;
                let mean = average(&present);
                Some(flag(values, |v| ((v - mean) / std).abs() > threshold))
            }
        }
    }
}

fn flag<F>(values: &[Option<f64>], is_outlier: F) -> Vec<bool>
where
    F: Fn(f64) -> bool,
{
    values.iter().map(|v| v.map_or(false, &is_outlier)).collect()
}

impl FromStr for OutlierMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "iqr" => Ok(Self::iqr()),
            "zscore" | "z-score" => Ok(Self::zscore()),
            other => Err(format!("unknown outlier method '{other}' (expected iqr or zscore)")),
        }
    }
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierMethod::Iqr { .. } => write!(f, "iqr"),
            OutlierMethod::ZScore { .. } => write!(f, "zscore"),
        }
    }
}
