//! Gaze calibration - learns the mapping from raw tracker ratios to
//! normalized scene coordinates.
//!
//! The engine fits one low-order polynomial per axis (target as a function of
//! raw ratio). Axes are independent, so there is no cross term: skew or
//! rotation between tracker and scene cannot be corrected. Until a fit
//! succeeds the transform is the identity.

mod sequence;

pub use sequence::{
    order_targets, CalibrationPhase, CalibrationProgress, CalibrationSequence, RawGazeFeed,
};

use crate::config::CalibrationConfig;
use crate::error::{GazeError, Result};
use crate::types::CalibrationStatus;
use serde::{Deserialize, Serialize};

/// Supervised pairing: the tracker reported `raw_*` while the user looked
/// at `target_*`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub raw_h: f64,
    pub raw_v: f64,
    pub target_h: f64,
    pub target_v: f64,
}

/// Polynomial for one axis, lowest order first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisFit {
    pub coefficients: Vec<f64>,
}

impl AxisFit {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CalibrationModel {
    #[default]
    Identity,
    Fitted {
        horizontal: AxisFit,
        vertical: AxisFit,
        /// RMS residual over the fitted samples, in normalized units
        rms_error: f64,
    },
}

impl CalibrationModel {
    /// Total over any input; the output is always inside [0,1]²
    pub fn transform(&self, raw_h: f64, raw_v: f64) -> (f64, f64) {
        let (h, v) = match self {
            CalibrationModel::Identity => (raw_h, raw_v),
            CalibrationModel::Fitted {
                horizontal,
                vertical,
                ..
            } => (horizontal.eval(raw_h), vertical.eval(raw_v)),
        };
        (clamp_unit(h), clamp_unit(v))
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, CalibrationModel::Fitted { .. })
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.5
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Result of a fit request. Refusals are states, not errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    Fitted { rms_error: f64 },
    InsufficientSamples { have: usize, need: usize },
    /// Raw samples do not span enough of an axis to solve the fit
    Degenerate,
}

impl FitOutcome {
    pub fn is_fitted(&self) -> bool {
        matches!(self, FitOutcome::Fitted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    samples: Vec<CalibrationSample>,
    model: CalibrationModel,
    min_samples: usize,
    degree: usize,
}

impl CalibrationEngine {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            samples: Vec::new(),
            model: CalibrationModel::Identity,
            min_samples: config.min_samples,
            degree: config.degree.clamp(1, 2),
        }
    }

    /// Append a supervised sample. Values outside [0,1] are rejected rather
    /// than clamped so they cannot bend the fit.
    pub fn add_sample(
        &mut self,
        raw_h: f64,
        raw_v: f64,
        target_h: f64,
        target_v: f64,
    ) -> Result<()> {
        for (field, value) in [
            ("raw_h", raw_h),
            ("raw_v", raw_v),
            ("target_h", target_h),
            ("target_v", target_v),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GazeError::SampleOutOfRange { field, value });
            }
        }

        self.samples.push(CalibrationSample {
            raw_h,
            raw_v,
            target_h,
            target_v,
        });
        Ok(())
    }

    /// Fit both axes from the collected samples. On refusal the previous
    /// model stays in place.
    pub fn fit(&mut self) -> FitOutcome {
        if self.samples.len() < self.min_samples {
            log::warn!(
                "Calibration fit refused: {} samples, need {}",
                self.samples.len(),
                self.min_samples
            );
            return FitOutcome::InsufficientSamples {
                have: self.samples.len(),
                need: self.min_samples,
            };
        }

        let raw_h: Vec<f64> = self.samples.iter().map(|s| s.raw_h).collect();
        let raw_v: Vec<f64> = self.samples.iter().map(|s| s.raw_v).collect();
        let target_h: Vec<f64> = self.samples.iter().map(|s| s.target_h).collect();
        let target_v: Vec<f64> = self.samples.iter().map(|s| s.target_v).collect();

        let (horizontal, vertical) = match (
            fit_axis_with_fallback(&raw_h, &target_h, self.degree),
            fit_axis_with_fallback(&raw_v, &target_v, self.degree),
        ) {
            (Some(h), Some(v)) => (h, v),
            _ => {
                log::warn!("Calibration fit refused: raw samples are degenerate");
                return FitOutcome::Degenerate;
            }
        };

        let sq_err: f64 = self
            .samples
            .iter()
            .map(|s| {
                let dh = horizontal.eval(s.raw_h) - s.target_h;
                let dv = vertical.eval(s.raw_v) - s.target_v;
                dh * dh + dv * dv
            })
            .sum();
        let rms_error = (sq_err / self.samples.len() as f64).sqrt();

        log::info!(
            "Calibration fitted from {} samples (degree h={}, v={}, rms={:.4})",
            self.samples.len(),
            horizontal.degree(),
            vertical.degree(),
            rms_error
        );

        self.model = CalibrationModel::Fitted {
            horizontal,
            vertical,
            rms_error,
        };
        FitOutcome::Fitted { rms_error }
    }

    /// Map raw ratios to calibrated ratios; identity until fitted
    pub fn transform(&self, raw_h: f64, raw_v: f64) -> (f64, f64) {
        self.model.transform(raw_h, raw_v)
    }

    pub fn reset(&mut self) {
        log::info!("Calibration reset to identity ({} samples dropped)", self.samples.len());
        self.samples.clear();
        self.model = CalibrationModel::Identity;
    }

    pub fn is_calibrated(&self) -> bool {
        self.model.is_fitted()
    }

    pub fn status(&self) -> CalibrationStatus {
        CalibrationStatus {
            calibrated: self.is_calibrated(),
            sample_count: self.samples.len(),
        }
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }

    /// Install a previously fitted model (e.g. loaded from disk)
    pub fn set_model(&mut self, model: CalibrationModel) {
        self.model = model;
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(&CalibrationConfig::default())
    }
}

fn fit_axis_with_fallback(xs: &[f64], ys: &[f64], degree: usize) -> Option<AxisFit> {
    fit_axis(xs, ys, degree).or_else(|| {
        if degree > 1 {
            log::debug!("Degree {} fit singular, falling back to affine", degree);
            fit_axis(xs, ys, 1)
        } else {
            None
        }
    })
}

/// Ordinary least squares via the normal equations
fn fit_axis(xs: &[f64], ys: &[f64], degree: usize) -> Option<AxisFit> {
    let n = degree + 1;
    if xs.len() < n {
        return None;
    }

    // powers[k] = Σ x^k for k in 0..=2*degree
    let mut powers = vec![0.0; 2 * degree + 1];
    let mut rhs = vec![0.0; n];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut xp = 1.0;
        for (k, p) in powers.iter_mut().enumerate() {
            if k < n {
                rhs[k] += y * xp;
            }
            *p += xp;
            xp *= x;
        }
    }

    let mut matrix: Vec<Vec<f64>> = (0..n)
        .map(|row| (0..n).map(|col| powers[row + col]).collect())
        .collect();

    solve(&mut matrix, &mut rhs).map(|coefficients| AxisFit { coefficients })
}

/// Gaussian elimination with partial pivoting; `None` when singular
fn solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    const PIVOT_EPS: f64 = 1e-10;
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < PIVOT_EPS {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
