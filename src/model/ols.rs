//! Ordinary least squares with classical (homoskedastic) inference.
//!
//! Columns are scaled to unit norm before a Householder QR so that rank
//! detection does not depend on feature units; estimates and covariance are
//! mapped back to the original scale afterwards.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::model::design::DesignColumn;

/// |r_ii| of the unit-scaled R below this marks a rank-deficient design.
const RANK_TOLERANCE: f64 = 1e-10;

/// Condition estimate above which the fit proceeds with a warning.
const COLLINEARITY_WARN: f64 = 1e8;

#[derive(Debug, Clone)]
pub struct FittedModel {
    pub coefficients: DVector<f64>,
    /// Estimated covariance of the coefficients, σ̂² (XᵀX)⁻¹.
    pub covariance: DMatrix<f64>,
    pub sigma2: f64,
    pub n_obs: usize,
    pub df_resid: usize,
    pub rss: f64,
    pub tss: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoefficientSummary {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitStatistics {
    pub n_obs: usize,
    pub df_model: usize,
    pub df_resid: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Overall F test; absent for an intercept-only model.
    pub f_statistic: Option<f64>,
    pub f_p_value: Option<f64>,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub residual_std_error: f64,
}

/// Point estimate with intervals for the mean response and a new observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub level: f64,
    pub mean: f64,
    pub mean_se: f64,
    pub mean_ci_lower: f64,
    pub mean_ci_upper: f64,
    pub obs_ci_lower: f64,
    pub obs_ci_upper: f64,
}

pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<FittedModel, PipelineError> {
    let (n, p) = x.shape();
    if y.len() != n {
        return Err(PipelineError::InvalidParameter(format!(
            "response has {} rows, design has {n}",
            y.len()
        )));
    }
    if n == 0 {
        return Err(PipelineError::EmptyTrainingSet);
    }
    if n < p {
        return Err(PipelineError::SingularDesign {
            rows: n,
            columns: p,
            reason: "fewer rows than columns",
        });
    }
    if n == p {
        return Err(PipelineError::SingularDesign {
            rows: n,
            columns: p,
            reason: "no residual degrees of freedom",
        });
    }

    let singular = |reason: &'static str| PipelineError::SingularDesign { rows: n, columns: p, reason };

    let norms: Vec<f64> = x.column_iter().map(|c| c.norm()).collect();
    if norms.iter().any(|s| !s.is_finite() || *s == 0.0) {
        return Err(singular("zero or non-finite column"));
    }
    let mut scaled = x.clone();
    for (j, s) in norms.iter().enumerate() {
        scaled.column_mut(j).unscale_mut(*s);
    }

    let qr = scaled.qr();
    let r = qr.r();
    let diag: Vec<f64> = r.diagonal().iter().map(|d| d.abs()).collect();
    let min_diag = diag.iter().copied().fold(f64::INFINITY, f64::min);
    let max_diag = diag.iter().copied().fold(0.0, f64::max);
    if min_diag <= RANK_TOLERANCE {
        return Err(singular("rank deficient"));
    }
    let condition = max_diag / min_diag;
    if condition > COLLINEARITY_WARN {
        warn!(condition, "[OLS] design is nearly collinear; estimates may be unstable");
    }

    let qty = qr.q().transpose() * y;
    let beta_scaled = r
        .solve_upper_triangular(&qty)
        .ok_or_else(|| singular("triangular solve failed"))?;
    let r_inv = r.try_inverse().ok_or_else(|| singular("R not invertible"))?;
    let xtx_inv_scaled = &r_inv * r_inv.transpose();

    let coefficients = DVector::from_iterator(p, beta_scaled.iter().zip(&norms).map(|(b, s)| b / s));

    let residuals = y - x * &coefficients;
    let rss = residuals.norm_squared();
    let df_resid = n - p;
    let sigma2 = rss / df_resid as f64;
    let covariance = DMatrix::from_fn(p, p, |i, j| sigma2 * xtx_inv_scaled[(i, j)] / (norms[i] * norms[j]));

    let y_mean = y.mean();
    let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    debug!(n, p, rss, sigma2, condition, "[OLS] fit complete");

    Ok(FittedModel {
        coefficients,
        covariance,
        sigma2,
        n_obs: n,
        df_resid,
        rss,
        tss,
    })
}

impl FittedModel {
    fn students_t(&self) -> Result<StudentsT, PipelineError> {
        StudentsT::new(0.0, 1.0, self.df_resid as f64)
            .map_err(|e| PipelineError::InvalidParameter(format!("t distribution: {e}")))
    }

    /// Two-sided critical value for the given confidence level.
    pub fn critical_value(&self, level: f64) -> Result<f64, PipelineError> {
        check_level(level)?;
        Ok(self.students_t()?.inverse_cdf(1.0 - (1.0 - level) / 2.0))
    }

    pub fn standard_errors(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }

    pub fn coefficient_summaries(&self, columns: &[DesignColumn], level: f64) -> Result<Vec<CoefficientSummary>, PipelineError> {
        if columns.len() != self.coefficients.len() {
            return Err(PipelineError::DesignMismatch {
                training: self.coefficients.len(),
                query: columns.len(),
            });
        }
        let t_dist = self.students_t()?;
        let crit = self.critical_value(level)?;
        let se = self.standard_errors();

        Ok(columns
            .iter()
            .enumerate()
            .map(|(j, col)| {
                let estimate = self.coefficients[j];
                let t_value = estimate / se[j];
                let p_value = if t_value.is_nan() {
                    f64::NAN
                } else {
                    2.0 * (1.0 - t_dist.cdf(t_value.abs()))
                };
                CoefficientSummary {
                    name: col.name().to_string(),
                    estimate,
                    std_error: se[j],
                    t_value,
                    p_value,
                    ci_lower: estimate - crit * se[j],
                    ci_upper: estimate + crit * se[j],
                }
            })
            .collect())
    }

    pub fn statistics(&self) -> FitStatistics {
        let n = self.n_obs as f64;
        let p = self.coefficients.len();
        let df_model = p.saturating_sub(1);
        let df_resid = self.df_resid as f64;

        let r_squared = if self.tss > 0.0 { 1.0 - self.rss / self.tss } else { f64::NAN };
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1.0) / df_resid;

        let (f_statistic, f_p_value) = if df_model > 0 && self.sigma2 > 0.0 {
            let f = ((self.tss - self.rss) / df_model as f64) / self.sigma2;
            let p_value = FisherSnedecor::new(df_model as f64, df_resid)
                .ok()
                .map(|dist| 1.0 - dist.cdf(f));
            (Some(f), p_value)
        } else {
            (None, None)
        };

        let log_likelihood = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.rss / n).ln() + 1.0);
        let k = p as f64;

        FitStatistics {
            n_obs: self.n_obs,
            df_model,
            df_resid: self.df_resid,
            r_squared,
            adj_r_squared,
            f_statistic,
            f_p_value,
            log_likelihood,
            aic: -2.0 * log_likelihood + 2.0 * k,
            bic: -2.0 * log_likelihood + k * n.ln(),
            residual_std_error: self.sigma2.sqrt(),
        }
    }
}

/// Point estimate and two-sided intervals at `level` for one design row.
pub fn predict(model: &FittedModel, row: &DVector<f64>, level: f64) -> Result<Prediction, PipelineError> {
    if row.len() != model.coefficients.len() {
        return Err(PipelineError::DesignMismatch {
            training: model.coefficients.len(),
            query: row.len(),
        });
    }
    let crit = model.critical_value(level)?;

    let mean = row.dot(&model.coefficients);
    let var_mean = (row.transpose() * &model.covariance * row)[(0, 0)].max(0.0);
    let mean_se = var_mean.sqrt();
    let obs_se = (var_mean + model.sigma2).sqrt();

    Ok(Prediction {
        level,
        mean,
        mean_se,
        mean_ci_lower: mean - crit * mean_se,
        mean_ci_upper: mean + crit * mean_se,
        obs_ci_lower: mean - crit * obs_se,
        obs_ci_upper: mean + crit * obs_se,
    })
}

fn check_level(level: f64) -> Result<(), PipelineError> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(PipelineError::InvalidParameter(format!(
            "confidence level must be in (0, 1), got {level}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x = 1..5, y = [2, 4, 5, 4, 5]: intercept 2.2, slope 0.6, RSS 2.4.
    fn textbook() -> (DMatrix<f64>, DVector<f64>) {
        let x = DMatrix::from_row_slice(5, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0]);
        let y = DVector::from_vec(vec![2.0, 4.0, 5.0, 4.0, 5.0]);
        (x, y)
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn recovers_textbook_estimates() {
        let (x, y) = textbook();
        let model = fit(&x, &y).unwrap();

        assert!(close(model.coefficients[0], 2.2, 1e-10));
        assert!(close(model.coefficients[1], 0.6, 1e-10));
        assert!(close(model.rss, 2.4, 1e-10));
        assert!(close(model.sigma2, 0.8, 1e-10));

        let se = model.standard_errors();
        assert!(close(se[0], 0.88f64.sqrt(), 1e-10));
        assert!(close(se[1], 0.08f64.sqrt(), 1e-10));

        let stats = model.statistics();
        assert!(close(stats.r_squared, 0.6, 1e-10));
        assert_eq!(stats.df_resid, 3);
        assert_eq!(stats.df_model, 1);
        assert!(close(stats.f_statistic.unwrap(), 4.5, 1e-10));
    }

    #[test]
    fn slope_p_value_is_two_sided() {
        let (x, y) = textbook();
        let model = fit(&x, &y).unwrap();
        let summary = model
            .coefficient_summaries(&[DesignColumn::Intercept, DesignColumn::InverseAmenityProximity], 0.95)
            .unwrap();

        assert_eq!(summary[0].name, "const");
        assert!(close(summary[1].t_value, 0.6 / 0.08f64.sqrt(), 1e-10));
        assert!(summary[1].p_value > 0.1 && summary[1].p_value < 0.2);
        assert!(summary[1].ci_lower < 0.6 && summary[1].ci_upper > 0.6);
    }

    #[test]
    fn prediction_intervals_at_mean_of_x() {
        let (x, y) = textbook();
        let model = fit(&x, &y).unwrap();
        let row = DVector::from_vec(vec![1.0, 3.0]);

        let pred = predict(&model, &row, 0.95).unwrap();

        // t(0.975, 3) = 3.18245
        assert!(close(pred.mean, 4.0, 1e-10));
        assert!(close(pred.mean_se, 0.4, 1e-10));
        assert!(close(pred.mean_ci_upper - pred.mean, 3.18245 * 0.4, 1e-3));
        assert!(close(pred.obs_ci_upper - pred.mean, 3.18245 * 0.96f64.sqrt(), 1e-3));
        assert!(pred.obs_ci_lower < pred.mean_ci_lower);
    }

    #[test]
    fn wider_level_gives_wider_interval() {
        let (x, y) = textbook();
        let model = fit(&x, &y).unwrap();
        let row = DVector::from_vec(vec![1.0, 2.0]);

        let narrow = predict(&model, &row, 0.80).unwrap();
        let wide = predict(&model, &row, 0.99).unwrap();

        assert!(wide.mean_ci_upper - wide.mean_ci_lower > narrow.mean_ci_upper - narrow.mean_ci_lower);
        assert_eq!(wide.mean, narrow.mean);
    }

    #[test]
    fn fewer_rows_than_columns_is_singular() {
        let x = DMatrix::from_row_slice(1, 2, &[1.0, 0.5]);
        let y = DVector::from_vec(vec![100.0]);
        assert!(matches!(fit(&x, &y), Err(PipelineError::SingularDesign { rows: 1, columns: 2, .. })));
    }

    #[test]
    fn constant_feature_is_singular() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.5, 1.0, 0.5, 1.0, 0.5, 1.0, 0.5]);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(
            fit(&x, &y),
            Err(PipelineError::SingularDesign { reason: "rank deficient", .. })
        ));
    }

    #[test]
    fn zero_rows_is_empty_training_set() {
        let x = DMatrix::<f64>::zeros(0, 2);
        let y = DVector::<f64>::zeros(0);
        assert_eq!(fit(&x, &y).unwrap_err(), PipelineError::EmptyTrainingSet);
    }

    #[test]
    fn intercept_only_model_predicts_the_mean() {
        let x = DMatrix::from_element(4, 1, 1.0);
        let y = DVector::from_vec(vec![10.0, 20.0, 30.0, 40.0]);
        let model = fit(&x, &y).unwrap();

        let pred = predict(&model, &DVector::from_element(1, 1.0), 0.95).unwrap();
        assert!(close(pred.mean, 25.0, 1e-9));
        assert!(model.statistics().f_statistic.is_none());
    }

    #[test]
    fn misaligned_row_and_bad_level_are_rejected() {
        let (x, y) = textbook();
        let model = fit(&x, &y).unwrap();

        let short = DVector::from_element(1, 1.0);
        assert_eq!(
            predict(&model, &short, 0.95).unwrap_err(),
            PipelineError::DesignMismatch { training: 2, query: 1 }
        );
        let row = DVector::from_vec(vec![1.0, 3.0]);
        assert!(matches!(predict(&model, &row, 1.5), Err(PipelineError::InvalidParameter(_))));
    }
}
