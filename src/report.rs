use std::fmt::Write;

use crate::error::Result;
use crate::model::design::FilterOutcome;
use crate::types::PredictionResult;

/// Plain-text model summary and prediction, in the layout of a regression
/// results table.
pub fn render_text(result: &PredictionResult) -> String {
    let mut s = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut s, result);
    s
}

fn write_report(s: &mut String, result: &PredictionResult) -> std::fmt::Result {
    let stats = &result.statistics;
    let rule = "=".repeat(78);
    let thin = "-".repeat(78);

    writeln!(s, "{rule}")?;
    writeln!(s, "{:^78}", "OLS Regression Results")?;
    writeln!(s, "{rule}")?;
    writeln!(s, "Dep. Variable:   {:<20} R-squared:        {:>10.4}", "price", stats.r_squared)?;
    writeln!(s, "Query:           {:<20} Adj. R-squared:   {:>10.4}", result.query.property_type.code(), stats.adj_r_squared)?;
    writeln!(
        s,
        "No. Observations:{:>6}{:<14} F-statistic:      {:>10}",
        stats.n_obs,
        "",
        opt(stats.f_statistic, 4)
    )?;
    writeln!(
        s,
        "Df Residuals:    {:<20} Prob (F-statistic):{:>9}",
        stats.df_resid,
        opt(stats.f_p_value, 4)
    )?;
    writeln!(s, "Df Model:        {:<20} Log-Likelihood:   {:>10.2}", stats.df_model, stats.log_likelihood)?;
    writeln!(s, "AIC:             {:<20.2} BIC:              {:>10.2}", stats.aic, stats.bic)?;
    writeln!(s, "{rule}")?;
    writeln!(
        s,
        "{:<22}{:>12}{:>12}{:>9}{:>8}{:>12}{:>12}",
        "", "coef", "std err", "t", "P>|t|", "lower", "upper"
    )?;
    writeln!(s, "{thin}")?;
    for c in &result.coefficients {
        writeln!(
            s,
            "{:<22}{:>12.4e}{:>12.4e}{:>9.3}{:>8.3}{:>12.4e}{:>12.4e}",
            c.name, c.estimate, c.std_error, c.t_value, c.p_value, c.ci_lower, c.ci_upper
        )?;
    }
    writeln!(s, "{rule}")?;

    let filter = match result.property_type_filter {
        FilterOutcome::Matched { rows } => format!("{rows} rows of type {}", result.query.property_type),
        FilterOutcome::FellBackToAll { rows } => {
            format!("no rows of type {}; fell back to all {rows} rows", result.query.property_type)
        }
    };
    let p = &result.prediction;
    writeln!(s, "Window:          {} / {}", result.bounding_box, result.date_range)?;
    writeln!(s, "Features:        {}", result.feature_columns)?;
    writeln!(s, "Training set:    {filter}")?;
    if result.dropped_rows > 0 {
        writeln!(s, "Dropped rows:    {} (undefined feature values)", result.dropped_rows)?;
    }
    writeln!(s, "{thin}")?;
    writeln!(
        s,
        "{:>12}{:>12}{:>16}{:>16}{:>16}{:>16}",
        "mean", "mean_se", "mean_ci_lower", "mean_ci_upper", "obs_ci_lower", "obs_ci_upper"
    )?;
    writeln!(
        s,
        "{:>12.2}{:>12.2}{:>16.2}{:>16.2}{:>16.2}{:>16.2}",
        p.mean, p.mean_se, p.mean_ci_lower, p.mean_ci_upper, p.obs_ci_lower, p.obs_ci_upper
    )?;
    writeln!(s, "({:.0}% intervals)", p.level * 100.0)
}

pub fn render_json(result: &PredictionResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn opt(v: Option<f64>, precision: usize) -> String {
    v.map(|v| format!("{v:.precision$}")).unwrap_or_else(|| "n/a".to_string())
}
