// Endpoint statistics and power analysis
//
// Every computation here is a pure function of the rows a cohort filter
// selected. There is no resampling and no imputation: a missing endpoint cell
// fails the computation with a data error instead of being dropped.
//
// Endpoint kinds:
// - continuous: two-sample mean difference, pooled SD, 95% normal CI
// - binary: difference in proportions, unpooled SE, 95% normal CI
// - time_to_event: Kaplan-Meier median survival per cohort, no CI
//
// Power uses the two-sided normal approximation. Time-to-event power is not
// implemented and is reported as such, never as a number.
//
// Normal CDF and quantile come from statrs' erf/erf_inv; descriptive
// statistics from statrs' Statistics trait.

mod endpoint;
mod power;
mod survival;

pub use endpoint::{
    binary_stats, compute, continuous_stats, BinaryStats, ContinuousStats, EndpointStats,
    SurvivalStats,
};
pub use power::{
    normal_cdf, normal_quantile, power_binary, power_normal, PowerEstimate, PowerModel, Z_975,
};
pub use survival::{kaplan_meier, median_survival, SurvivalCurve};
