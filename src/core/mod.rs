mod engine;
mod types;

pub use engine::{
    MAX_MONTHS, MONTHS_PER_YEAR, Phase, advance_phase, horizon, monthly_factor, simulate,
};
pub use types::{FiresResult, MonthlyDataPoint, Parameters, RetirementSnapshot, YearlyDataPoint};
