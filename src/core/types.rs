use serde::Serialize;

/// Validated calculator inputs; annual nominal amounts and annual percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameters {
    pub birth_year: i32,
    pub years_duration: u32,
    pub currency: String,
    pub income_gross_per_year: u64,
    pub expenses_per_year: u64,
    pub portfolio_value: u64,
    pub portfolio_percentage_per_year: f64,
    pub inflation_percentage_per_year: f64,
    pub max_withdrawal_percentage_per_year: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MonthlyDataPoint {
    pub portfolio: i64,
    pub interest: i64,
    pub change: i64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct YearlyDataPoint {
    pub year: u32,
    pub portfolio: i64,
    pub interest: i64,
    pub change: i64,
}

/// Figures frozen on the month the portfolio first exceeds its withdrawal target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetirementSnapshot {
    pub cost_of_living: i64,
    pub portfolio: i64,
    pub months: u32,
    pub years: u32,
    pub age: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiresResult {
    pub cost_of_living: Option<i64>,
    pub portfolio: Option<i64>,
    pub months: Option<u32>,
    pub years: Option<u32>,
    pub age: Option<i32>,
    pub pension_started: bool,
    pub graph_months: Vec<MonthlyDataPoint>,
    pub graph_years: Vec<YearlyDataPoint>,
}

impl FiresResult {
    pub fn retirement(&self) -> Option<RetirementSnapshot> {
        Some(RetirementSnapshot {
            cost_of_living: self.cost_of_living?,
            portfolio: self.portfolio?,
            months: self.months?,
            years: self.years?,
            age: self.age?,
        })
    }
}
