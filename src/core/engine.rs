use super::types::{
    FiresResult, MonthlyDataPoint, Parameters, RetirementSnapshot, YearlyDataPoint,
};

/// Hard cap on simulated months (100 years), reached or not.
pub const MAX_MONTHS: u32 = 1200;
pub const MONTHS_PER_YEAR: u32 = 12;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Accumulating,
    Retired { retirement_month: u32 },
    Done,
}

#[derive(Debug, Clone, Copy)]
struct MonthlyFactors {
    savings: f64,
    inflation: f64,
    growth: f64,
    safe_rate_yearly: f64,
}

impl MonthlyFactors {
    fn from_parameters(parameters: &Parameters) -> Self {
        let income = parameters.income_gross_per_year as f64 / 12.0;
        let expenses = parameters.expenses_per_year as f64 / 12.0;
        Self {
            // Fixed at the starting income/expense gap; later inflation does not erode it.
            savings: (income - expenses).max(0.0),
            inflation: monthly_factor(parameters.inflation_percentage_per_year),
            growth: monthly_factor(parameters.portfolio_percentage_per_year),
            safe_rate_yearly: parameters.max_withdrawal_percentage_per_year / 100.0,
        }
    }
}

#[derive(Debug, Clone)]
struct SimulationState {
    month: u32,
    current_portfolio: f64,
    monthly_expenses: f64,
    phase: Phase,
    retirement: Option<RetirementSnapshot>,
}

impl SimulationState {
    fn new(parameters: &Parameters) -> Self {
        Self {
            month: 0,
            current_portfolio: parameters.portfolio_value as f64,
            monthly_expenses: parameters.expenses_per_year as f64 / 12.0,
            phase: Phase::Accumulating,
            retirement: None,
        }
    }

    fn pension_started(&self) -> bool {
        self.retirement.is_some()
    }
}

/// Unrounded figures of one simulated month.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MonthValues {
    portfolio: f64,
    interest: f64,
    change: f64,
}

impl MonthValues {
    fn to_point(self) -> MonthlyDataPoint {
        MonthlyDataPoint {
            portfolio: round_half_even(self.portfolio),
            interest: round_half_even(self.interest),
            change: round_half_even(self.change),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct YearlyAggregator {
    portfolio: f64,
    interest: f64,
    change: f64,
}

impl YearlyAggregator {
    fn push(&mut self, month: u32, values: MonthValues) -> Option<YearlyDataPoint> {
        if (month - 1) % MONTHS_PER_YEAR == 0 {
            *self = Self::default();
        }
        self.portfolio += values.portfolio;
        self.interest += values.interest;
        self.change += values.change;

        if month % MONTHS_PER_YEAR != 0 {
            return None;
        }
        Some(YearlyDataPoint {
            year: month / MONTHS_PER_YEAR,
            portfolio: (self.portfolio / f64::from(MONTHS_PER_YEAR)).floor() as i64,
            interest: round_half_even(self.interest),
            change: round_half_even(self.change),
        })
    }
}

/// Runs the month-by-month projection until the post-retirement horizon or
/// [`MAX_MONTHS`] is reached. `current_year` only feeds the reported age.
pub fn simulate(parameters: &Parameters, current_year: i32) -> FiresResult {
    let factors = MonthlyFactors::from_parameters(parameters);
    let age_at_start = current_year - parameters.birth_year;
    let mut state = SimulationState::new(parameters);
    let mut yearly = YearlyAggregator::default();
    let mut graph_months = Vec::with_capacity(MAX_MONTHS as usize);
    let mut graph_years = Vec::with_capacity((MAX_MONTHS / MONTHS_PER_YEAR) as usize);

    while state.phase != Phase::Done {
        let values = step_month(&mut state, &factors, age_at_start);
        graph_months.push(values.to_point());
        if let Some(year) = yearly.push(state.month, values) {
            graph_years.push(year);
        }
        state.phase = advance_phase(state.phase, state.month, parameters.years_duration);
    }

    build_result(state.retirement, graph_months, graph_years)
}

pub fn monthly_factor(annual_percentage: f64) -> f64 {
    (1.0 + annual_percentage / 100.0).powf(1.0 / 12.0)
}

pub fn horizon(retirement_month: u32, years_duration: u32) -> u32 {
    retirement_month.saturating_add(MONTHS_PER_YEAR.saturating_mul(years_duration))
}

pub fn advance_phase(phase: Phase, month: u32, years_duration: u32) -> Phase {
    match phase {
        Phase::Done => Phase::Done,
        Phase::Retired { retirement_month } if month >= horizon(retirement_month, years_duration) => {
            Phase::Done
        }
        _ if month >= MAX_MONTHS => Phase::Done,
        other => other,
    }
}

fn round_half_even(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn step_month(state: &mut SimulationState, factors: &MonthlyFactors, age_at_start: i32) -> MonthValues {
    state.month += 1;
    state.monthly_expenses *= factors.inflation;
    let interest = state.current_portfolio * (factors.growth - 1.0);
    state.current_portfolio = state.current_portfolio * factors.growth + factors.savings;
    let target_portfolio = state.monthly_expenses * 12.0 / factors.safe_rate_yearly;

    if state.current_portfolio > target_portfolio && state.phase == Phase::Accumulating {
        let years = state.month / MONTHS_PER_YEAR;
        let snapshot = RetirementSnapshot {
            cost_of_living: round_half_even(state.monthly_expenses * 12.0),
            portfolio: round_half_even(state.current_portfolio),
            months: state.month,
            years,
            age: age_at_start + years as i32,
        };
        tracing::debug!(
            month = snapshot.months,
            portfolio = snapshot.portfolio,
            cost_of_living = snapshot.cost_of_living,
            "retirement goal reached"
        );
        state.retirement = Some(snapshot);
        state.phase = Phase::Retired {
            retirement_month: state.month,
        };
    }

    let change = if state.pension_started() {
        -state.monthly_expenses
    } else {
        factors.savings
    };
    MonthValues {
        portfolio: state.current_portfolio,
        interest,
        change,
    }
}

fn build_result(
    retirement: Option<RetirementSnapshot>,
    graph_months: Vec<MonthlyDataPoint>,
    graph_years: Vec<YearlyDataPoint>,
) -> FiresResult {
    FiresResult {
        cost_of_living: retirement.map(|r| r.cost_of_living),
        portfolio: retirement.map(|r| r.portfolio),
        months: retirement.map(|r| r.months),
        years: retirement.map(|r| r.years),
        age: retirement.map(|r| r.age),
        pension_started: retirement.is_some(),
        graph_months,
        graph_years,
    }
}
