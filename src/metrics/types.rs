use rust_decimal::Decimal;
use serde::Serialize;

use crate::query::range::DateRange;
use crate::rows::GoalMetric;
use crate::segment::Segment;

/// Headline KPI tiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiResult {
    pub qualified_leads_total: u64,
    /// Appointments per lead handled. Not clamped to 1.0.
    pub booking_rate: f64,
    /// Signed contracts per presentation. Not clamped to 1.0.
    pub close_rate: f64,
    pub avg_contract_value: Decimal,
    pub gross_profit_pct: f64,
    pub net_profit_pct: f64,
    pub gross_profit_mom: f64,
    pub net_profit_mom: f64,
    /// Supplied by configuration, never computed.
    pub billing_on_time: Option<f64>,
    /// `YYYY-MM` of the finance record the profit figures came from.
    pub finance_month: Option<String>,
}

/// Profit figures for the reporting month and their month-over-month deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfitSnapshot {
    pub month: Option<String>,
    pub gross_profit_pct: f64,
    pub net_profit_pct: f64,
    pub gross_profit_mom: f64,
    pub net_profit_mom: f64,
}

/// Actual vs. target for one goal over the report range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub metric: GoalMetric,
    pub daily_target: f64,
    pub target: f64,
    pub actual: f64,
    /// `actual / target`, 0 when the target is not positive.
    pub attainment: f64,
}

/// Open receivables bucketed by days past due.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArAging {
    /// Not yet due.
    pub current: Decimal,
    pub days_1_30: Decimal,
    pub days_31_60: Decimal,
    pub days_61_90: Decimal,
    pub over_90: Decimal,
    pub total_open: Decimal,
    pub open_invoices: u64,
}

/// Segmented breakdowns, one per dimension family.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentSet {
    pub leads_by_source: Vec<Segment>,
    pub bookings_by_csr: Vec<Segment>,
    pub closes_by_rep: Vec<Segment>,
    pub contracts_by_service: Vec<Segment>,
}

/// Everything the dashboard renders for one range and selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub range_key: String,
    pub range: DateRange,
    pub days: i64,
    pub kpis: KpiResult,
    pub segments: SegmentSet,
    pub goals: Vec<GoalProgress>,
    pub ar_aging: ArAging,
}
