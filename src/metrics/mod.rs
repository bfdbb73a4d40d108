pub mod types;

pub use types::*;

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::date_util::{first_of_month, month_key, previous_month};
use crate::dimension::{Catalogs, DimensionFamily, DimensionOption};
use crate::filter::{select_rows, Selection, SelectionState};
use crate::query::range::DateRange;
use crate::rows::{
    BookingRow, CloseRow, ContractRow, FactRow, Goal, GoalMetric, LeadRow, MonthlyFinanceRow,
    ReceivableRow, RowSet,
};
use crate::segment;

/// Inputs for [`compute_report`] that do not change with the selection.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub rows: &'a RowSet,
    pub catalogs: &'a Catalogs,
    pub goals: &'a [Goal],
    pub billing_on_time: Option<f64>,
}

/// Compute the full dashboard for one range and selection.
pub fn compute_report(
    input: ReportInput<'_>,
    range: &DateRange,
    selection: &SelectionState,
) -> DashboardReport {
    let rows = input.rows;
    let kpis = compute_kpis(rows, range, selection, input.billing_on_time);
    let segments = compute_segments(rows, input.catalogs, range, selection);
    let actuals = GoalActuals::from_rows(rows, range, selection);
    let goals = goal_progress(input.goals, &actuals, range);
    let ar_aging = ar_aging(&rows.receivables, range.end);

    log::debug!(
        "report {}: {} leads, booking {:.3}, close {:.3}, {} goals",
        range,
        kpis.qualified_leads_total,
        kpis.booking_rate,
        kpis.close_rate,
        goals.len()
    );

    DashboardReport {
        range_key: range.to_key(),
        range: *range,
        days: range.days(),
        kpis,
        segments,
        goals,
        ar_aging,
    }
}

/// Compute the headline KPI tiles.
pub fn compute_kpis(
    rows: &RowSet,
    range: &DateRange,
    selection: &SelectionState,
    billing_on_time: Option<f64>,
) -> KpiResult {
    let profit = profit_snapshot(&rows.finance, range);
    KpiResult {
        qualified_leads_total: qualified_leads_total(&rows.leads, range, &selection.lead_sources),
        booking_rate: booking_rate(&rows.bookings, range, &selection.csrs),
        close_rate: close_rate(&rows.closes, range, &selection.sales_reps),
        avg_contract_value: avg_contract_value(&rows.contracts, range, &selection.services),
        gross_profit_pct: profit.gross_profit_pct,
        net_profit_pct: profit.net_profit_pct,
        gross_profit_mom: profit.gross_profit_mom,
        net_profit_mom: profit.net_profit_mom,
        billing_on_time,
        finance_month: profit.month,
    }
}

pub fn qualified_leads_total(rows: &[LeadRow], range: &DateRange, selection: &Selection) -> u64 {
    select_rows(rows, range, selection).fold(0u64, |total, r| total.saturating_add(r.count))
}

/// Appointments over leads. Numerator and denominator are both scoped to the
/// CSR selection.
pub fn booking_rate(rows: &[BookingRow], range: &DateRange, selection: &Selection) -> f64 {
    let (appointments, leads) = select_rows(rows, range, selection)
        .fold((0u64, 0u64), |(a, l), r| {
            (a.saturating_add(r.appointments_count), l.saturating_add(r.leads_count))
        });
    ratio(appointments, leads)
}

pub fn close_rate(rows: &[CloseRow], range: &DateRange, selection: &Selection) -> f64 {
    let (signed, presented) = select_rows(rows, range, selection)
        .fold((0u64, 0u64), |(s, p), r| {
            (s.saturating_add(r.signed_count), p.saturating_add(r.presented_count))
        });
    ratio(signed, presented)
}

/// Mean contract amount. An explicitly empty service selection counts as
/// all services here, unlike every other KPI.
pub fn avg_contract_value(rows: &[ContractRow], range: &DateRange, selection: &Selection) -> Decimal {
    let selection = selection.or_all_if_empty();
    let (sum, n) = select_rows(rows, range, &selection)
        .fold((Decimal::ZERO, 0u64), |(sum, n), r| (sum.saturating_add(r.amount), n + 1));
    if n == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(n)
    }
}

/// Denominator floored to 1, so empty input yields 0 rather than NaN.
fn ratio(numerator: u64, denominator: u64) -> f64 {
    numerator as f64 / denominator.max(1) as f64
}

/// Profit for the month containing `range.end`, falling back to the most
/// recent month on record.
pub fn profit_snapshot(finance: &[MonthlyFinanceRow], range: &DateRange) -> ProfitSnapshot {
    let target = first_of_month(range.end);
    let current = match find_month(finance, target) {
        Some(row) => row,
        None => match finance.iter().max_by_key(|r| r.month) {
            Some(row) => {
                log::debug!(
                    "no finance record for {}, using {}",
                    month_key(target),
                    month_key(row.month)
                );
                row
            }
            None => return ProfitSnapshot::default(),
        },
    };

    let (gross_mom, net_mom) = match find_month(finance, previous_month(current.month)) {
        Some(prev) => (
            current.gross_profit_pct - prev.gross_profit_pct,
            current.net_profit_pct - prev.net_profit_pct,
        ),
        None => (0.0, 0.0),
    };

    ProfitSnapshot {
        month: Some(month_key(current.month)),
        gross_profit_pct: current.gross_profit_pct,
        net_profit_pct: current.net_profit_pct,
        gross_profit_mom: gross_mom,
        net_profit_mom: net_mom,
    }
}

fn find_month(finance: &[MonthlyFinanceRow], month: NaiveDate) -> Option<&MonthlyFinanceRow> {
    finance.iter().find(|r| first_of_month(r.month) == month)
}

// ── Breakdowns ─────────────────────────────────────────────────────

/// Per-option subtotals in catalog order, for selected catalog options only.
///
/// Rows whose dimension id is not in the catalog are left out here even
/// though they still count toward the ungrouped KPI totals.
pub fn subtotals<R, F>(
    rows: &[R],
    range: &DateRange,
    selection: &Selection,
    catalog: &[DimensionOption],
    value: F,
) -> Vec<(String, f64)>
where
    R: FactRow,
    F: Fn(&R) -> f64,
{
    let mut by_id: HashMap<&str, f64> = HashMap::new();
    for row in select_rows(rows, range, selection) {
        *by_id.entry(row.dimension_id()).or_insert(0.0) += value(row);
    }
    catalog
        .iter()
        .filter(|o| selection.is_selected(&o.id))
        .map(|o| (o.id.clone(), by_id.get(o.id.as_str()).copied().unwrap_or(0.0)))
        .collect()
}

/// Raw subtotals for one family, ready for [`segment::compose`].
pub fn family_subtotals(
    family: DimensionFamily,
    rows: &RowSet,
    catalogs: &Catalogs,
    range: &DateRange,
    selection: &SelectionState,
) -> Vec<(String, f64)> {
    let catalog = catalogs.get(family);
    let sel = selection.get(family);
    match family {
        DimensionFamily::LeadSource => {
            subtotals(&rows.leads, range, sel, catalog, |r| r.count as f64)
        }
        DimensionFamily::Csr => subtotals(&rows.bookings, range, sel, catalog, |r| {
            r.appointments_count as f64
        }),
        DimensionFamily::SalesRep => {
            subtotals(&rows.closes, range, sel, catalog, |r| r.signed_count as f64)
        }
        DimensionFamily::Service => subtotals(&rows.contracts, range, sel, catalog, |r| {
            r.amount.to_f64().unwrap_or(0.0)
        }),
    }
}

pub fn compute_segments(
    rows: &RowSet,
    catalogs: &Catalogs,
    range: &DateRange,
    selection: &SelectionState,
) -> SegmentSet {
    let compose =
        |family| segment::compose(&family_subtotals(family, rows, catalogs, range, selection));
    SegmentSet {
        leads_by_source: compose(DimensionFamily::LeadSource),
        bookings_by_csr: compose(DimensionFamily::Csr),
        closes_by_rep: compose(DimensionFamily::SalesRep),
        contracts_by_service: compose(DimensionFamily::Service),
    }
}

// ── Goals ──────────────────────────────────────────────────────────

/// Range totals that goals are measured against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalActuals {
    pub leads: f64,
    pub appointments: f64,
    pub closes: f64,
    pub revenue: f64,
}

impl GoalActuals {
    pub fn from_rows(rows: &RowSet, range: &DateRange, selection: &SelectionState) -> Self {
        let revenue = select_rows(&rows.contracts, range, &selection.services)
            .fold(Decimal::ZERO, |sum, r| sum.saturating_add(r.amount));
        Self {
            leads: qualified_leads_total(&rows.leads, range, &selection.lead_sources) as f64,
            appointments: select_rows(&rows.bookings, range, &selection.csrs)
                .map(|r| r.appointments_count as f64)
                .sum(),
            closes: select_rows(&rows.closes, range, &selection.sales_reps)
                .map(|r| r.signed_count as f64)
                .sum(),
            revenue: revenue.to_f64().unwrap_or(0.0),
        }
    }

    pub fn get(&self, metric: GoalMetric) -> f64 {
        match metric {
            GoalMetric::Leads => self.leads,
            GoalMetric::Appointments => self.appointments,
            GoalMetric::Closes => self.closes,
            GoalMetric::Revenue => self.revenue,
        }
    }
}

/// Scale each daily target to the range length and compare with actuals.
pub fn goal_progress(goals: &[Goal], actuals: &GoalActuals, range: &DateRange) -> Vec<GoalProgress> {
    let days = range.days() as f64;
    goals
        .iter()
        .map(|g| {
            let target = g.daily_target * days;
            let actual = actuals.get(g.metric);
            GoalProgress {
                metric: g.metric,
                daily_target: g.daily_target,
                target,
                actual,
                attainment: if target > 0.0 { actual / target } else { 0.0 },
            }
        })
        .collect()
}

// ── AR aging ───────────────────────────────────────────────────────

/// Bucket unpaid invoices by days past due as of `as_of`.
pub fn ar_aging(invoices: &[ReceivableRow], as_of: NaiveDate) -> ArAging {
    let mut aging = ArAging::default();
    for inv in invoices.iter().filter(|i| !i.paid) {
        let bucket = match (as_of - inv.due_date).num_days() {
            d if d <= 0 => &mut aging.current,
            1..=30 => &mut aging.days_1_30,
            31..=60 => &mut aging.days_31_60,
            61..=90 => &mut aging.days_61_90,
            _ => &mut aging.over_90,
        };
        *bucket = bucket.saturating_add(inv.amount);
        aging.total_open = aging.total_open.saturating_add(inv.amount);
        aging.open_invoices += 1;
    }
    aging
}
