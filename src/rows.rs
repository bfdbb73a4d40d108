use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Common accessors the date and dimension filters need.
///
/// Fact rows are append-only: a correction is a new row, never an update in
/// place.
pub trait FactRow {
    fn date(&self) -> NaiveDate;
    fn dimension_id(&self) -> &str;
}

/// Missing or `null` numeric fields read as zero.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Qualified leads for one lead source on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRow {
    pub date: NaiveDate,
    #[serde(alias = "source", alias = "leadSource")]
    pub dimension_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u64,
}

/// Leads handled and appointments booked by one CSR on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRow {
    pub date: NaiveDate,
    #[serde(alias = "csr")]
    pub dimension_id: String,
    #[serde(default, deserialize_with = "null_as_default", alias = "leads")]
    pub leads_count: u64,
    #[serde(default, deserialize_with = "null_as_default", alias = "appointments")]
    pub appointments_count: u64,
}

/// Presentations given and contracts signed by one sales rep on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRow {
    pub date: NaiveDate,
    #[serde(alias = "salesRep", alias = "rep")]
    pub dimension_id: String,
    #[serde(default, deserialize_with = "null_as_default", alias = "presented")]
    pub presented_count: u64,
    #[serde(default, deserialize_with = "null_as_default", alias = "signed")]
    pub signed_count: u64,
}

/// A single signed contract for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRow {
    pub date: NaiveDate,
    #[serde(alias = "service")]
    pub dimension_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: Decimal,
}

macro_rules! impl_fact_row {
    ($($t:ty),*) => {
        $(impl FactRow for $t {
            fn date(&self) -> NaiveDate {
                self.date
            }

            fn dimension_id(&self) -> &str {
                &self.dimension_id
            }
        })*
    };
}

impl_fact_row!(LeadRow, BookingRow, CloseRow, ContractRow);

/// Month-level finance record. `month` is always the first of the month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFinanceRow {
    pub month: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub revenue: Decimal,
    #[serde(default, deserialize_with = "null_as_default", alias = "grossProfitPercent")]
    pub gross_profit_pct: f64,
    #[serde(default, deserialize_with = "null_as_default", alias = "netProfitPercent")]
    pub net_profit_pct: f64,
}

/// An invoice tracked for accounts-receivable aging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivableRow {
    pub invoice_id: String,
    pub due_date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: Decimal,
    #[serde(default)]
    pub paid: bool,
}

/// What a daily goal is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMetric {
    Leads,
    Appointments,
    Closes,
    Revenue,
}

impl GoalMetric {
    pub const ALL: [GoalMetric; 4] = [
        GoalMetric::Leads,
        GoalMetric::Appointments,
        GoalMetric::Closes,
        GoalMetric::Revenue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GoalMetric::Leads => "leads",
            GoalMetric::Appointments => "appointments",
            GoalMetric::Closes => "closes",
            GoalMetric::Revenue => "revenue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        GoalMetric::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub metric: GoalMetric,
    pub daily_target: f64,
}

/// Everything the pipeline needs from the row source for one report.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub leads: Vec<LeadRow>,
    pub bookings: Vec<BookingRow>,
    pub closes: Vec<CloseRow>,
    pub contracts: Vec<ContractRow>,
    pub finance: Vec<MonthlyFinanceRow>,
    pub receivables: Vec<ReceivableRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lead_row_null_count_is_zero() {
        let row: LeadRow =
            serde_json::from_str(r#"{"date":"2025-09-01","source":"angi","count":null}"#).unwrap();
        assert_eq!(row.count, 0);
        assert_eq!(row.dimension_id, "angi");
    }

    #[test]
    fn test_booking_row_missing_fields_are_zero() {
        let row: BookingRow =
            serde_json::from_str(r#"{"date":"2025-09-01","dimensionId":"csr-1","leads":20}"#)
                .unwrap();
        assert_eq!(row.leads_count, 20);
        assert_eq!(row.appointments_count, 0);
    }

    #[test]
    fn test_contract_amount_from_string_or_number() {
        let a: ContractRow = serde_json::from_str(
            r#"{"date":"2025-09-01","service":"roofing","amount":"12500.50"}"#,
        )
        .unwrap();
        assert_eq!(a.amount, dec!(12500.50));

        let b: ContractRow =
            serde_json::from_str(r#"{"date":"2025-09-01","service":"roofing","amount":null}"#)
                .unwrap();
        assert_eq!(b.amount, Decimal::ZERO);
    }

    #[test]
    fn test_finance_row_accepts_percent_alias() {
        let row: MonthlyFinanceRow = serde_json::from_str(
            r#"{"month":"2025-09-01","revenue":"100000","grossProfitPercent":0.46,"netProfitPercent":null}"#,
        )
        .unwrap();
        assert_eq!(row.gross_profit_pct, 0.46);
        assert_eq!(row.net_profit_pct, 0.0);
    }

    #[test]
    fn test_goal_metric_parse() {
        assert_eq!(GoalMetric::parse("Leads"), Some(GoalMetric::Leads));
        assert_eq!(GoalMetric::parse("revenue"), Some(GoalMetric::Revenue));
        assert_eq!(GoalMetric::parse("profit"), None);
    }
}
