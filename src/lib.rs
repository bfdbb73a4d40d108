pub mod date_util;
pub mod dimension;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod query;
pub mod rows;
pub mod segment;
pub mod storage;

pub use dimension::{Catalogs, DimensionFamily, DimensionOption};
pub use error::{Error, Result};
pub use filter::{is_selected, select_rows, Selection, SelectionState};
pub use metrics::{ArAging, DashboardReport, GoalProgress, KpiResult, SegmentSet};
pub use query::builder::{Recorded, RowQuery, StoredFact};
pub use query::range::{days_in_range, in_range, DateRange, Preset};
pub use rows::{
    BookingRow, CloseRow, ContractRow, FactRow, Goal, GoalMetric, LeadRow, MonthlyFinanceRow,
    ReceivableRow, RowSet,
};
pub use segment::{compose, Segment};
pub use storage::Database;

use chrono::NaiveDate;

use metrics::ReportInput;
use storage::{repository, schema};

/// Config key for the externally supplied billing-on-time ratio.
pub const BILLING_ON_TIME_KEY: &str = "billing_on_time";
/// Config key for the range used when none is given.
pub const DEFAULT_RANGE_KEY: &str = "default_range";

/// Main entry point: the KPI pipeline over a local warehouse.
pub struct Dashboard {
    db: Database,
}

impl Dashboard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Compute the full dashboard. Uses the persisted selection when
    /// `selection` is `None`.
    pub async fn report(
        &self,
        range: &DateRange,
        selection: Option<&SelectionState>,
    ) -> Result<DashboardReport> {
        if range.is_inverted() {
            log::warn!("range {range} ends before it starts; every KPI will be empty");
        }

        let selection = match selection {
            Some(s) => s.clone(),
            None => self.selection().await?,
        };
        let catalogs = self.catalogs().await?;
        let rows = self.load_rows(range).await?;
        let goals = self.goals().await?;
        let billing_on_time = self.billing_on_time().await?;

        let input = ReportInput {
            rows: &rows,
            catalogs: &catalogs,
            goals: &goals,
            billing_on_time,
        };
        Ok(metrics::compute_report(input, range, &selection))
    }

    /// Segmented breakdown for one family under the persisted selection.
    pub async fn segments(&self, family: DimensionFamily, range: &DateRange) -> Result<Vec<Segment>> {
        let selection = self.selection().await?;
        let catalogs = self.catalogs().await?;
        let rows = self.load_rows(range).await?;
        let subtotals = metrics::family_subtotals(family, &rows, &catalogs, range, &selection);
        Ok(segment::compose(&subtotals))
    }

    /// Every row the pipeline needs for `range`. Dimension filtering is left
    /// to the pipeline so that orphaned ids still reach the `All` totals.
    pub async fn load_rows(&self, range: &DateRange) -> Result<RowSet> {
        let query = RowQuery::new().range(range);
        let leads = query.clone().leads(&self.db).await?;
        let bookings = query.clone().bookings(&self.db).await?;
        let closes = query.clone().closes(&self.db).await?;
        let contracts = query.contracts(&self.db).await?;

        let (finance, receivables) = self
            .db
            .reader()
            .call(|conn| {
                let finance = repository::list_finance(conn)?;
                let receivables = repository::list_invoices(conn, false)?;
                Ok::<_, rusqlite::Error>((finance, receivables))
            })
            .await?;

        log::debug!(
            "loaded {} lead, {} booking, {} close, {} contract rows for {range}",
            leads.len(),
            bookings.len(),
            closes.len(),
            contracts.len()
        );

        Ok(RowSet {
            leads,
            bookings,
            closes,
            contracts,
            finance,
            receivables,
        })
    }

    // ── Catalog ────────────────────────────────────────────────────

    pub async fn catalogs(&self) -> Result<Catalogs> {
        Ok(self.db.reader().call(|conn| repository::load_catalogs(conn)).await?)
    }

    pub async fn options(
        &self,
        family: DimensionFamily,
        include_inactive: bool,
    ) -> Result<Vec<DimensionOption>> {
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::list_options(conn, family, include_inactive))
            .await?)
    }

    /// Add an option, or rename and reactivate an existing one.
    pub async fn add_option(&self, family: DimensionFamily, option: DimensionOption) -> Result<()> {
        if option.id.trim().is_empty() {
            return Err(Error::InvalidInput("option id must not be empty".into()));
        }
        self.db
            .writer()
            .call(move |conn| repository::upsert_option(conn, family, &option))
            .await?;
        Ok(())
    }

    pub async fn deactivate_option(&self, family: DimensionFamily, option_id: &str) -> Result<()> {
        let found = self
            .db
            .writer()
            .call({
                let id = option_id.to_string();
                move |conn| repository::set_option_active(conn, family, &id, false)
            })
            .await?;
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!("{family} option '{option_id}'")))
        }
    }

    pub async fn remove_option(&self, family: DimensionFamily, option_id: &str) -> Result<()> {
        let found = self
            .db
            .writer()
            .call({
                let id = option_id.to_string();
                move |conn| repository::remove_option(conn, family, &id)
            })
            .await?;
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!("{family} option '{option_id}'")))
        }
    }

    // ── Data entry ─────────────────────────────────────────────────

    pub async fn record_lead(&self, row: LeadRow) -> Result<i64> {
        check_count("lead count", row.count)?;
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::insert_lead(conn, &row))
            .await?)
    }

    pub async fn record_booking(&self, row: BookingRow) -> Result<i64> {
        check_count("leads count", row.leads_count)?;
        check_count("appointments count", row.appointments_count)?;
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::insert_booking(conn, &row))
            .await?)
    }

    pub async fn record_close(&self, row: CloseRow) -> Result<i64> {
        check_count("presented count", row.presented_count)?;
        check_count("signed count", row.signed_count)?;
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::insert_close(conn, &row))
            .await?)
    }

    pub async fn record_contract(&self, row: ContractRow) -> Result<i64> {
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::insert_contract(conn, &row))
            .await?)
    }

    pub async fn delete_row(&self, family: DimensionFamily, row_id: i64) -> Result<()> {
        let found = self
            .db
            .writer()
            .call(move |conn| repository::delete_fact_row(conn, family, row_id))
            .await?;
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!("{family} row {row_id}")))
        }
    }

    pub async fn record_finance(&self, row: MonthlyFinanceRow) -> Result<()> {
        self.db
            .writer()
            .call(move |conn| repository::upsert_finance(conn, &row))
            .await?;
        Ok(())
    }

    pub async fn record_invoice(&self, row: ReceivableRow) -> Result<()> {
        self.db
            .writer()
            .call(move |conn| repository::upsert_invoice(conn, &row))
            .await?;
        Ok(())
    }

    pub async fn mark_invoice_paid(&self, invoice_id: &str) -> Result<()> {
        let found = self
            .db
            .writer()
            .call({
                let id = invoice_id.to_string();
                move |conn| repository::mark_invoice_paid(conn, &id)
            })
            .await?;
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!("invoice '{invoice_id}'")))
        }
    }

    pub async fn set_goal(&self, goal: Goal) -> Result<()> {
        if !goal.daily_target.is_finite() || goal.daily_target < 0.0 {
            return Err(Error::InvalidInput(format!(
                "daily target must be a non-negative number, got {}",
                goal.daily_target
            )));
        }
        self.db
            .writer()
            .call(move |conn| repository::set_goal(conn, &goal))
            .await?;
        Ok(())
    }

    pub async fn delete_goal(&self, metric: GoalMetric) -> Result<()> {
        let found = self
            .db
            .writer()
            .call(move |conn| repository::delete_goal(conn, metric))
            .await?;
        if found {
            Ok(())
        } else {
            Err(Error::NotFound(format!("goal {}", metric.as_str())))
        }
    }

    pub async fn goals(&self) -> Result<Vec<Goal>> {
        Ok(self.db.reader().call(|conn| repository::list_goals(conn)).await?)
    }

    // ── Selection ──────────────────────────────────────────────────

    /// The persisted selection for every family.
    pub async fn selection(&self) -> Result<SelectionState> {
        Ok(self.db.reader().call(|conn| repository::load_selection_state(conn)).await?)
    }

    pub async fn set_selection(&self, family: DimensionFamily, selection: Selection) -> Result<()> {
        self.db
            .writer()
            .call(move |conn| repository::save_selection(conn, family, &selection))
            .await?;
        Ok(())
    }

    // ── Config ─────────────────────────────────────────────────────

    /// `billing_on_time` from config. An unparseable value is logged and
    /// treated as unset.
    pub async fn billing_on_time(&self) -> Result<Option<f64>> {
        let raw = self.config_get(BILLING_ON_TIME_KEY).await?;
        Ok(raw.and_then(|s| match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                log::warn!("ignoring invalid {BILLING_ON_TIME_KEY} value '{s}'");
                None
            }
        }))
    }

    /// The configured default range, or the 30-day preset.
    pub async fn default_range(&self, today: NaiveDate) -> Result<DateRange> {
        match self.config_get(DEFAULT_RANGE_KEY).await? {
            Some(s) => DateRange::parse(&s, today),
            None => Ok(DateRange::preset(Preset::Last30, today)),
        }
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Set a config value. Known keys are validated before they are stored.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        validate_config(key, value)?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Row counts for the warehouse tables.
    pub async fn status(&self) -> Result<Vec<(&'static str, i64)>> {
        Ok(self.db.reader().call(|conn| schema::table_counts(conn)).await?)
    }
}

fn validate_config(key: &str, value: &str) -> Result<()> {
    match key {
        BILLING_ON_TIME_KEY => match value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(()),
            _ => Err(Error::Config(format!("{key} must be a number, got '{value}'"))),
        },
        DEFAULT_RANGE_KEY => {
            DateRange::parse(value, chrono::Local::now().date_naive())
                .map(|_| ())
                .map_err(|e| Error::Config(e.to_string()))
        }
        _ if DimensionFamily::ALL.iter().any(|f| f.selection_key() == key) => {
            serde_json::from_str::<Vec<String>>(value)
                .map(|_| ())
                .map_err(|e| Error::Config(format!("{key} must be a JSON array of ids: {e}")))
        }
        _ => Ok(()),
    }
}

fn check_count(what: &str, n: u64) -> Result<()> {
    if i64::try_from(n).is_err() {
        return Err(Error::InvalidInput(format!("{what} {n} is too large to store")));
    }
    Ok(())
}
