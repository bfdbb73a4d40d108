use rusqlite::types::ToSql;
use rusqlite::Row;
use serde::Serialize;

use crate::date_util::date_key;
use crate::dimension::DimensionFamily;
use crate::error::{Error, Result};
use crate::filter::Selection;
use crate::query::range::DateRange;
use crate::rows::{BookingRow, CloseRow, ContractRow, FactRow, LeadRow};
use crate::storage::repository::{read_date, read_decimal};
use crate::storage::schema::fact_table;
use crate::storage::Database;

/// A daily fact row type that can be read back from its table.
pub trait StoredFact: FactRow + Serialize + Sized + Send + 'static {
    const FAMILY: DimensionFamily;
    const CSV_HEADER: &'static str;

    /// Build from a row laid out as `row_id, date_key, dimension, values...`.
    fn from_sql_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error>;

    /// Measure columns formatted for CSV.
    fn csv_values(&self) -> String;

    /// One-line human summary of the measures.
    fn describe(&self) -> String;
}

/// A fact row plus its storage id, for listing and deletion.
#[derive(Debug, Clone, Serialize)]
pub struct Recorded<T> {
    pub row_id: i64,
    #[serde(flatten)]
    pub row: T,
}

/// NULL or negative counts read as zero.
fn read_count(row: &Row<'_>, idx: usize) -> std::result::Result<u64, rusqlite::Error> {
    let n: Option<i64> = row.get(idx)?;
    Ok(n.unwrap_or(0).max(0) as u64)
}

impl StoredFact for LeadRow {
    const FAMILY: DimensionFamily = DimensionFamily::LeadSource;
    const CSV_HEADER: &'static str = "row_id,date,lead_source,count";

    fn from_sql_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(LeadRow {
            date: read_date(row, 1)?,
            dimension_id: row.get(2)?,
            count: read_count(row, 3)?,
        })
    }

    fn csv_values(&self) -> String {
        self.count.to_string()
    }

    fn describe(&self) -> String {
        format!("{} leads", self.count)
    }
}

impl StoredFact for BookingRow {
    const FAMILY: DimensionFamily = DimensionFamily::Csr;
    const CSV_HEADER: &'static str = "row_id,date,csr,leads,appointments";

    fn from_sql_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(BookingRow {
            date: read_date(row, 1)?,
            dimension_id: row.get(2)?,
            leads_count: read_count(row, 3)?,
            appointments_count: read_count(row, 4)?,
        })
    }

    fn csv_values(&self) -> String {
        format!("{},{}", self.leads_count, self.appointments_count)
    }

    fn describe(&self) -> String {
        format!(
            "{} appointments from {} leads",
            self.appointments_count, self.leads_count
        )
    }
}

impl StoredFact for CloseRow {
    const FAMILY: DimensionFamily = DimensionFamily::SalesRep;
    const CSV_HEADER: &'static str = "row_id,date,sales_rep,presented,signed";

    fn from_sql_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(CloseRow {
            date: read_date(row, 1)?,
            dimension_id: row.get(2)?,
            presented_count: read_count(row, 3)?,
            signed_count: read_count(row, 4)?,
        })
    }

    fn csv_values(&self) -> String {
        format!("{},{}", self.presented_count, self.signed_count)
    }

    fn describe(&self) -> String {
        format!(
            "{} signed of {} presented",
            self.signed_count, self.presented_count
        )
    }
}

impl StoredFact for ContractRow {
    const FAMILY: DimensionFamily = DimensionFamily::Service;
    const CSV_HEADER: &'static str = "row_id,date,service,amount";

    fn from_sql_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(ContractRow {
            date: read_date(row, 1)?,
            dimension_id: row.get(2)?,
            amount: read_decimal(row, 3)?,
        })
    }

    fn csv_values(&self) -> String {
        self.amount.to_string()
    }

    fn describe(&self) -> String {
        format!("${:.2}", self.amount)
    }
}

/// Builder for reading daily fact rows with optional filters.
///
/// Date bounds are inclusive `YYYY-MM-DD` keys. The dimension filter mirrors
/// [`Selection`]: `None` means every id, an empty list matches nothing.
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    since: Option<String>,
    until: Option<String>,
    dimension_ids: Option<Vec<String>>,
    limit: Option<u32>,
    order_desc: bool,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, date: &str) -> Self {
        self.since = Some(date.to_string());
        self
    }

    pub fn until(mut self, date: &str) -> Self {
        self.until = Some(date.to_string());
        self
    }

    /// Bound both ends to a date range.
    pub fn range(mut self, range: &DateRange) -> Self {
        self.since = Some(date_key(range.start));
        self.until = Some(date_key(range.end));
        self
    }

    pub fn dimensions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimension_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn selection(mut self, selection: &Selection) -> Self {
        self.dimension_ids = selection.to_persisted();
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    pub async fn leads(self, db: &Database) -> Result<Vec<LeadRow>> {
        self.rows(db).await
    }

    pub async fn bookings(self, db: &Database) -> Result<Vec<BookingRow>> {
        self.rows(db).await
    }

    pub async fn closes(self, db: &Database) -> Result<Vec<CloseRow>> {
        self.rows(db).await
    }

    pub async fn contracts(self, db: &Database) -> Result<Vec<ContractRow>> {
        self.rows(db).await
    }

    /// Build and execute the query, returning bare rows.
    pub async fn rows<T: StoredFact>(self, db: &Database) -> Result<Vec<T>> {
        Ok(self
            .records::<T>(db)
            .await?
            .into_iter()
            .map(|r| r.row)
            .collect())
    }

    /// Build and execute the query, returning rows with their storage ids.
    pub async fn records<T: StoredFact>(self, db: &Database) -> Result<Vec<Recorded<T>>> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql(T::FAMILY);
                let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), |row| {
                    Ok(Recorded {
                        row_id: row.get(0)?,
                        row: T::from_sql_row(row)?,
                    })
                })?;
                let result: std::result::Result<Vec<Recorded<T>>, _> = rows.collect();
                result
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning a count of matching rows.
    pub async fn count(self, family: DimensionFamily, db: &Database) -> Result<u64> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (inner_sql, params) = builder.build_sql(family);
                let sql = format!("SELECT COUNT(*) FROM ({inner_sql})");
                let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
                Ok::<u64, rusqlite::Error>(count as u64)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning results as JSON.
    pub async fn to_json(self, family: DimensionFamily, db: &Database) -> Result<String> {
        let json = match family {
            DimensionFamily::LeadSource => {
                serde_json::to_string_pretty(&self.records::<LeadRow>(db).await?)?
            }
            DimensionFamily::Csr => {
                serde_json::to_string_pretty(&self.records::<BookingRow>(db).await?)?
            }
            DimensionFamily::SalesRep => {
                serde_json::to_string_pretty(&self.records::<CloseRow>(db).await?)?
            }
            DimensionFamily::Service => {
                serde_json::to_string_pretty(&self.records::<ContractRow>(db).await?)?
            }
        };
        Ok(json)
    }

    /// Build and execute the query, returning results as CSV.
    pub async fn to_csv(self, family: DimensionFamily, db: &Database) -> Result<String> {
        let csv = match family {
            DimensionFamily::LeadSource => render_csv(&self.records::<LeadRow>(db).await?),
            DimensionFamily::Csr => render_csv(&self.records::<BookingRow>(db).await?),
            DimensionFamily::SalesRep => render_csv(&self.records::<CloseRow>(db).await?),
            DimensionFamily::Service => render_csv(&self.records::<ContractRow>(db).await?),
        };
        Ok(csv)
    }

    fn build_sql(&self, family: DimensionFamily) -> (String, Vec<Box<dyn ToSql>>) {
        let table = fact_table(family);
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        let mut sql = format!(
            "SELECT row_id, date_key, {}, {} FROM {}",
            table.dimension_column, table.value_columns, table.table
        );

        if let Some(ref date) = self.since {
            wheres.push(format!("date_key >= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }
        if let Some(ref date) = self.until {
            wheres.push(format!("date_key <= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }

        if let Some(ref ids) = self.dimension_ids {
            if ids.is_empty() {
                wheres.push("1 = 0".to_string());
            } else {
                let mut placeholders = Vec::with_capacity(ids.len());
                for id in ids {
                    placeholders.push(format!("?{param_idx}"));
                    params.push(Box::new(id.clone()));
                    param_idx += 1;
                }
                wheres.push(format!(
                    "{} IN ({})",
                    table.dimension_column,
                    placeholders.join(", ")
                ));
            }
        }

        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }

        let order_dir = if self.order_desc { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY date_key {order_dir}, row_id {order_dir}"));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT ?{param_idx}"));
            params.push(Box::new(limit));
        }

        (sql, params)
    }
}

fn render_csv<T: StoredFact>(records: &[Recorded<T>]) -> String {
    let mut out = String::new();
    out.push_str(T::CSV_HEADER);
    out.push('\n');
    for r in records {
        out.push_str(&format!(
            "{},{},{},{}\n",
            r.row_id,
            date_key(r.row.date()),
            csv_escape(r.row.dimension_id()),
            r.row.csv_values(),
        ));
    }
    out
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
