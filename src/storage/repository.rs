use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::date_util::{date_key, month_key, parse_month_key, DATE_KEY_FORMAT};
use crate::dimension::{Catalogs, DimensionFamily, DimensionOption};
use crate::filter::{Selection, SelectionState};
use crate::rows::{
    BookingRow, CloseRow, ContractRow, Goal, GoalMetric, LeadRow, MonthlyFinanceRow,
    ReceivableRow,
};
use crate::storage::schema::fact_table;

// ── Dimension Options ──────────────────────────────────────────────

/// Options for one family in display order. Inactive options are hidden
/// unless `include_inactive` is set.
pub fn list_options(
    conn: &Connection,
    family: DimensionFamily,
    include_inactive: bool,
) -> Result<Vec<DimensionOption>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT option_id, name, color FROM dim_options
         WHERE family = ?1 AND (active = 1 OR ?2)
         ORDER BY sort_order, option_id",
    )?;
    let rows = stmt.query_map(params![family.as_str(), include_inactive], |row| {
        Ok(DimensionOption {
            id: row.get(0)?,
            display_name: row.get(1)?,
            color_hint: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Active options for every family.
pub fn load_catalogs(conn: &Connection) -> Result<Catalogs, rusqlite::Error> {
    let mut catalogs = Catalogs::default();
    for family in DimensionFamily::ALL {
        catalogs.set(family, list_options(conn, family, false)?);
    }
    Ok(catalogs)
}

/// Insert an option at the end of its family, or update name/color and
/// reactivate it if the id already exists. Existing options keep their
/// position.
pub fn upsert_option(
    conn: &Connection,
    family: DimensionFamily,
    option: &DimensionOption,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_options (family, option_id, name, color, active, sort_order, created_at)
         VALUES (?1, ?2, ?3, ?4, 1,
                 (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM dim_options WHERE family = ?1),
                 datetime('now'))
         ON CONFLICT(family, option_id) DO UPDATE SET
           name = excluded.name, color = excluded.color, active = 1",
        params![
            family.as_str(),
            option.id,
            option.display_name,
            option.color_hint
        ],
    )?;
    Ok(())
}

/// Returns false if the option does not exist.
pub fn set_option_active(
    conn: &Connection,
    family: DimensionFamily,
    option_id: &str,
    active: bool,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE dim_options SET active = ?3 WHERE family = ?1 AND option_id = ?2",
        params![family.as_str(), option_id, active],
    )?;
    Ok(count > 0)
}

/// Delete an option from the catalog. Fact rows referencing it are kept and
/// become orphans.
pub fn remove_option(
    conn: &Connection,
    family: DimensionFamily,
    option_id: &str,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM dim_options WHERE family = ?1 AND option_id = ?2",
        params![family.as_str(), option_id],
    )?;
    Ok(count > 0)
}

// ── Daily Facts ────────────────────────────────────────────────────

/// Counts are stored as SQLite INTEGER, so anything above `i64::MAX` is refused.
fn count_param(n: u64) -> Result<i64, rusqlite::Error> {
    i64::try_from(n).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub fn insert_lead(conn: &Connection, row: &LeadRow) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_daily_leads (date_key, source_id, lead_count, recorded_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![date_key(row.date), row.dimension_id, count_param(row.count)?],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_booking(conn: &Connection, row: &BookingRow) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_daily_bookings (
            date_key, csr_id, leads_count, appointments_count, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![
            date_key(row.date),
            row.dimension_id,
            count_param(row.leads_count)?,
            count_param(row.appointments_count)?
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_close(conn: &Connection, row: &CloseRow) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_daily_closes (
            date_key, rep_id, presented_count, signed_count, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![
            date_key(row.date),
            row.dimension_id,
            count_param(row.presented_count)?,
            count_param(row.signed_count)?
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_contract(conn: &Connection, row: &ContractRow) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_daily_contracts (date_key, service_id, amount, recorded_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![date_key(row.date), row.dimension_id, row.amount.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete one fact row by id. Returns false if no such row.
pub fn delete_fact_row(
    conn: &Connection,
    family: DimensionFamily,
    row_id: i64,
) -> Result<bool, rusqlite::Error> {
    let table = fact_table(family).table;
    let count = conn.execute(
        &format!("DELETE FROM {table} WHERE row_id = ?1"),
        params![row_id],
    )?;
    Ok(count > 0)
}

// ── Monthly Finance ────────────────────────────────────────────────

pub fn upsert_finance(conn: &Connection, row: &MonthlyFinanceRow) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_monthly_finance (
            month_key, revenue, gross_profit_pct, net_profit_pct, updated_at
        ) VALUES (?1, ?2, ?3, ?4, datetime('now'))
        ON CONFLICT(month_key) DO UPDATE SET
            revenue = excluded.revenue, gross_profit_pct = excluded.gross_profit_pct,
            net_profit_pct = excluded.net_profit_pct, updated_at = excluded.updated_at",
        params![
            month_key(row.month),
            row.revenue.to_string(),
            row.gross_profit_pct,
            row.net_profit_pct
        ],
    )?;
    Ok(())
}

/// All finance records, oldest month first.
pub fn list_finance(conn: &Connection) -> Result<Vec<MonthlyFinanceRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT month_key, revenue, gross_profit_pct, net_profit_pct
         FROM fact_monthly_finance ORDER BY month_key",
    )?;
    let rows = stmt.query_map([], |row| {
        let key: String = row.get(0)?;
        let month = parse_month_key(&key)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        Ok(MonthlyFinanceRow {
            month,
            revenue: read_decimal(row, 1)?,
            gross_profit_pct: row.get(2)?,
            net_profit_pct: row.get(3)?,
        })
    })?;
    rows.collect()
}

// ── Receivables ────────────────────────────────────────────────────

pub fn upsert_invoice(conn: &Connection, row: &ReceivableRow) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_ar_invoices (invoice_id, due_date, amount, is_paid, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(invoice_id) DO UPDATE SET
           due_date = excluded.due_date, amount = excluded.amount,
           is_paid = excluded.is_paid, updated_at = excluded.updated_at",
        params![
            row.invoice_id,
            date_key(row.due_date),
            row.amount.to_string(),
            row.paid
        ],
    )?;
    Ok(())
}

/// Returns false if the invoice does not exist.
pub fn mark_invoice_paid(conn: &Connection, invoice_id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE fact_ar_invoices SET is_paid = 1, updated_at = datetime('now')
         WHERE invoice_id = ?1",
        params![invoice_id],
    )?;
    Ok(count > 0)
}

pub fn list_invoices(
    conn: &Connection,
    include_paid: bool,
) -> Result<Vec<ReceivableRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT invoice_id, due_date, amount, is_paid FROM fact_ar_invoices
         WHERE is_paid = 0 OR ?1
         ORDER BY due_date, invoice_id",
    )?;
    let rows = stmt.query_map(params![include_paid], |row| {
        Ok(ReceivableRow {
            invoice_id: row.get(0)?,
            due_date: read_date(row, 1)?,
            amount: read_decimal(row, 2)?,
            paid: row.get(3)?,
        })
    })?;
    rows.collect()
}

// ── Goals ──────────────────────────────────────────────────────────

pub fn set_goal(conn: &Connection, goal: &Goal) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO goals (metric, daily_target, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![goal.metric.as_str(), goal.daily_target],
    )?;
    Ok(())
}

pub fn delete_goal(conn: &Connection, metric: GoalMetric) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM goals WHERE metric = ?1", params![metric.as_str()])?;
    Ok(count > 0)
}

/// Goals in a fixed metric order. Rows with an unknown metric are skipped.
pub fn list_goals(conn: &Connection) -> Result<Vec<Goal>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT metric, daily_target FROM goals")?;
    let rows = stmt.query_map([], |row| {
        let metric: String = row.get(0)?;
        let daily_target: f64 = row.get(1)?;
        Ok((metric, daily_target))
    })?;

    let mut goals = Vec::new();
    for row in rows {
        let (metric, daily_target) = row?;
        match GoalMetric::parse(&metric) {
            Some(metric) => goals.push(Goal {
                metric,
                daily_target,
            }),
            None => log::warn!("ignoring goal with unknown metric '{metric}'"),
        }
    }
    goals.sort_by_key(|g| g.metric);
    Ok(goals)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(count > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Persisted Selection ────────────────────────────────────────────

/// The last saved selection for a family. A missing key means `All`; a value
/// that is not a JSON array of strings is logged and also treated as `All`.
pub fn load_selection(
    conn: &Connection,
    family: DimensionFamily,
) -> Result<Selection, rusqlite::Error> {
    let key = family.selection_key();
    let Some(raw) = get_config(conn, key)? else {
        return Ok(Selection::All);
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(ids) => Ok(Selection::from_persisted(Some(ids))),
        Err(e) => {
            log::warn!("ignoring malformed selection in {key}: {e}");
            Ok(Selection::All)
        }
    }
}

pub fn save_selection(
    conn: &Connection,
    family: DimensionFamily,
    selection: &Selection,
) -> Result<(), rusqlite::Error> {
    let key = family.selection_key();
    match selection.to_persisted() {
        None => {
            delete_config(conn, key)?;
        }
        Some(ids) => {
            let json = serde_json::to_string(&ids)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            set_config(conn, key, &json)?;
        }
    }
    Ok(())
}

pub fn load_selection_state(conn: &Connection) -> Result<SelectionState, rusqlite::Error> {
    let mut state = SelectionState::default();
    for family in DimensionFamily::ALL {
        state.set(family, load_selection(conn, family)?);
    }
    Ok(state)
}

// ── Helpers ────────────────────────────────────────────────────────

/// Read a `YYYY-MM-DD` text column.
pub(crate) fn read_date(row: &Row<'_>, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_KEY_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a decimal stored as text. NULL reads as zero.
pub(crate) fn read_decimal(row: &Row<'_>, idx: usize) -> Result<Decimal, rusqlite::Error> {
    let s: Option<String> = row.get(idx)?;
    match s {
        None => Ok(Decimal::ZERO),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "billing_on_time", "0.93")?;
                let val = get_config(conn, "billing_on_time")?;
                assert_eq!(val, Some("0.93".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);

                assert!(delete_config(conn, "billing_on_time")?);
                assert!(!delete_config(conn, "billing_on_time")?);
                assert!(list_config(conn)?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_option_crud_and_order() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let family = DimensionFamily::LeadSource;
                upsert_option(conn, family, &DimensionOption::new("website", "Website", "#0f0"))?;
                upsert_option(conn, family, &DimensionOption::new("angi", "Angi", "#f00"))?;
                upsert_option(conn, DimensionFamily::Csr, &DimensionOption::new("csr-a", "Ana", ""))?;

                let ids: Vec<String> =
                    list_options(conn, family, false)?.into_iter().map(|o| o.id).collect();
                assert_eq!(ids, vec!["website", "angi"]);

                // Renaming keeps the position.
                upsert_option(conn, family, &DimensionOption::new("website", "Web", "#0f0"))?;
                let opts = list_options(conn, family, false)?;
                assert_eq!(opts[0].display_name, "Web");

                assert!(set_option_active(conn, family, "website", false)?);
                assert_eq!(list_options(conn, family, false)?.len(), 1);
                assert_eq!(list_options(conn, family, true)?.len(), 2);
                assert!(!set_option_active(conn, family, "missing", false)?);

                assert!(remove_option(conn, family, "angi")?);
                assert!(!remove_option(conn, family, "angi")?);
                assert!(list_options(conn, family, false)?.is_empty());

                let catalogs = load_catalogs(conn)?;
                assert_eq!(catalogs.csrs.len(), 1);
                assert!(catalogs.lead_sources.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_finance_upsert_and_list() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut row = MonthlyFinanceRow {
                    month: d("2025-09-01"),
                    revenue: dec!(125000.50),
                    gross_profit_pct: 0.46,
                    net_profit_pct: 0.15,
                };
                upsert_finance(conn, &row)?;
                row.gross_profit_pct = 0.48;
                upsert_finance(conn, &row)?;
                upsert_finance(
                    conn,
                    &MonthlyFinanceRow {
                        month: d("2025-08-01"),
                        revenue: dec!(100000),
                        gross_profit_pct: 0.42,
                        net_profit_pct: 0.12,
                    },
                )?;

                let rows = list_finance(conn)?;
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].month, d("2025-08-01"));
                assert_eq!(rows[1].gross_profit_pct, 0.48);
                assert_eq!(rows[1].revenue, dec!(125000.50));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invoices() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                for (id, due) in [("inv-2", "2025-09-15"), ("inv-1", "2025-08-01")] {
                    upsert_invoice(
                        conn,
                        &ReceivableRow {
                            invoice_id: id.into(),
                            due_date: d(due),
                            amount: dec!(250.00),
                            paid: false,
                        },
                    )?;
                }
                assert!(mark_invoice_paid(conn, "inv-2")?);
                assert!(!mark_invoice_paid(conn, "inv-9")?);

                let open = list_invoices(conn, false)?;
                assert_eq!(open.len(), 1);
                assert_eq!(open[0].invoice_id, "inv-1");
                assert_eq!(open[0].amount, dec!(250));

                let all = list_invoices(conn, true)?;
                assert_eq!(all.len(), 2);
                assert!(all[1].paid);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_goals() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_goal(
                    conn,
                    &Goal {
                        metric: GoalMetric::Revenue,
                        daily_target: 5000.0,
                    },
                )?;
                set_goal(
                    conn,
                    &Goal {
                        metric: GoalMetric::Leads,
                        daily_target: 3.0,
                    },
                )?;
                set_goal(
                    conn,
                    &Goal {
                        metric: GoalMetric::Leads,
                        daily_target: 4.0,
                    },
                )?;
                conn.execute(
                    "INSERT INTO goals (metric, daily_target, updated_at) VALUES ('bogus', 1, '')",
                    [],
                )?;

                let goals = list_goals(conn)?;
                assert_eq!(goals.len(), 2);
                assert_eq!(goals[0].metric, GoalMetric::Leads);
                assert_eq!(goals[0].daily_target, 4.0);

                assert!(delete_goal(conn, GoalMetric::Revenue)?);
                assert_eq!(list_goals(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_selection_persistence() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let family = DimensionFamily::Service;
                assert_eq!(load_selection(conn, family)?, Selection::All);

                let sel = Selection::only(["roofing", "siding"]);
                save_selection(conn, family, &sel)?;
                assert_eq!(load_selection(conn, family)?, sel);
                assert_eq!(
                    get_config(conn, "dcl_services")?.as_deref(),
                    Some(r#"["roofing","siding"]"#)
                );

                save_selection(conn, family, &Selection::none())?;
                assert_eq!(load_selection(conn, family)?, Selection::none());

                save_selection(conn, family, &Selection::All)?;
                assert_eq!(get_config(conn, "dcl_services")?, None);

                set_config(conn, "dcl_csrs", "not json")?;
                assert_eq!(load_selection(conn, DimensionFamily::Csr)?, Selection::All);

                let state = load_selection_state(conn)?;
                assert!(state.services.is_all());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_fact_row() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let id = insert_contract(
                    conn,
                    &ContractRow {
                        date: d("2025-09-03"),
                        dimension_id: "roofing".into(),
                        amount: dec!(12000),
                    },
                )?;
                assert!(!delete_fact_row(conn, DimensionFamily::LeadSource, id)?);
                assert!(delete_fact_row(conn, DimensionFamily::Service, id)?);
                assert!(!delete_fact_row(conn, DimensionFamily::Service, id)?);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_refuses_counts_above_i64_max() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let huge = LeadRow {
                    date: d("2025-09-03"),
                    dimension_id: "angi".into(),
                    count: u64::MAX,
                };
                assert!(matches!(
                    insert_lead(conn, &huge),
                    Err(rusqlite::Error::ToSqlConversionFailure(_))
                ));
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM fact_daily_leads", [], |r| r.get(0))?;
                assert_eq!(count, 0);

                let max = LeadRow {
                    count: i64::MAX as u64,
                    ..huge
                };
                insert_lead(conn, &max)?;
                let stored: i64 =
                    conn.query_row("SELECT lead_count FROM fact_daily_leads", [], |r| r.get(0))?;
                assert_eq!(stored, i64::MAX);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
