use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::dimension::DimensionFamily;

/// All schema migrations, oldest first.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))])
}

/// Where a family's daily facts live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactTable {
    pub table: &'static str,
    /// Column holding the dimension option id.
    pub dimension_column: &'static str,
    /// Measure columns, in row-struct field order.
    pub value_columns: &'static str,
}

pub fn fact_table(family: DimensionFamily) -> FactTable {
    match family {
        DimensionFamily::LeadSource => FactTable {
            table: "fact_daily_leads",
            dimension_column: "source_id",
            value_columns: "lead_count",
        },
        DimensionFamily::Csr => FactTable {
            table: "fact_daily_bookings",
            dimension_column: "csr_id",
            value_columns: "leads_count, appointments_count",
        },
        DimensionFamily::SalesRep => FactTable {
            table: "fact_daily_closes",
            dimension_column: "rep_id",
            value_columns: "presented_count, signed_count",
        },
        DimensionFamily::Service => FactTable {
            table: "fact_daily_contracts",
            dimension_column: "service_id",
            value_columns: "amount",
        },
    }
}

/// Tables reported by `status`.
pub const STATUS_TABLES: [&str; 8] = [
    "dim_options",
    "fact_daily_leads",
    "fact_daily_bookings",
    "fact_daily_closes",
    "fact_daily_contracts",
    "fact_monthly_finance",
    "fact_ar_invoices",
    "goals",
];

/// Row count per status table.
pub fn table_counts(conn: &Connection) -> Result<Vec<(&'static str, i64)>, rusqlite::Error> {
    STATUS_TABLES
        .iter()
        .map(|table| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok((*table, count))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_validate() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_fact_tables_are_distinct() {
        let tables: std::collections::HashSet<&str> = DimensionFamily::ALL
            .into_iter()
            .map(|f| fact_table(f).table)
            .collect();
        assert_eq!(tables.len(), 4);
    }
}
