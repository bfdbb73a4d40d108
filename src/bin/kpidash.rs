use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use kpidash::{
    BookingRow, CloseRow, ContractRow, Dashboard, DateRange, DimensionFamily, DimensionOption,
    FactRow, Goal, GoalMetric, LeadRow, MonthlyFinanceRow, ReceivableRow, RowQuery, Segment,
    Selection, StoredFact,
};

#[derive(Parser)]
#[command(name = "kpidash", about = "KPI dashboard warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.kpidash/kpidash.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the dashboard KPIs, breakdowns, goals and AR aging
    Report {
        /// Range: 7d, 30d, 90d, YYYY-MM or YYYY-MM-DD..YYYY-MM-DD
        #[arg(long)]
        range: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the segmented breakdown for one dimension family
    Segments {
        /// lead-source, csr, sales-rep or service
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        #[arg(long)]
        range: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List raw daily rows for one dimension family
    Rows {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        /// Range shorthand; overrides --since/--until
        #[arg(long)]
        range: Option<String>,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
        /// Only these dimension ids (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,
        /// Maximum rows
        #[arg(long, default_value = "100")]
        limit: u32,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        csv: bool,
        /// Print only the number of matching rows
        #[arg(long)]
        count: bool,
    },
    /// Manage dimension catalogs
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Record facts, finance, invoices and goals
    Record {
        #[command(subcommand)]
        target: RecordTarget,
    },
    /// Manage the persisted dimension selection
    Select {
        #[command(subcommand)]
        action: SelectAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List options for a family
    List {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        /// Include deactivated options
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Add an option, or rename and reactivate an existing one
    Add {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        id: String,
        name: String,
        /// Display color, e.g. #1f77b4
        #[arg(long, default_value = "")]
        color: String,
    },
    /// Hide an option without deleting it
    Deactivate {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        id: String,
    },
    /// Delete an option. Rows that reference it are kept.
    Remove {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        id: String,
    },
}

#[derive(Subcommand)]
enum RecordTarget {
    /// Qualified leads for a lead source on a day
    Lead {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        source: String,
        count: u64,
    },
    /// Leads handled and appointments booked by a CSR on a day
    Booking {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        csr: String,
        leads: u64,
        appointments: u64,
    },
    /// Presentations and signed contracts for a sales rep on a day
    Close {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        rep: String,
        presented: u64,
        signed: u64,
    },
    /// A signed contract for a service
    Contract {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        service: String,
        #[arg(value_parser = parse_amount)]
        amount: Decimal,
    },
    /// Monthly revenue and profit percentages (fractions, e.g. 0.46)
    Finance {
        /// Month (YYYY-MM)
        #[arg(value_parser = parse_month)]
        month: NaiveDate,
        #[arg(value_parser = parse_amount)]
        revenue: Decimal,
        gross_profit_pct: f64,
        net_profit_pct: f64,
    },
    /// An invoice for AR aging
    Invoice {
        id: String,
        #[arg(value_parser = parse_date)]
        due: NaiveDate,
        #[arg(value_parser = parse_amount)]
        amount: Decimal,
        #[arg(long)]
        paid: bool,
    },
    /// Mark an invoice as paid
    Paid { id: String },
    /// Daily target for a goal metric: leads, appointments, closes, revenue
    Goal {
        #[arg(value_parser = parse_goal_metric)]
        metric: GoalMetric,
        #[arg(required_unless_present = "clear")]
        daily_target: Option<f64>,
        /// Remove the goal instead of setting it
        #[arg(long, conflicts_with = "daily_target")]
        clear: bool,
    },
    /// Delete a daily row by id (see `kpidash rows`)
    Delete {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        row_id: i64,
    },
}

#[derive(Subcommand)]
enum SelectAction {
    /// Show the persisted selection for every family
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Select exactly these ids. No ids selects nothing.
    Set {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
        ids: Vec<String>,
    },
    /// Select every id of a family
    All {
        #[arg(value_parser = parse_family)]
        family: DimensionFamily,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_family(s: &str) -> Result<DimensionFamily, String> {
    DimensionFamily::parse(s).map_err(|e| e.to_string())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    kpidash::date_util::parse_date_key(s).map_err(|e| e.to_string())
}

fn parse_month(s: &str) -> Result<NaiveDate, String> {
    kpidash::date_util::parse_month_key(s).map_err(|e| e.to_string())
}

fn parse_amount(s: &str) -> Result<Decimal, String> {
    s.trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse::<Decimal>()
        .map_err(|e| format!("invalid amount '{s}': {e}"))
}

fn parse_goal_metric(s: &str) -> Result<GoalMetric, String> {
    GoalMetric::parse(s).ok_or_else(|| {
        format!("unknown goal metric '{s}' (use leads, appointments, closes or revenue)")
    })
}

async fn resolve_range(dash: &Dashboard, range: Option<&str>) -> anyhow::Result<DateRange> {
    let today = chrono::Local::now().date_naive();
    Ok(match range {
        Some(s) => DateRange::parse(s, today)?,
        None => dash.default_range(today).await?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => kpidash::Database::open_at(path).await?,
        None => kpidash::Database::open().await?,
    };
    let dash = Dashboard::new(db);

    match cli.command {
        Commands::Report { range, json } => {
            let range = resolve_range(&dash, range.as_deref()).await?;
            let report = dash.report(&range, None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let catalogs = dash.catalogs().await?;
                print_report(&report, &catalogs);
            }
        }
        Commands::Segments {
            family,
            range,
            json,
        } => {
            let range = resolve_range(&dash, range.as_deref()).await?;
            let segments = dash.segments(family, &range).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&segments)?);
            } else {
                let catalogs = dash.catalogs().await?;
                println!("{family} breakdown ({range})");
                print_segments(&segments, catalogs.get(family));
            }
        }
        Commands::Rows {
            family,
            range,
            since,
            until,
            ids,
            limit,
            json,
            csv,
            count,
        } => {
            let mut builder = RowQuery::new().limit(limit).descending();
            if let Some(r) = range {
                builder = builder.range(&resolve_range(&dash, Some(&r)).await?);
            } else {
                if let Some(d) = since {
                    builder = builder.since(&d);
                }
                if let Some(d) = until {
                    builder = builder.until(&d);
                }
            }
            if !ids.is_empty() {
                builder = builder.dimensions(ids);
            }
            handle_rows(&dash, builder, family, json, csv, count).await?;
        }
        Commands::Catalog { action } => {
            handle_catalog(&dash, action).await?;
        }
        Commands::Record { target } => {
            handle_record(&dash, target).await?;
        }
        Commands::Select { action } => {
            handle_select(&dash, action).await?;
        }
        Commands::Config { action } => {
            handle_config(&dash, action).await?;
        }
        Commands::Status => {
            print_status(&dash).await?;
        }
    }

    Ok(())
}

async fn handle_rows(
    dash: &Dashboard,
    builder: RowQuery,
    family: DimensionFamily,
    json: bool,
    csv: bool,
    count: bool,
) -> anyhow::Result<()> {
    let db = dash.db();
    if count {
        let n = builder.count(family, db).await?;
        println!("{n}");
    } else if json {
        let output = builder.to_json(family, db).await?;
        println!("{output}");
    } else if csv {
        let output = builder.to_csv(family, db).await?;
        print!("{output}");
    } else {
        match family {
            DimensionFamily::LeadSource => print_records(builder.records::<LeadRow>(db).await?),
            DimensionFamily::Csr => print_records(builder.records::<BookingRow>(db).await?),
            DimensionFamily::SalesRep => print_records(builder.records::<CloseRow>(db).await?),
            DimensionFamily::Service => print_records(builder.records::<ContractRow>(db).await?),
        }
    }
    Ok(())
}

fn print_records<T: StoredFact>(records: Vec<kpidash::Recorded<T>>) {
    if records.is_empty() {
        println!("No rows found.");
        return;
    }
    for r in &records {
        println!(
            "#{:<6} {} {:<20} {}",
            r.row_id,
            r.row.date(),
            r.row.dimension_id(),
            r.row.describe()
        );
    }
    println!("\n{} rows", records.len());
}

async fn handle_catalog(dash: &Dashboard, action: CatalogAction) -> anyhow::Result<()> {
    match action {
        CatalogAction::List { family, all, json } => {
            let options = dash.options(family, all).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&options)?);
            } else if options.is_empty() {
                println!("No {family} options.");
            } else {
                for o in &options {
                    let color = if o.color_hint.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", o.color_hint)
                    };
                    println!("  {:<20} {}{color}", o.id, o.display_name);
                }
            }
        }
        CatalogAction::Add {
            family,
            id,
            name,
            color,
        } => {
            dash.add_option(family, DimensionOption::new(&id, &name, &color))
                .await?;
            println!("Added {family} option {id}.");
        }
        CatalogAction::Deactivate { family, id } => {
            dash.deactivate_option(family, &id).await?;
            println!("Deactivated {family} option {id}.");
        }
        CatalogAction::Remove { family, id } => {
            dash.remove_option(family, &id).await?;
            println!("Removed {family} option {id}.");
        }
    }
    Ok(())
}

async fn handle_record(dash: &Dashboard, target: RecordTarget) -> anyhow::Result<()> {
    match target {
        RecordTarget::Lead {
            date,
            source,
            count,
        } => {
            let id = dash
                .record_lead(LeadRow {
                    date,
                    dimension_id: source,
                    count,
                })
                .await?;
            println!("Recorded lead row #{id}.");
        }
        RecordTarget::Booking {
            date,
            csr,
            leads,
            appointments,
        } => {
            let id = dash
                .record_booking(BookingRow {
                    date,
                    dimension_id: csr,
                    leads_count: leads,
                    appointments_count: appointments,
                })
                .await?;
            println!("Recorded booking row #{id}.");
        }
        RecordTarget::Close {
            date,
            rep,
            presented,
            signed,
        } => {
            let id = dash
                .record_close(CloseRow {
                    date,
                    dimension_id: rep,
                    presented_count: presented,
                    signed_count: signed,
                })
                .await?;
            println!("Recorded close row #{id}.");
        }
        RecordTarget::Contract {
            date,
            service,
            amount,
        } => {
            let id = dash
                .record_contract(ContractRow {
                    date,
                    dimension_id: service,
                    amount,
                })
                .await?;
            println!("Recorded contract row #{id}.");
        }
        RecordTarget::Finance {
            month,
            revenue,
            gross_profit_pct,
            net_profit_pct,
        } => {
            dash.record_finance(MonthlyFinanceRow {
                month,
                revenue,
                gross_profit_pct,
                net_profit_pct,
            })
            .await?;
            println!("Recorded finance for {}.", kpidash::date_util::month_key(month));
        }
        RecordTarget::Invoice {
            id,
            due,
            amount,
            paid,
        } => {
            dash.record_invoice(ReceivableRow {
                invoice_id: id.clone(),
                due_date: due,
                amount,
                paid,
            })
            .await?;
            println!("Recorded invoice {id}.");
        }
        RecordTarget::Paid { id } => {
            dash.mark_invoice_paid(&id).await?;
            println!("Invoice {id} marked paid.");
        }
        RecordTarget::Goal {
            metric,
            daily_target,
            clear,
        } => match daily_target {
            Some(daily_target) if !clear => {
                dash.set_goal(Goal {
                    metric,
                    daily_target,
                })
                .await?;
                println!("Goal for {} set to {daily_target}/day.", metric.as_str());
            }
            _ => {
                dash.delete_goal(metric).await?;
                println!("Goal for {} cleared.", metric.as_str());
            }
        },
        RecordTarget::Delete { family, row_id } => {
            dash.delete_row(family, row_id).await?;
            println!("Deleted {family} row #{row_id}.");
        }
    }
    Ok(())
}

async fn handle_select(dash: &Dashboard, action: SelectAction) -> anyhow::Result<()> {
    match action {
        SelectAction::Show { json } => {
            let state = dash.selection().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                for family in DimensionFamily::ALL {
                    let desc = match state.get(family) {
                        Selection::All => "all".to_string(),
                        Selection::Only(ids) if ids.is_empty() => "none".to_string(),
                        Selection::Only(ids) => {
                            ids.iter().cloned().collect::<Vec<_>>().join(", ")
                        }
                    };
                    println!("  {:<12} {desc}", family.as_str());
                }
            }
        }
        SelectAction::Set { family, ids } => {
            let n = ids.len();
            dash.set_selection(family, Selection::only(ids)).await?;
            println!("Selected {n} {family} option(s).");
        }
        SelectAction::All { family } => {
            dash.set_selection(family, Selection::All).await?;
            println!("Selected all {family} options.");
        }
    }
    Ok(())
}

async fn handle_config(dash: &Dashboard, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match dash.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            dash.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dash.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(dash: &Dashboard) -> anyhow::Result<()> {
    let counts = dash.status().await?;
    println!("Warehouse Status");
    for (table, count) in counts {
        println!("  {table:<22} {count}");
    }
    let range = dash.default_range(chrono::Local::now().date_naive()).await?;
    println!("  Default range:         {range}");
    Ok(())
}

fn print_report(report: &kpidash::DashboardReport, catalogs: &kpidash::Catalogs) {
    let k = &report.kpis;
    println!(
        "Dashboard: {} ({} to {}, {} days)",
        report.range_key, report.range.start, report.range.end, report.days
    );
    println!("  KPIs:");
    println!("    Qualified leads:    {}", k.qualified_leads_total);
    println!("    Booking rate:       {:.1}%", k.booking_rate * 100.0);
    println!("    Close rate:         {:.1}%", k.close_rate * 100.0);
    println!("    Avg contract value: ${:.2}", k.avg_contract_value);
    match &k.finance_month {
        Some(month) => {
            println!(
                "    Gross profit:       {:.1}% ({:+.1} pts MoM, {month})",
                k.gross_profit_pct * 100.0,
                k.gross_profit_mom * 100.0
            );
            println!(
                "    Net profit:         {:.1}% ({:+.1} pts MoM, {month})",
                k.net_profit_pct * 100.0,
                k.net_profit_mom * 100.0
            );
        }
        None => println!("    Profit:             no finance data"),
    }
    match k.billing_on_time {
        Some(v) => println!("    Billing on time:    {:.1}%", v * 100.0),
        None => println!("    Billing on time:    n/a"),
    }

    let s = &report.segments;
    for (title, segments, family) in [
        ("Leads by source", &s.leads_by_source, DimensionFamily::LeadSource),
        ("Appointments by CSR", &s.bookings_by_csr, DimensionFamily::Csr),
        ("Closes by rep", &s.closes_by_rep, DimensionFamily::SalesRep),
        ("Revenue by service", &s.contracts_by_service, DimensionFamily::Service),
    ] {
        println!("  {title}:");
        print_segments(segments, catalogs.get(family));
    }

    if !report.goals.is_empty() {
        println!("  Goals:");
        for g in &report.goals {
            println!(
                "    {:<13} {:>10.1} / {:<10.1} {:.0}%",
                g.metric.as_str(),
                g.actual,
                g.target,
                g.attainment * 100.0
            );
        }
    }

    let ar = &report.ar_aging;
    println!("  AR aging ({} open invoices):", ar.open_invoices);
    println!("    Current:  ${:.2}", ar.current);
    println!("    1-30:     ${:.2}", ar.days_1_30);
    println!("    31-60:    ${:.2}", ar.days_31_60);
    println!("    61-90:    ${:.2}", ar.days_61_90);
    println!("    90+:      ${:.2}", ar.over_90);
    println!("    Total:    ${:.2}", ar.total_open);
}

fn print_segments(segments: &[Segment], catalog: &[DimensionOption]) {
    if segments.is_empty() {
        println!("    (no data)");
        return;
    }
    for seg in segments {
        let name = catalog
            .iter()
            .find(|o| o.id == seg.dimension_id)
            .map(|o| o.display_name.as_str())
            .unwrap_or(seg.dimension_id.as_str());
        let bar = "#".repeat((seg.proportion * 30.0).round() as usize);
        println!(
            "    {name:<20} {:>5.1}% {bar} ({})",
            seg.proportion * 100.0,
            seg.raw_value
        );
    }
}
