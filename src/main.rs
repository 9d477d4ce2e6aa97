// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use nomina_report::{
    logging, AppConfig, Notice, NoticeLevel, QueryOutcome, ReportKind, Session, Table, Value,
};

#[derive(Parser, Debug)]
#[command(name = "nomina-report")]
#[command(about = "Payroll perception/deduction reports grouped by dependency")]
#[command(version)]
struct Cli {
    /// Path to the INI configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,

    /// List the dependencies found in the catalog
    Groups {
        /// Case-insensitive substring filter
        #[arg(long)]
        filter: Option<String>,
    },

    /// Run one report and print or export the pivot
    Query {
        /// percepciones or deducciones
        #[arg(long)]
        report: ReportKind,

        /// Dependency name, exactly as listed by `groups`
        #[arg(long)]
        group: String,

        /// Measure column (defaults to the report's first measure)
        #[arg(long)]
        measure: Option<String>,

        /// Export to this file instead of printing (.xlsx or CSV)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the pivot as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Tui);

    match &command {
        Command::Tui => logging::init_file(Path::new(logging::TUI_LOG_FILE))?,
        _ => logging::init_stderr(),
    }

    let config = AppConfig::load(cli.config.as_deref()).context("Invalid configuration")?;

    match command {
        Command::Tui => run_ui_mode(config),
        Command::Groups { filter } => run_groups(config, filter.as_deref()),
        Command::Query {
            report,
            group,
            measure,
            output,
            json,
        } => run_query(config, report, &group, measure, output, json),
    }
}

fn run_groups(config: AppConfig, filter: Option<&str>) -> Result<()> {
    let session = Session::new(config);
    let catalog = session.catalog();

    if let Some(e) = catalog.load_error() {
        anyhow::bail!("Catalog could not be loaded: {}", e);
    }

    let groups = catalog.filter_groups(filter.unwrap_or_default());
    println!("📋 {} dependencies", groups.len());
    for group in groups {
        println!("  {}", group);
    }
    Ok(())
}

fn run_query(
    config: AppConfig,
    report: ReportKind,
    group: &str,
    measure: Option<String>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut session = Session::new(config);
    session.initialize();

    let measure = measure.unwrap_or_else(|| session.report(report).default_measure().to_string());
    let outcome = session.run_query(report, group, &measure);
    print_notices(&session.take_notices());

    let mut exported = true;
    if let QueryOutcome::HasData(_) = outcome {
        if let Some(path) = output {
            exported = session.export(&path);
            print_notices(&session.take_notices());
        } else if json {
            println!("{}", serde_json::to_string_pretty(session.current())?);
        } else {
            print_table(&session.current().to_table());
        }
    }

    session.shutdown();

    let code = exit_code(outcome, exported);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Non-zero when the query was rejected or failed, or the export did not
/// write its file.
fn exit_code(outcome: QueryOutcome, exported: bool) -> i32 {
    match outcome {
        QueryOutcome::Failed | QueryOutcome::Rejected => 1,
        _ if !exported => 1,
        _ => 0,
    }
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        let icon = match notice.level {
            NoticeLevel::Info => "✅",
            NoticeLevel::Warning => "⚠️ ",
            NoticeLevel::Error => "❌",
        };
        eprintln!("{} {}: {}", icon, notice.title, notice.message);
    }
}

/// Plain aligned text; numbers right-aligned, text left-aligned.
fn print_table(table: &Table) {
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();

    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(c, name)| {
            cells
                .iter()
                .map(|row| row[c].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = table
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{:<w$}", name, w = w))
        .collect();
    println!("{}", header.join("  "));
    println!("{}", "━".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));

    for (row, values) in cells.iter().zip(&table.rows) {
        let line: Vec<String> = row
            .iter()
            .zip(values)
            .zip(&widths)
            .map(|((text, value), w)| {
                if matches!(value, Value::Integer(_) | Value::Real(_)) {
                    format!("{:>w$}", text, w = w)
                } else {
                    format!("{:<w$}", text, w = w)
                }
            })
            .collect();
        println!("{}", line.join("  "));
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: AppConfig) -> Result<()> {
    println!("🖥️  Loading Nomina Report UI...\n");

    let session = Session::new(config);
    let mut app = ui::App::new(session);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: nomina-report query --report percepciones --group <DEPENDENCY>");
    std::process::exit(1);
}
