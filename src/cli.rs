//! `kqlite` command line: load CSV files, then run pipeline queries against them.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{self, Preferences};
use crate::export;
use crate::kql::emitter::dialect::get_dialect;
use crate::kql::executor::QueryResult;
use crate::models::enums::OutputFormat;
use crate::query_tools::pretty_sql;
use crate::session::QuerySession;

#[derive(Parser, Debug)]
#[command(name = "kqlite")]
#[command(about = "Query CSV files with Kusto-style pipelines, executed on in-memory SQLite")]
#[command(version)]
pub struct Cli {
    /// CSV files to load; each becomes a table named after the file
    pub files: Vec<PathBuf>,

    /// Query to run; without it queries are read from stdin, one per line
    #[arg(short = 'e', long = "execute")]
    pub query: Option<String>,

    /// Print the generated SQL instead of running it
    #[arg(long)]
    pub sql_only: bool,

    /// SQL dialect for --sql-only output (sqlite, postgres)
    #[arg(long, default_value = "sqlite")]
    pub dialect: String,

    /// Format printed SQL over multiple lines
    #[arg(long)]
    pub pretty: bool,

    /// Print the query plan instead of running it
    #[arg(long)]
    pub plan: bool,

    /// Output format (table, csv, json)
    #[arg(short = 'o', long)]
    pub output: Option<OutputFormat>,

    /// Write results to this CSV file as well
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Row cap for queries without limit/take/top (0 = none)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Skip table/column checks before execution
    #[arg(long)]
    pub no_validate: bool,

    /// Directory holding preferences.json
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Save the effective preferences and exit
    #[arg(long)]
    pub save_config: bool,
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = &cli.data_dir {
        config::set_data_dir(dir)?;
    }
    let mut prefs = Preferences::load();
    if let Some(limit) = cli.limit {
        prefs.default_row_limit = limit;
    }
    if let Some(format) = cli.output {
        prefs.output_format = format;
    }
    prefs.pretty_sql |= cli.pretty;
    prefs.validate_names &= !cli.no_validate;

    if cli.save_config {
        let path = prefs.save()?;
        println!("Saved preferences to {}", path.display());
        return Ok(());
    }

    let mut session = QuerySession::new()
        .with_row_limit(prefs.row_limit())
        .with_validation(prefs.validate_names);
    if !cli.files.is_empty() {
        for schema in session.load_files(cli.files.as_slice()).await? {
            info!("loaded {} ({} rows): {}", schema.table_name, schema.row_count, schema.columns.join(", "));
        }
    }

    if let Some(query) = &cli.query {
        return run_one(&session, &cli, &prefs, query).await;
    }

    let stdin = tokio::io::stdin();
    let interactive = std::io::stdin().is_terminal();
    if interactive {
        eprintln!("tables: {}", session.registry().table_names().join(", "));
    }
    let mut lines = BufReader::new(stdin).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        // keep reading after a failed query
        if let Err(e) = run_one(&session, &cli, &prefs, &line).await {
            error!("{}", e);
            eprintln!("{}", e);
        }
    }
    Ok(())
}

async fn run_one(
    session: &QuerySession,
    cli: &Cli,
    prefs: &Preferences,
    query: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if cli.plan {
        println!("{}", crate::kql::debug_plan(query)?);
        return Ok(());
    }
    if cli.sql_only {
        let sql = session.compile_for(query, get_dialect(&cli.dialect).as_ref())?;
        println!("{}", if prefs.pretty_sql { pretty_sql(&sql) } else { sql });
        return Ok(());
    }
    let result = session.run(query).await?;
    if let Some(path) = &cli.export {
        export::write_csv(path, &result)?;
    }
    print_result(&result, prefs.output_format)
}

fn print_result(result: &QueryResult, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(result.headers.clone());
            for row in &result.rows {
                table.add_row(row.clone());
            }
            println!("{}", table);
            println!("({} rows)", result.row_count());
        }
        OutputFormat::Csv => export::write_csv_to(std::io::stdout().lock(), result)?,
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}
