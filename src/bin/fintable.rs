//! CLI binary for viewing and editing the finance table.

extern crate alloc;

use alloc::sync::Arc;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use fintable_rs::config::{AppConfig, Settings, StorageConfig, SystemClock};
use fintable_rs::ledger::Ledger;
use fintable_rs::models::{Account, AccountId, MONTHS_PER_YEAR, Period};
use fintable_rs::storage::{Storage, open_storage};
use owo_colors::OwoColorize;

/// Monthly finance table: categories by month, consumption and a running
/// balance.
#[derive(Debug, Parser)]
#[command(name = "fintable", version, about)]
struct Cli {
    /// Config file (default: `$FINTABLE_CONFIG` or the platform config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Write a new config file with file storage in the default data dir.
    Init {
        /// Year the balance chain starts in.
        #[arg(long)]
        start_year: i32,
        /// Month the balance chain starts in (1-12).
        #[arg(long, default_value_t = 1)]
        start_month: u32,
        /// Opening balance.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        start_money: i64,
        /// Use a SQLite database at this path instead of CSV files.
        #[arg(long, value_name = "PATH")]
        sqlite: Option<PathBuf>,
    },
    /// Show the table for one year.
    Show {
        /// Year to show (default: current year).
        #[arg(long)]
        year: Option<i32>,
    },
    /// Set a value and recalculate balances.
    Set {
        /// Main category, e.g. "Expenses".
        main_category: String,
        /// Category name.
        category: String,
        /// Month (1-12).
        month: u32,
        /// Year.
        year: i32,
        /// Amount.
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
    /// Add a category at the end of a main category.
    AddCategory {
        /// Main category.
        main_category: String,
        /// New category name.
        name: String,
    },
    /// Rename a category, moving its values.
    RenameCategory {
        /// Main category.
        main_category: String,
        /// Current name.
        old_name: String,
        /// New name.
        new_name: String,
    },
    /// List accounts with their aggregate sums.
    Accounts,
    /// Add an account.
    AddAccount {
        /// Account name.
        name: String,
        /// Current amount.
        #[arg(allow_negative_numbers = true)]
        sum: i64,
        /// Free-text note.
        #[arg(long, default_value = "")]
        note: String,
        /// Leave the account out of the aggregate sum.
        #[arg(long)]
        exclude: bool,
    },
    /// Delete an account by id.
    DeleteAccount {
        /// Account id as shown by `accounts`.
        id: String,
    },
    /// Show or replace the "last record" note.
    Note {
        /// New note text; prints the current note when omitted.
        text: Option<String>,
    },
}

/// Prints an error line to stderr.
fn report<E: core::fmt::Display>(context: &str, err: E) -> io::Result<ExitCode> {
    writeln!(
        io::stderr().lock(),
        "{} {context}: {err}",
        "error:".red().bold()
    )?;
    Ok(ExitCode::FAILURE)
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    let _dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_path = match AppConfig::resolve_path(cli.config) {
        Ok(path) => path,
        Err(err) => return report("failed to locate config", err),
    };

    if let Command::Init {
        start_year,
        start_month,
        start_money,
        sqlite,
    } = cli.command
    {
        init_tracing("info");
        let settings = Settings::new(start_year, start_month, start_money);
        return cmd_init(&config_path, settings, sqlite);
    }

    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            writeln!(
                io::stderr().lock(),
                "{} failed to load config: {err}",
                "error:".red().bold()
            )?;
            writeln!(
                io::stderr().lock(),
                "  {} run {} to create one",
                "hint:".cyan(),
                "fintable init --start-year <YEAR>".bold()
            )?;
            return Ok(ExitCode::FAILURE);
        }
    };
    init_tracing(&config.log_level);

    let storage = match open_storage(&config.storage) {
        Ok(storage) => storage,
        Err(err) => return report("failed to open storage", err),
    };
    let ledger = match Ledger::load(storage, config.settings, Arc::new(SystemClock)) {
        Ok(ledger) => ledger,
        Err(err) => return report("failed to load ledger", err),
    };

    dispatch(&ledger, cli.command)
}

/// Installs the tracing subscriber; `RUST_LOG` wins over `default_level`.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

/// Dispatches to the appropriate subcommand handler.
fn dispatch<S: Storage>(ledger: &Ledger<S>, command: Command) -> io::Result<ExitCode> {
    match command {
        Command::Init { .. } => Ok(ExitCode::SUCCESS),
        Command::Show { year } => cmd_show(ledger, year.unwrap_or_else(|| ledger.today().year())),
        Command::Set {
            main_category,
            category,
            month,
            year,
            value,
        } => cmd_set(ledger, &main_category, &category, month, year, value),
        Command::AddCategory {
            main_category,
            name,
        } => cmd_add_category(ledger, &main_category, &name),
        Command::RenameCategory {
            main_category,
            old_name,
            new_name,
        } => cmd_rename_category(ledger, &main_category, &old_name, &new_name),
        Command::Accounts => cmd_accounts(ledger),
        Command::AddAccount {
            name,
            sum,
            note,
            exclude,
        } => cmd_add_account(ledger, name, sum, note, exclude),
        Command::DeleteAccount { id } => cmd_delete_account(ledger, &AccountId::new(id)),
        Command::Note { text } => cmd_note(ledger, text.as_deref()),
    }
}

/// Executes the `init` subcommand: writes a fresh config file.
fn cmd_init(
    path: &Path,
    settings: Settings,
    sqlite: Option<PathBuf>,
) -> io::Result<ExitCode> {
    if path.exists() {
        return report("refusing to overwrite", path.display());
    }
    let storage = match sqlite {
        Some(db) => StorageConfig::Sqlite { path: db },
        None => match AppConfig::default_data_dir() {
            Ok(dir) => StorageConfig::File { dir },
            Err(err) => return report("failed to pick a data directory", err),
        },
    };
    let config = AppConfig {
        log_level: "info".to_owned(),
        storage,
        settings,
    };
    if let Err(err) = config.validate().and_then(|()| config.save(path)) {
        return report("failed to write config", err);
    }
    writeln!(
        io::stdout().lock(),
        "{} {}",
        "Config written".green().bold(),
        format_args!("({})", path.display()).dimmed()
    )?;
    Ok(ExitCode::SUCCESS)
}

/// Saves the ledger, reporting failures.
fn save<S: Storage>(ledger: &Ledger<S>) -> io::Result<ExitCode> {
    match ledger.save_all() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => report("failed to save", err),
    }
}

/// Executes the `show` subcommand.
fn cmd_show<S: Storage>(ledger: &Ledger<S>, year: i32) -> io::Result<ExitCode> {
    let rows = match year_rows(ledger, year) {
        Ok(rows) => rows,
        Err(err) => return report("failed to read the table", err),
    };
    let footer = ledger
        .last_updated()
        .and_then(|at| Ok((at, ledger.last_record()?)));
    match footer {
        Ok((last_updated, last_record)) => {
            print_year(year, rows, last_updated, &last_record)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read the table", err),
    }
}

/// Executes the `set` subcommand: stores the value, recalculates from
/// its month and saves.
fn cmd_set<S: Storage>(
    ledger: &Ledger<S>,
    main_category: &str,
    category: &str,
    month: u32,
    year: i32,
    value: i64,
) -> io::Result<ExitCode> {
    let period = match Period::new(year, month) {
        Ok(period) => period,
        Err(err) => return report("invalid month", err),
    };
    if let Err(err) = ledger.upsert_value(main_category, category, period, value) {
        return report("failed to set value", err);
    }
    let balances = match ledger.recalculate(period) {
        Ok((_, balances)) => balances,
        Err(err) => return report("failed to recalculate", err),
    };
    let code = save(ledger)?;
    if code != ExitCode::SUCCESS {
        return Ok(code);
    }

    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} {}",
        "Value set".green().bold(),
        format_args!("({main_category} / {category}, {period})").dimmed()
    )?;
    for (at, balance) in &balances {
        writeln!(out, "  {} {balance}", format_args!("{at}:").bold())?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `add-category` subcommand.
fn cmd_add_category<S: Storage>(
    ledger: &Ledger<S>,
    main_category: &str,
    name: &str,
) -> io::Result<ExitCode> {
    match ledger.add_category(main_category, name) {
        Ok(category) => {
            let code = save(ledger)?;
            if code == ExitCode::SUCCESS {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Category added".green().bold(),
                    format_args!("({main_category} / {}, #{})", category.name, category.priority)
                        .dimmed()
                )?;
            }
            Ok(code)
        }
        Err(err) => report("failed to add category", err),
    }
}

/// Executes the `rename-category` subcommand.
fn cmd_rename_category<S: Storage>(
    ledger: &Ledger<S>,
    main_category: &str,
    old_name: &str,
    new_name: &str,
) -> io::Result<ExitCode> {
    match ledger.rename_category(main_category, old_name, new_name) {
        Ok(moved) => {
            let code = save(ledger)?;
            if code == ExitCode::SUCCESS {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Category renamed".green().bold(),
                    format_args!("({moved} values moved)").dimmed()
                )?;
            }
            Ok(code)
        }
        Err(err) => report("failed to rename category", err),
    }
}

/// Executes the `accounts` subcommand.
fn cmd_accounts<S: Storage>(ledger: &Ledger<S>) -> io::Result<ExitCode> {
    let listed = ledger
        .accounts()
        .and_then(|accounts| Ok((ledger.account_sums()?, accounts)));
    match listed {
        Ok((sums, accounts)) => {
            print_accounts_table(&accounts)?;
            let mut out = io::stdout().lock();
            writeln!(out, "  {} {}", "Total:".bold(), sums.main_sum)?;
            let diff = if sums.diff_sum < 0 {
                sums.diff_sum.red().to_string()
            } else {
                sums.diff_sum.green().to_string()
            };
            writeln!(out, "  {} {diff}", "Against balance:".bold())?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read accounts", err),
    }
}

/// Executes the `add-account` subcommand.
fn cmd_add_account<S: Storage>(
    ledger: &Ledger<S>,
    name: String,
    sum: i64,
    note: String,
    exclude: bool,
) -> io::Result<ExitCode> {
    let account = Account {
        note,
        in_sum: !exclude,
        ..Account::new(name, sum)
    };
    match ledger.insert_account(account) {
        Ok(stored) => {
            let code = save(ledger)?;
            if code == ExitCode::SUCCESS {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Account added".green().bold(),
                    format_args!("({})", stored.id).dimmed()
                )?;
            }
            Ok(code)
        }
        Err(err) => report("failed to add account", err),
    }
}

/// Executes the `delete-account` subcommand.
fn cmd_delete_account<S: Storage>(ledger: &Ledger<S>, id: &AccountId) -> io::Result<ExitCode> {
    if let Err(err) = ledger.delete_account(id) {
        return report("failed to delete account", err);
    }
    let code = save(ledger)?;
    if code == ExitCode::SUCCESS {
        writeln!(io::stdout().lock(), "{}", "Account deleted".green().bold())?;
    }
    Ok(code)
}

/// Executes the `note` subcommand.
fn cmd_note<S: Storage>(ledger: &Ledger<S>, text: Option<&str>) -> io::Result<ExitCode> {
    let Some(new_note) = text else {
        return match ledger.last_record() {
            Ok(note) if note.is_empty() => {
                writeln!(io::stdout().lock(), "{}", "No note set.".dimmed())?;
                Ok(ExitCode::SUCCESS)
            }
            Ok(note) => {
                writeln!(io::stdout().lock(), "{note}")?;
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => report("failed to read note", err),
        };
    };
    if let Err(err) = ledger.set_last_record(new_note) {
        return report("failed to set note", err);
    }
    save(ledger)
}

// ── Output formatting ────────────────────────────────────────────────

/// Formats an optional amount, with a dash for missing values.
fn amount_cell(value: Option<i64>) -> Cell {
    value.map_or_else(
        || Cell::new("\u{2014}").fg(Color::DarkGrey),
        Cell::new,
    )
}

/// Builds one year of the table: a row per category, then the
/// consumption and balance rows.
fn year_rows<S: Storage>(ledger: &Ledger<S>, year: i32) -> fintable_rs::Result<Vec<Vec<Cell>>> {
    let groups = ledger.categories()?;
    let annual = ledger.annual_result(year)?;
    let calculation = ledger.calculator().cache();
    let periods: Vec<Period> = Period::year_range(year).collect();

    let mut rows = Vec::new();
    for category in groups.iter().flatten() {
        let mut row = vec![
            Cell::new(&category.main_category).fg(Color::DarkGrey),
            Cell::new(&category.name),
        ];
        for &period in &periods {
            let value = ledger
                .cell(&category.main_category, &category.name, period)?
                .map(|cell| cell.value);
            row.push(amount_cell(value));
        }
        let total = annual.by_category.get(&category.key()).copied().unwrap_or(0);
        row.push(Cell::new(total).fg(Color::Cyan));
        rows.push(row);
    }

    let mut consumption_row = vec![Cell::new(""), Cell::new("Consumption").fg(Color::Red)];
    let mut balance_row = vec![Cell::new(""), Cell::new("Balance").fg(Color::Green)];
    for &period in &periods {
        consumption_row.push(amount_cell(calculation.consumption(period)?));
        balance_row.push(amount_cell(calculation.balance(period)?));
    }
    consumption_row.push(Cell::new(annual.consumption).fg(Color::Red));
    balance_row.push(Cell::new(annual.balance).fg(Color::Green));
    rows.push(consumption_row);
    rows.push(balance_row);
    Ok(rows)
}

/// Prints the rows built by [`year_rows`] and the bookkeeping footer.
fn print_year(
    year: i32,
    rows: Vec<Vec<Cell>>,
    last_updated: Option<chrono::DateTime<chrono::Utc>>,
    last_record: &str,
) -> io::Result<()> {
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    let mut header = vec![
        Cell::new("Group").fg(Color::Cyan),
        Cell::new("Category").fg(Color::Cyan),
    ];
    header.extend(
        (1..=MONTHS_PER_YEAR).map(|month| Cell::new(format!("{month:02}")).fg(Color::Cyan)),
    );
    header.push(Cell::new("Year").fg(Color::Cyan));
    _ = table.set_header(header);
    for row in rows {
        _ = table.add_row(row);
    }

    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} {}",
        "Table".green().bold(),
        format_args!("({year})").dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    if let Some(at) = last_updated {
        writeln!(out, "  {} {}", "Last updated:".bold(), at.format("%d.%m.%Y %H:%M:%S"))?;
    }
    if !last_record.is_empty() {
        writeln!(out, "  {} {last_record}", "Last record:".bold())?;
    }
    Ok(())
}

/// Prints accounts in a table.
fn print_accounts_table(accounts: &[Account]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if accounts.is_empty() {
        writeln!(out, "{}", "No accounts found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Sum").fg(Color::Cyan),
        Cell::new("In sum").fg(Color::Cyan),
        Cell::new("Note").fg(Color::Cyan),
    ]);

    for account in accounts {
        let in_sum = if account.in_sum {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        _ = table.add_row(vec![
            Cell::new(&account.id),
            Cell::new(&account.name),
            Cell::new(account.sum),
            in_sum,
            Cell::new(&account.note),
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Accounts".green().bold(),
        format_args!("({})", accounts.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            // Last-resort error output; if stderr itself failed there is
            // nothing left to do.
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
