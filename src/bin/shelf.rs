//! `shelf` command line.
//!
//! ```bash
//! shelf tasks add "Buy milk" --priority high --due 2026-05-01
//! shelf tasks list --search milk --filter active --sort dueDate --dir desc
//! shelf tasks toggle task_20260501_090000_1a2b3c4d
//! shelf inventory import ./stock.csv
//! shelf investments summary
//! shelf theme toggle
//! shelf screen send "3"
//! ```
//!
//! Every command prints JSON on stdout. Logs go to `<dataDir>/logs/`.

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use shelfkit::collection::CollectionController;
use shelfkit::csv::{parse_date, CsvRecord};
use shelfkit::models::{
    AssetKind, InventoryDraft, InventoryPatch, InvestmentDraft, InvestmentFilter, InvestmentPatch, Priority,
    StockFilter, TaskDraft, TaskFilter, TaskPatch,
};
use shelfkit::shelf::{export_to_file, import_from_file, list_page};
use shelfkit::theme::Theme;
use shelfkit::{init_tracing, to_client_error, AppError, Record, Shelf, ShelfConfig, SortDirection, ViewQuery};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(about = "Local record collections: tasks, inventory, investments and a screener")]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "SHELF_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config and SHELF_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Tasks(TaskCommand),
    #[command(subcommand)]
    Inventory(InventoryCommand),
    #[command(subcommand)]
    Investments(InvestmentCommand),
    #[command(subcommand)]
    Theme(ThemeCommand),
    #[command(subcommand)]
    Screen(ScreenCommand),
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Case-insensitive substring matched against text fields
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long)]
    filter: Option<String>,
    /// Sort key, e.g. createdAt, text, dueDate
    #[arg(long)]
    sort: Option<String>,
    /// Sort direction: asc or desc
    #[arg(long, default_value = "asc")]
    dir: String,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    cursor: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Destination file; defaults to <dataDir>/exports/
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Add {
        text: String,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    List(ListArgs),
    /// Pass an empty --due or --category to clear it
    Edit {
        id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    Toggle {
        id: String,
    },
    Remove {
        id: String,
    },
    ClearCompleted,
    Stats,
    Export(ExportArgs),
    Import {
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum InventoryCommand {
    Add {
        name: String,
        #[arg(long)]
        sku: String,
        #[arg(long, default_value_t = 0)]
        quantity: u32,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 0)]
        reorder: u32,
    },
    List(ListArgs),
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sku: Option<String>,
        #[arg(long)]
        quantity: Option<u32>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        reorder: Option<u32>,
    },
    /// Flips the discontinued flag
    Toggle {
        id: String,
    },
    Remove {
        id: String,
    },
    Export(ExportArgs),
    Import {
        path: PathBuf,
    },
    Summary,
}

#[derive(Subcommand, Debug)]
enum InvestmentCommand {
    Add {
        symbol: String,
        #[arg(long)]
        shares: f64,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        current: Option<f64>,
        /// Purchase date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    List(ListArgs),
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        shares: Option<f64>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        current: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    Remove {
        id: String,
    },
    Export(ExportArgs),
    Import {
        path: PathBuf,
    },
    Summary,
}

#[derive(Subcommand, Debug)]
enum ThemeCommand {
    Show,
    Dark,
    Light,
    Toggle,
}

#[derive(Subcommand, Debug)]
enum ScreenCommand {
    Send { text: String },
    Assess,
    Show,
    Reset,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {}", to_client_error(format!("{:#}", error)));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ShelfConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Err(error) = init_tracing(&config.log_dir(), &config.log_level, config.log_json) {
        eprintln!("warning: file logging disabled: {}", error);
    }

    let mut shelf = Shelf::open(config)?;
    match cli.command {
        Command::Tasks(command) => run_tasks(&mut shelf, command),
        Command::Inventory(command) => run_inventory(&mut shelf, command),
        Command::Investments(command) => run_investments(&mut shelf, command),
        Command::Theme(command) => run_theme(&mut shelf, command),
        Command::Screen(command) => run_screen(&mut shelf, command).await,
    }
}

fn run_tasks(shelf: &mut Shelf, command: TaskCommand) -> anyhow::Result<()> {
    let page_size = shelf.config().page_size;
    match command {
        TaskCommand::Add {
            text,
            priority,
            due,
            category,
        } => {
            let draft = TaskDraft {
                text,
                completed: false,
                priority: priority.as_deref().map(parse_priority).transpose()?.unwrap_or_default(),
                due_date: due.as_deref().map(parse_cli_date).transpose()?,
                category,
            };
            let task = shelf.tasks_mut().add(draft).map_err(AppError::from)?;
            finish(shelf.tasks(), &task)
        }
        TaskCommand::List(args) => {
            let filter = match args.filter.as_deref() {
                Some(raw) => TaskFilter::parse(raw).ok_or_else(|| anyhow!("unknown task filter '{}'", raw))?,
                None => TaskFilter::All,
            };
            print_list(shelf.tasks(), filter, args, page_size)
        }
        TaskCommand::Edit {
            id,
            text,
            priority,
            due,
            category,
        } => {
            let patch = TaskPatch {
                text,
                priority: priority.as_deref().map(parse_priority).transpose()?,
                due_date: due.as_deref().map(clearable_date).transpose()?,
                category: category.map(clearable_text),
            };
            let updated = shelf.tasks_mut().update(&id, &patch).map_err(AppError::from)?;
            finish(shelf.tasks(), &json!({ "updated": updated, "task": shelf.tasks().get(&id) }))
        }
        TaskCommand::Toggle { id } => {
            let toggled = shelf.tasks_mut().toggle_flag(&id, "completed");
            finish(shelf.tasks(), &json!({ "toggled": toggled.is_some(), "task": toggled }))
        }
        TaskCommand::Remove { id } => {
            let removed = shelf.tasks_mut().remove(&id);
            finish(shelf.tasks(), &json!({ "removed": removed }))
        }
        TaskCommand::ClearCompleted => {
            let removed = shelf.clear_completed_tasks();
            finish(shelf.tasks(), &json!({ "removed": removed }))
        }
        TaskCommand::Stats => print_json(&shelf.task_stats()),
        TaskCommand::Export(args) => export(shelf, shelf.tasks().records(), "tasks", args),
        TaskCommand::Import { path } => import(shelf.tasks_mut(), &path),
    }
}

fn run_inventory(shelf: &mut Shelf, command: InventoryCommand) -> anyhow::Result<()> {
    let page_size = shelf.config().page_size;
    match command {
        InventoryCommand::Add {
            name,
            sku,
            quantity,
            price,
            category,
            reorder,
        } => {
            let draft = InventoryDraft {
                name,
                sku,
                quantity,
                unit_price: price,
                category,
                reorder_level: reorder,
                discontinued: false,
            };
            let item = shelf.inventory_mut().add(draft).map_err(AppError::from)?;
            finish(shelf.inventory(), &item)
        }
        InventoryCommand::List(args) => {
            let filter = match args.filter.as_deref() {
                Some(raw) => StockFilter::parse(raw).ok_or_else(|| anyhow!("unknown stock filter '{}'", raw))?,
                None => StockFilter::All,
            };
            print_list(shelf.inventory(), filter, args, page_size)
        }
        InventoryCommand::Edit {
            id,
            name,
            sku,
            quantity,
            price,
            category,
            reorder,
        } => {
            let patch = InventoryPatch {
                name,
                sku,
                quantity,
                unit_price: price,
                category: category.map(clearable_text),
                reorder_level: reorder,
            };
            let updated = shelf.inventory_mut().update(&id, &patch).map_err(AppError::from)?;
            finish(shelf.inventory(), &json!({ "updated": updated, "item": shelf.inventory().get(&id) }))
        }
        InventoryCommand::Toggle { id } => {
            let toggled = shelf.inventory_mut().toggle_flag(&id, "discontinued");
            finish(shelf.inventory(), &json!({ "toggled": toggled.is_some(), "item": toggled }))
        }
        InventoryCommand::Remove { id } => {
            let removed = shelf.inventory_mut().remove(&id);
            finish(shelf.inventory(), &json!({ "removed": removed }))
        }
        InventoryCommand::Export(args) => export(shelf, shelf.inventory().records(), "inventory", args),
        InventoryCommand::Import { path } => import(shelf.inventory_mut(), &path),
        InventoryCommand::Summary => print_json(&shelf.inventory_summary()),
    }
}

fn run_investments(shelf: &mut Shelf, command: InvestmentCommand) -> anyhow::Result<()> {
    let page_size = shelf.config().page_size;
    match command {
        InvestmentCommand::Add {
            symbol,
            shares,
            price,
            current,
            date,
            kind,
            name,
            notes,
        } => {
            let purchase_date = match date.as_deref() {
                Some(raw) => parse_cli_date(raw)?,
                None => chrono::Utc::now().date_naive(),
            };
            let draft = InvestmentDraft {
                name: name.unwrap_or_else(|| symbol.clone()),
                symbol,
                kind: kind.as_deref().map(parse_kind).transpose()?.unwrap_or_default(),
                shares,
                purchase_price: price,
                current_price: current,
                purchase_date,
                notes,
            };
            let position = shelf.investments_mut().add(draft).map_err(AppError::from)?;
            finish(shelf.investments(), &position)
        }
        InvestmentCommand::List(args) => {
            let filter = InvestmentFilter {
                kind: args.filter.as_deref().map(parse_kind).transpose()?,
            };
            print_list(shelf.investments(), filter, args, page_size)
        }
        InvestmentCommand::Edit {
            id,
            name,
            kind,
            shares,
            price,
            current,
            notes,
        } => {
            let patch = InvestmentPatch {
                name,
                kind: kind.as_deref().map(parse_kind).transpose()?,
                shares,
                purchase_price: price,
                current_price: current,
                notes: notes.map(clearable_text),
            };
            let updated = shelf.investments_mut().update(&id, &patch).map_err(AppError::from)?;
            finish(
                shelf.investments(),
                &json!({ "updated": updated, "position": shelf.investments().get(&id) }),
            )
        }
        InvestmentCommand::Remove { id } => {
            let removed = shelf.investments_mut().remove(&id);
            finish(shelf.investments(), &json!({ "removed": removed }))
        }
        InvestmentCommand::Export(args) => export(shelf, shelf.investments().records(), "investments", args),
        InvestmentCommand::Import { path } => import(shelf.investments_mut(), &path),
        InvestmentCommand::Summary => print_json(&shelf.portfolio_summary()),
    }
}

fn run_theme(shelf: &mut Shelf, command: ThemeCommand) -> anyhow::Result<()> {
    let theme = match command {
        ThemeCommand::Show => shelf.theme(),
        ThemeCommand::Dark => shelf.set_theme(Theme::Dark)?,
        ThemeCommand::Light => shelf.set_theme(Theme::Light)?,
        ThemeCommand::Toggle => shelf.toggle_theme()?,
    };
    print_json(&json!({ "theme": theme, "dark": theme.is_dark() }))
}

async fn run_screen(shelf: &mut Shelf, command: ScreenCommand) -> anyhow::Result<()> {
    match command {
        ScreenCommand::Send { text } => {
            let outcome = tokio::select! {
                result = shelf.screener_mut().send(&text) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            match outcome {
                Some(result) => {
                    let reply = result?;
                    print_json(&reply)
                }
                None => print_json(&json!({ "canceled": true })),
            }
        }
        ScreenCommand::Assess => {
            let outcome = tokio::select! {
                result = shelf.screener_mut().assess() => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            match outcome {
                Some(result) => {
                    let assessment = result?;
                    if let Some(error) = shelf.screener().persist_error() {
                        eprintln!("warning: assessment was not saved: {}", error);
                    }
                    print_json(&assessment)
                }
                None => print_json(&json!({ "canceled": true })),
            }
        }
        ScreenCommand::Show => print_json(&shelf.screener().snapshot()),
        ScreenCommand::Reset => {
            shelf.screener_mut().reset();
            print_json(&shelf.screener().snapshot())
        }
    }
}

fn print_list<R: Record>(
    controller: &CollectionController<R>,
    filter: R::Filter,
    args: ListArgs,
    page_size: u32,
) -> anyhow::Result<()> {
    let mut query = ViewQuery::new().search(args.search).filter(filter);
    if let Some(key) = args.sort {
        query = query.sort_by(key, parse_direction(&args.dir)?);
    }
    let page = list_page(controller, &query, Some(args.limit.unwrap_or(page_size)), args.cursor)?;
    print_json(&page)
}

fn export<R: CsvRecord>(shelf: &Shelf, records: &[R], name: &str, args: ExportArgs) -> anyhow::Result<()> {
    let path = match args.out {
        Some(path) => path,
        None => shelf.export_path(name)?,
    };
    print_json(&export_to_file(records, &path)?)
}

fn import<R: CsvRecord>(controller: &mut CollectionController<R>, path: &Path) -> anyhow::Result<()> {
    let report = import_from_file(controller, path)?;
    finish(controller, &report)
}

/// Prints `value`; a failed write-through is reported on stderr but the
/// command still succeeds.
fn finish<R: Record, T: Serialize + ?Sized>(controller: &CollectionController<R>, value: &T) -> anyhow::Result<()> {
    if let Some(error) = controller.persist_error() {
        eprintln!("warning: changes were not saved: {}", error);
    }
    print_json(value)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

fn parse_priority(raw: &str) -> anyhow::Result<Priority> {
    Priority::parse(raw).ok_or_else(|| anyhow!("unknown priority '{}' (low, medium, high)", raw))
}

fn parse_kind(raw: &str) -> anyhow::Result<AssetKind> {
    AssetKind::parse(raw).ok_or_else(|| anyhow!("unknown asset kind '{}'", raw))
}

fn parse_direction(raw: &str) -> anyhow::Result<SortDirection> {
    SortDirection::parse(raw).ok_or_else(|| anyhow!("unknown sort direction '{}' (expected asc or desc)", raw))
}

fn parse_cli_date(raw: &str) -> anyhow::Result<chrono::NaiveDate> {
    match parse_date(raw) {
        Some(date) => Ok(date),
        None => bail!("invalid date '{}' (expected YYYY-MM-DD)", raw),
    }
}

fn clearable_date(raw: &str) -> anyhow::Result<Option<chrono::NaiveDate>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_cli_date(raw).map(Some)
}

fn clearable_text(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
