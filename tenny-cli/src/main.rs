use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tenny_client::{ApiClient, ApiError, OpenError, Query, Session, UploadFlow, UserFilters};
use tenny_core::time::{month_bounds, to_iso_date, today_in};
use tenny_core::{
    CategoryPatch, MonthlySummary, NewCategory, OcrEngine, ReportSummary, SortDirection, SortField,
    Transaction, TransactionFilters, TransactionForm,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod export;
mod proxy;
mod render;
mod state;

use config::Config;

const RECENT_ON_DASHBOARD: u64 = 5;

#[derive(Parser, Debug)]
#[command(
    name = "tenny",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TENNY_BUILD_SHA"), ")"),
    about = "Tenny Ledger: expenses, receipts and spending reports from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Forward /api/proxy/* and /api/ocr/* to the backend
    Proxy {
        #[arg(long)]
        listen: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },

    #[command(flatten)]
    Remote(Remote),
}

/// Commands that talk to the backend
#[derive(Subcommand, Debug)]
enum Remote {
    /// Sign in and remember the session token
    Login {
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account (signs in on success)
    Register {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Forget the stored session token
    Logout,

    /// Show the signed-in account
    Me,

    /// This month's spending with a projection, plus recent transactions
    Dashboard,

    Transactions {
        #[command(subcommand)]
        command: TransactionsCommand,
    },

    /// Scan a receipt (JPEG, PNG or PDF) and review what was read
    Upload {
        file: PathBuf,

        /// hybrid, tesseract or google
        #[arg(long)]
        engine: Option<OcrEngine>,

        /// Create a transaction from the scan
        #[arg(long)]
        create: bool,

        /// Category for --create (defaults to a guess from the merchant)
        #[arg(long)]
        category: Option<String>,
    },

    Reports {
        #[command(subcommand)]
        command: ReportsCommand,
    },

    Categories {
        #[command(subcommand)]
        command: CategoriesCommand,
    },

    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    start: Option<NaiveDate>,
    /// YYYY-MM-DD
    #[arg(long)]
    end: Option<NaiveDate>,
    /// date, amount, merchant, category or created_at
    #[arg(long)]
    sort_by: Option<SortField>,
    /// Ascending instead of newest/largest first
    #[arg(long)]
    asc: bool,
}

impl ListArgs {
    fn filters(&self, today: NaiveDate) -> TransactionFilters {
        let mut f = TransactionFilters::new();
        f.search = self.search.clone();
        f.category = self.category.clone();
        if self.start.is_some() || self.end.is_some() {
            let start = self.start.unwrap_or_else(|| month_bounds(today).0);
            let end = self.end.unwrap_or(today);
            f = f.with_range(start, end);
        }
        let direction = if self.asc { SortDirection::Asc } else { SortDirection::Desc };
        f.sorted_by(self.sort_by.unwrap_or(SortField::Date), direction)
    }
}

#[derive(Subcommand, Debug)]
enum TransactionsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
        #[command(flatten)]
        filter: ListArgs,
    },
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        amount: String,
        #[arg(long)]
        merchant: String,
        /// Defaults to a guess from the merchant name
        #[arg(long)]
        category: Option<String>,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Write every matching transaction to a CSV file
    Export {
        #[arg(long, short)]
        out: PathBuf,
        #[command(flatten)]
        filter: ListArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ReportsCommand {
    /// Totals and category shares computed locally (default: this month)
    Summary {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    SpendingByCategory {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    Monthly {
        #[arg(long)]
        year: Option<i32>,
    },
    Trends {
        #[arg(long, default_value = "monthly")]
        period: String,
    },
}

#[derive(Subcommand, Debug)]
enum CategoriesCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Rename {
        id: String,
        name: String,
    },
    Remove {
        id: String,
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    List {
        #[arg(long)]
        page: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.tenny/config.toml with defaults
    Init,
    /// Print the effective configuration
    Show,
}

struct App {
    cfg: Config,
    client: ApiClient,
}

impl App {
    fn new(cfg: Config) -> Result<Self> {
        let session = Session::new(state::FileTokenStore::new(state::auth_path()?));
        let client = ApiClient::new(&cfg.api_config(), session)?;
        debug!(base_url = %client.base_url(), "client ready");
        Ok(Self { cfg, client })
    }

    fn today(&self) -> Result<NaiveDate> {
        today_in(&self.cfg.display.timezone)
    }

    fn symbol(&self) -> &str {
        &self.cfg.display.currency_symbol
    }

    fn transactions(&self, filters: TransactionFilters) -> Query<tenny_core::TransactionsPage> {
        Query::transactions(self.client.clone(), filters).with_options(self.cfg.transactions_query())
    }

    /// Every page of a listing
    async fn fetch_all(&self, filters: TransactionFilters) -> Result<Vec<Transaction>> {
        Ok(self.client.list_all_transactions(&filters).await?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_message(&e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TENNY_LOG").unwrap_or_else(|_| EnvFilter::new("tenny=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// An expired session gets a pointer to `tenny login` instead of a raw error
fn error_message(e: &anyhow::Error) -> String {
    match e.downcast_ref::<ApiError>() {
        Some(ApiError::Unauthorized) => {
            "Your session has expired or you are not signed in. Run `tenny login`.".to_string()
        }
        Some(api) => format!("Error: {}", api.user_message()),
        None => format!("Error: {e:#}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config()?;

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config(),
            ConfigCommand::Show => {
                println!("# {}", config::config_path()?.display());
                print!("{}", config::show_config(&cfg)?);
                Ok(())
            }
        },
        Command::Proxy { listen, target } => {
            let listen = listen.unwrap_or_else(|| cfg.proxy.listen.clone());
            let target = target.unwrap_or_else(|| cfg.proxy.target.clone());
            proxy::serve(&listen, &target).await
        }
        Command::Remote(command) => remote(&App::new(cfg)?, command).await,
    }
}

async fn remote(app: &App, command: Remote) -> Result<()> {
    match command {
        Remote::Login { email } => auth::login(&app.client, email).await,
        Remote::Register { email, name } => auth::register(&app.client, email, name).await,
        Remote::Logout => {
            auth::logout(&app.client);
            Ok(())
        }
        Remote::Me => {
            let me = app.client.me().await?;
            print!("{}", render::user(&me));
            Ok(())
        }
        Remote::Dashboard => dashboard(app).await,
        Remote::Transactions { command } => transactions(app, command).await,
        Remote::Upload {
            file,
            engine,
            create,
            category,
        } => upload(app, file, engine, create, category).await,
        Remote::Reports { command } => reports(app, command).await,
        Remote::Categories { command } => categories(app, command).await,
        Remote::Users { command } => users(app, command).await,
    }
}

async fn dashboard(app: &App) -> Result<()> {
    let today = app.today()?;
    let recent = app.transactions(TransactionFilters::recent(RECENT_ON_DASHBOARD));

    let (month, recent) = tokio::join!(
        app.fetch_all(TransactionFilters::current_month(today)),
        recent.load()
    );
    let month = month.context("loading this month's transactions")?;
    let recent = recent.context("loading recent transactions")?;

    let summary = MonthlySummary::compute(&month, today);
    print!("{}", render::dashboard(&summary, &recent.transactions, app.symbol()));
    Ok(())
}

async fn transactions(app: &App, command: TransactionsCommand) -> Result<()> {
    let sym = app.symbol();
    match command {
        TransactionsCommand::List { page, limit, filter } => {
            let filters = filter.filters(app.today()?).with_page(page).with_limit(limit);
            let listing = app.transactions(filters).load().await?;
            print!("{}", render::transaction_list(&listing, limit, sym));
        }
        TransactionsCommand::Show { id } => {
            let txn = Query::transaction(app.client.clone(), id).load().await?;
            print!("{}", render::transaction_detail(&txn, sym));
        }
        TransactionsCommand::Create {
            amount,
            merchant,
            category,
            date,
            notes,
        } => {
            let mut form = TransactionForm::new(app.today()?);
            form.amount = amount;
            form.category = category.unwrap_or_else(|| tenny_core::suggest_category(&merchant).to_string());
            form.merchant = merchant;
            if let Some(date) = date {
                form.date = date;
            }
            form.notes = notes.unwrap_or_default();

            let created = app.client.create_transaction(&form.submit()?).await?;
            info!(id = %created.id, "transaction created");
            print!("Created\n{}", render::transaction_detail(&created, sym));
        }
        TransactionsCommand::Edit {
            id,
            amount,
            merchant,
            category,
            date,
            notes,
        } => {
            let original = app.client.get_transaction(&id).await?;
            let mut form = TransactionForm::from_transaction(&original);
            let edits = [
                (amount, &mut form.amount),
                (merchant, &mut form.merchant),
                (category, &mut form.category),
                (date, &mut form.date),
                (notes, &mut form.notes),
            ];
            for (value, field) in edits {
                if let Some(v) = value {
                    *field = v;
                }
            }

            let patch = form.patch(&original)?;
            if patch.is_empty() {
                println!("Nothing to change");
                return Ok(());
            }
            let updated = app.client.update_transaction(&id, &patch).await?;
            print!("Updated\n{}", render::transaction_detail(&updated, sym));
        }
        TransactionsCommand::Delete { id, yes } => {
            if !yes && !auth::confirm(&format!("Delete transaction {id}?"))? {
                println!("Cancelled");
                return Ok(());
            }
            app.client.delete_transaction(&id).await?;
            println!("Deleted {id}");
        }
        TransactionsCommand::Export { out, filter } => {
            let txns = app.fetch_all(filter.filters(app.today()?)).await?;
            export::export_to_path(&out, &txns)?;
            println!("Wrote {} transactions to {}", txns.len(), out.display());
        }
    }
    Ok(())
}

async fn upload(
    app: &App,
    path: PathBuf,
    engine: Option<OcrEngine>,
    create: bool,
    category: Option<String>,
) -> Result<()> {
    let policy = app.cfg.upload_policy();
    let file = match policy.read(&path) {
        Ok(file) => file,
        Err(OpenError::Rejected(r)) => bail!(r.message()),
        Err(OpenError::Io(e)) => return Err(anyhow!(e).context(format!("read {}", path.display()))),
    };
    let mut flow = UploadFlow::new(policy);
    let preview = flow.select(file).map_err(|r| anyhow!(r.message()))?;
    println!("Selected {} ({}, {} bytes)", preview.name, preview.mime, preview.size);

    let engine = engine.unwrap_or(app.cfg.upload.default_engine);
    let mut progress = flow.subscribe_progress();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let pct = *progress.borrow_and_update();
            eprint!("\rUploading ({engine})... {pct:>3}%");
        }
    });
    let result = flow.submit(&app.client, engine).await;
    printer.abort();
    eprintln!();

    let result = result.map_err(|e| match e {
        ApiError::Unauthorized => anyhow!(e),
        other => anyhow!(other.upload_message()),
    })?;
    print!("{}", render::ocr_review(&result, app.symbol()));

    if !create {
        return Ok(());
    }

    let mut form = TransactionForm::prefill(&result, app.today()?);
    if form.merchant.is_empty() {
        form.merchant = auth::prompt("Merchant")?;
    }
    if form.amount.is_empty() {
        form.amount = auth::prompt("Amount")?;
    }
    if let Some(c) = category {
        form.category = c;
    } else if form.category.is_empty() {
        form.category = tenny_core::suggest_category(&form.merchant).to_string();
    }

    let created = app.client.create_transaction(&form.submit()?).await?;
    print!("\nCreated\n{}", render::transaction_detail(&created, app.symbol()));
    Ok(())
}

async fn reports(app: &App, command: ReportsCommand) -> Result<()> {
    let today = app.today()?;
    let (month_start, month_end) = month_bounds(today);
    match command {
        ReportsCommand::Summary { start, end } => {
            let start = start.unwrap_or(month_start);
            let end = end.unwrap_or(month_end);
            if end < start {
                bail!("--end {} is before --start {}", to_iso_date(end), to_iso_date(start));
            }
            let txns = app
                .fetch_all(TransactionFilters::new().with_range(start, end))
                .await?;
            let summary = ReportSummary::compute(&txns);
            print!("{}", render::report(&summary, start, end, app.symbol()));
        }
        ReportsCommand::SpendingByCategory { start, end } => {
            let v = app
                .client
                .spending_by_category(start.unwrap_or(month_start), end.unwrap_or(month_end))
                .await?;
            print!("{}", render::json(&v));
        }
        ReportsCommand::Monthly { year } => {
            let v = app.client.monthly_spending(year.unwrap_or(today.year())).await?;
            print!("{}", render::json(&v));
        }
        ReportsCommand::Trends { period } => {
            let v = app.client.transaction_trends(&period).await?;
            print!("{}", render::json(&v));
        }
    }
    Ok(())
}

async fn categories(app: &App, command: CategoriesCommand) -> Result<()> {
    match command {
        CategoriesCommand::List => {
            let list = Query::categories(app.client.clone())
                .with_options(app.cfg.categories_query())
                .load()
                .await?;
            print!("{}", render::categories(&list));
        }
        CategoriesCommand::Add { name, description } => {
            let mut new = NewCategory::named(name);
            new.description = description;
            let created = app.client.create_category(&new).await?;
            println!("Added {} ({})", created.name, created.id);
        }
        CategoriesCommand::Rename { id, name } => {
            let patch = CategoryPatch {
                name: Some(name),
                ..CategoryPatch::default()
            };
            let updated = app.client.update_category(&id, &patch).await?;
            println!("Renamed {} to {}", id, updated.name);
        }
        CategoriesCommand::Remove { id, yes } => {
            if !yes && !auth::confirm(&format!("Remove category {id}?"))? {
                println!("Cancelled");
                return Ok(());
            }
            app.client.delete_category(&id).await?;
            println!("Removed {id}");
        }
    }
    Ok(())
}

async fn users(app: &App, command: UsersCommand) -> Result<()> {
    match command {
        UsersCommand::List { page, limit, search } => {
            let list = app.client.list_users(&UserFilters { page, limit, search }).await?;
            print!("{}", render::users(&list));
        }
        UsersCommand::Show { id } => {
            let user = app.client.get_user(&id).await?;
            print!("{}", render::user(&user));
        }
        UsersCommand::Delete { id, yes } => {
            if !yes && !auth::confirm(&format!("Delete user {id}?"))? {
                println!("Cancelled");
                return Ok(());
            }
            app.client.delete_user(&id).await?;
            println!("Deleted user {id}");
        }
    }
    Ok(())
}
