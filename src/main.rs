use {
    chrono::{DateTime, NaiveDate, Utc},
    clap::{Args, Parser, Subcommand},
    payrec::adapters::csv::StatementReader,
    payrec::config::AppConfig,
    payrec::domain::account::AccountNumber,
    payrec::domain::error::EngineError,
    payrec::domain::store::{BatchFilter, PaymentStore},
    payrec::handlers::build_handlers,
    payrec::infra::postgres::PgPaymentStore,
    payrec::processors::{AssignmentContext, ProcessorRegistry},
    payrec::services::assignment::{assign_payment, default_tax_date},
    payrec::services::callbacks::build_callbacks,
    payrec::services::card_sync::update_card_payment_states,
    payrec::services::import::{ImportStats, import_payments},
    payrec::services::scheduler::{RunOutcome, process_payments},
    sqlx::postgres::PgPoolOptions,
    std::path::PathBuf,
    std::process::ExitCode,
    std::time::Duration,
    tracing::{error, info, warn},
    uuid::Uuid,
};

#[derive(Parser)]
#[command(name = "payrec", about = "Bank and card payment reconciliation jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import payments from bank statement CSV files.
    Import(ImportArgs),
    /// Process unprocessed payments with the configured processor chain.
    Process(ProcessArgs),
    /// Update card payment states from their gateways.
    SyncCards(SyncArgs),
    /// Manually assign one payment to a processor.
    Assign(AssignArgs),
    /// Run pending database migrations.
    Migrate,
}

#[derive(Args)]
struct ImportArgs {
    /// Account number the statements belong to.
    #[arg(long)]
    account: String,

    /// Statement files; `-` reads standard input.
    #[arg(default_value = "-")]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct ProcessArgs {
    /// Only payments created at or after this ISO datetime.
    #[arg(short = 'f', long = "from")]
    time_from: Option<DateTime<Utc>>,

    /// Only payments created at or before this ISO datetime.
    #[arg(short = 't', long = "to")]
    time_to: Option<DateTime<Utc>>,

    /// Comma separated account numbers that should be included.
    #[arg(long, value_delimiter = ',', conflicts_with = "exclude_accounts")]
    include_accounts: Option<Vec<String>>,

    /// Comma separated account numbers that should be excluded.
    #[arg(long, value_delimiter = ',')]
    exclude_accounts: Option<Vec<String>>,
}

#[derive(Args)]
struct SyncArgs {
    #[arg(short = 'f', long = "from")]
    time_from: Option<DateTime<Utc>>,

    #[arg(short = 't', long = "to")]
    time_to: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct AssignArgs {
    /// UUID of the payment to assign.
    payment: Uuid,

    /// Target processor name.
    #[arg(long)]
    processor: String,

    /// Client reference handed to the processor as a hint.
    #[arg(long, default_value = "")]
    client_id: String,

    /// Tax date; defaults from the payment's transaction date where a safe
    /// default exists.
    #[arg(long)]
    tax_date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            error!(%error, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await?;

    if let Command::Migrate = cli.command {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("migrations applied");
        return Ok(ExitCode::SUCCESS);
    }

    let store = PgPaymentStore::new(pool, config.run_lock_key);

    match cli.command {
        Command::Migrate => unreachable!("handled above"),
        Command::Import(args) => run_import(&store, &config, args).await,
        Command::Process(args) => run_process(&store, &config, args).await,
        Command::SyncCards(args) => run_sync_cards(&store, &config, args).await,
        Command::Assign(args) => run_assign(&store, &config, args).await,
    }
}

async fn run_import(
    store: &PgPaymentStore,
    config: &AppConfig,
    args: ImportArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    info!("command import started");
    let callbacks = build_callbacks(&config.import_callbacks, config.ignore_processor())?;

    let number = AccountNumber::new(args.account);
    let account = store
        .account_by_number(&number)
        .await?
        .ok_or_else(|| format!("bank account {number} does not exist"))?;

    let batch = store.open_import_batch("import").await?;
    let mut total = ImportStats::default();
    for file in &args.files {
        let name = file.display().to_string();
        store.append_import_file(batch, &name).await?;

        let contents = if name == "-" {
            std::io::read_to_string(std::io::stdin())
        } else {
            std::fs::read_to_string(file)
        };
        let contents = match contents {
            Ok(contents) => contents,
            Err(err) => {
                error!(file = %name, %err, "could not read statement file");
                total.errors += 1;
                continue;
            }
        };

        let mut records = Vec::new();
        for result in StatementReader::new(contents.as_bytes()).records() {
            match result {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(file = %name, %err, "statement row not imported");
                    total.errors += 1;
                }
            }
        }

        let stats = import_payments(store, &account, records, &callbacks).await?;
        total.absorb(stats);
    }
    store.add_import_errors(batch, total.errors).await?;
    store.close_import_batch(batch).await?;

    info!(
        imported = total.imported,
        skipped = total.skipped,
        errors = total.errors,
        "command import finished"
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_process(
    store: &PgPaymentStore,
    config: &AppConfig,
    args: ProcessArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    info!("command process started");
    let registry = ProcessorRegistry::from_config(&config.processors);
    let filter = BatchFilter {
        time_from: args.time_from,
        time_to: args.time_to,
        include_accounts: args
            .include_accounts
            .map(|numbers| numbers.into_iter().map(AccountNumber::new).collect()),
        exclude_accounts: args
            .exclude_accounts
            .map(|numbers| numbers.into_iter().map(AccountNumber::new).collect()),
    };

    match process_payments(store, &registry, &filter).await {
        Ok(RunOutcome::Completed { claimed }) => {
            info!(claimed, "command process finished");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::LockBusy) => {
            // Contention with another run is a soft no-op, exit zero.
            warn!("command process is already running, terminating");
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ EngineError::UnknownAccounts(_)) => {
            error!(%err, "terminating");
            Ok(ExitCode::FAILURE)
        }
        Err(other) => Err(other.into()),
    }
}

async fn run_sync_cards(
    store: &PgPaymentStore,
    config: &AppConfig,
    args: SyncArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    info!("command sync-cards started");
    let handlers = build_handlers(&config.card_handlers, config.stripe.as_ref())?;
    let stats =
        update_card_payment_states(store, &handlers, args.time_from, args.time_to).await?;
    info!(
        updated = stats.updated,
        failed = stats.failed,
        skipped = stats.skipped,
        "command sync-cards finished"
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_assign(
    store: &PgPaymentStore,
    config: &AppConfig,
    args: AssignArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let registry = ProcessorRegistry::from_config(&config.processors);

    let tax_date = match args.tax_date {
        Some(date) => Some(date),
        None => {
            let payment = store
                .payment_by_uuid(args.payment)
                .await?
                .ok_or_else(|| format!("payment {} does not exist", args.payment))?;
            payment
                .transaction_date
                .and_then(|date| default_tax_date(date, Utc::now().date_naive()))
        }
    };

    let ctx = AssignmentContext {
        client_id: args.client_id,
        tax_date,
    };
    match assign_payment(store, &registry, args.payment, &args.processor, ctx).await {
        Ok(()) => {
            info!(payment = %args.payment, processor = %args.processor, "payment assigned");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(%err, "assignment failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
