use clap::Parser;
use miette::{IntoDiagnostic, Result};
use mockable::{Clock, DefaultClock};
use slotkeeper::application::membership::MembershipService;
use slotkeeper::application::notifier::Notifier;
use slotkeeper::application::reservation::ReservationService;
use slotkeeper::application::sweeper::ExpirySweeper;
use slotkeeper::config::Settings;
use slotkeeper::domain::ports::{LedgerStoreRef, NotificationSinkRef};
use slotkeeper::infrastructure::in_memory::InMemoryLedger;
use slotkeeper::infrastructure::notify::{QueuedSink, TracingSink};
use slotkeeper::interfaces::batch::BatchRunner;
use slotkeeper::interfaces::csv::outcome_writer::OutcomeWriter;
use slotkeeper::interfaces::csv::request_reader::RequestReader;
use slotkeeper::interfaces::fixture::Fixture;
use slotkeeper::telemetry;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Fixture JSON with classes, payments and memberships to seed
    fixture: PathBuf,

    /// Requests CSV file
    requests: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// TOML configuration file (optional)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    telemetry::init(&settings.logging);

    let db_path = cli.db_path.or_else(|| settings.store.path.clone());
    let store = open_store(db_path, settings.store.lock_timeout())?;

    let fixture = File::open(&cli.fixture).into_diagnostic()?;
    Fixture::from_reader(fixture)
        .into_diagnostic()?
        .seed(store.as_ref())
        .await
        .into_diagnostic()?;

    let tracing_sink: NotificationSinkRef = Arc::new(TracingSink);
    let (queue, delivery) =
        QueuedSink::spawn(tracing_sink, settings.notifications.queue_capacity);
    let notifier = Notifier::new(Arc::new(queue));
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let operation_timeout = settings.booking.operation_timeout();

    let sweeper = Arc::new(ExpirySweeper::new(
        store.clone(),
        clock.clone(),
        settings.sweeper.interval(),
        settings.sweeper.jitter(),
    ));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let background = settings.sweeper.enabled.then(|| {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.run(cancel_rx).await })
    });

    let runner = BatchRunner::new(
        ReservationService::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            operation_timeout,
        ),
        MembershipService::new(store, notifier, clock, operation_timeout),
        sweeper,
    );

    let requests = File::open(&cli.requests).into_diagnostic()?;
    let reader = RequestReader::new(requests).into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    for (line, request) in reader.requests() {
        match request {
            Ok(request) => {
                let outcome = runner.execute(line, request).await;
                writer.write(&outcome).into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading request on line {line}: {e}");
            }
        }
    }
    writer.flush().into_diagnostic()?;

    let _ = cancel_tx.send(true);
    if let Some(background) = background {
        let _ = background.await;
    }
    // Queued notifications drain once the last sender is gone.
    drop(runner);
    let _ = tokio::time::timeout(Duration::from_secs(1), delivery).await;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>, lock_timeout: Duration) -> Result<LedgerStoreRef> {
    use slotkeeper::infrastructure::rocksdb::RocksDbLedger;

    let store: LedgerStoreRef = match db_path {
        Some(path) => Arc::new(RocksDbLedger::open_rocksdb(path, lock_timeout).into_diagnostic()?),
        None => Arc::new(InMemoryLedger::in_memory(lock_timeout)),
    };
    Ok(store)
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>, lock_timeout: Duration) -> Result<LedgerStoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryLedger::in_memory(lock_timeout)))
}
