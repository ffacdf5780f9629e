//! Terminal diagnostics.
//!
//! Connects to a TCP/IP terminal (or the in-memory mock), reports its
//! identity and optionally exercises the printer and input collectors. The
//! `classify` and `add-bin` commands work on a local BIN table and need no
//! terminal.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use poi_core::constants::DEFAULT_DEVICE_PORT;
use poi_core::{Amount, DeviceConnectionInfo, ReceiptData, TcpIpConfiguration};
use poi_hardware::MockTransport;
use poi_network::{AnyTransport, TcpTransport, TcpTransportConfig};
use poi_session::printer::BarcodeType;
use poi_session::{BarcodeRequest, DeviceSession, SessionConfig, YesNoInputRequest};
use poi_storage::{BinTableStore, NewBinEntry, SqliteBinTableStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "POI terminal diagnostics", long_about = None)]
struct Args {
    /// Terminal address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Terminal port
    #[arg(long, default_value_t = DEFAULT_DEVICE_PORT)]
    port: u16,

    /// Use the in-memory terminal instead of TCP
    #[arg(long)]
    mock: bool,

    /// Session configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print the terminal identity
    Info,
    /// Print a sample receipt
    TestReceipt,
    /// Print a barcode
    Barcode { data: String },
    /// Ask a yes/no question on the terminal
    Ask { prompt: String },
    /// Look up the card network for a PAN
    Classify {
        #[command(flatten)]
        table: TableArgs,
        pan: String,
    },
    /// Add a BIN range to the table
    AddBin {
        #[command(flatten)]
        table: TableArgs,
        bin: String,
        network: String,
        /// Exact PAN length for this range (0 = any)
        #[arg(long, default_value_t = 0)]
        pan_length: u8,
        #[arg(long)]
        debit: bool,
    },
}

#[derive(clap::Args, Debug)]
struct TableArgs {
    /// Directory holding BIN table files
    #[arg(long, default_value = "bins")]
    dir: PathBuf,

    /// Table name
    #[arg(long, default_value = "default")]
    table: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,poi_session=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Some(Command::Classify { ref table, ref pan }) => classify(table, pan).await,
        Some(Command::AddBin {
            ref table,
            ref bin,
            ref network,
            pan_length,
            debit,
        }) => {
            let entry = NewBinEntry::new(bin.as_str(), network.as_str())
                .pan_length(pan_length)
                .debit(debit);
            add_bin(table, &entry).await
        }
        _ => run_terminal(&args).await,
    }
}

async fn open_table(args: &TableArgs) -> Result<SqliteBinTableStore> {
    let mut store = SqliteBinTableStore::new(&args.dir);
    store
        .open(&args.table)
        .await
        .with_context(|| format!("opening BIN table {:?} in {}", args.table, args.dir.display()))?;
    Ok(store)
}

async fn classify(args: &TableArgs, pan: &str) -> Result<()> {
    let mut store = open_table(args).await?;
    match store.classify(pan).await? {
        Some(entry) => println!(
            "{} ({}) via BIN {}",
            entry.network,
            if entry.is_debit { "debit" } else { "credit" },
            entry.bin
        ),
        None => println!("no matching BIN"),
    }
    store.close().await?;
    Ok(())
}

async fn add_bin(args: &TableArgs, entry: &NewBinEntry) -> Result<()> {
    let mut store = open_table(args).await?;
    let bin_id = store.insert(entry).await?;
    println!("added BIN {} as #{bin_id}", entry.bin);
    store.close().await?;
    Ok(())
}

async fn run_terminal(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    // The mock handle must outlive the session.
    let (transport, _terminal) = if args.mock {
        let (mock, handle) = MockTransport::new();
        (AnyTransport::Mock(mock), Some(handle))
    } else {
        let tcp = TcpTransport::new(TcpTransportConfig::default());
        (AnyTransport::Tcp(tcp), None)
    };

    let session = DeviceSession::spawn(transport, config)?;
    let info = DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new(&args.host, args.port))
        .with_description("poi-diag");

    info!(host = %args.host, port = args.port, mock = args.mock, "connecting");
    let setup = session.connect(info)?.await?;
    if !setup.did_configure_successfully {
        let reason = setup
            .error
            .map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        session.shutdown().await;
        bail!("terminal setup failed: {reason}");
    }

    if let Some(device) = &setup.device_info {
        println!("model:    {}", device.model);
        println!("serial:   {}", device.serial_number);
        println!("firmware: {}", device.firmware);
    }

    let outcome = match &args.command {
        Some(Command::TestReceipt) => print_test_receipt(&session).await,
        Some(Command::Barcode { data }) => session
            .print_barcode(BarcodeRequest::new(BarcodeType::Code128, data.as_str()))?
            .await
            .context("printing barcode"),
        Some(Command::Ask { prompt }) => {
            let answer = session
                .enable_yes_no_input(YesNoInputRequest {
                    prompt: prompt.clone(),
                })?
                .await
                .context("waiting for answer")?;
            println!("answer:   {}", if answer { "yes" } else { "no" });
            Ok(())
        }
        _ => Ok(()),
    };

    if let Err(error) = session.disconnect()?.await {
        warn!(%error, "disconnect failed");
    }
    session.shutdown().await;
    outcome
}

async fn print_test_receipt(session: &DeviceSession) -> Result<()> {
    let receipt = ReceiptData {
        header_lines: vec!["POI DIAGNOSTICS".into(), "TEST RECEIPT".into()],
        merchant_id: Some("000000000001".into()),
        terminal_id: Some("T0001".into()),
        transaction_type: Some("SALE".into()),
        card_type: Some("VISA".into()),
        account_number: Some("************1111".into()),
        entry_type: Some("Chip".into()),
        transaction_amount: Some(Amount::from_cents(1234)),
        approved_amount: Some(Amount::from_cents(1234)),
        transaction_status: Some("APPROVED".into()),
        signature_required: true,
        signature_agreement_text: Some("I AGREE TO PAY THE ABOVE TOTAL AMOUNT".into()),
        date_time: Some(Utc::now()),
        type_of_copy: Some("MERCHANT COPY".into()),
        footer_lines: vec!["THANK YOU".into()],
        ..Default::default()
    };

    session.start_new_receipt()?;
    session.add_receipt_data(&receipt)?;
    session.add_three_columns("ITEM", "QTY", "PRICE")?;
    session.add_three_columns("Widget", "1", "12.34")?;
    session.forward(None)?;
    session
        .send_current_job_to_printer()?
        .await
        .context("printing test receipt")?;
    println!("receipt:  printed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_add_bin() {
        let args = Args::parse_from([
            "poi-diag", "add-bin", "--dir", "/tmp/bins", "411111", "VISA", "--pan-length", "16",
        ]);
        match args.command {
            Some(Command::AddBin {
                table,
                bin,
                network,
                pan_length,
                debit,
            }) => {
                assert_eq!(table.dir, PathBuf::from("/tmp/bins"));
                assert_eq!(table.table, "default");
                assert_eq!(bin, "411111");
                assert_eq!(network, "VISA");
                assert_eq!(pan_length, 16);
                assert!(!debit);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_defaults_to_terminal_info() {
        let args = Args::parse_from(["poi-diag", "--mock"]);
        assert!(args.mock);
        assert_eq!(args.port, DEFAULT_DEVICE_PORT);
        assert!(args.command.is_none());
    }
}
