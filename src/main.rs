//! ledger-forensics CLI
//!
//! Control log level with RUST_LOG:
//!   RUST_LOG=debug ledger-forensics analyze ...
//!   RUST_LOG=ledger_forensics::detectors=trace ledger-forensics analyze ...

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use ledger_forensics::evidence::{EvidenceType, HashAlgorithm, NewCustodyEntry, NewEvidence};
use ledger_forensics::report::OutputFormat;
use ledger_forensics::transaction::parse_date;
use ledger_forensics::{
    logging, Caller, Database, EngineConfig, EngineError, EngineResult, ForensicEngine, InMemoryLedger,
    InvestigationStatus, NewInvestigation,
};

#[derive(Parser)]
#[command(name = "ledger-forensics")]
#[command(about = "Forensic financial analysis - risk scoring, anomaly detection and case reporting", long_about = None)]
struct Cli {
    /// Case database path (defaults to the local data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Acting user id
    #[arg(short, long, global = true, env = "LEDGER_FORENSICS_USER", default_value = "local")]
    user: String,

    /// Verbose logging with file:line and thread ids
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new investigation
    CreateCase {
        /// Case title
        title: String,
        #[arg(long)]
        case_number: Option<String>,
        #[arg(long)]
        allegations: Option<String>,
        #[arg(long)]
        lead: Option<String>,
    },

    /// List the acting user's investigations
    ListCases,

    /// Move an investigation forward (open, in_progress, completed, closed)
    Status {
        investigation_id: String,
        status: String,
    },

    /// Reopen a completed or closed investigation
    Reopen { investigation_id: String },

    /// Register an evidence item
    AddEvidence {
        investigation_id: String,
        evidence_number: String,
        /// bank_statement, invoice, email, ledger_export, ...
        evidence_type: String,
        description: String,
        /// File to hash on registration
        #[arg(long)]
        file: Option<PathBuf>,
        /// md5, sha1, sha256, sha512, blake3
        #[arg(long, default_value = "sha256")]
        algorithm: String,
    },

    /// Record a chain-of-custody hand-off
    Custody {
        evidence_id: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        purpose: String,
        #[arg(long)]
        location: Option<String>,
    },

    /// Re-hash an evidence file against its recorded digest
    Verify { evidence_id: String, file: PathBuf },

    /// Score every transaction and run all detectors
    Analyze {
        investigation_id: String,
        /// JSON array of transactions
        #[arg(short, long)]
        transactions: PathBuf,
    },

    /// Direct loss over transactions judged improper
    DirectLoss {
        investigation_id: String,
        #[arg(short, long)]
        transactions: PathBuf,
        /// Transaction ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Pre-judgment interest on a loss
    Interest {
        amount: Decimal,
        /// Loss date (YYYY-MM-DD or RFC 3339)
        loss_date: String,
        /// Annual rate as a fraction, e.g. 0.05
        rate: Decimal,
    },

    /// Print the investigation summary
    Summary {
        investigation_id: String,
        /// markdown or json
        #[arg(short, long, default_value = "markdown")]
        format: String,
    },

    /// Render the executive summary and store it as a report
    Publish { investigation_id: String },
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledger-forensics")
        .join("forensics.db")
}

fn open_engine(cli: &Cli, ledger: InMemoryLedger) -> EngineResult<ForensicEngine<InMemoryLedger>> {
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    ForensicEngine::new(Database::open(&db_path)?, ledger, config)
}

fn load_ledger(owner_id: &str, path: &Path) -> EngineResult<InMemoryLedger> {
    let mut ledger = InMemoryLedger::new();
    let count = ledger.load_json_file(owner_id, path)?;
    tracing::info!(count, path = %path.display(), "Transactions loaded");
    Ok(ledger)
}

fn print_json<T: serde::Serialize>(value: &T) -> EngineResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: &Cli) -> EngineResult<()> {
    let caller = Caller::new(cli.user.as_str());

    match &cli.command {
        Commands::CreateCase {
            title,
            case_number,
            allegations,
            lead,
        } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let mut new = NewInvestigation::titled(title.as_str());
            new.case_number = case_number.clone();
            new.allegations = allegations.clone();
            new.lead_investigator = lead.clone();
            print_json(&engine.create_investigation(&caller, new)?)
        }
        Commands::ListCases => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            print_json(&engine.list_investigations(&caller, &caller.user_id)?)
        }
        Commands::Status {
            investigation_id,
            status,
        } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let status: InvestigationStatus = status.parse()?;
            print_json(&engine.update_investigation_status(&caller, investigation_id, status)?)
        }
        Commands::Reopen { investigation_id } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            print_json(&engine.reopen_investigation(&caller, investigation_id)?)
        }
        Commands::AddEvidence {
            investigation_id,
            evidence_number,
            evidence_type,
            description,
            file,
            algorithm,
        } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let evidence_type: EvidenceType = evidence_type.parse()?;
            let mut new = NewEvidence::new(
                investigation_id.as_str(),
                evidence_number.as_str(),
                evidence_type,
                description.as_str(),
            );
            new.file_path = file.clone();
            new.hash_algorithm = Some(algorithm.parse::<HashAlgorithm>()?);
            print_json(&engine.add_evidence(&caller, new)?)
        }
        Commands::Custody {
            evidence_id,
            to,
            by,
            purpose,
            location,
        } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let mut entry = NewCustodyEntry::new(to.as_str(), by.as_str(), purpose.as_str());
            if let Some(location) = location {
                entry = entry.at_location(location.as_str());
            }
            print_json(&engine.append_custody_entry(&caller, evidence_id, entry)?)
        }
        Commands::Verify { evidence_id, file } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let check = engine.verify_evidence_integrity(&caller, evidence_id, file)?;
            print_json(&check)?;
            if !check.matches {
                return Err(EngineError::validation("Evidence content does not match its recorded hash"));
            }
            Ok(())
        }
        Commands::Analyze {
            investigation_id,
            transactions,
        } => {
            let engine = open_engine(cli, load_ledger(&caller.user_id, transactions)?)?;
            print_json(&engine.run_comprehensive_analysis(&caller, investigation_id)?)
        }
        Commands::DirectLoss {
            investigation_id,
            transactions,
            ids,
        } => {
            let engine = open_engine(cli, load_ledger(&caller.user_id, transactions)?)?;
            print_json(&engine.calculate_direct_loss(&caller, investigation_id, ids)?)
        }
        Commands::Interest {
            amount,
            loss_date,
            rate,
        } => {
            let loss_date = parse_date(loss_date)
                .ok_or_else(|| EngineError::validation(format!("Unrecognized date '{}'", loss_date)))?;
            let interest = ledger_forensics::damages::pre_judgment_interest(*amount, loss_date, *rate)?;
            println!("{}", interest);
            Ok(())
        }
        Commands::Summary {
            investigation_id,
            format,
        } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let format: OutputFormat = format.parse()?;
            println!("{}", engine.render_investigation_summary(&caller, investigation_id, format)?);
            Ok(())
        }
        Commands::Publish { investigation_id } => {
            let engine = open_engine(cli, InMemoryLedger::new())?;
            let report = engine.publish_executive_summary(&caller, investigation_id)?;
            println!("{}", engine.export_report_json(&caller, &report.id)?);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init_verbose();
    } else {
        logging::init();
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
