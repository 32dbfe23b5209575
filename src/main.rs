// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use grain_ledger::{
    bin_status, reconcile, BackupPolicy, DeliveryRequest, FarmSession, FarmSummary,
    LedgerWarning, Settings, Table, UnloadRequest,
};

#[derive(Parser)]
#[command(name = "grain-ledger", version, about = "Farm bin & delivery tracker")]
struct Cli {
    /// Config file (defaults to ./grain-ledger.toml if present)
    #[arg(long, global = true, env = "GRAIN_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the tables (and placeholder bins) if they don't exist
    Init,
    /// Current bin status
    Status,
    /// Farm totals and grain by variety
    Dashboard,
    /// Deliveries and unloads, newest first
    Records {
        #[arg(long)]
        bin: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Log a delivery into a bin
    Deliver {
        bin: String,
        bushels: f64,
        #[arg(long, default_value = "")]
        variety: String,
        #[arg(long, default_value = "")]
        truck: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Unload grain from a bin
    Unload {
        bin: String,
        bushels: f64,
        #[arg(long, default_value = "")]
        destination: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    AddBin {
        name: String,
        #[arg(long, default_value_t = 0.0)]
        capacity: f64,
        #[arg(long, default_value = "")]
        variety: String,
    },
    /// Edit capacity and/or variety (variety edits are not checked against fill)
    UpdateBin {
        name: String,
        #[arg(long)]
        capacity: Option<f64>,
        #[arg(long)]
        variety: Option<String>,
    },
    RemoveBin {
        name: String,
    },
    /// Release an empty bin's variety
    ClearVariety {
        name: String,
    },
    /// Set every bin to 0 bu (varieties are kept)
    ResetFill,
    ClearDeliveries,
    ClearUnloads,
    /// Snapshot the tables now
    Backup {
        #[arg(long, default_value = "manual")]
        label: String,
    },
    /// List snapshots
    Backups,
    /// Replace tables from a snapshot
    Restore {
        id: String,
        /// bins, deliveries or unloads (default: all three)
        #[arg(long)]
        table: Option<Table>,
    },
    /// Compare bin fill with the delivery/unload log
    Reconcile,
    /// Terminal dashboard
    Ui,
}

impl Command {
    fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Status
                | Command::Dashboard
                | Command::Records { .. }
                | Command::Backups
                | Command::Reconcile
        )
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::new(cli.config.as_deref()).context("Failed to load settings")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    // default: status
    let command = cli.command.unwrap_or(Command::Status);

    // read-only commands don't take session snapshots
    let policy = if command.is_read_only() {
        BackupPolicy::Never
    } else {
        settings.backup.policy
    };

    let mut session = FarmSession::open(
        settings.open_store()?,
        settings.backup_manager(),
        policy,
        settings.farm.seed_bins,
    )?;

    match command {
        Command::Init => {
            println!("🌾 Farm ready: {}", session.store_description());
            println!("✓ {} bins", session.registry().len());
            println!("✓ {} deliveries", session.log().deliveries().len());
            println!("✓ {} unloads", session.log().unloads().len());
        }
        Command::Status => print_status(&session),
        Command::Dashboard => print_dashboard(&session),
        Command::Records { bin, limit } => print_records(&session, bin.as_deref(), limit),
        Command::Deliver {
            bin,
            bushels,
            variety,
            truck,
            notes,
        } => {
            let request = DeliveryRequest::new(&bin, &variety, bushels)
                .truck(&truck)
                .notes(&notes);
            let outcome = session.record_delivery(&request)?;
            print_warning(outcome.warning.as_ref());
            println!(
                "✓ Added {} bu of {} to {} (now {} bu)",
                outcome.accepted, outcome.variety, outcome.bin, outcome.fill_after
            );
        }
        Command::Unload {
            bin,
            bushels,
            destination,
            notes,
        } => {
            let request = UnloadRequest::new(&bin, bushels, &destination).notes(&notes);
            let outcome = session.record_unload(&request)?;
            print_warning(outcome.warning.as_ref());
            println!(
                "✓ Unloaded {} bu from {} (now {} bu)",
                outcome.taken, outcome.bin, outcome.fill_after
            );
        }
        Command::AddBin {
            name,
            capacity,
            variety,
        } => {
            let bin = session.add_bin(&name, capacity, &variety)?;
            println!("✓ {} added", bin.name);
        }
        Command::UpdateBin {
            name,
            capacity,
            variety,
        } => {
            let before = session.registry().get(&name).cloned();
            let bin = session.update_bin(&name, capacity, variety.as_deref())?;
            if let Some(before) = before {
                if !before.is_empty() && before.variety != bin.variety {
                    println!(
                        "⚠️  Variety of a non-empty bin changed: {} → {}",
                        before.variety, bin.variety
                    );
                }
            }
            println!("✓ {} updated", bin.name);
        }
        Command::RemoveBin { name } => {
            let bin = session.remove_bin(&name)?;
            println!("✓ {} removed", bin.name);
        }
        Command::ClearVariety { name } => {
            let bin = session.clear_variety(&name)?;
            println!("✓ {} variety cleared", bin.name);
        }
        Command::ResetFill => {
            let count = session.reset_all_fill()?;
            println!("✓ {} bins reset to 0 bushels", count);
        }
        Command::ClearDeliveries => {
            let count = session.clear_deliveries()?;
            println!("✓ Deliveries cleared ({} removed)", count);
        }
        Command::ClearUnloads => {
            let count = session.clear_unloads()?;
            println!("✓ Unloads cleared ({} removed)", count);
        }
        Command::Backup { label } => match session.snapshot(&label)? {
            Some(manifest) => println!("✓ Snapshot {}", manifest.id),
            None => println!("⚠️  Backups are disabled in settings"),
        },
        Command::Backups => print_backups(&session)?,
        Command::Restore { id, table } => {
            session.restore(&id, table)?;
            let what = table.map(|t| t.name()).unwrap_or("all tables");
            println!("✓ Restored {} from {}", what, id);
        }
        Command::Reconcile => {
            let report = reconcile(session.registry(), session.log());
            if report.is_balanced() {
                println!("✓ {} bins match the log", report.bins_checked);
            } else {
                println!("⚠️  {} bins differ from the log:", report.discrepancies.len());
                for d in &report.discrepancies {
                    println!(
                        "   {:<12} in {:>10.0}  out {:>10.0}  expected {:>10.0}  actual {:>10.0}",
                        d.bin, d.delivered, d.unloaded, d.expected_fill, d.actual_fill
                    );
                }
            }
            if report.orphaned_entries > 0 {
                println!("⚠️  {} log entries name bins that no longer exist", report.orphaned_entries);
            }
        }
        Command::Ui => return run_ui_mode(session),
    }

    session.close()?;
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(session: FarmSession) -> Result<()> {
    let mut app = ui::App::new(session);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    app.into_session().close()?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_session: FarmSession) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin grain-server --features server");
    std::process::exit(1);
}

fn print_warning(warning: Option<&LedgerWarning>) {
    if let Some(warning) = warning {
        println!("⚠️  {}", warning);
    }
}

fn print_status(session: &FarmSession) {
    let rows = bin_status(session.registry());
    if rows.is_empty() {
        println!("No bins yet.");
        return;
    }

    println!(
        "{:<14} {:<14} {:>12} {:>12} {:>12} {:>6}",
        "Bin", "Variety", "Capacity", "In Bin", "Remaining", "Full"
    );
    println!("{}", "━".repeat(75));
    for row in rows {
        let remaining = row
            .remaining
            .map(|r| format!("{:.0}", r))
            .unwrap_or_else(|| "-".to_string());
        let flag = if row.over_capacity { "  ⚠️ over capacity" } else { "" };
        println!(
            "{:<14} {:<14} {:>12.0} {:>12.0} {:>12} {:>5.0}%{}",
            row.bin, row.variety, row.capacity, row.in_bin, remaining, row.percent_full, flag
        );
    }
}

fn print_dashboard(session: &FarmSession) {
    let summary = FarmSummary::from_registry(session.registry());

    println!("🌾 Farm Totals & Varieties");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Bins:                {}", summary.bin_count);
    println!("Total Capacity (bu): {:.0}", summary.total_capacity);
    println!("Grain in Bins (bu):  {:.0}", summary.total_in_bins);
    if summary.uncapped_bins > 0 {
        println!("Uncapped bins:       {}", summary.uncapped_bins);
    }

    println!("\nGrain by Variety");
    if summary.by_variety.is_empty() {
        println!("No grain in bins yet.");
    }
    for v in &summary.by_variety {
        println!("  {:<16} {:>12.0} bu  ({} bins)", v.variety, v.bushels, v.bins);
    }
}

fn print_records(session: &FarmSession, bin: Option<&str>, limit: usize) {
    let keep = |name: &str| bin.map(|b| b == name).unwrap_or(true);

    println!("🚚 Deliveries");
    for d in session
        .log()
        .deliveries_newest_first()
        .into_iter()
        .filter(|d| keep(&d.bin))
        .take(limit)
    {
        println!(
            "  {}  {:<10} {:<12} {:<12} {:>10.0} bu  {}",
            d.timestamp, d.truck, d.bin, d.variety, d.bushels, d.notes
        );
    }

    println!("\n⬇️  Unloads");
    for u in session
        .log()
        .unloads_newest_first()
        .into_iter()
        .filter(|u| keep(&u.bin))
        .take(limit)
    {
        println!(
            "  {}  {:<12} {:<12} {:>10.0} bu  → {:<14} {}",
            u.timestamp, u.bin, u.variety, u.bushels, u.destination, u.notes
        );
    }
}

fn print_backups(session: &FarmSession) -> Result<()> {
    let Some(backups) = session.backups() else {
        println!("⚠️  Backups are disabled in settings");
        return Ok(());
    };

    let manifests = backups.list()?;
    if manifests.is_empty() {
        println!("No snapshots in {}", backups.dir().display());
    }
    for m in manifests {
        println!(
            "{}  {}  bins {:>3}  deliveries {:>5}  unloads {:>5}",
            m.id,
            m.created_at.format("%Y-%m-%d %H:%M:%S"),
            m.rows(Table::Bins),
            m.rows(Table::Deliveries),
            m.rows(Table::Unloads)
        );
    }
    Ok(())
}
