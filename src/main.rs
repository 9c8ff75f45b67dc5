mod cli;
mod config;
mod discovery;
mod error;
mod ledger;
mod notify;
mod reclaim;
mod storage;
mod utils;
mod verify;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info, warn};

use cli::{Cli, Commands, WhitelistAction};
use config::Config;
use discovery::{DiscoveryEngine, ScanOptions};
use ledger::LedgerClient;
use notify::Notifier;
use reclaim::{ReclaimEngine, ReclaimPolicy, ReclaimSummary, TreasurySweeper};
use storage::{AccountStatus, Database};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rent_warden=debug,info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Scan {
            verbose,
            force_verify,
            limit,
        } => scan_accounts(&config, verbose, force_verify, limit).await,

        Commands::Reclaim {
            pubkey,
            yes,
            dry_run,
        } => reclaim_accounts(&config, pubkey, yes, dry_run).await,

        Commands::Auto { interval, dry_run } => {
            info!("Starting automated reclaim service (interval: {}s)", interval);
            run_auto_service(&config, interval, dry_run).await
        }

        Commands::Stats { format } => show_stats(&config, &format),

        Commands::Whitelist { action } => manage_whitelist(&config, action),

        Commands::Init => initialize(&config),
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

/// Open the store and seed the whitelist from config.
fn open_database(config: &Config) -> error::Result<Arc<Database>> {
    let db = Arc::new(Database::new(&config.database.path)?);
    for address in &config.reclaim.whitelist {
        db.add_whitelist(address, Some("config"))?;
    }
    Ok(db)
}

fn build_discovery(config: &Config, db: Arc<Database>) -> DiscoveryEngine {
    let client = ledger::provider::select_client(config);
    let in_flight = Arc::new(Mutex::new(HashSet::new()));
    DiscoveryEngine::new(client, db, in_flight)
}

fn build_reclaim(
    config: &Config,
    client: Arc<dyn LedgerClient>,
    db: Arc<Database>,
    dry_run: bool,
) -> error::Result<ReclaimEngine> {
    let signer = config.load_operator_keypair()?;
    let treasury = config
        .treasury_destination()?
        .unwrap_or(config.operator_pubkey()?);

    let mut policy = ReclaimPolicy::from_config(config);
    policy.dry_run = policy.dry_run || dry_run;

    Ok(ReclaimEngine::new(
        client,
        db,
        signer,
        treasury,
        policy,
        Notifier::from_config(config),
    ))
}

async fn scan_accounts(
    config: &Config,
    verbose: bool,
    force_verify: bool,
    limit: Option<usize>,
) -> error::Result<()> {
    let operator = config.operator_pubkey()?;
    let db = open_database(config)?;
    let engine = build_discovery(config, db);

    println!("{}", format!("Scanning history for {}...", operator).cyan());
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let report = engine
        .scan(
            operator,
            ScanOptions {
                wait_for_sync: true,
                force_verify,
                max_items: limit,
            },
        )
        .await?;
    spinner.finish_and_clear();

    let reclaimable: Vec<_> = report
        .accounts
        .iter()
        .filter(|account| account.status == AccountStatus::Reclaimable)
        .collect();
    let reclaimable_lamports: u64 = reclaimable.iter().map(|a| a.deposit_lamports).sum();

    println!("\n{}", "=== Scan Results ===".cyan().bold());
    println!("Tracked Accounts:   {}", report.accounts.len());
    println!(
        "Reclaimable:        {} ✓",
        reclaimable.len().to_string().green()
    );
    println!(
        "Reclaimable Value:  {}",
        utils::format_sol(reclaimable_lamports)
    );
    if let Some(checkpoint) = &report.checkpoint {
        println!(
            "First Scan:         {}",
            if checkpoint.first_scan_complete {
                "complete".green()
            } else {
                "partial".yellow()
            }
        );
        if let Some(synced) = &checkpoint.last_synced_at {
            println!("Last Sync:          {}", utils::format_timestamp(synced));
        }
    }

    if verbose && !reclaimable.is_empty() {
        println!("\n{}", "Reclaimable Accounts:".yellow());
        utils::print_table_border(104);
        utils::print_table_row(&["Address", "Deposit", "First Seen", "Source"], &[44, 18, 20, 18]);
        utils::print_table_border(104);
        for account in &reclaimable {
            utils::print_table_row(
                &[
                    &account.address,
                    &utils::format_sol(account.deposit_lamports),
                    &utils::format_timestamp(&account.first_seen_at),
                    &account.source,
                ],
                &[44, 18, 20, 18],
            );
        }
        utils::print_table_border(104);
    }

    Ok(())
}

async fn reclaim_accounts(
    config: &Config,
    pubkey: Option<String>,
    yes: bool,
    dry_run: bool,
) -> error::Result<()> {
    let db = open_database(config)?;
    let client = ledger::provider::select_client(config);
    let engine = build_reclaim(config, client, db, dry_run)?;

    let summary = match pubkey {
        Some(raw) => {
            let address = Pubkey::from_str(&raw)?;
            println!("{}", format!("Reclaiming account: {}", address).cyan());
            if !yes && !dry_run && !utils::confirm_action("Close this account and recover its deposit?")
            {
                println!("Cancelled");
                return Ok(());
            }
            engine.reclaim_accounts(&[address]).await?
        }
        None => {
            println!("{}", "Reclaiming all eligible accounts...".cyan());
            if !yes && !dry_run && !utils::confirm_action("Proceed with batch reclaim?") {
                println!("Cancelled");
                return Ok(());
            }
            engine.reclaim_eligible().await?
        }
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ReclaimSummary) {
    println!("\n{}", "=== Reclaim Summary ===".cyan().bold());
    if summary.dry_run {
        println!("{}", "DRY RUN: no transactions were sent".yellow());
    }
    println!("Attempted:   {}", summary.attempted);
    println!("Reclaimed:   {} ✓", summary.reclaimed.to_string().green());
    println!("Failed:      {} ✗", summary.failed.to_string().red());
    println!("Revived:     {}", summary.revived);
    if summary.skipped_whitelisted > 0 {
        println!("Whitelisted: {}", summary.skipped_whitelisted);
    }
    if summary.skipped_cooldown > 0 {
        println!("Cooling:     {}", summary.skipped_cooldown);
    }
    println!(
        "Recovered:   {}",
        utils::format_sol(summary.lamports_recovered)
    );
    for signature in &summary.signatures {
        println!("  tx {}", signature);
    }
}

async fn run_auto_service(config: &Config, interval: u64, dry_run: bool) -> error::Result<()> {
    let operator = config.operator_pubkey()?;
    let db = open_database(config)?;
    let client = ledger::provider::select_client(config);
    let discovery = build_discovery(config, db.clone());

    loop {
        info!("Running discovery cycle...");
        match discovery
            .scan(
                operator,
                ScanOptions {
                    wait_for_sync: true,
                    ..Default::default()
                },
            )
            .await
        {
            Ok(report) => info!("tracking {} accounts", report.accounts.len()),
            Err(e) => warn!("discovery failed: {}", e),
        }

        match build_reclaim(config, client.clone(), db.clone(), dry_run) {
            Ok(engine) => match engine.reclaim_eligible().await {
                Ok(summary) => {
                    if summary.reclaimed > 0 || summary.failed > 0 {
                        print_summary(&summary);
                    } else {
                        info!("no eligible accounts this cycle");
                    }
                }
                Err(e) => warn!("reclaim cycle failed: {}", e),
            },
            Err(e) => {
                error!("cannot build reclaim engine: {}", e);
                return Err(e);
            }
        }

        // Post-cycle sweep when a forwarding destination is configured.
        if let Some(destination) = config.treasury_destination()? {
            if !dry_run && !config.reclaim.dry_run {
                let sweeper = TreasurySweeper::new(
                    client.clone(),
                    config.load_operator_keypair()?,
                    destination,
                    config.treasury_reserve_lamports(),
                );
                match sweeper.sweep().await {
                    Ok(Some((signature, lamports))) => {
                        info!("swept {} | {}", utils::format_sol(lamports), signature)
                    }
                    Ok(None) => {}
                    Err(e) => warn!("treasury sweep failed: {}", e),
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
    }
}

fn show_stats(config: &Config, format: &str) -> error::Result<()> {
    let operator = config.operator_pubkey()?;
    let db = open_database(config)?;
    let stats = db.get_stats(&operator.to_string())?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== Rent Warden Statistics ===".cyan().bold());
    println!("\nAccounts:");
    println!("  Total:       {}", stats.total_accounts);
    println!("  Active:      {}", stats.active.to_string().green());
    println!("  Reclaimable: {}", stats.reclaimable.to_string().yellow());
    println!("  Locked:      {}", stats.locked);
    println!("  Closed:      {}", stats.closed);
    println!("  Reclaimed:   {}", stats.reclaimed.to_string().cyan());
    println!("  Error:       {}", stats.error.to_string().red());

    println!("\nValue:");
    println!(
        "  Reclaimable: {}",
        utils::format_sol(stats.reclaimable_lamports)
    );
    println!(
        "  Recovered:   {}",
        utils::format_sol(stats.reclaimed_lamports)
    );
    println!("  Fees Spent:  {}", utils::format_sol(stats.fee_lamports));

    let history = db.recent_reclaims(&operator.to_string(), 10)?;
    if !history.is_empty() {
        println!("\n{}", "Recent Reclaims:".yellow());
        utils::print_table_border(100);
        utils::print_table_row(&["Reclaimed At", "Account", "Amount", "Signature"], &[22, 44, 15, 20]);
        utils::print_table_border(100);
        for account in history {
            utils::print_table_row(
                &[
                    &account
                        .reclaimed_at
                        .map(|t| utils::format_timestamp(&t))
                        .unwrap_or_default(),
                    &utils::format_pubkey(&account.address),
                    &utils::format_sol(account.reclaimed_lamports.unwrap_or(0)),
                    &utils::format_pubkey(account.reclaim_signature.as_deref().unwrap_or("-")),
                ],
                &[22, 44, 15, 20],
            );
        }
        utils::print_table_border(100);
    }

    Ok(())
}

fn manage_whitelist(config: &Config, action: WhitelistAction) -> error::Result<()> {
    let db = open_database(config)?;

    match action {
        WhitelistAction::Add { address, label } => {
            // Validate before persisting.
            Pubkey::from_str(&address)?;
            db.add_whitelist(&address, label.as_deref())?;
            println!("{}", format!("✓ {} exempted from reclaim", address).green());
        }
        WhitelistAction::Remove { address } => {
            if db.remove_whitelist(&address)? {
                println!("{}", format!("✓ {} removed from whitelist", address).green());
            } else {
                println!("{}", format!("{} was not whitelisted", address).yellow());
            }
        }
        WhitelistAction::List => {
            let entries = db.get_whitelist()?;
            if entries.is_empty() {
                println!("Whitelist is empty");
            } else {
                utils::print_table_border(90);
                utils::print_table_row(&["Address", "Label", "Added"], &[44, 20, 22]);
                utils::print_table_border(90);
                for entry in entries {
                    utils::print_table_row(
                        &[
                            &entry.address,
                            entry.label.as_deref().unwrap_or("-"),
                            &utils::format_timestamp(&entry.added_at),
                        ],
                        &[44, 20, 22],
                    );
                }
                utils::print_table_border(90);
            }
        }
    }

    Ok(())
}

fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing rent-warden...".green());
    let _db = open_database(config)?;
    println!("{}", "✓ Database initialized".green());
    println!("{}", "✓ Configuration loaded".green());
    println!("\n{}", "Configuration:".cyan());
    println!("  RPC URL:      {}", config.solana.rpc_url);
    println!(
        "  Provider:     {}",
        if config.solana.helius_api_key.is_some() {
            "helius"
        } else {
            "rpc"
        }
    );
    println!("  Operator:     {}", config.operator.pubkey);
    println!(
        "  Treasury:     {}",
        config.treasury.destination.as_deref().unwrap_or("(operator)")
    );
    println!("  Dry Run:      {}", config.reclaim.dry_run);
    println!("  Batch Size:   {}", config.reclaim.batch_size);
    println!("  Batch Ceiling: {} SOL", config.reclaim.max_batch_sol);
    Ok(())
}
