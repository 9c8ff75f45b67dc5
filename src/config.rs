use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub solana: SolanaConfig,
    pub operator: OperatorConfig,
    pub reclaim: ReclaimSettings,
    pub treasury: TreasuryConfig,
    pub database: DatabaseConfig,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub helius_api_key: Option<String>,
    pub commitment: String,
    pub rate_limit_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorConfig {
    /// Sponsoring identity whose history is crawled.
    pub pubkey: String,
    /// Keypair holding close authority; required for reclaim and sweep.
    pub keypair_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReclaimSettings {
    /// Close instructions per transaction.
    pub batch_size: usize,
    /// Circuit breaker: abort any batch whose summed value exceeds this.
    pub max_batch_sol: f64,
    /// Cool-down: skip accounts marked reclaimable more recently than this.
    pub min_reclaimable_age_hours: u64,
    pub priority_fee_micro_lamports: u64,
    pub dry_run: bool,
    /// Seeded into the persistent whitelist at startup.
    pub whitelist: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TreasuryConfig {
    /// Optional forwarding destination for the post-cycle sweep.
    pub destination: Option<String>,
    /// Operator balance kept back for future transaction fees.
    pub reserve_sol: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_ids: Vec<i64>,
    pub notifications_enabled: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("WARDEN"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn operator_pubkey(&self) -> anyhow::Result<Pubkey> {
        Pubkey::from_str(&self.operator.pubkey)
            .map_err(|e| anyhow::anyhow!("Invalid operator pubkey: {}", e))
    }

    pub fn load_operator_keypair(&self) -> anyhow::Result<Keypair> {
        let path = self
            .operator
            .keypair_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("operator.keypair_path is not configured"))?;
        solana_sdk::signer::keypair::read_keypair_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to read operator keypair {}: {}", path, e))
    }

    pub fn treasury_destination(&self) -> anyhow::Result<Option<Pubkey>> {
        match self.treasury.destination.as_deref() {
            None => Ok(None),
            Some(raw) => Pubkey::from_str(raw)
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid treasury destination: {}", e)),
        }
    }

    pub fn treasury_reserve_lamports(&self) -> u64 {
        crate::utils::sol_to_lamports(self.treasury.reserve_sol)
    }

    pub fn commitment_config(&self) -> CommitmentConfig {
        match self.solana.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        }
    }
}
