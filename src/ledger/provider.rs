use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::ledger::client::LedgerClient;
use crate::ledger::rpc::RpcLedgerClient;

/// Pick the ledger provider once at startup based on available
/// credentials. Everything downstream only sees `dyn LedgerClient`.
pub fn select_client(config: &Config) -> Arc<dyn LedgerClient> {
    let commitment = config.commitment_config();
    let delay = config.solana.rate_limit_delay_ms;

    match config.solana.helius_api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            info!("ledger provider: helius");
            let url = format!("https://mainnet.helius-rpc.com/?api-key={}", key);
            Arc::new(RpcLedgerClient::new(&url, commitment, delay))
        }
        _ => {
            info!("ledger provider: rpc ({})", config.solana.rpc_url);
            Arc::new(RpcLedgerClient::new(
                &config.solana.rpc_url,
                commitment,
                delay,
            ))
        }
    }
}
