use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiInstruction, UiMessage,
    UiParsedInstruction, UiTransactionEncoding,
};
use tracing::{debug, warn};

use crate::error::{Result, WardenError};
use crate::ledger::client::LedgerClient;
use crate::ledger::types::{
    AccountState, BalanceChange, HistoryQuery, InstructionRecord, TransactionRecord,
};
use crate::utils::RateLimiter;

/// JSON-RPC implementation of `LedgerClient`.
///
/// Works against any standard Solana RPC endpoint. History pages are
/// assembled from `getSignaturesForAddress` plus one `getTransaction`
/// per signature; the type hint is ignored since plain RPC cannot filter
/// server-side.
pub struct RpcLedgerClient {
    client: RpcClient,
    commitment: CommitmentConfig,
    rate_limiter: RateLimiter,
}

impl RpcLedgerClient {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig, rate_limit_delay_ms: u64) -> Self {
        let client = RpcClient::new_with_commitment(rpc_url.to_string(), commitment);
        Self {
            client,
            commitment,
            rate_limiter: RateLimiter::new(rate_limit_delay_ms),
        }
    }

    fn map_err(e: ClientError) -> WardenError {
        let msg = e.to_string();
        if msg.contains("429") || msg.contains("Too Many Requests") {
            WardenError::RateLimited(msg)
        } else {
            WardenError::SolanaRpc(e)
        }
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        self.rate_limiter.wait().await;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        match self.client.get_transaction_with_config(signature, config).await {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => {
                // A transaction evicted from the node's history reads as
                // not-found; treat it as an empty result.
                if e.to_string().contains("not found") {
                    Ok(None)
                } else {
                    Err(Self::map_err(e))
                }
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_history(
        &self,
        address: &Pubkey,
        query: HistoryQuery,
    ) -> Result<Vec<TransactionRecord>> {
        self.rate_limiter.wait().await;

        let before = match query.before.as_deref() {
            Some(raw) => Some(Signature::from_str(raw)?),
            None => None,
        };

        let signatures = self
            .client
            .get_signatures_for_address_with_config(
                address,
                GetConfirmedSignaturesForAddress2Config {
                    before,
                    until: None,
                    limit: Some(query.limit),
                    commitment: Some(self.commitment),
                },
            )
            .await
            .map_err(Self::map_err)?;

        let mut records = Vec::with_capacity(signatures.len());
        for sig_info in &signatures {
            if sig_info.err.is_some() {
                continue;
            }

            let signature = Signature::from_str(&sig_info.signature)?;
            let Some(tx) = self.fetch_transaction(&signature).await? else {
                continue;
            };

            match to_record(&sig_info.signature, sig_info.memo.clone(), &tx) {
                Some(record) => records.push(record),
                None => debug!(
                    "skipping transaction {} (undecodable encoding)",
                    sig_info.signature
                ),
            }
        }

        Ok(records)
    }

    async fn fetch_account_state(&self, address: &Pubkey) -> Result<Option<AccountState>> {
        self.rate_limiter.wait().await;

        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(Self::map_err)?;

        Ok(response.value.map(|account| AccountState {
            address: *address,
            lamports: account.lamports,
            data: account.data,
            owner: account.owner,
        }))
    }

    async fn fetch_account_states(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<AccountState>>> {
        self.rate_limiter.wait().await;

        let accounts = self
            .client
            .get_multiple_accounts(addresses)
            .await
            .map_err(Self::map_err)?;

        Ok(addresses
            .iter()
            .zip(accounts)
            .map(|(address, account)| {
                account.map(|account| AccountState {
                    address: *address,
                    lamports: account.lamports,
                    data: account.data,
                    owner: account.owner,
                })
            })
            .collect())
    }

    async fn submit_mutation(&self, transaction: &Transaction) -> Result<Signature> {
        self.rate_limiter.wait().await;

        self.client
            .send_and_confirm_transaction(transaction)
            .await
            .map_err(|e| {
                let mapped = Self::map_err(e);
                match mapped {
                    WardenError::RateLimited(_) => mapped,
                    other => WardenError::SubmissionFailed(other.to_string()),
                }
            })
    }

    async fn minimum_rent_deposit(&self, data_len: usize) -> Result<u64> {
        self.rate_limiter.wait().await;

        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(Self::map_err)
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        self.rate_limiter.wait().await;

        self.client.get_latest_blockhash().await.map_err(Self::map_err)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        self.rate_limiter.wait().await;

        self.client.get_balance(address).await.map_err(Self::map_err)
    }
}

/// Reduce a provider transaction to the uniform record shape.
///
/// Returns `None` when the payload is not in the JSON encoding we asked
/// for; callers skip such transactions rather than failing the page.
fn to_record(
    signature: &str,
    memo: Option<String>,
    tx: &EncodedConfirmedTransactionWithStatusMeta,
) -> Option<TransactionRecord> {
    let meta = tx.transaction.meta.as_ref()?;
    let ui_tx = match &tx.transaction.transaction {
        EncodedTransaction::Json(ui_tx) => ui_tx,
        _ => return None,
    };

    let account_keys: Vec<Pubkey> = match &ui_tx.message {
        UiMessage::Parsed(parsed) => parsed
            .account_keys
            .iter()
            .filter_map(|key| Pubkey::from_str(&key.pubkey).ok())
            .collect(),
        UiMessage::Raw(raw) => raw
            .account_keys
            .iter()
            .filter_map(|key| Pubkey::from_str(key).ok())
            .collect(),
    };

    let balance_changes = account_keys
        .iter()
        .zip(meta.pre_balances.iter().zip(meta.post_balances.iter()))
        .map(|(account, (before, after))| BalanceChange {
            account: *account,
            before: *before,
            after: *after,
        })
        .collect();

    let mut instructions = Vec::new();
    if let UiMessage::Parsed(parsed) = &ui_tx.message {
        for instruction in &parsed.instructions {
            match instruction {
                UiInstruction::Parsed(UiParsedInstruction::Parsed(ix)) => {
                    let Ok(program_id) = Pubkey::from_str(&ix.program_id) else {
                        continue;
                    };
                    instructions.push(InstructionRecord {
                        program: ix.program.clone(),
                        program_id,
                        accounts: Vec::new(),
                        parsed: Some(ix.parsed.clone()),
                    });
                }
                UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(ix)) => {
                    let Ok(program_id) = Pubkey::from_str(&ix.program_id) else {
                        continue;
                    };
                    instructions.push(InstructionRecord {
                        program: String::new(),
                        program_id,
                        accounts: ix
                            .accounts
                            .iter()
                            .filter_map(|key| Pubkey::from_str(key).ok())
                            .collect(),
                        parsed: None,
                    });
                }
                UiInstruction::Compiled(_) => {
                    warn!("compiled instruction in jsonParsed payload, skipping");
                }
            }
        }
    }

    Some(TransactionRecord {
        signature: signature.to_string(),
        slot: tx.slot,
        block_time: tx.block_time.and_then(|t| DateTime::from_timestamp(t, 0)),
        fee: meta.fee,
        fee_payer: account_keys.first().copied(),
        memo,
        balance_changes,
        instructions,
    })
}
