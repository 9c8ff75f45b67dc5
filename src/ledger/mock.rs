//! Scripted ledger double for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_program::program_pack::Pack;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::{Result, WardenError};
use crate::ledger::client::LedgerClient;
use crate::ledger::types::{AccountState, HistoryQuery, TransactionRecord};

/// Rent-exempt minimum for a 165-byte token account on mainnet.
pub const TOKEN_ACCOUNT_RENT: u64 = 2_039_280;

#[derive(Default)]
pub struct MockLedger {
    /// Responses popped in order, one per `fetch_history` call. An empty
    /// queue reads as exhausted history.
    pub history: Mutex<VecDeque<Result<Vec<TransactionRecord>>>>,
    /// Every history query the engine issued, in order.
    pub history_queries: Mutex<Vec<HistoryQuery>>,
    pub accounts: Mutex<HashMap<Pubkey, AccountState>>,
    pub balances: Mutex<HashMap<Pubkey, u64>>,
    pub submitted: Mutex<Vec<Transaction>>,
    /// When set, any submission carrying more than one token-program
    /// instruction fails, forcing the per-account fallback path.
    pub fail_batch_submissions: AtomicBool,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: Result<Vec<TransactionRecord>>) {
        self.history.lock().unwrap().push_back(page);
    }

    pub fn set_account(&self, state: AccountState) {
        self.accounts.lock().unwrap().insert(state.address, state);
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.accounts.lock().unwrap().remove(address);
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }

    pub fn submissions(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }

    fn token_instruction_targets(tx: &Transaction) -> Vec<Pubkey> {
        let message = &tx.message;
        let mut targets = Vec::new();
        for ix in &message.instructions {
            let program_id = message.account_keys[ix.program_id_index as usize];
            if program_id == spl_token::id() {
                if let Some(first) = ix.accounts.first() {
                    targets.push(message.account_keys[*first as usize]);
                }
            }
        }
        targets
    }
}

/// Build the on-chain state of an SPL token account.
pub fn token_account_state(
    address: Pubkey,
    mint: Pubkey,
    owner: Pubkey,
    amount: u64,
    close_authority: Option<Pubkey>,
    lamports: u64,
) -> AccountState {
    let account = spl_token::state::Account {
        mint,
        owner,
        amount,
        delegate: solana_program::program_option::COption::None,
        state: spl_token::state::AccountState::Initialized,
        is_native: solana_program::program_option::COption::None,
        delegated_amount: 0,
        close_authority: match close_authority {
            Some(key) => solana_program::program_option::COption::Some(key),
            None => solana_program::program_option::COption::None,
        },
    };

    let mut data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(account, &mut data).unwrap();

    AccountState {
        address,
        lamports,
        data,
        owner: spl_token::id(),
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn fetch_history(
        &self,
        _address: &Pubkey,
        query: HistoryQuery,
    ) -> Result<Vec<TransactionRecord>> {
        self.history_queries.lock().unwrap().push(query);
        match self.history.lock().unwrap().pop_front() {
            Some(page) => page,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_account_state(&self, address: &Pubkey) -> Result<Option<AccountState>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn fetch_account_states(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<AccountState>>> {
        let accounts = self.accounts.lock().unwrap();
        Ok(addresses
            .iter()
            .map(|address| accounts.get(address).cloned())
            .collect())
    }

    async fn submit_mutation(&self, transaction: &Transaction) -> Result<Signature> {
        let targets = Self::token_instruction_targets(transaction);

        if self.fail_batch_submissions.load(Ordering::SeqCst) && targets.len() > 1 {
            return Err(WardenError::SubmissionFailed(
                "simulated batch failure".into(),
            ));
        }

        self.submitted.lock().unwrap().push(transaction.clone());

        let mut accounts = self.accounts.lock().unwrap();
        for target in targets {
            accounts.remove(&target);
        }

        Ok(Signature::new_unique())
    }

    async fn minimum_rent_deposit(&self, _data_len: usize) -> Result<u64> {
        Ok(TOKEN_ACCOUNT_RENT)
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::default())
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        if let Some(balance) = self.balances.lock().unwrap().get(address) {
            return Ok(*balance);
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(address)
            .map(|state| state.lamports)
            .unwrap_or(0))
    }
}
