use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;

use crate::discovery::rent::matches_deposit;
use crate::ledger::types::{InstructionRecord, TransactionRecord};
use crate::storage::models::{AccountStatus, ResourceKind, SponsoredAccount};

/// An account extracted from a transaction as a probable sponsorship.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: Pubkey,
    pub owner: Option<Pubkey>,
    pub mint: Option<Pubkey>,
    pub kind: ResourceKind,
    pub deposit_lamports: u64,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub memo: Option<String>,
}

impl Candidate {
    pub fn into_account(self, operator: &Pubkey, source: &str) -> SponsoredAccount {
        SponsoredAccount {
            address: self.address.to_string(),
            operator: operator.to_string(),
            owner: self.owner.map(|k| k.to_string()),
            mint: self.mint.map(|k| k.to_string()),
            kind: self.kind,
            discovery_signature: Some(self.signature),
            discovery_slot: Some(self.slot),
            first_seen_at: self.block_time.unwrap_or_else(Utc::now),
            source: source.to_string(),
            memo: self.memo,
            deposit_lamports: self.deposit_lamports,
            status: AccountStatus::Active,
            last_verified_at: None,
            reclaimable_since: None,
            reclaimed_at: None,
            reclaim_signature: None,
            reclaimed_lamports: None,
            last_error: None,
        }
    }
}

/// Well-known program and sysvar addresses that can never be sponsored
/// accounts or owners.
fn infrastructure_addresses() -> &'static Vec<Pubkey> {
    static ADDRESSES: OnceLock<Vec<Pubkey>> = OnceLock::new();
    ADDRESSES.get_or_init(|| {
        vec![
            solana_sdk::system_program::id(),
            spl_token::id(),
            spl_associated_token_account::id(),
            solana_sdk::compute_budget::id(),
            solana_sdk::sysvar::rent::id(),
            solana_sdk::sysvar::clock::id(),
        ]
    })
}

pub fn is_infrastructure(key: &Pubkey) -> bool {
    infrastructure_addresses().contains(key)
}

/// Extract sponsored-account candidates from one transaction.
///
/// Requires the operator to be the fee payer, then looks for accounts
/// whose native balance grew by roughly the token-account rent deposit.
/// Ownership and mint come from an account-creation instruction when one
/// names the candidate; otherwise the first other non-infrastructure
/// account in the transaction is presumed to be the owner. Candidates
/// with neither are dropped.
pub fn extract_candidates(
    tx: &TransactionRecord,
    operator: &Pubkey,
    expected_deposit: u64,
) -> Vec<Candidate> {
    if tx.fee_payer != Some(*operator) {
        return Vec::new();
    }

    let mut candidates = Vec::new();

    for change in &tx.balance_changes {
        if change.account == *operator || is_infrastructure(&change.account) {
            continue;
        }

        let delta = change.delta();
        if delta <= 0 {
            continue;
        }
        if !matches_deposit(delta as u64, expected_deposit) {
            continue;
        }

        let (owner, mint, kind) = match match_creation(&tx.instructions, &change.account) {
            Some(found) => (found.owner, found.mint, found.kind),
            None => {
                let Some(presumed) = fallback_owner(tx, operator, &change.account) else {
                    continue;
                };
                (Some(presumed), None, ResourceKind::TokenAccount)
            }
        };

        candidates.push(Candidate {
            address: change.account,
            owner,
            mint,
            kind,
            deposit_lamports: delta as u64,
            signature: tx.signature.clone(),
            slot: tx.slot,
            block_time: tx.block_time,
            memo: tx.memo.clone(),
        });
    }

    candidates
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreationMatch {
    pub owner: Option<Pubkey>,
    pub mint: Option<Pubkey>,
    pub kind: ResourceKind,
}

/// Run the ordered pattern matchers over a transaction's instructions.
pub fn match_creation(
    instructions: &[InstructionRecord],
    target: &Pubkey,
) -> Option<CreationMatch> {
    for ix in instructions {
        if let Some(found) = match_ata_create(ix, target)
            .or_else(|| match_initialize_account(ix, target))
            .or_else(|| match_ata_create_undecoded(ix, target))
        {
            return Some(found);
        }
    }
    None
}

fn parsed_str<'a>(parsed: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    parsed.get("info")?.get(field)?.as_str()
}

fn parsed_type<'a>(parsed: &'a serde_json::Value) -> Option<&'a str> {
    parsed.get("type")?.as_str()
}

/// Decoded associated-token-account create naming wallet and mint.
pub fn match_ata_create(ix: &InstructionRecord, target: &Pubkey) -> Option<CreationMatch> {
    if ix.program != "spl-associated-token-account" {
        return None;
    }
    let parsed = ix.parsed.as_ref()?;
    if !matches!(parsed_type(parsed), Some("create") | Some("createIdempotent")) {
        return None;
    }
    if parsed_str(parsed, "account")? != target.to_string() {
        return None;
    }

    Some(CreationMatch {
        owner: parsed_str(parsed, "wallet").and_then(|s| Pubkey::from_str(s).ok()),
        mint: parsed_str(parsed, "mint").and_then(|s| Pubkey::from_str(s).ok()),
        kind: ResourceKind::AssociatedTokenAccount,
    })
}

/// Decoded token-program initializeAccount naming owner and mint.
pub fn match_initialize_account(ix: &InstructionRecord, target: &Pubkey) -> Option<CreationMatch> {
    if ix.program != "spl-token" {
        return None;
    }
    let parsed = ix.parsed.as_ref()?;
    if !matches!(
        parsed_type(parsed),
        Some("initializeAccount") | Some("initializeAccount2") | Some("initializeAccount3")
    ) {
        return None;
    }
    if parsed_str(parsed, "account")? != target.to_string() {
        return None;
    }

    Some(CreationMatch {
        owner: parsed_str(parsed, "owner").and_then(|s| Pubkey::from_str(s).ok()),
        mint: parsed_str(parsed, "mint").and_then(|s| Pubkey::from_str(s).ok()),
        kind: ResourceKind::TokenAccount,
    })
}

/// Undecoded ATA create, matched by the program id and the fixed account
/// layout: funding, associated account, wallet, mint, ...
pub fn match_ata_create_undecoded(
    ix: &InstructionRecord,
    target: &Pubkey,
) -> Option<CreationMatch> {
    if ix.parsed.is_some() || ix.program_id != spl_associated_token_account::id() {
        return None;
    }
    if ix.accounts.len() < 4 || ix.accounts[1] != *target {
        return None;
    }

    Some(CreationMatch {
        owner: Some(ix.accounts[2]),
        mint: Some(ix.accounts[3]),
        kind: ResourceKind::AssociatedTokenAccount,
    })
}

/// Heuristic owner: the first other non-infrastructure account touched
/// in the same transaction.
fn fallback_owner(tx: &TransactionRecord, operator: &Pubkey, target: &Pubkey) -> Option<Pubkey> {
    tx.balance_changes
        .iter()
        .map(|change| change.account)
        .find(|account| {
            account != operator && account != target && !is_infrastructure(account)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::BalanceChange;
    use serde_json::json;

    const DEPOSIT: u64 = 2_039_280;

    fn tx(
        fee_payer: Pubkey,
        balance_changes: Vec<BalanceChange>,
        instructions: Vec<InstructionRecord>,
    ) -> TransactionRecord {
        TransactionRecord {
            signature: "sig1".to_string(),
            slot: 100,
            block_time: Some(Utc::now()),
            fee: 5000,
            fee_payer: Some(fee_payer),
            memo: None,
            balance_changes,
            instructions,
        }
    }

    fn deposit_into(account: Pubkey, amount: u64) -> BalanceChange {
        BalanceChange {
            account,
            before: 0,
            after: amount,
        }
    }

    fn ata_create_ix(target: &Pubkey, wallet: &Pubkey, mint: &Pubkey) -> InstructionRecord {
        InstructionRecord {
            program: "spl-associated-token-account".to_string(),
            program_id: spl_associated_token_account::id(),
            accounts: Vec::new(),
            parsed: Some(json!({
                "type": "create",
                "info": {
                    "account": target.to_string(),
                    "mint": mint.to_string(),
                    "wallet": wallet.to_string(),
                    "source": "payer",
                    "systemProgram": solana_sdk::system_program::id().to_string(),
                    "tokenProgram": spl_token::id().to_string(),
                }
            })),
        }
    }

    #[test]
    fn extracts_candidate_with_owner_and_mint() {
        let operator = Pubkey::new_unique();
        let target = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let tx = tx(
            operator,
            vec![
                BalanceChange {
                    account: operator,
                    before: 10 * DEPOSIT,
                    after: 9 * DEPOSIT,
                },
                deposit_into(target, DEPOSIT),
            ],
            vec![ata_create_ix(&target, &wallet, &mint)],
        );

        let candidates = extract_candidates(&tx, &operator, DEPOSIT);
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.address, target);
        assert_eq!(candidate.owner, Some(wallet));
        assert_eq!(candidate.mint, Some(mint));
        assert_eq!(candidate.kind, ResourceKind::AssociatedTokenAccount);
        assert_eq!(candidate.deposit_lamports, DEPOSIT);
    }

    #[test]
    fn requires_operator_fee_payer() {
        let operator = Pubkey::new_unique();
        let someone_else = Pubkey::new_unique();
        let target = Pubkey::new_unique();

        let tx = tx(
            someone_else,
            vec![deposit_into(target, DEPOSIT)],
            Vec::new(),
        );

        assert!(extract_candidates(&tx, &operator, DEPOSIT).is_empty());
    }

    #[test]
    fn tolerates_fee_rounding_only_within_window() {
        let operator = Pubkey::new_unique();
        let near = Pubkey::new_unique();
        let far = Pubkey::new_unique();
        let owner = Pubkey::new_unique();

        let tx = tx(
            operator,
            vec![
                deposit_into(near, DEPOSIT + 4_999),
                deposit_into(far, DEPOSIT + 5_001),
                deposit_into(owner, 1),
            ],
            Vec::new(),
        );

        let candidates = extract_candidates(&tx, &operator, DEPOSIT);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, near);
    }

    #[test]
    fn skips_operator_and_infrastructure() {
        let operator = Pubkey::new_unique();
        let other = Pubkey::new_unique();

        let tx = tx(
            operator,
            vec![
                deposit_into(operator, DEPOSIT),
                deposit_into(spl_token::id(), DEPOSIT),
                deposit_into(other, 1),
            ],
            Vec::new(),
        );

        assert!(extract_candidates(&tx, &operator, DEPOSIT).is_empty());
    }

    #[test]
    fn falls_back_to_first_other_account_as_owner() {
        let operator = Pubkey::new_unique();
        let target = Pubkey::new_unique();
        let bystander = Pubkey::new_unique();

        let tx = tx(
            operator,
            vec![
                deposit_into(target, DEPOSIT),
                BalanceChange {
                    account: bystander,
                    before: 5,
                    after: 5,
                },
            ],
            Vec::new(),
        );

        let candidates = extract_candidates(&tx, &operator, DEPOSIT);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].owner, Some(bystander));
        assert_eq!(candidates[0].kind, ResourceKind::TokenAccount);
        assert_eq!(candidates[0].mint, None);
    }

    #[test]
    fn drops_candidate_with_no_resolvable_owner() {
        let operator = Pubkey::new_unique();
        let target = Pubkey::new_unique();

        let tx = tx(
            operator,
            vec![
                deposit_into(target, DEPOSIT),
                deposit_into(solana_sdk::system_program::id(), 0),
            ],
            Vec::new(),
        );

        assert!(extract_candidates(&tx, &operator, DEPOSIT).is_empty());
    }

    #[test]
    fn matches_initialize_account_instruction() {
        let target = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let ix = InstructionRecord {
            program: "spl-token".to_string(),
            program_id: spl_token::id(),
            accounts: Vec::new(),
            parsed: Some(json!({
                "type": "initializeAccount3",
                "info": {
                    "account": target.to_string(),
                    "mint": mint.to_string(),
                    "owner": owner.to_string(),
                }
            })),
        };

        let found = match_initialize_account(&ix, &target).unwrap();
        assert_eq!(found.owner, Some(owner));
        assert_eq!(found.mint, Some(mint));
        assert_eq!(found.kind, ResourceKind::TokenAccount);

        assert!(match_initialize_account(&ix, &Pubkey::new_unique()).is_none());
    }

    #[test]
    fn matches_undecoded_ata_create_by_layout() {
        let payer = Pubkey::new_unique();
        let target = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let ix = InstructionRecord {
            program: String::new(),
            program_id: spl_associated_token_account::id(),
            accounts: vec![
                payer,
                target,
                wallet,
                mint,
                solana_sdk::system_program::id(),
                spl_token::id(),
            ],
            parsed: None,
        };

        let found = match_ata_create_undecoded(&ix, &target).unwrap();
        assert_eq!(found.owner, Some(wallet));
        assert_eq!(found.mint, Some(mint));
        assert_eq!(found.kind, ResourceKind::AssociatedTokenAccount);
    }
}
