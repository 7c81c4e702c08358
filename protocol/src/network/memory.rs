//! In-process ledger.
//!
//! [`InMemoryLedger`] executes transactions against a simple account model
//! so the whole dispatch pipeline can run without a real node: the CLI's
//! `simulate` and `devnode` commands use it, and so do the tests.
//!
//! ## Execution Model
//!
//! - Broadcast checks signature, chain id and nonce, charges the fee and
//!   applies the transfer immediately. Nonces must increase but may skip
//!   values, so a nonce burned by a refused transaction leaves no hole. The
//!   finalization record becomes visible after `finalize_after_polls`
//!   "not found" answers.
//! - Token contracts understand `transfer` and `addToken`. `addToken` fails
//!   on-chain unless the sender is the token's minter.
//! - Broadcasting a transaction the ledger already holds returns the same
//!   hash and changes nothing.
//! - Fault injection knobs simulate outages, dropped responses, a lagging
//!   pending-nonce view, rejections, on-chain failures and flaky record
//!   queries.
//!
//! State sits behind a `parking_lot::Mutex` that is never held across an
//! `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use tracing::debug;

use super::node::{Connector, LedgerNode, NodeError, NodeHandle};
use super::rpc::{RpcError, RpcMethod};
use crate::config::BASE_TRANSFER_COST;
use crate::crypto::Address;
use crate::transaction::{
    decode_token_call, FinalizationRecord, SignedTransaction, TokenCall, TxHash,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TokenState {
    decimals: u8,
    minter: Option<Address>,
    balances: HashMap<Address, u128>,
}

#[derive(Debug)]
struct PendingRecord {
    record: FinalizationRecord,
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    failing_calls: u32,
    dropped_broadcast_responses: u32,
    refused_dials: u32,
    record_query_errors: u32,
    nonce_lag: u64,
    rejected_recipients: HashSet<Address>,
    reverting_recipients: HashSet<Address>,
}

#[derive(Debug, Default)]
struct LedgerState {
    native: HashMap<Address, u128>,
    tokens: HashMap<Address, TokenState>,
    nonces: HashMap<Address, u64>,
    pending: HashMap<TxHash, PendingRecord>,
    finalized: HashMap<TxHash, FinalizationRecord>,
    submitted: Vec<SignedTransaction>,
    calls: Vec<&'static str>,
    faults: Faults,
}

/// An in-process ledger node.
#[derive(Debug)]
pub struct InMemoryLedger {
    chain_id: u64,
    fee_unit_price: u128,
    finalize_after_polls: u32,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// A ledger that finalizes on the first poll, charges
    /// [`BASE_TRANSFER_COST`] per transaction at a unit price of 1.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            fee_unit_price: 1,
            finalize_after_polls: 0,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn with_fee_unit_price(mut self, price: u128) -> Self {
        self.fee_unit_price = price;
        self
    }

    /// Number of "not found" answers before a record becomes visible.
    pub fn with_finalize_after_polls(mut self, polls: u32) -> Self {
        self.finalize_after_polls = polls;
        self
    }

    pub fn chain_id_value(&self) -> u64 {
        self.chain_id
    }

    // -- accounts ----------------------------------------------------------

    pub fn fund(&self, account: Address, amount: u128) {
        let mut state = self.state.lock();
        let balance = state.native.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn native_balance(&self, account: &Address) -> u128 {
        self.state.lock().native.get(account).copied().unwrap_or(0)
    }

    /// Registers a token contract. Re-deploying keeps existing balances.
    pub fn deploy_token(&self, contract: Address, decimals: u8) {
        let mut state = self.state.lock();
        state.tokens.entry(contract).or_default().decimals = decimals;
    }

    /// Lets `account` call `addToken` on `contract`. One minter per token;
    /// granting again replaces it.
    pub fn grant_minter(&self, contract: Address, account: Address) {
        let mut state = self.state.lock();
        state.tokens.entry(contract).or_default().minter = Some(account);
    }

    pub fn mint(&self, contract: Address, account: Address, amount: u128) {
        let mut state = self.state.lock();
        let token = state.tokens.entry(contract).or_default();
        let balance = token.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn token_balance(&self, contract: &Address, account: &Address) -> u128 {
        self.state
            .lock()
            .tokens
            .get(contract)
            .and_then(|t| t.balances.get(account).copied())
            .unwrap_or(0)
    }

    /// Next nonce the ledger expects from `account`.
    pub fn next_nonce(&self, account: &Address) -> u64 {
        self.state.lock().nonces.get(account).copied().unwrap_or(0)
    }

    // -- fault injection ---------------------------------------------------

    /// While offline every query and every dial fails with a connectivity
    /// error.
    pub fn set_online(&self, online: bool) {
        self.state.lock().faults.offline = !online;
    }

    /// The next `n` node calls fail with a connectivity error.
    pub fn fail_next_calls(&self, n: u32) {
        self.state.lock().faults.failing_calls = n;
    }

    /// The next `n` broadcasts are applied, but the response is lost.
    pub fn drop_broadcast_responses(&self, n: u32) {
        self.state.lock().faults.dropped_broadcast_responses = n;
    }

    /// The next `n` dials are refused.
    pub fn refuse_dials(&self, n: u32) {
        self.state.lock().faults.refused_dials = n;
    }

    /// The next `n` finalization-record queries return an internal error.
    pub fn fail_record_queries(&self, n: u32) {
        self.state.lock().faults.record_query_errors = n;
    }

    /// The pending-nonce query under-reports by `lag`, the way a node with
    /// a slow transaction pool does.
    pub fn set_nonce_lag(&self, lag: u64) {
        self.state.lock().faults.nonce_lag = lag;
    }

    /// Transfers to `recipient` are refused at broadcast time.
    pub fn reject_transfers_to(&self, recipient: Address) {
        self.state
            .lock()
            .faults
            .rejected_recipients
            .insert(recipient);
    }

    /// Transfers to `recipient` are included but fail on-chain.
    pub fn revert_transfers_to(&self, recipient: Address) {
        self.state
            .lock()
            .faults
            .reverting_recipients
            .insert(recipient);
    }

    // -- inspection --------------------------------------------------------

    /// Wire names of every node method called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Every transaction accepted so far, in acceptance order.
    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.state.lock().submitted.clone()
    }

    // -- internals ---------------------------------------------------------

    /// Records the call and applies outage faults.
    fn enter(&self, state: &mut LedgerState, method: RpcMethod) -> Result<(), NodeError> {
        state.calls.push(method.as_str());
        if state.faults.offline {
            return Err(NodeError::Connectivity("ledger offline".into()));
        }
        if state.faults.failing_calls > 0 {
            state.faults.failing_calls -= 1;
            return Err(NodeError::Connectivity("connection reset".into()));
        }
        Ok(())
    }

    fn submit(&self, state: &mut LedgerState, tx: &SignedTransaction) -> Result<TxHash, NodeError> {
        let hash = tx.hash();
        if state.pending.contains_key(&hash) || state.finalized.contains_key(&hash) {
            debug!(%hash, "duplicate broadcast");
            return Ok(hash);
        }

        let body = &tx.transaction;
        if !tx.verify() {
            return Err(RpcError::transaction_rejected("invalid signature").into());
        }
        if body.chain_id != self.chain_id {
            return Err(RpcError::transaction_rejected(format!(
                "wrong chain id {} (expected {})",
                body.chain_id, self.chain_id
            ))
            .into());
        }

        let sender = tx.sender();
        let expected = state.nonces.get(&sender).copied().unwrap_or(0);
        if body.nonce < expected {
            return Err(RpcError::transaction_rejected(format!(
                "nonce too low: {} < {}",
                body.nonce, expected
            ))
            .into());
        }

        let recipient = match body.payload.as_deref() {
            Some(data) => decode_token_call(data).map(|(_, to, _)| to),
            None => Some(body.to),
        };
        if let Some(r) = recipient {
            if state.faults.rejected_recipients.contains(&r) {
                return Err(RpcError::transaction_rejected(format!(
                    "recipient {} is blocked",
                    r
                ))
                .into());
            }
        }

        let fee = body.fee_unit_price.saturating_mul(BASE_TRANSFER_COST as u128);
        let sender_native = state.native.get(&sender).copied().unwrap_or(0);
        if sender_native < fee.saturating_add(body.value) {
            return Err(RpcError::transaction_rejected("insufficient funds for fee and value").into());
        }

        // Accepted: the nonce is consumed and the fee is charged whatever
        // the execution outcome.
        state.nonces.insert(sender, body.nonce.saturating_add(1));
        state.native.insert(sender, sender_native - fee);

        let succeeded = BASE_TRANSFER_COST <= body.fee_budget
            && recipient.map_or(true, |r| !state.faults.reverting_recipients.contains(&r))
            && Self::execute(state, tx);

        state.pending.insert(
            hash,
            PendingRecord {
                record: FinalizationRecord {
                    succeeded,
                    resource_used: BASE_TRANSFER_COST.min(body.fee_budget),
                },
                polls_remaining: self.finalize_after_polls,
            },
        );
        state.submitted.push(tx.clone());
        debug!(%hash, %sender, nonce = body.nonce, succeeded, "transaction accepted");
        Ok(hash)
    }

    /// Moves value or issues tokens. Returns `false` (and changes nothing)
    /// if execution fails.
    fn execute(state: &mut LedgerState, tx: &SignedTransaction) -> bool {
        let body = &tx.transaction;
        let sender = tx.sender();

        match body.payload.as_deref() {
            None => {
                let from = state.native.get(&sender).copied().unwrap_or(0);
                state.native.insert(sender, from - body.value);
                let to = state.native.entry(body.to).or_default();
                *to = to.saturating_add(body.value);
                true
            }
            Some(data) => {
                let Some((call, recipient, amount)) = decode_token_call(data) else {
                    return false;
                };
                if body.value != 0 {
                    return false;
                }
                let Some(token) = state.tokens.get_mut(&body.to) else {
                    return false;
                };
                match call {
                    TokenCall::Transfer => {
                        let from = token.balances.get(&sender).copied().unwrap_or(0);
                        if from < amount {
                            return false;
                        }
                        token.balances.insert(sender, from - amount);
                    }
                    TokenCall::Mint => {
                        if token.minter != Some(sender) {
                            return false;
                        }
                    }
                }
                let to = token.balances.entry(recipient).or_default();
                *to = to.saturating_add(amount);
                true
            }
        }
    }

    fn lookup_record(&self, state: &mut LedgerState, hash: &TxHash) -> Option<FinalizationRecord> {
        if let Some(record) = state.finalized.get(hash) {
            return Some(*record);
        }
        let pending = state.pending.get_mut(hash)?;
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return None;
        }
        let record = pending.record;
        state.pending.remove(hash);
        state.finalized.insert(*hash, record);
        Some(record)
    }
}

#[async_trait]
impl LedgerNode for InMemoryLedger {
    async fn chain_id(&self) -> Result<u64, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::ChainId)?;
        Ok(self.chain_id)
    }

    async fn pending_sequence_number(&self, account: &Address) -> Result<u64, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::GetPendingNonce)?;
        let next = state.nonces.get(account).copied().unwrap_or(0);
        Ok(next.saturating_sub(state.faults.nonce_lag))
    }

    async fn suggested_fee_unit_price(&self) -> Result<u128, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::FeeUnitPrice)?;
        Ok(self.fee_unit_price)
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TxHash, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::SendRawTransaction)?;
        let hash = self.submit(&mut state, tx)?;
        if state.faults.dropped_broadcast_responses > 0 {
            state.faults.dropped_broadcast_responses -= 1;
            return Err(NodeError::Connectivity("response lost".into()));
        }
        Ok(hash)
    }

    async fn finalization_record(
        &self,
        hash: &TxHash,
    ) -> Result<Option<FinalizationRecord>, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::GetFinalizationRecord)?;
        if state.faults.record_query_errors > 0 {
            state.faults.record_query_errors -= 1;
            return Err(RpcError::internal_error("record index unavailable").into());
        }
        Ok(self.lookup_record(&mut state, hash))
    }

    async fn account_token_balance(
        &self,
        token: &Address,
        account: &Address,
    ) -> Result<u128, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::GetTokenBalance)?;
        let contract = state
            .tokens
            .get(token)
            .ok_or_else(|| NodeError::from(RpcError::account_not_found(&token.to_string())))?;
        Ok(contract.balances.get(account).copied().unwrap_or(0))
    }

    async fn token_decimals(&self, token: &Address) -> Result<u8, NodeError> {
        let mut state = self.state.lock();
        self.enter(&mut state, RpcMethod::GetTokenDecimals)?;
        state
            .tokens
            .get(token)
            .map(|t| t.decimals)
            .ok_or_else(|| RpcError::account_not_found(&token.to_string()).into())
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// Hands out a shared [`InMemoryLedger`], honoring its outage knobs.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    ledger: Arc<InMemoryLedger>,
    dials: Arc<AtomicU32>,
}

impl MemoryConnector {
    pub fn new(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            ledger,
            dials: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of dial attempts so far, successful or not.
    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _endpoint: &Url) -> Result<NodeHandle, NodeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.ledger.state.lock();
            if state.faults.offline {
                return Err(NodeError::Connectivity("ledger offline".into()));
            }
            if state.faults.refused_dials > 0 {
                state.faults.refused_dials -= 1;
                return Err(NodeError::Connectivity("connection refused".into()));
            }
        }
        Ok(self.ledger.clone())
    }
}
