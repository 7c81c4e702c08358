//! # Batch Distribution
//!
//! Sends the same transfer to every recipient of a list and reports one
//! [`TransactionResult`] per recipient, in input order.
//!
//! ## Per-Recipient Pipeline
//!
//! ```text
//! Signing ──► Broadcasting ──► AwaitingConfirmation ──► Finished
//!  factory      broadcaster        receipt tracker
//! ```
//!
//! Each step emits a [`BatchEvent::Status`]; the finished result follows as
//! a [`BatchEvent::Result`]. A failure at any step ends that recipient's
//! pipeline and the batch moves on to the next one.
//!
//! ## Concurrency
//!
//! `max_in_flight = 1` (the default) runs recipients strictly one after
//! another. Larger values overlap recipients through an order-preserving
//! `buffered` stream. Signing and broadcasting stay serialized behind one
//! lock so transactions reach the node in nonce order; only receipt waits
//! overlap. Results are still emitted in input order.
//!
//! ## Cancellation
//!
//! The token is checked before each recipient starts. Recipients that never
//! started are reported as skipped; a receipt wait in progress ends as
//! unknown.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::broadcaster::Broadcaster;
use super::error::DispatchError;
use super::factory::TransactionFactory;
use super::nonce::NonceAllocator;
use super::receipt::{ReceiptOutcome, ReceiptTracker};
use super::result::{BatchEvent, BatchStatus, BatchSummary, Outcome, Stage, TransactionResult};
use crate::cancel::{CancelHandle, CancelToken};
use crate::config::{DispatchConfig, DistributorConfig, EVENT_CHANNEL_CAPACITY, MAX_TOKEN_DECIMALS};
use crate::crypto::{Address, Credential};
use crate::network::ConnectionSupervisor;
use crate::transaction::Transfer;

type EventSink<'a> = Option<&'a mpsc::Sender<BatchEvent>>;

/// A batch running on its own task.
///
/// `events` must be drained: once the channel is full the batch waits for
/// the observer.
#[derive(Debug)]
pub struct BatchHandle {
    pub events: mpsc::Receiver<BatchEvent>,
    pub cancel: CancelHandle,
    pub join: JoinHandle<Result<Vec<TransactionResult>, DispatchError>>,
}

/// Drives the factory, broadcaster and receipt tracker over a recipient
/// list.
#[derive(Debug)]
pub struct BatchDistributor {
    supervisor: Arc<ConnectionSupervisor>,
    factory: TransactionFactory,
    broadcaster: Broadcaster,
    tracker: ReceiptTracker,
    config: DistributorConfig,
    submission: Mutex<()>,
}

impl BatchDistributor {
    /// Nonces come from `nonces`, which may be shared with other
    /// distributors sending from the same account.
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        nonces: Arc<NonceAllocator>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            factory: TransactionFactory::new(
                supervisor.clone(),
                nonces,
                config.distributor.fee_budget,
            ),
            broadcaster: Broadcaster::new(supervisor.clone()),
            tracker: ReceiptTracker::new(supervisor.clone(), config.receipt.clone()),
            config: config.distributor.clone(),
            submission: Mutex::new(()),
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Runs the batch to completion.
    ///
    /// Returns exactly one result per recipient. The only errors are
    /// configuration problems found before the first recipient starts. A
    /// node that stays unreachable while the token is looked up fails every
    /// recipient at the connection stage instead.
    pub async fn run(
        &self,
        credential: &Credential,
        recipients: &[Address],
        transfer: Transfer,
        events: EventSink<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<TransactionResult>, DispatchError> {
        if recipients.is_empty() {
            info!("recipient list is empty, nothing to send");
            return Ok(Vec::new());
        }

        let transfer = match self.resolve_amount(transfer, cancel).await {
            Ok(t) => t,
            Err(e @ (DispatchError::Cancelled | DispatchError::Connectivity(_))) => {
                warn!(error = %e, "batch ended before the first recipient");
                let mut results = Vec::with_capacity(recipients.len());
                for (index, recipient) in recipients.iter().enumerate() {
                    let result = TransactionResult::from_error(index, *recipient, None, e.clone());
                    emit(events, BatchEvent::Result(result.clone())).await;
                    results.push(result);
                }
                return Ok(results);
            }
            Err(e) => return Err(e),
        };

        let in_flight = self.config.max_in_flight.max(1);
        info!(
            sender = %credential.address(),
            recipients = recipients.len(),
            %transfer,
            in_flight,
            "starting distribution"
        );

        let mut results = Vec::with_capacity(recipients.len());
        let mut pipelines = stream::iter(recipients.iter().copied().enumerate())
            .map(move |(index, recipient)| {
                self.process(index, recipient, transfer, credential, events, cancel)
            })
            .buffered(in_flight);

        while let Some(result) = pipelines.next().await {
            emit(events, BatchEvent::Result(result.clone())).await;
            results.push(result);
        }

        info!(summary = %BatchSummary::from_results(&results), "distribution finished");
        Ok(results)
    }

    /// Runs the batch on a new task and streams its events.
    pub fn spawn(
        self: Arc<Self>,
        credential: Arc<Credential>,
        recipients: Vec<Address>,
        transfer: Transfer,
    ) -> BatchHandle {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancelHandle::new();
        let token = cancel.token();
        let span = info_span!("batch", id = %Uuid::new_v4());

        let join = tokio::spawn(
            async move {
                self.run(&credential, &recipients, transfer, Some(&tx), &token)
                    .await
            }
            .instrument(span),
        );

        BatchHandle {
            events: rx,
            cancel,
            join,
        }
    }

    /// Scales whole-token amounts by the contract's decimals.
    async fn resolve_amount(
        &self,
        transfer: Transfer,
        cancel: &CancelToken,
    ) -> Result<Transfer, DispatchError> {
        let Some(contract) = transfer.token_contract() else {
            return Ok(transfer);
        };
        let amount = transfer.amount();
        if !self.config.scale_by_decimals {
            return Ok(transfer);
        }

        let decimals = self
            .supervisor
            .call(cancel, move |node| async move {
                node.token_decimals(&contract).await
            })
            .await
            .map_err(|e| {
                DispatchError::from_supervisor(e, |msg| {
                    DispatchError::Configuration(format!("token decimals unavailable: {}", msg))
                })
            })?;

        if decimals > MAX_TOKEN_DECIMALS {
            return Err(DispatchError::Configuration(format!(
                "token {} reports {} decimals, at most {} are supported",
                contract, decimals, MAX_TOKEN_DECIMALS
            )));
        }
        let scaled = 10u128
            .pow(u32::from(decimals))
            .checked_mul(amount)
            .ok_or_else(|| {
                DispatchError::Configuration(format!(
                    "amount {} with {} decimals does not fit in 128 bits",
                    amount, decimals
                ))
            })?;

        info!(%contract, decimals, amount, scaled, "scaled token amount");
        Ok(transfer.with_amount(scaled))
    }

    async fn process(
        &self,
        index: usize,
        recipient: Address,
        transfer: Transfer,
        credential: &Credential,
        events: EventSink<'_>,
        cancel: &CancelToken,
    ) -> TransactionResult {
        if cancel.is_cancelled() {
            debug!(index, %recipient, "batch cancelled, skipping recipient");
            return TransactionResult::skipped(index, recipient);
        }

        info!(index, %recipient, "sending");
        let result = self
            .dispatch_one(index, recipient, transfer, credential, events, cancel)
            .await;
        status(events, index, recipient, BatchStatus::Finished).await;

        match &result.outcome {
            Outcome::Succeeded => info!(index, %recipient, hash = ?result.hash, "transfer succeeded"),
            Outcome::Failed { stage } => warn!(
                index,
                %recipient,
                %stage,
                error = result.error.as_deref().unwrap_or(""),
                "transfer failed"
            ),
            Outcome::Unknown { reason } => warn!(index, %recipient, %reason, "transfer outcome unknown"),
            Outcome::Skipped => debug!(index, %recipient, "transfer skipped"),
        }
        result
    }

    async fn dispatch_one(
        &self,
        index: usize,
        recipient: Address,
        transfer: Transfer,
        credential: &Credential,
        events: EventSink<'_>,
        cancel: &CancelToken,
    ) -> TransactionResult {
        let submission = self.submission.lock().await;
        if cancel.is_cancelled() {
            return TransactionResult::skipped(index, recipient);
        }

        status(events, index, recipient, BatchStatus::Signing).await;
        let signed = match self.factory.build(credential, recipient, transfer, cancel).await {
            Ok(signed) => signed,
            Err(e) => return TransactionResult::from_error(index, recipient, None, e),
        };
        let hash = signed.hash();

        status(events, index, recipient, BatchStatus::Broadcasting).await;
        let record = match self.broadcaster.submit(signed, recipient, cancel).await {
            Ok(record) => record,
            Err(e) => return TransactionResult::from_error(index, recipient, Some(hash), e),
        };
        drop(submission);

        status(events, index, recipient, BatchStatus::AwaitingConfirmation).await;
        let mut result = match self.tracker.await_receipt(&record, cancel).await {
            Ok(ReceiptOutcome::Finalized {
                succeeded,
                resource_cost,
            }) => {
                let mut result = if succeeded {
                    TransactionResult::new(index, recipient, Outcome::Succeeded)
                } else {
                    let mut failed = TransactionResult::new(
                        index,
                        recipient,
                        Outcome::Failed {
                            stage: Stage::Execution,
                        },
                    );
                    failed.error = Some("execution failed on the ledger".into());
                    failed
                };
                result.resource_cost = Some(resource_cost);
                result
            }
            Ok(ReceiptOutcome::Unknown(reason)) => {
                TransactionResult::new(index, recipient, Outcome::Unknown { reason })
            }
            Err(e) => TransactionResult::from_error(index, recipient, Some(record.hash), e),
        };
        result.hash = Some(record.hash);

        if let (true, true, Some(contract)) = (
            result.succeeded(),
            self.config.report_balances,
            transfer.token_contract(),
        ) {
            result.balance_after = self.balance_after(contract, recipient, cancel).await;
        }
        result
    }

    /// Recipient's token balance. Failure is logged, never fatal.
    async fn balance_after(
        &self,
        contract: Address,
        recipient: Address,
        cancel: &CancelToken,
    ) -> Option<u128> {
        match self
            .supervisor
            .call(cancel, move |node| async move {
                node.account_token_balance(&contract, &recipient).await
            })
            .await
        {
            Ok(balance) => {
                info!(%recipient, %contract, balance, "recipient balance");
                Some(balance)
            }
            Err(e) => {
                warn!(%recipient, %contract, error = %e, "balance query failed");
                None
            }
        }
    }
}

async fn emit(events: EventSink<'_>, event: BatchEvent) {
    if let Some(tx) = events {
        // A dropped observer does not stop the batch.
        let _ = tx.send(event).await;
    }
}

async fn status(events: EventSink<'_>, index: usize, recipient: Address, status: BatchStatus) {
    emit(
        events,
        BatchEvent::Status {
            index,
            recipient,
            status,
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReceiptConfig, SupervisorConfig};
    use crate::network::{InMemoryLedger, MemoryConnector};
    use std::time::Duration;

    fn token() -> Address {
        Address::from_bytes([0x70; 20])
    }

    fn recipients(n: u8) -> Vec<Address> {
        (1..=n).map(|i| Address::from_bytes([i; 20])).collect()
    }

    fn distributor(ledger: &Arc<InMemoryLedger>, config: DispatchConfig) -> BatchDistributor {
        let sup = ConnectionSupervisor::new(
            "memory://ledger",
            Arc::new(MemoryConnector::new(ledger.clone())),
            config.supervisor.clone(),
        )
        .unwrap();
        BatchDistributor::new(Arc::new(sup), Arc::new(NonceAllocator::new()), &config)
    }

    fn funded(ledger: &InMemoryLedger) -> Credential {
        let cred = Credential::from_seed(&[1u8; 32]);
        ledger.fund(cred.address(), 10_000_000);
        cred
    }

    #[tokio::test(start_paused = true)]
    async fn empty_list_touches_nothing() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        let d = distributor(&ledger, DispatchConfig::default());
        let cred = funded(&ledger);

        let results = d
            .run(&cred, &[], Transfer::Native { value: 5 }, None, &CancelToken::never())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(ledger.calls().is_empty());
        assert!(!d.supervisor().is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn events_follow_pipeline_order() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        let d = distributor(&ledger, DispatchConfig::default());
        let cred = funded(&ledger);
        let list = recipients(2);
        let (tx, mut rx) = mpsc::channel(64);

        let results = d
            .run(&cred, &list, Transfer::Native { value: 5 }, Some(&tx), &CancelToken::never())
            .await
            .unwrap();
        drop(tx);
        assert!(results.iter().all(|r| r.succeeded()));

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(match ev {
                BatchEvent::Status { index, status, .. } => format!("{}:{:?}", index, status),
                BatchEvent::Result(r) => format!("{}:Result", r.index),
            });
        }
        assert_eq!(
            seen,
            vec![
                "0:Signing",
                "0:Broadcasting",
                "0:AwaitingConfirmation",
                "0:Finished",
                "0:Result",
                "1:Signing",
                "1:Broadcasting",
                "1:AwaitingConfirmation",
                "1:Finished",
                "1:Result",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn token_amount_is_scaled_and_balance_reported() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        let d = distributor(&ledger, DispatchConfig::default());
        let cred = funded(&ledger);
        ledger.deploy_token(token(), 18);
        ledger.mint(token(), cred.address(), 100 * 10u128.pow(18));
        let list = recipients(1);

        let results = d
            .run(
                &cred,
                &list,
                Transfer::Token { contract: token(), amount: 5 },
                None,
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert!(results[0].succeeded());
        assert_eq!(results[0].balance_after, Some(5 * 10u128.pow(18)));
        assert_eq!(ledger.token_balance(&token(), &list[0]), 5 * 10u128.pow(18));

        let decimals_queries = ledger
            .calls()
            .into_iter()
            .filter(|m| *m == "ledger_getTokenDecimals")
            .count();
        assert_eq!(decimals_queries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scaling_overflow_halts_before_any_recipient() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        let d = distributor(&ledger, DispatchConfig::default());
        let cred = funded(&ledger);
        ledger.deploy_token(token(), 38);

        let err = d
            .run(
                &cred,
                &recipients(3),
                Transfer::Token { contract: token(), amount: 1_000 },
                None,
                &CancelToken::never(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unscaled_when_disabled() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        let mut config = DispatchConfig::default();
        config.distributor.scale_by_decimals = false;
        config.distributor.report_balances = false;
        let d = distributor(&ledger, config);
        let cred = funded(&ledger);
        ledger.deploy_token(token(), 18);
        ledger.mint(token(), cred.address(), 1_000);
        let list = recipients(1);

        let results = d
            .run(
                &cred,
                &list,
                Transfer::Token { contract: token(), amount: 7 },
                None,
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert!(results[0].succeeded());
        assert_eq!(results[0].balance_after, None);
        assert_eq!(ledger.token_balance(&token(), &list[0]), 7);
        assert!(!ledger.calls().contains(&"ledger_getTokenDecimals"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_execution_is_reported_with_cost() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        let d = distributor(&ledger, DispatchConfig::default());
        let cred = funded(&ledger);
        let list = recipients(1);
        ledger.revert_transfers_to(list[0]);

        let results = d
            .run(&cred, &list, Transfer::Native { value: 5 }, None, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(
            results[0].outcome,
            Outcome::Failed {
                stage: Stage::Execution
            }
        );
        assert_eq!(results[0].resource_cost, Some(21_000));
        assert!(results[0].hash.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_pipelines_keep_input_order() {
        let ledger = Arc::new(InMemoryLedger::new(1).with_finalize_after_polls(1));
        let mut config = DispatchConfig::default();
        config.distributor.max_in_flight = 4;
        let d = distributor(&ledger, config);
        let cred = funded(&ledger);
        let list = recipients(8);

        let results = d
            .run(&cred, &list, Transfer::Native { value: 1 }, None, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(results.len(), 8);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.index, i);
            assert_eq!(r.recipient, list[i]);
            assert!(r.succeeded(), "{}", r);
        }
        let mut nonces: Vec<u64> = ledger
            .submitted()
            .iter()
            .map(|tx| tx.transaction.nonce)
            .collect();
        nonces.sort_unstable();
        assert_eq!(nonces, (0..8).collect::<Vec<u64>>());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_batch_can_be_cancelled() {
        let ledger = Arc::new(InMemoryLedger::new(1).with_finalize_after_polls(u32::MAX));
        let config = DispatchConfig {
            receipt: ReceiptConfig {
                poll_interval: Duration::from_secs(3),
                max_polls: None,
            },
            supervisor: SupervisorConfig::default(),
            ..DispatchConfig::default()
        };
        let d = Arc::new(distributor(&ledger, config));
        let cred = Arc::new(funded(&ledger));

        let mut handle = d.spawn(cred, recipients(3), Transfer::Native { value: 1 });

        // Wait until the first recipient is waiting on its receipt.
        loop {
            match handle.events.recv().await {
                Some(BatchEvent::Status {
                    status: BatchStatus::AwaitingConfirmation,
                    ..
                }) => break,
                Some(_) => continue,
                None => panic!("batch ended early"),
            }
        }
        handle.cancel.cancel();
        while handle.events.recv().await.is_some() {}

        let results = handle.join.await.unwrap().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].outcome,
            Outcome::Unknown {
                reason: "cancelled".into()
            }
        );
        assert_eq!(results[1].outcome, Outcome::Skipped);
        assert_eq!(results[2].outcome, Outcome::Skipped);
        assert_eq!(ledger.submitted().len(), 1);
    }
}
