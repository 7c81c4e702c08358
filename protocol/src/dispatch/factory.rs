//! Turns "send this to that recipient" into a signed transaction.
//!
//! Steps, in order: chain id (queried once, then cached), nonce, fee unit
//! price, assembly, signature. A nonce issued here is not returned if a
//! later step fails; the allocator never hands the same value out twice.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use super::error::DispatchError;
use super::nonce::NonceAllocator;
use crate::cancel::CancelToken;
use crate::crypto::{Address, Credential};
use crate::network::ConnectionSupervisor;
use crate::transaction::{sign_transaction, SignedTransaction, TransactionBuilder, Transfer};

/// Builds and signs outbound transactions.
#[derive(Debug)]
pub struct TransactionFactory {
    supervisor: Arc<ConnectionSupervisor>,
    nonces: Arc<NonceAllocator>,
    fee_budget: u64,
    chain_id: OnceCell<u64>,
}

impl TransactionFactory {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        nonces: Arc<NonceAllocator>,
        fee_budget: u64,
    ) -> Self {
        Self {
            supervisor,
            nonces,
            fee_budget,
            chain_id: OnceCell::new(),
        }
    }

    /// The ledger's chain id, queried on first use.
    pub async fn chain_id(&self, cancel: &CancelToken) -> Result<u64, DispatchError> {
        self.chain_id
            .get_or_try_init(|| async {
                self.supervisor
                    .call(cancel, |node| async move { node.chain_id().await })
                    .await
                    .map_err(|e| DispatchError::from_supervisor(e, DispatchError::Construction))
            })
            .await
            .copied()
    }

    /// Builds and signs a transaction delivering `transfer` to `recipient`.
    pub async fn build(
        &self,
        credential: &Credential,
        recipient: Address,
        transfer: Transfer,
        cancel: &CancelToken,
    ) -> Result<SignedTransaction, DispatchError> {
        if recipient.is_zero() {
            return Err(DispatchError::Construction(
                "recipient is the zero address".into(),
            ));
        }

        let chain_id = self.chain_id(cancel).await?;
        let sender = credential.address();
        let nonce = self
            .nonces
            .next_nonce(&self.supervisor, &sender, cancel)
            .await?;

        let fee_unit_price = self
            .supervisor
            .call(cancel, |node| async move {
                node.suggested_fee_unit_price().await
            })
            .await
            .map_err(|e| DispatchError::from_supervisor(e, DispatchError::Construction))?;

        let tx = TransactionBuilder::new(recipient, transfer)
            .chain_id(chain_id)
            .nonce(nonce)
            .fee_budget(self.fee_budget)
            .fee_unit_price(fee_unit_price)
            .build();
        let signed = sign_transaction(tx, credential);

        debug!(
            %sender,
            %recipient,
            nonce,
            fee_unit_price,
            hash = %signed.hash(),
            "transaction signed"
        );
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SupervisorConfig, DEFAULT_FEE_BUDGET};
    use crate::network::{InMemoryLedger, MemoryConnector};
    use crate::transaction::{decode_token_call, TokenCall};

    fn factory(ledger: &Arc<InMemoryLedger>) -> TransactionFactory {
        let sup = ConnectionSupervisor::new(
            "memory://ledger",
            Arc::new(MemoryConnector::new(ledger.clone())),
            SupervisorConfig::default(),
        )
        .unwrap();
        TransactionFactory::new(Arc::new(sup), Arc::new(NonceAllocator::new()), DEFAULT_FEE_BUDGET)
    }

    #[tokio::test(start_paused = true)]
    async fn native_transfer_is_signed_for_the_chain() {
        let ledger = Arc::new(InMemoryLedger::new(5).with_fee_unit_price(30));
        let f = factory(&ledger);
        let cred = Credential::from_seed(&[1u8; 32]);
        let bob = Address::from_bytes([0xbb; 20]);

        let signed = f
            .build(&cred, bob, Transfer::Native { value: 5 }, &CancelToken::never())
            .await
            .unwrap();
        assert!(signed.verify());
        assert_eq!(signed.sender(), cred.address());
        assert_eq!(signed.transaction.chain_id, 5);
        assert_eq!(signed.transaction.nonce, 0);
        assert_eq!(signed.transaction.fee_unit_price, 30);
        assert_eq!(signed.transaction.fee_budget, DEFAULT_FEE_BUDGET);
        assert_eq!(signed.transaction.to, bob);
    }

    #[tokio::test(start_paused = true)]
    async fn token_transfer_targets_contract() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let f = factory(&ledger);
        let cred = Credential::from_seed(&[1u8; 32]);
        let bob = Address::from_bytes([0xbb; 20]);
        let token = Address::from_bytes([0x70; 20]);

        let signed = f
            .build(
                &cred,
                bob,
                Transfer::Token { contract: token, amount: 42 },
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert_eq!(signed.transaction.to, token);
        let payload = signed.transaction.payload.as_deref().unwrap();
        assert_eq!(
            decode_token_call(payload),
            Some((TokenCall::Transfer, bob, 42))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mint_carries_add_token_calldata() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let f = factory(&ledger);
        let cred = Credential::from_seed(&[1u8; 32]);
        let bob = Address::from_bytes([0xbb; 20]);
        let token = Address::from_bytes([0x70; 20]);

        let signed = f
            .build(
                &cred,
                bob,
                Transfer::Mint { contract: token, amount: 8 },
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert!(signed.verify());
        assert_eq!(signed.transaction.to, token);
        assert_eq!(signed.transaction.value, 0);
        let payload = signed.transaction.payload.as_deref().unwrap();
        assert_eq!(decode_token_call(payload), Some((TokenCall::Mint, bob, 8)));
    }

    #[tokio::test(start_paused = true)]
    async fn chain_id_is_queried_once() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let f = factory(&ledger);
        let cred = Credential::from_seed(&[1u8; 32]);
        let bob = Address::from_bytes([0xbb; 20]);
        let cancel = CancelToken::never();

        for _ in 0..3 {
            f.build(&cred, bob, Transfer::Native { value: 1 }, &cancel)
                .await
                .unwrap();
        }
        let chain_queries = ledger
            .calls()
            .into_iter()
            .filter(|m| *m == "ledger_chainId")
            .count();
        assert_eq!(chain_queries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_recipient_is_refused_before_any_query() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let f = factory(&ledger);
        let cred = Credential::from_seed(&[1u8; 32]);

        let err = f
            .build(&cred, Address::ZERO, Transfer::Native { value: 1 }, &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Construction(_)));
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn build_is_deterministic_for_same_inputs() {
        let cred = Credential::from_seed(&[1u8; 32]);
        let bob = Address::from_bytes([0xbb; 20]);

        let a = factory(&Arc::new(InMemoryLedger::new(5)))
            .build(&cred, bob, Transfer::Native { value: 1 }, &CancelToken::never())
            .await
            .unwrap();
        let b = factory(&Arc::new(InMemoryLedger::new(5)))
            .build(&cred, bob, Transfer::Native { value: 1 }, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }
}
