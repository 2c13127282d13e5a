//! The wallet session: one identity, its balance and history, and at most
//! one bound contract.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::broadcast::{broadcast, sign_transaction};
use crate::config::WalletConfig;
use crate::contract::{Arg, ContractInstance};
use crate::error::{Error, Result};
use crate::interpreter::{ContractInterpreter, ScryptInterpreter};
use crate::keys::{Address, Identity};
use crate::network::Network;
use crate::oracle::{HistoryEntry, HttpOracle, LedgerOracle, SubmissionResult};
use crate::signing::{Secp256k1Provider, SigningProvider};
use crate::state::{
    ContractState, Operation, SessionError, SessionSnapshot, SessionState, SubmissionRecord,
};
use crate::tx::deploy::{DeployParams, build_deploy_tx};
use crate::tx::invoke::{InvokeParams, build_invoke_tx};
use crate::tx::{OutPoint, SignedTransaction, UnspentOutput};

/// Result of a deploy broadcast.
#[derive(Debug, Clone)]
pub struct DeployResult {
    /// txid of the signed transaction as computed locally.
    pub txid: String,
    pub submission: SubmissionResult,
    pub previous_state: ContractState,
    pub new_state: ContractState,
    pub locked_value: u64,
    pub raw_tx: String,
}

/// Result of an invoke broadcast.
#[derive(Debug, Clone)]
pub struct InvokeResult {
    pub txid: String,
    pub submission: SubmissionResult,
    pub method: String,
    pub previous_state: ContractState,
    pub new_state: ContractState,
    pub output_value: u64,
    pub raw_tx: String,
}

/// Wallet engine bound to a single keypair.
///
/// Every operation returns its outcome and also records failures in the
/// session's last-error slot, cleared according to
/// [`ErrorPolicy`](crate::config::ErrorPolicy). A failed operation leaves
/// prior state untouched.
///
/// # Ordering
///
/// Operations suspend only while waiting on the ledger oracle. By default
/// they are not serialized: when two fetches overlap, the one that
/// completes last wins, regardless of which was issued first. Set
/// [`WalletConfig::serialize_operations`] to make operations on one
/// session complete in issue order.
///
/// A deploy or invoke that completes after the contract was rebound still
/// returns its submission, but does not advance the new contract's
/// lifecycle. Likewise, a fetch that completes after re-initialization
/// does not overwrite the new identity's balance or history.
pub struct WalletSession {
    config: WalletConfig,
    oracle: Arc<dyn LedgerOracle>,
    signer: Arc<dyn SigningProvider>,
    interpreter: Arc<dyn ContractInterpreter>,
    state: Mutex<SessionState>,
    op_lock: tokio::sync::Mutex<()>,
}

impl WalletSession {
    pub fn new(
        config: WalletConfig,
        oracle: Arc<dyn LedgerOracle>,
        signer: Arc<dyn SigningProvider>,
        interpreter: Arc<dyn ContractInterpreter>,
    ) -> Self {
        Self {
            config,
            oracle,
            signer,
            interpreter,
            state: Mutex::new(SessionState::default()),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Session backed by the HTTP oracle, secp256k1 and the sCrypt artifact
    /// interpreter.
    pub fn with_defaults(config: WalletConfig) -> Result<Self> {
        let url = config.oracle_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!("oracle url must be http(s): {url}")));
        }
        let oracle = Arc::new(HttpOracle::new(url));
        Ok(Self::new(
            config,
            oracle,
            Arc::new(Secp256k1Provider::new()),
            Arc::new(ScryptInterpreter),
        ))
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn serialize(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if self.config.serialize_operations {
            Some(self.op_lock.lock().await)
        } else {
            None
        }
    }

    fn begin(&self) {
        self.state().begin(self.config.error_policy);
    }

    fn fail<T>(&self, operation: Operation, error: Error) -> Result<T> {
        log::warn!("{operation:?} failed: {error}");
        self.state().failed(operation, &error);
        Err(error)
    }

    fn identity(&self, operation: Operation) -> Result<Arc<Identity>> {
        let identity = self.state().identity.clone();
        match identity {
            Some(identity) => Ok(identity),
            None => self.fail(operation, Error::NoIdentity),
        }
    }

    fn bound(&self, operation: Operation) -> Result<(Arc<Identity>, Arc<ContractInstance>)> {
        let identity = self.identity(operation)?;
        let contract = self.state().contract.clone();
        match contract {
            Some(contract) => Ok((identity, contract)),
            None => self.fail(operation, Error::NoContract),
        }
    }

    // ------------------------------------------------------------------
    // Identity and ledger queries
    // ------------------------------------------------------------------

    /// Load the identity from WIF key material.
    ///
    /// Replaces any previous identity and resets balance and history. With
    /// `sync_on_initialize` set, balance and history are then refreshed;
    /// failures there are recorded but do not fail initialization.
    pub async fn initialize(&self, raw_key_material: &str) -> Result<Address> {
        let _guard = self.serialize().await;
        self.begin();

        let identity =
            match Identity::from_key_material(self.signer.as_ref(), raw_key_material, self.network())
            {
                Ok(identity) => Arc::new(identity),
                Err(e) => return self.fail(Operation::Initialize, e),
            };
        let address = identity.address().clone();
        {
            let mut state = self.state();
            state.identity = Some(identity);
            state.balance = 0;
            state.history.clear();
            state.succeeded(self.config.error_policy, Operation::Initialize);
        }
        log::info!("wallet initialized for {address} on {}", self.network().as_str());

        if self.config.sync_on_initialize {
            let _ = self.sync_inner().await;
        }
        Ok(address)
    }

    /// Refresh balance and history. Both are attempted; the first failure
    /// is returned.
    pub async fn sync(&self) -> Result<()> {
        let _guard = self.serialize().await;
        self.begin();
        self.sync_inner().await
    }

    // `_inner` helpers never call `begin`. The public entry point clears the
    // error slot once, before its first step.
    async fn sync_inner(&self) -> Result<()> {
        let balance = self.fetch_balance_inner().await;
        let history = self.fetch_history_inner().await;
        balance?;
        history?;
        Ok(())
    }

    pub async fn fetch_balance(&self) -> Result<u64> {
        let _guard = self.serialize().await;
        self.begin();
        self.fetch_balance_inner().await
    }

    async fn fetch_balance_inner(&self) -> Result<u64> {
        let identity = self.identity(Operation::FetchBalance)?;
        let balance = match self.oracle.balance(identity.address()).await {
            Ok(balance) => balance,
            Err(e) => return self.fail(Operation::FetchBalance, e),
        };

        let mut state = self.state();
        if state
            .identity
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &identity))
        {
            state.balance = balance;
        }
        state.succeeded(self.config.error_policy, Operation::FetchBalance);
        log::debug!("balance for {}: {balance}", identity.address());
        Ok(balance)
    }

    pub async fn fetch_history(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.serialize().await;
        self.begin();
        self.fetch_history_inner().await
    }

    async fn fetch_history_inner(&self) -> Result<Vec<HistoryEntry>> {
        let identity = self.identity(Operation::FetchHistory)?;
        let history = match self.oracle.history(identity.address()).await {
            Ok(history) => history,
            Err(e) => return self.fail(Operation::FetchHistory, e),
        };

        let mut state = self.state();
        if state
            .identity
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &identity))
        {
            state.history = history.clone();
        }
        state.succeeded(self.config.error_policy, Operation::FetchHistory);
        log::debug!(
            "history for {}: {} entries",
            identity.address(),
            history.len()
        );
        Ok(history)
    }

    // ------------------------------------------------------------------
    // Contract binding and transactions
    // ------------------------------------------------------------------

    /// Bind a contract description to constructor `args`.
    ///
    /// On success the instance replaces any previous one and the lifecycle
    /// restarts at [`ContractState::Bound`]. On failure the previous
    /// instance is kept.
    pub async fn bind_contract(
        &self,
        description: &serde_json::Value,
        args: Vec<Arg>,
    ) -> Result<Arc<ContractInstance>> {
        let _guard = self.serialize().await;
        self.begin();
        let instance = match ContractInstance::bind(self.interpreter.clone(), description, args) {
            Ok(instance) => Arc::new(instance),
            Err(e) => return self.fail(Operation::BindContract, e),
        };

        let mut state = self.state();
        state.contract = Some(instance.clone());
        state.contract_state = ContractState::Bound;
        state.succeeded(self.config.error_policy, Operation::BindContract);
        log::info!(
            "bound contract {} ({} bytes locking script)",
            instance.name(),
            instance.locking_predicate().len()
        );
        Ok(instance)
    }

    /// Lock the whole known balance, less `fee`, into the bound contract.
    pub async fn deploy(&self, fee: u64) -> Result<DeployResult> {
        let _guard = self.serialize().await;
        self.begin();
        self.deploy_inner(fee, None).await
    }

    /// As [`deploy`](Self::deploy), spending an explicit funding outpoint
    /// instead of the placeholder reference.
    pub async fn deploy_with_funding(&self, fee: u64, funding: OutPoint) -> Result<DeployResult> {
        let _guard = self.serialize().await;
        self.begin();
        self.deploy_inner(fee, Some(funding)).await
    }

    async fn deploy_inner(&self, fee: u64, funding: Option<OutPoint>) -> Result<DeployResult> {
        let (identity, contract) = self.bound(Operation::Deploy)?;
        let balance = self.state().balance;

        let params = DeployParams {
            balance,
            fee,
            funding_script: identity.locking_script(),
            funding,
        };
        let signed = match build_deploy_tx(&contract, &params)
            .and_then(|tx| sign_transaction(self.signer.as_ref(), &tx, &identity))
        {
            Ok(signed) => signed,
            Err(e) => return self.fail(Operation::Deploy, e),
        };
        let locked_value = signed.unsigned.output_value();

        let submitted = self
            .submit(Operation::Deploy, &contract, &signed, |_, txid| {
                ContractState::Deployed {
                    txid: txid.to_string(),
                }
            })
            .await?;
        log::info!(
            "deploy of {} submitted: {:?}",
            contract.name(),
            submitted.result
        );
        Ok(DeployResult {
            txid: submitted.local_txid,
            submission: submitted.result,
            previous_state: submitted.previous_state,
            new_state: submitted.new_state,
            locked_value,
            raw_tx: signed.to_hex(),
        })
    }

    /// Call `method(args)` on the bound contract, spending `utxo`.
    ///
    /// The output re-locks `utxo.satoshis - fee` under the contract's
    /// locking script.
    pub async fn invoke(
        &self,
        method: &str,
        args: Vec<Arg>,
        utxo: UnspentOutput,
        fee: u64,
    ) -> Result<InvokeResult> {
        let _guard = self.serialize().await;
        self.begin();
        let (identity, contract) = self.bound(Operation::Invoke)?;

        let params = InvokeParams {
            method: method.to_string(),
            args,
            utxo,
            fee,
        };
        let signed = match build_invoke_tx(&contract, &params)
            .and_then(|tx| sign_transaction(self.signer.as_ref(), &tx, &identity))
        {
            Ok(signed) => signed,
            Err(e) => return self.fail(Operation::Invoke, e),
        };
        let output_value = signed.unsigned.output_value();

        let submitted = self
            .submit(Operation::Invoke, &contract, &signed, |prev, txid| {
                prev.after_invoke(txid.to_string())
            })
            .await?;
        log::info!(
            "invoke of {}.{method} submitted: {:?}",
            contract.name(),
            submitted.result
        );
        Ok(InvokeResult {
            txid: submitted.local_txid,
            submission: submitted.result,
            method: method.to_string(),
            previous_state: submitted.previous_state,
            new_state: submitted.new_state,
            output_value,
            raw_tx: signed.to_hex(),
        })
    }

    /// Broadcast `signed` and record the outcome.
    ///
    /// `next` computes the lifecycle state after an accepted submission. It
    /// is applied only if `contract` is still the bound instance.
    async fn submit(
        &self,
        operation: Operation,
        contract: &Arc<ContractInstance>,
        signed: &SignedTransaction,
        next: impl FnOnce(&ContractState, &str) -> ContractState,
    ) -> Result<Submitted> {
        let local_txid = signed.txid();
        let result = match broadcast(self.oracle.as_ref(), signed).await {
            Ok(result) => result,
            Err(e) => return self.fail(operation, e),
        };

        let mut state = self.state();
        state.last_submission = Some(SubmissionRecord {
            operation,
            local_txid: local_txid.clone(),
            result: result.clone(),
            submitted_at: Utc::now(),
        });
        state.succeeded(self.config.error_policy, operation);

        let previous_state = state.contract_state.clone();
        let still_bound = state
            .contract
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, contract));
        let new_state = match &result {
            SubmissionResult::Accepted { txid } if still_bound => {
                let new_state = next(&previous_state, txid);
                state.contract_state = new_state.clone();
                new_state
            }
            SubmissionResult::Accepted { .. } => {
                log::warn!("{operation:?} accepted after the contract was rebound");
                previous_state.clone()
            }
            SubmissionResult::Rejected { reason } => {
                log::warn!("{operation:?} rejected by the oracle: {reason}");
                previous_state.clone()
            }
        };
        Ok(Submitted {
            local_txid,
            result,
            previous_state,
            new_state,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn identity_address(&self) -> Option<Address> {
        self.state().identity.as_ref().map(|id| id.address().clone())
    }

    pub fn public_key(&self) -> Option<Vec<u8>> {
        self.state().identity.as_ref().map(|id| id.public_key().to_vec())
    }

    pub fn balance(&self) -> u64 {
        self.state().balance
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().history.clone()
    }

    pub fn contract(&self) -> Option<Arc<ContractInstance>> {
        self.state().contract.clone()
    }

    pub fn contract_state(&self) -> ContractState {
        self.state().contract_state.clone()
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.state().last_error.clone()
    }

    pub fn last_submission(&self) -> Option<SubmissionRecord> {
        self.state().last_submission.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state().snapshot()
    }
}

struct Submitted {
    local_txid: String,
    result: SubmissionResult,
    previous_state: ContractState,
    new_state: ContractState,
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("network", &self.config.network)
            .field("address", &self.identity_address())
            .finish_non_exhaustive()
    }
}
