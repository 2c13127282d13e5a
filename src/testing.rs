//! Test utilities: a demo contract artifact, fixed key material and an
//! in-memory ledger oracle.
//!
//! Enabled for unit tests and, through the `testing` feature, for the
//! integration tests under `tests/`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use crate::contract::{Arg, ContractInstance};
use crate::error::{Error, Result};
use crate::interpreter::ScryptInterpreter;
use crate::keys::{Address, SigningKey, encode_wif};
use crate::network::Network;
use crate::oracle::{HistoryEntry, LedgerOracle, SubmissionResult};
use crate::tx::UnspentOutput;

/// Display txid used for fixture outputs.
pub const DEMO_TXID: &str = "6f1a4c5d0e3b2a19f8e7d6c5b4a3928170f6e5d4c3b2a1908f7e6d5c4b3a2910";

/// Secret scalar behind [`test_wif`].
pub const TEST_SECRET: [u8; 32] = [0x11; 32];

/// A small three-function sCrypt artifact.
///
/// Constructor `(x: int, y: int)`; functions `add(z: int)`, `sub(z: int)` and
/// `settle(sig: Sig, txPreimage: SigHashPreimage)`.
pub fn demo_artifact() -> serde_json::Value {
    json!({
        "version": 9,
        "compilerVersion": "1.19.0",
        "contract": "Demo",
        "md5": "00000000000000000000000000000000",
        "abi": [
            {
                "type": "function",
                "name": "add",
                "index": 0,
                "params": [{ "name": "z", "type": "int" }]
            },
            {
                "type": "function",
                "name": "sub",
                "index": 1,
                "params": [{ "name": "z", "type": "int" }]
            },
            {
                "type": "function",
                "name": "settle",
                "index": 2,
                "params": [
                    { "name": "sig", "type": "Sig" },
                    { "name": "txPreimage", "type": "SigHashPreimage" }
                ]
            },
            {
                "type": "constructor",
                "params": [
                    { "name": "x", "type": "int" },
                    { "name": "y", "type": "int" }
                ]
            }
        ],
        "hex": "<x><y>9387"
    })
}

/// [`demo_artifact`] bound to `x = 3, y = 4`.
pub fn demo_contract() -> ContractInstance {
    ContractInstance::bind(
        Arc::new(ScryptInterpreter),
        &demo_artifact(),
        vec![Arg::Int(3), Arg::Int(4)],
    )
    .expect("demo artifact binds")
}

/// A contract output holding `satoshis`, locked by [`demo_contract`].
pub fn demo_utxo(satoshis: u64) -> UnspentOutput {
    UnspentOutput {
        txid: DEMO_TXID.to_string(),
        output_index: 0,
        satoshis,
        script: demo_contract().locking_predicate().clone(),
    }
}

/// Fixed compressed WIF for `network`.
pub fn test_wif(network: Network) -> String {
    encode_wif(&SigningKey::from_bytes(TEST_SECRET, true), network)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Response,
}

impl Failure {
    fn to_error(self, what: &str) -> Error {
        match self {
            Failure::Network => Error::Network(format!("{what}: connection refused")),
            Failure::Response => Error::OracleResponse(format!("{what}: unexpected body")),
        }
    }
}

/// The oracle entry points, for gating and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    Balance,
    History,
    Submit,
}

/// Holds one oracle call until the test releases it.
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    released: Notify,
}

impl Gate {
    /// Resolves once the held call has reached the oracle.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn hold(&self) {
        self.entered.notify_one();
        self.released.notified().await;
    }
}

#[derive(Debug, Default)]
struct MockState {
    gates: HashMap<MockCall, Arc<Gate>>,
    calls: Vec<MockCall>,
    balance: u64,
    history: Vec<HistoryEntry>,
    submit_result: Option<SubmissionResult>,
    balance_failure: Option<Failure>,
    history_failure: Option<Failure>,
    submit_failure: Option<Failure>,
    submitted: Vec<Vec<u8>>,
    balance_calls: usize,
    history_calls: usize,
}

/// In-memory [`LedgerOracle`] with scripted answers and failure injection.
///
/// Submissions are accepted with the locally computed txid unless a result
/// was scripted with [`MockOracle::set_submit_result`].
#[derive(Debug, Default)]
pub struct MockOracle {
    state: Mutex<MockState>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(balance: u64) -> Self {
        let oracle = Self::new();
        oracle.set_balance(balance);
        oracle
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_balance(&self, balance: u64) {
        self.lock().balance = balance;
    }

    pub fn set_history(&self, history: Vec<HistoryEntry>) {
        self.lock().history = history;
    }

    pub fn set_submit_result(&self, result: SubmissionResult) {
        self.lock().submit_result = Some(result);
    }

    pub fn fail_balance(&self, failure: Option<Failure>) {
        self.lock().balance_failure = failure;
    }

    pub fn fail_history(&self, failure: Option<Failure>) {
        self.lock().history_failure = failure;
    }

    pub fn fail_submit(&self, failure: Option<Failure>) {
        self.lock().submit_failure = failure;
    }

    /// Raw transactions received so far, in submission order.
    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.lock().submitted.clone()
    }

    /// Hold the next `call` inside the oracle until the returned gate is
    /// released.
    pub fn hold_next(&self, call: MockCall) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().gates.insert(call, gate.clone());
        gate
    }

    /// Calls in the order they reached the oracle.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    async fn enter(&self, call: MockCall) {
        let gate = {
            let mut state = self.lock();
            state.calls.push(call);
            state.gates.remove(&call)
        };
        if let Some(gate) = gate {
            gate.hold().await;
        }
    }

    pub fn balance_calls(&self) -> usize {
        self.lock().balance_calls
    }

    pub fn history_calls(&self) -> usize {
        self.lock().history_calls
    }
}

#[async_trait]
impl LedgerOracle for MockOracle {
    async fn balance(&self, _address: &Address) -> Result<u64> {
        self.enter(MockCall::Balance).await;
        let mut state = self.lock();
        state.balance_calls += 1;
        match state.balance_failure {
            Some(f) => Err(f.to_error("balance")),
            None => Ok(state.balance),
        }
    }

    async fn history(&self, _address: &Address) -> Result<Vec<HistoryEntry>> {
        self.enter(MockCall::History).await;
        let mut state = self.lock();
        state.history_calls += 1;
        match state.history_failure {
            Some(f) => Err(f.to_error("history")),
            None => Ok(state.history.clone()),
        }
    }

    async fn submit_raw(&self, raw_tx: &[u8]) -> Result<SubmissionResult> {
        self.enter(MockCall::Submit).await;
        let mut state = self.lock();
        if let Some(f) = state.submit_failure {
            return Err(f.to_error("submit"));
        }
        state.submitted.push(raw_tx.to_vec());
        Ok(state.submit_result.clone().unwrap_or_else(|| {
            let mut hash = crate::hash::sha256d(raw_tx);
            hash.reverse();
            SubmissionResult::Accepted {
                txid: hex::encode(hash),
            }
        }))
    }
}
