use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ErrorPolicy;
use crate::contract::{Arg, ContractInstance};
use crate::error::{Error, ErrorKind};
use crate::keys::{Address, Identity};
use crate::oracle::{HistoryEntry, SubmissionResult};

/// Lifecycle of the bound contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ContractState {
    #[default]
    Unbound,
    Bound,
    /// An accepted deploy transaction.
    Deployed { txid: String },
    /// Accepted invocations since the last bind.
    Invoked { txid: String, count: u32 },
}

impl ContractState {
    pub fn is_bound(&self) -> bool {
        !matches!(self, ContractState::Unbound)
    }

    /// txid of the last accepted deploy or invoke.
    pub fn last_txid(&self) -> Option<&str> {
        match self {
            ContractState::Deployed { txid } | ContractState::Invoked { txid, .. } => {
                Some(txid.as_str())
            }
            _ => None,
        }
    }

    pub(crate) fn after_invoke(&self, txid: String) -> Self {
        let count = match self {
            ContractState::Invoked { count, .. } => count.saturating_add(1),
            _ => 1,
        };
        ContractState::Invoked { txid, count }
    }
}

/// Session operations, used to tag errors and submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    FetchBalance,
    FetchHistory,
    BindContract,
    Deploy,
    Invoke,
}

/// The most recent failure, as exposed to a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub operation: Operation,
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(operation: Operation, error: &Error) -> Self {
        Self {
            operation,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of the last broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub operation: Operation,
    /// txid computed from the signed bytes before submission.
    pub local_txid: String,
    pub result: SubmissionResult,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub identity: Option<Arc<Identity>>,
    pub balance: u64,
    pub history: Vec<HistoryEntry>,
    pub contract: Option<Arc<ContractInstance>>,
    pub contract_state: ContractState,
    pub last_error: Option<SessionError>,
    pub last_submission: Option<SubmissionRecord>,
}

impl SessionState {
    pub fn begin(&mut self, policy: ErrorPolicy) {
        if policy == ErrorPolicy::ClearOnAttempt {
            self.last_error = None;
        }
    }

    pub fn succeeded(&mut self, policy: ErrorPolicy, operation: Operation) {
        if policy == ErrorPolicy::ClearOnCategorySuccess
            && self
                .last_error
                .as_ref()
                .is_some_and(|e| e.operation == operation)
        {
            self.last_error = None;
        }
    }

    pub fn failed(&mut self, operation: Operation, error: &Error) {
        self.last_error = Some(SessionError::new(operation, error));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            address: self.identity.as_ref().map(|id| id.address().clone()),
            public_key: self.identity.as_ref().map(|id| hex::encode(id.public_key())),
            balance: self.balance,
            history: self.history.clone(),
            contract: self.contract.as_ref().map(|c| ContractSummary {
                name: c.name().to_string(),
                constructor_args: c.constructor_args().to_vec(),
                locking_script: c.locking_predicate().to_hex(),
                methods: c.methods().map(|m| m.name().to_string()).collect(),
            }),
            contract_state: self.contract_state.clone(),
            last_error: self.last_error.clone(),
            last_submission: self.last_submission.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractSummary {
    pub name: String,
    pub constructor_args: Vec<Arg>,
    pub locking_script: String,
    pub methods: Vec<String>,
}

/// Serializable view of a session. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub address: Option<Address>,
    pub public_key: Option<String>,
    pub balance: u64,
    pub history: Vec<HistoryEntry>,
    pub contract: Option<ContractSummary>,
    pub contract_state: ContractState,
    pub last_error: Option<SessionError>,
    pub last_submission: Option<SubmissionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_count_advances() {
        let deployed = ContractState::Deployed { txid: "a".into() };
        let first = deployed.after_invoke("b".into());
        assert_eq!(
            first,
            ContractState::Invoked {
                txid: "b".into(),
                count: 1
            }
        );
        let second = first.after_invoke("c".into());
        assert_eq!(second.last_txid(), Some("c"));
        assert!(matches!(second, ContractState::Invoked { count: 2, .. }));
    }

    #[test]
    fn category_success_clears_only_matching_error() {
        let mut state = SessionState::default();
        state.failed(Operation::FetchBalance, &Error::Network("down".into()));
        state.succeeded(ErrorPolicy::ClearOnCategorySuccess, Operation::FetchHistory);
        assert!(state.last_error.is_some());
        state.succeeded(ErrorPolicy::ClearOnCategorySuccess, Operation::FetchBalance);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn sticky_and_attempt_policies() {
        let mut state = SessionState::default();
        state.failed(Operation::Deploy, &Error::NoContract);
        state.succeeded(ErrorPolicy::Sticky, Operation::Deploy);
        state.begin(ErrorPolicy::Sticky);
        assert!(state.last_error.is_some());
        state.begin(ErrorPolicy::ClearOnAttempt);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn snapshot_serializes() {
        let state = SessionState::default();
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["contract_state"]["state"], "unbound");
        assert_eq!(json["balance"], 0);
    }
}
