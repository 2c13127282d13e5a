pub mod broadcast;
pub mod config;
pub mod contract;
pub mod error;
pub mod hash;
pub mod interpreter;
pub mod keys;
pub mod network;
pub mod oracle;
pub mod script;
pub mod session;
pub mod sighash;
pub mod signing;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tx;

// Core types
pub use config::{ErrorPolicy, WalletConfig};
pub use contract::{Arg, ContractInstance, ContractMethod};
pub use error::{Error, ErrorKind, Result};
pub use keys::{Address, Identity, SigningKey};
pub use network::Network;
pub use session::{DeployResult, InvokeResult, WalletSession};
pub use state::{ContractState, Operation, SessionError, SessionSnapshot, SubmissionRecord};

// Capabilities
pub use interpreter::{ContractDescription, ContractInterpreter, ScryptInterpreter};
pub use oracle::{HistoryEntry, HttpOracle, LedgerOracle, SubmissionResult};
pub use signing::{Secp256k1Provider, SigningProvider};

// Transaction construction
pub use broadcast::{broadcast, sign_transaction};
pub use script::{Script, UnlockingScript};
pub use tx::deploy::{DeployParams, build_deploy_tx};
pub use tx::invoke::{InvokeParams, build_invoke_tx};
pub use tx::{OutPoint, SignedTransaction, UnsignedTransaction, UnspentOutput};
