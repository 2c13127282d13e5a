use crate::contract::ContractInstance;
use crate::error::{Error, Result};
use crate::script::Script;

use super::{DEFAULT_SEQUENCE, OutPoint, SpentOutput, TxInput, TxOutput, Unlock, UnsignedTransaction};

/// Parameters for constructing a deploy transaction.
///
/// The whole wallet balance is treated as a single funding source locked by
/// `funding_script`; its value minus the fee moves into the contract output.
pub struct DeployParams {
    pub balance: u64,
    pub fee: u64,
    pub funding_script: Script,
    /// Funding outpoint, when known. The all-zero placeholder otherwise.
    pub funding: Option<OutPoint>,
}

/// Build the deploy transaction.
///
/// Input 0: funding input (P2PKH, signed by the wallet identity)
///
/// Output 0: contract locking predicate, `balance - fee`
pub fn build_deploy_tx(
    contract: &ContractInstance,
    params: &DeployParams,
) -> Result<UnsignedTransaction> {
    let locked_value = params
        .balance
        .checked_sub(params.fee)
        .ok_or(Error::InsufficientFunds {
            available: params.balance,
            required: params.fee,
        })?;

    let mut tx = UnsignedTransaction::new(params.fee);
    tx.inputs.push(TxInput {
        prevout: params.funding.unwrap_or_else(OutPoint::placeholder),
        sequence: DEFAULT_SEQUENCE,
        unlock: Unlock::P2pkh,
        spends: Some(SpentOutput {
            script: params.funding_script.clone(),
            value: params.balance,
        }),
    });
    tx.outputs.push(TxOutput {
        value: locked_value,
        script: contract.locking_predicate().clone(),
    });

    Ok(tx)
}
