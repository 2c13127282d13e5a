use crate::contract::{Arg, ContractInstance};
use crate::error::{Error, Result};
use crate::script::UnlockingScript;
use crate::sighash;

use super::{
    DEFAULT_SEQUENCE, SpentOutput, TxInput, TxOutput, Unlock, UnsignedTransaction, UnspentOutput,
};

/// Parameters for calling a method on a deployed contract.
pub struct InvokeParams {
    pub method: String,
    pub args: Vec<Arg>,
    /// The contract output being spent.
    pub utxo: UnspentOutput,
    pub fee: u64,
}

/// Build the invoke transaction.
///
/// The prior locking script used for the preimage is the UTXO's own script
/// when present, otherwise the bound contract's locking predicate.
///
/// Input 0: contract UTXO, unlocked by `method(args)`
///
/// Output 0: contract locking predicate, `utxo.satoshis - fee`
pub fn build_invoke_tx(
    contract: &ContractInstance,
    params: &InvokeParams,
) -> Result<UnsignedTransaction> {
    let method = contract.method(&params.method)?;
    method.check_args(&params.args)?;

    let utxo = &params.utxo;
    let out_value = utxo
        .satoshis
        .checked_sub(params.fee)
        .ok_or(Error::InsufficientFunds {
            available: utxo.satoshis,
            required: params.fee,
        })?;

    let prevout = utxo
        .outpoint()
        .map_err(|e| Error::PreimageComputation(format!("unspent output reference: {e}")))?;
    let prior_script = if utxo.script.is_empty() {
        contract.locking_predicate().clone()
    } else {
        utxo.script.clone()
    };
    if prior_script.is_empty() {
        return Err(Error::PreimageComputation(
            "no prior locking script for the contract input".into(),
        ));
    }

    let mut tx = UnsignedTransaction::new(params.fee);
    tx.inputs.push(TxInput {
        prevout,
        sequence: DEFAULT_SEQUENCE,
        unlock: Unlock::Script(UnlockingScript::new()),
        spends: Some(SpentOutput {
            script: prior_script.clone(),
            value: utxo.satoshis,
        }),
    });
    tx.outputs.push(TxOutput {
        value: out_value,
        script: contract.locking_predicate().clone(),
    });

    // The preimage commits to outputs but not to scriptSigs, so it can be
    // computed before the unlocking script exists.
    let preimage = sighash::preimage(&tx, 0, &prior_script, utxo.satoshis)?;
    let unlocking = contract.unlocking_script(&params.method, &params.args, Some(&preimage))?;
    tx.inputs[0].unlock = Unlock::Script(unlocking);

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Chunk, Script, push_data};
    use crate::testing::{demo_contract, demo_utxo};

    fn params(method: &str, args: Vec<Arg>, satoshis: u64, fee: u64) -> InvokeParams {
        InvokeParams {
            method: method.to_string(),
            args,
            utxo: demo_utxo(satoshis),
            fee,
        }
    }

    #[test]
    fn known_method_output_value() {
        let tx = build_invoke_tx(&demo_contract(), &params("add", vec![Arg::Int(1)], 500, 10))
            .unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 490);
        assert!(tx.fee_covered());
        assert_eq!(tx.signable_inputs(), 1);
    }

    #[test]
    fn unknown_method_builds_nothing() {
        let err = build_invoke_tx(&demo_contract(), &params("mint", vec![], 500, 10)).unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(ref m) if m == "mint"));
    }

    #[test]
    fn unknown_method_checked_before_funds() {
        let err = build_invoke_tx(&demo_contract(), &params("mint", vec![], 5, 10)).unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(_)));
    }

    #[test]
    fn utxo_below_fee() {
        let err = build_invoke_tx(&demo_contract(), &params("add", vec![Arg::Int(1)], 5, 10))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[test]
    fn malformed_utxo_reference() {
        let mut p = params("add", vec![Arg::Int(1)], 500, 10);
        p.utxo.txid = "xyz".into();
        let err = build_invoke_tx(&demo_contract(), &p).unwrap_err();
        assert!(matches!(err, Error::PreimageComputation(_)));
    }

    #[test]
    fn preimage_injected_for_declared_param() {
        let contract = demo_contract();
        let p = params("settle", vec![], 500, 10);
        let tx = build_invoke_tx(&contract, &p).unwrap();

        let expected = sighash::preimage(&tx, 0, &p.utxo.script, 500).unwrap();
        let Unlock::Script(unlocking) = &tx.inputs[0].unlock else {
            panic!("contract input must carry an unlocking script");
        };
        assert_eq!(unlocking.chunks()[0], Chunk::Signature);
        assert_eq!(unlocking.chunks()[1], Chunk::Raw(push_data(&expected)));
    }

    #[test]
    fn falls_back_to_bound_predicate() {
        let contract = demo_contract();
        let mut p = params("add", vec![Arg::Int(1)], 500, 10);
        p.utxo.script = Script::new();
        let tx = build_invoke_tx(&contract, &p).unwrap();
        let spends = tx.inputs[0].spends.as_ref().unwrap();
        assert_eq!(&spends.script, contract.locking_predicate());
    }
}
