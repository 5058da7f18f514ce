use std::str::FromStr;

use lwk_wollet::bitcoin::absolute::LockTime;
use lwk_wollet::bitcoin::consensus::encode::{deserialize, serialize_hex};
use lwk_wollet::bitcoin::hashes::Hash;
use lwk_wollet::bitcoin::sighash::{EcdsaSighashType, SighashCache};
use lwk_wollet::bitcoin::transaction::Version;
use lwk_wollet::bitcoin::{
    Amount, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use serde_json::json;

use super::{
    AmountValue, BlindRequest, OutputSpec, OutputTarget, ReissueRequest, SighashRequest, TxCodec,
    TxShape, missing_input, script_json,
};
use crate::error::TxBuildError;
use crate::network::Network;
use crate::script::{Unlocking, burn_script};
use crate::types::{Outpoint, SigHashKind, SigHashType, decode_hex};

/// Plain Bitcoin transaction codec.
#[derive(Debug, Clone, Copy)]
pub struct BitcoinCodec {
    network: Network,
}

impl BitcoinCodec {
    #[must_use]
    pub const fn new(network: Network) -> Self {
        Self { network }
    }

    fn read(tx_hex: &str) -> Result<Transaction, TxBuildError> {
        let bytes = decode_hex("tx", tx_hex)?;
        deserialize(&bytes).map_err(|e| TxBuildError::validation("tx", e.to_string()))
    }

    fn input_index(tx: &Transaction, outpoint: &Outpoint) -> Result<Option<usize>, TxBuildError> {
        let txid = Txid::from_str(&outpoint.txid)
            .map_err(|e| TxBuildError::validation("txid", e.to_string()))?;
        let wanted = OutPoint::new(txid, outpoint.vout);
        Ok(tx.input.iter().position(|input| input.previous_output == wanted))
    }

    fn require_input(tx: &Transaction, outpoint: &Outpoint) -> Result<usize, TxBuildError> {
        Self::input_index(tx, outpoint)?.ok_or_else(|| missing_input(outpoint))
    }
}

fn sighash_type(sighash: SigHashType) -> EcdsaSighashType {
    match (sighash.kind, sighash.anyone_can_pay) {
        (SigHashKind::All, false) => EcdsaSighashType::All,
        (SigHashKind::None, false) => EcdsaSighashType::None,
        (SigHashKind::Single, false) => EcdsaSighashType::Single,
        (SigHashKind::All, true) => EcdsaSighashType::AllPlusAnyoneCanPay,
        (SigHashKind::None, true) => EcdsaSighashType::NonePlusAnyoneCanPay,
        (SigHashKind::Single, true) => EcdsaSighashType::SinglePlusAnyoneCanPay,
    }
}

fn unsupported(operation: &'static str) -> TxBuildError {
    TxBuildError::crypto(operation, "not available for Bitcoin transactions")
}

impl TxCodec for BitcoinCodec {
    fn network(&self) -> Network {
        self.network
    }

    fn initialize(&self, version: u32, locktime: u32) -> Result<String, TxBuildError> {
        let version = i32::try_from(version)
            .map_err(|_| TxBuildError::validation("version", "out of range"))?;
        let tx = Transaction {
            version: Version(version),
            lock_time: LockTime::from_consensus(locktime),
            input: vec![],
            output: vec![],
        };
        Ok(serialize_hex(&tx))
    }

    fn add_input(&self, tx_hex: &str, outpoint: &Outpoint, sequence: u32) -> Result<String, TxBuildError> {
        let mut tx = Self::read(tx_hex)?;
        let txid = Txid::from_str(&outpoint.txid)
            .map_err(|e| TxBuildError::validation("txid", e.to_string()))?;
        tx.input.push(TxIn {
            previous_output: OutPoint::new(txid, outpoint.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence),
            witness: Witness::new(),
        });
        Ok(serialize_hex(&tx))
    }

    fn add_output(&self, tx_hex: &str, output: &OutputSpec) -> Result<String, TxBuildError> {
        let mut tx = Self::read(tx_hex)?;
        if output.asset.is_some() {
            return Err(TxBuildError::validation("asset", "Bitcoin outputs carry no asset"));
        }
        let script_pubkey = match &output.target {
            OutputTarget::Address(address) => self.network.decode_address(address)?.script_pubkey,
            OutputTarget::Script(script) => script.clone(),
            OutputTarget::Destroy => burn_script(),
            OutputTarget::Fee => {
                return Err(TxBuildError::validation("fee", "fee outputs are Elements only"));
            }
        };
        tx.output.push(TxOut {
            value: Amount::from_sat(output.amount),
            script_pubkey: ScriptBuf::from_bytes(script_pubkey),
        });
        Ok(serialize_hex(&tx))
    }

    fn find_input(&self, tx_hex: &str, outpoint: &Outpoint) -> Result<Option<usize>, TxBuildError> {
        Self::input_index(&Self::read(tx_hex)?, outpoint)
    }

    fn signature_hash(&self, tx_hex: &str, request: &SighashRequest<'_>) -> Result<[u8; 32], TxBuildError> {
        let tx = Self::read(tx_hex)?;
        let index = Self::require_input(&tx, request.outpoint)?;
        let script_code = Script::from_bytes(request.script_code);
        let hash_type = sighash_type(request.sighash_type);
        let cache = SighashCache::new(&tx);

        if request.segwit {
            let AmountValue::Explicit(amount) = request.value else {
                return Err(TxBuildError::validation(
                    "amountcommitment",
                    "Bitcoin inputs need an explicit amount",
                ));
            };
            let mut cache = cache;
            cache
                .p2wsh_signature_hash(index, script_code, Amount::from_sat(*amount), hash_type)
                .map(|hash| hash.to_byte_array())
                .map_err(|e| TxBuildError::crypto("signature hash", e))
        } else {
            cache
                .legacy_signature_hash(index, script_code, hash_type.to_u32())
                .map(|hash| hash.to_byte_array())
                .map_err(|e| TxBuildError::crypto("signature hash", e))
        }
    }

    fn input_unlocking(&self, tx_hex: &str, outpoint: &Outpoint) -> Result<Unlocking, TxBuildError> {
        let tx = Self::read(tx_hex)?;
        let input = &tx.input[Self::require_input(&tx, outpoint)?];
        Ok(Unlocking {
            script_sig: input.script_sig.to_bytes(),
            witness: input.witness.to_vec(),
        })
    }

    fn set_input_unlocking(
        &self,
        tx_hex: &str,
        outpoint: &Outpoint,
        unlocking: &Unlocking,
    ) -> Result<String, TxBuildError> {
        let mut tx = Self::read(tx_hex)?;
        let index = Self::require_input(&tx, outpoint)?;
        tx.input[index].script_sig = ScriptBuf::from_bytes(unlocking.script_sig.clone());
        tx.input[index].witness = Witness::from_slice(&unlocking.witness);
        Ok(serialize_hex(&tx))
    }

    fn blind(&self, _tx_hex: &str, _request: &BlindRequest) -> Result<String, TxBuildError> {
        Err(unsupported("blind"))
    }

    fn set_reissue_asset(
        &self,
        _tx_hex: &str,
        _request: &ReissueRequest,
    ) -> Result<(String, String), TxBuildError> {
        Err(unsupported("reissue asset"))
    }

    fn decode(&self, tx_hex: &str) -> Result<serde_json::Value, TxBuildError> {
        let tx = Self::read(tx_hex)?;

        let vin: Vec<_> = tx
            .input
            .iter()
            .map(|input| {
                let mut entry = json!({
                    "txid": input.previous_output.txid.to_string(),
                    "vout": input.previous_output.vout,
                    "scriptSig": {
                        "asm": crate::script::to_asm(input.script_sig.as_bytes()),
                        "hex": hex::encode(input.script_sig.as_bytes()),
                    },
                    "sequence": input.sequence.0,
                });
                if !input.witness.is_empty() {
                    entry["txinwitness"] = input.witness.iter().map(hex::encode).collect();
                }
                entry
            })
            .collect();

        let vout: Vec<_> = tx
            .output
            .iter()
            .enumerate()
            .map(|(n, output)| {
                json!({
                    "value": output.value.to_sat(),
                    "n": n,
                    "scriptPubKey": script_json(self.network, output.script_pubkey.as_bytes()),
                })
            })
            .collect();

        Ok(json!({
            "txid": tx.compute_txid().to_string(),
            "hash": tx.compute_wtxid().to_string(),
            "version": tx.version.0,
            "size": tx.total_size(),
            "vsize": tx.vsize(),
            "weight": tx.weight().to_wu(),
            "locktime": tx.lock_time.to_consensus_u32(),
            "vin": vin,
            "vout": vout,
        }))
    }

    fn shape(&self, tx_hex: &str) -> Result<TxShape, TxBuildError> {
        let tx = Self::read(tx_hex)?;
        Ok(TxShape {
            base_size: tx.base_size(),
            total_size: tx.total_size(),
            inputs: tx.input.len(),
            blindable_outputs: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{p2pkh_script, p2wpkh_script};

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn codec() -> BitcoinCodec {
        BitcoinCodec::new(Network::Mainnet)
    }

    fn outpoint() -> Outpoint {
        Outpoint::new(&"a".repeat(64), 0).unwrap()
    }

    fn sample_tx() -> String {
        let tx = codec().initialize(2, 0).unwrap();
        let tx = codec().add_input(&tx, &outpoint(), 0xffff_ffff).unwrap();
        codec()
            .add_output(
                &tx,
                &OutputSpec {
                    amount: 50_000,
                    asset: None,
                    target: OutputTarget::Address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string()),
                },
            )
            .unwrap()
    }

    #[test]
    fn empty_transaction_round_trips() {
        let tx = codec().initialize(2, 10).unwrap();
        let decoded = codec().decode(&tx).unwrap();
        assert_eq!(decoded["version"], 2);
        assert_eq!(decoded["locktime"], 10);
        assert_eq!(decoded["vin"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn builds_and_decodes() {
        let tx = sample_tx();
        assert_eq!(codec().find_input(&tx, &outpoint()).unwrap(), Some(0));
        let other = Outpoint::new(&"a".repeat(64), 1).unwrap();
        assert_eq!(codec().find_input(&tx, &other).unwrap(), None);

        let decoded = codec().decode(&tx).unwrap();
        assert_eq!(decoded["vout"][0]["value"], 50_000);
        assert_eq!(decoded["vout"][0]["scriptPubKey"]["type"], "p2wpkh");
        assert_eq!(
            decoded["vout"][0]["scriptPubKey"]["hex"],
            hex::encode(p2wpkh_script(&hex::decode(G).unwrap()))
        );
    }

    #[test]
    fn rejects_elements_only_features() {
        let tx = sample_tx();
        let fee = OutputSpec {
            amount: 1,
            asset: None,
            target: OutputTarget::Fee,
        };
        assert!(codec().add_output(&tx, &fee).is_err());
        assert!(codec().blind(&tx, &BlindRequest::default()).is_err());
    }

    #[test]
    fn legacy_and_segwit_hashes_differ() {
        let tx = sample_tx();
        let outpoint = outpoint();
        let code = p2pkh_script(&hex::decode(G).unwrap());
        let value = AmountValue::Explicit(60_000);
        let request = SighashRequest {
            outpoint: &outpoint,
            script_code: &code,
            segwit: true,
            value: &value,
            sighash_type: SigHashType::ALL,
        };
        let segwit = codec().signature_hash(&tx, &request).unwrap();
        let legacy = codec()
            .signature_hash(&tx, &SighashRequest { segwit: false, ..request })
            .unwrap();
        assert_ne!(segwit, legacy);

        let commitment = AmountValue::Commitment(vec![0x08; 33]);
        let bad = SighashRequest { value: &commitment, ..request };
        assert!(codec().signature_hash(&tx, &bad).is_err());
    }

    #[test]
    fn witness_round_trip() {
        let tx = sample_tx();
        let unlocking = Unlocking {
            script_sig: Vec::new(),
            witness: vec![vec![0x30; 71], vec![0x02; 33]],
        };
        let signed = codec().set_input_unlocking(&tx, &outpoint(), &unlocking).unwrap();
        assert_eq!(codec().input_unlocking(&signed, &outpoint()).unwrap(), unlocking);

        let shape = codec().shape(&signed).unwrap();
        assert!(shape.total_size > shape.base_size);
    }
}
