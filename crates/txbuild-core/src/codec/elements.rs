use std::collections::HashMap;
use std::str::FromStr;

use lwk_wollet::elements::confidential::{
    Asset, AssetBlindingFactor, Nonce, Value, ValueBlindingFactor,
};
use lwk_wollet::elements::encode::{deserialize, serialize, serialize_hex};
use lwk_wollet::elements::hashes::Hash;
use lwk_wollet::elements::hashes::sha256::Midstate;
use lwk_wollet::elements::pset::{Input, PartiallySignedTransaction};
use lwk_wollet::elements::secp256k1_zkp::Secp256k1;
use lwk_wollet::elements::secp256k1_zkp::rand::thread_rng;
use lwk_wollet::elements::sighash::SighashCache;
use lwk_wollet::elements::{
    self, AssetId, AssetIssuance, EcdsaSighashType, LockTime, OutPoint, Script, Sequence,
    Transaction, TxInWitness, TxOut, TxOutSecrets, TxOutWitness, Txid,
};
use serde_json::json;
use tracing::{debug, info};

use super::{
    AmountValue, BlindInput, BlindOptions, BlindRequest, IssuanceBlindingKey, OutputSpec, OutputTarget,
    ReissueRequest, SighashRequest, TxCodec, TxShape, missing_input, script_json,
};
use crate::error::TxBuildError;
use crate::network::Network;
use crate::script::{Unlocking, burn_script};
use crate::types::{Outpoint, SigHashKind, SigHashType, check_hex, decode_hex, decode_hex32};

/// Confidential transaction codec.
#[derive(Debug, Clone, Copy)]
pub struct ElementsCodec {
    network: Network,
}

impl ElementsCodec {
    #[must_use]
    pub const fn new(network: Network) -> Self {
        Self { network }
    }

    fn read(tx_hex: &str) -> Result<Transaction, TxBuildError> {
        let bytes = decode_hex("tx", tx_hex)?;
        deserialize(&bytes).map_err(|e| TxBuildError::validation("tx", e.to_string()))
    }

    fn input_index(tx: &Transaction, outpoint: &Outpoint) -> Result<Option<usize>, TxBuildError> {
        let txid = parse_txid(&outpoint.txid)?;
        Ok(tx
            .input
            .iter()
            .position(|input| input.previous_output == OutPoint::new(txid, outpoint.vout)))
    }

    fn require_input(tx: &Transaction, outpoint: &Outpoint) -> Result<usize, TxBuildError> {
        Self::input_index(tx, outpoint)?.ok_or_else(|| missing_input(outpoint))
    }

    /// Issuances are kept explicit, so an issuance key is never accepted.
    fn check_issuance_keys(tx: &Transaction, keys: &[IssuanceBlindingKey]) -> Result<(), TxBuildError> {
        for key in keys {
            let index = Self::require_input(tx, &key.outpoint)?;
            if !tx.input[index].has_issuance() {
                return Err(TxBuildError::validation(
                    "blindingkeys",
                    format!("input {} carries no issuance", key.outpoint),
                ));
            }
        }
        match keys.first() {
            Some(key) => Err(TxBuildError::crypto(
                "blind",
                format!(
                    "issuance of input {} would need blinding, only explicit issuances are supported",
                    key.outpoint
                ),
            )),
            None => Ok(()),
        }
    }

    fn target(&self, target: &OutputTarget) -> Result<(Script, Nonce), TxBuildError> {
        match target {
            OutputTarget::Address(address) => {
                let decoded = self.network.decode_address(address)?;
                let nonce = match decoded.blinding_pubkey {
                    Some(pubkey) => Nonce::Confidential(
                        elements::secp256k1_zkp::PublicKey::from_slice(&pubkey)
                            .map_err(|e| TxBuildError::validation("address", e.to_string()))?,
                    ),
                    None => Nonce::Null,
                };
                Ok((Script::from(decoded.script_pubkey), nonce))
            }
            OutputTarget::Script(script) => Ok((Script::from(script.clone()), Nonce::Null)),
            OutputTarget::Fee => Ok((Script::new(), Nonce::Null)),
            OutputTarget::Destroy => Ok((Script::from(burn_script()), Nonce::Null)),
        }
    }
}

fn parse_txid(txid: &str) -> Result<Txid, TxBuildError> {
    Txid::from_str(txid).map_err(|e| TxBuildError::validation("txid", e.to_string()))
}

fn parse_asset(asset: &str) -> Result<AssetId, TxBuildError> {
    check_hex("asset", asset, 32, false)?;
    AssetId::from_str(asset).map_err(|e| TxBuildError::validation("asset", e.to_string()))
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

fn value_of(value: &AmountValue) -> Result<Value, TxBuildError> {
    match value {
        AmountValue::Explicit(amount) => Ok(Value::Explicit(*amount)),
        AmountValue::Commitment(bytes) => {
            deserialize(bytes).map_err(|e| TxBuildError::validation("amountcommitment", e.to_string()))
        }
    }
}

/// Spent output and its unblinding secrets, as recorded for one input.
fn input_secrets(input: &BlindInput) -> Result<(TxOut, TxOutSecrets), TxBuildError> {
    let asset_id = parse_asset(&input.asset)?;
    let asset_bf = AssetBlindingFactor::from_str(&input.asset_blinder)
        .map_err(|e| TxBuildError::validation("assetblinder", e.to_string()))?;
    let value_bf = ValueBlindingFactor::from_str(&input.amount_blinder)
        .map_err(|e| TxBuildError::validation("blinder", e.to_string()))?;

    let asset = if input.asset_commitment.is_empty() {
        Asset::Explicit(asset_id)
    } else {
        deserialize(&decode_hex("assetcommitment", &input.asset_commitment)?)
            .map_err(|e| TxBuildError::validation("assetcommitment", e.to_string()))?
    };
    let value = if input.amount_commitment.is_empty() {
        Value::Explicit(input.amount)
    } else {
        deserialize(&decode_hex("amountcommitment", &input.amount_commitment)?)
            .map_err(|e| TxBuildError::validation("amountcommitment", e.to_string()))?
    };

    let txout = TxOut {
        asset,
        value,
        nonce: Nonce::Null,
        script_pubkey: Script::new(),
        witness: TxOutWitness::default(),
    };
    let secrets = TxOutSecrets {
        asset_bf,
        value_bf,
        value: input.amount,
        asset: asset_id,
    };
    Ok((txout, secrets))
}

fn value_json(value: &Value) -> (&'static str, serde_json::Value) {
    match value {
        Value::Explicit(amount) => ("value", json!(amount)),
        other => ("valuecommitment", json!(serialize_hex(other))),
    }
}

impl TxCodec for ElementsCodec {
    fn network(&self) -> Network {
        self.network
    }

    fn initialize(&self, version: u32, locktime: u32) -> Result<String, TxBuildError> {
        let tx = Transaction {
            version,
            lock_time: LockTime::from_consensus(locktime),
            input: vec![],
            output: vec![],
        };
        Ok(serialize_hex(&tx))
    }

    fn add_input(&self, tx_hex: &str, outpoint: &Outpoint, sequence: u32) -> Result<String, TxBuildError> {
        let mut tx = Self::read(tx_hex)?;

        // A fresh, issuance-free input is built through a one-input PSET.
        let mut pset = PartiallySignedTransaction::new_v2();
        let mut input = Input::from_prevout(OutPoint::new(parse_txid(&outpoint.txid)?, outpoint.vout));
        input.sequence = Some(Sequence(sequence));
        pset.add_input(input);
        let template = pset
            .extract_tx()
            .map_err(|e| TxBuildError::crypto("add input", e))?;
        tx.input.extend(template.input);

        Ok(serialize_hex(&tx))
    }

    fn add_output(&self, tx_hex: &str, output: &OutputSpec) -> Result<String, TxBuildError> {
        let mut tx = Self::read(tx_hex)?;
        let asset = output
            .asset
            .as_deref()
            .ok_or_else(|| TxBuildError::validation("asset", "required for Elements outputs"))?;
        let asset = parse_asset(asset)?;

        let txout = if output.target == OutputTarget::Fee {
            TxOut::new_fee(output.amount, asset)
        } else {
            let (script_pubkey, nonce) = self.target(&output.target)?;
            TxOut {
                asset: Asset::Explicit(asset),
                value: Value::Explicit(output.amount),
                nonce,
                script_pubkey,
                witness: TxOutWitness::default(),
            }
        };
        tx.output.push(txout);

        Ok(serialize_hex(&tx))
    }

    fn find_input(&self, tx_hex: &str, outpoint: &Outpoint) -> Result<Option<usize>, TxBuildError> {
        Self::input_index(&Self::read(tx_hex)?, outpoint)
    }

    fn signature_hash(&self, tx_hex: &str, request: &SighashRequest<'_>) -> Result<[u8; 32], TxBuildError> {
        let tx = Self::read(tx_hex)?;
        let index = Self::require_input(&tx, request.outpoint)?;
        let script_code = Script::from(request.script_code.to_vec());
        let hash_type = sighash_type(request.sighash_type);

        let mut cache = SighashCache::new(&tx);
        let sighash = if request.segwit {
            cache.segwitv0_sighash(index, &script_code, value_of(request.value)?, hash_type)
        } else {
            cache.legacy_sighash(index, &script_code, hash_type)
        };
        Ok(sighash.to_byte_array())
    }

    fn input_unlocking(&self, tx_hex: &str, outpoint: &Outpoint) -> Result<Unlocking, TxBuildError> {
        let tx = Self::read(tx_hex)?;
        let input = &tx.input[Self::require_input(&tx, outpoint)?];
        Ok(Unlocking {
            script_sig: input.script_sig.to_bytes(),
            witness: input.witness.script_witness.clone(),
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
        let input = &mut tx.input[index];
        input.script_sig = Script::from(unlocking.script_sig.clone());
        input.witness.script_witness.clone_from(&unlocking.witness);
        Ok(serialize_hex(&tx))
    }

    fn blind(&self, tx_hex: &str, request: &BlindRequest) -> Result<String, TxBuildError> {
        if request.options != BlindOptions::default() {
            return Err(TxBuildError::crypto(
                "blind",
                "only the default range proof parameters (1, 0, 52) are supported",
            ));
        }
        let tx = Self::read(tx_hex)?;
        Self::check_issuance_keys(&tx, &request.issuance_keys)?;

        let mut address_keys = Vec::with_capacity(request.confidential_addresses.len());
        for address in &request.confidential_addresses {
            let decoded = self.network.decode_address(address)?;
            let key = decoded
                .blinding_pubkey
                .ok_or_else(|| TxBuildError::validation("addresses", format!("{address} is not confidential")))?;
            address_keys.push((decoded.script_pubkey, key));
        }

        let mut pset = PartiallySignedTransaction::from_tx(tx.clone());
        let mut secrets = HashMap::new();
        for (index, txin) in tx.input.iter().enumerate() {
            let recorded = request
                .inputs
                .iter()
                .find(|input| {
                    input.outpoint.as_ref().is_some_and(|outpoint| {
                        parse_txid(&outpoint.txid).is_ok_and(|txid| {
                            OutPoint::new(txid, outpoint.vout) == txin.previous_output
                        })
                    })
                })
                .ok_or_else(|| {
                    TxBuildError::validation("utxos", format!("no unblinding data for input {index}"))
                })?;
            let (spent, secret) = input_secrets(recorded)?;

            let pset_input = &mut pset.inputs_mut()[index];
            pset_input.witness_utxo = Some(spent);
            if txin.has_issuance() {
                pset_input.blinded_issuance = Some(0x00);
            }
            secrets.insert(index, secret);
        }

        let mut blinded_outputs = 0;
        for (index, txout) in tx.output.iter().enumerate() {
            if txout.is_fee() {
                continue;
            }
            let key = match txout.nonce {
                Nonce::Confidential(pubkey) => Some(pubkey.serialize().to_vec()),
                _ => address_keys
                    .iter()
                    .find(|(script, _)| script.as_slice() == txout.script_pubkey.as_bytes())
                    .map(|(_, key)| key.clone()),
            };
            let Some(key) = key else { continue };

            let output = &mut pset.outputs_mut()[index];
            output.blinding_key = Some(
                elements::bitcoin::PublicKey::from_slice(&key)
                    .map_err(|e| TxBuildError::crypto("blind", e))?,
            );
            output.blinder_index = Some(0);
            blinded_outputs += 1;
        }
        if blinded_outputs == 0 {
            return Err(TxBuildError::crypto("blind", "no output has a blinding key"));
        }

        pset.blind_last(&mut thread_rng(), &Secp256k1::new(), &secrets)
            .map_err(|e| TxBuildError::crypto("blind", e))?;
        let blinded = serialize_hex(
            &pset
                .extract_tx()
                .map_err(|e| TxBuildError::crypto("blind", e))?,
        );
        if blinded.eq_ignore_ascii_case(tx_hex) {
            return Err(TxBuildError::crypto("blind", "transaction was not changed"));
        }
        debug!(outputs = blinded_outputs, "outputs blinded");

        Ok(blinded)
    }

    fn set_reissue_asset(
        &self,
        tx_hex: &str,
        request: &ReissueRequest,
    ) -> Result<(String, String), TxBuildError> {
        let mut tx = Self::read(tx_hex)?;
        let index = Self::require_input(&tx, &request.outpoint)?;

        let asset_bf = AssetBlindingFactor::from_str(&request.asset_blinder)
            .map_err(|e| TxBuildError::validation("assetblinder", e.to_string()))?;
        let mut entropy = decode_hex32("entropy", &request.entropy)?;
        entropy.reverse();
        let entropy = Midstate::from_byte_array(entropy);
        let asset_id = AssetId::from_entropy(entropy);

        tx.input[index].asset_issuance = AssetIssuance {
            asset_blinding_nonce: asset_bf.into_inner(),
            asset_entropy: entropy.to_byte_array(),
            amount: Value::Explicit(request.amount),
            inflation_keys: Value::Null,
        };

        let (script_pubkey, nonce) = self.target(&request.target)?;
        tx.output.push(TxOut {
            asset: Asset::Explicit(asset_id),
            value: Value::Explicit(request.amount),
            nonce,
            script_pubkey,
            witness: TxOutWitness::default(),
        });
        info!(asset = %asset_id, amount = request.amount, "reissuance set");

        Ok((serialize_hex(&tx), asset_id.to_string()))
    }

    fn decode(&self, tx_hex: &str) -> Result<serde_json::Value, TxBuildError> {
        let tx = Self::read(tx_hex)?;
        let weight = tx.weight();

        let vin: Vec<_> = tx
            .input
            .iter()
            .map(|input| {
                let mut entry = json!({
                    "txid": input.previous_output.txid.to_string(),
                    "vout": input.previous_output.vout,
                    "is_pegin": input.is_pegin,
                    "scriptSig": {
                        "asm": crate::script::to_asm(input.script_sig.as_bytes()),
                        "hex": hex::encode(input.script_sig.as_bytes()),
                    },
                    "sequence": input.sequence.0,
                });
                if !input.witness.script_witness.is_empty() {
                    entry["txinwitness"] = input.witness.script_witness.iter().map(hex::encode).collect();
                }
                if input.has_issuance() {
                    let issuance = &input.asset_issuance;
                    let (amount_key, amount) = value_json(&issuance.amount);
                    let mut entropy = issuance.asset_entropy;
                    entropy.reverse();
                    entry["issuance"] = json!({
                        "assetBlindingNonce": hex::encode(&issuance.asset_blinding_nonce[..]),
                        "assetEntropy": hex::encode(entropy),
                        "isreissuance": issuance.asset_blinding_nonce[..] != [0u8; 32],
                        amount_key: amount,
                    });
                }
                entry
            })
            .collect();

        let vout: Vec<_> = tx
            .output
            .iter()
            .enumerate()
            .map(|(n, output)| {
                let (value_key, value) = value_json(&output.value);
                let mut entry = json!({ "n": n, value_key: value });
                match output.asset {
                    Asset::Explicit(asset) => entry["asset"] = asset.to_string().into(),
                    ref other => entry["assetcommitment"] = serialize_hex(other).into(),
                }
                if !output.nonce.is_null() {
                    entry["commitmentnonce"] = serialize_hex(&output.nonce).into();
                }
                entry["scriptPubKey"] = if output.is_fee() {
                    json!({ "asm": "", "hex": "", "type": "fee" })
                } else {
                    script_json(self.network, output.script_pubkey.as_bytes())
                };
                entry
            })
            .collect();

        Ok(json!({
            "txid": tx.txid().to_string(),
            "hash": tx.wtxid().to_string(),
            "version": tx.version,
            "size": serialize(&tx).len(),
            "vsize": weight.div_ceil(4),
            "weight": weight,
            "locktime": tx.lock_time.to_consensus_u32(),
            "vin": vin,
            "vout": vout,
        }))
    }

    fn shape(&self, tx_hex: &str) -> Result<TxShape, TxBuildError> {
        let tx = Self::read(tx_hex)?;
        let mut stripped = tx.clone();
        for input in &mut stripped.input {
            input.witness = TxInWitness::default();
        }
        for output in &mut stripped.output {
            output.witness = TxOutWitness::default();
        }

        Ok(TxShape {
            base_size: serialize(&stripped).len(),
            total_size: serialize(&tx).len(),
            inputs: tx.input.len(),
            blindable_outputs: tx
                .output
                .iter()
                .filter(|output| !output.is_fee() && output.value.is_explicit())
                .count(),
        })
    }
}
