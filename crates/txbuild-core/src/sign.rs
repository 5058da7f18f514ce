//! Chain-agnostic signing: signature hashes and the unlocking data of each input type.

use lwk_wollet::bitcoin::secp256k1::SecretKey;
use tracing::debug;

use crate::codec::{AmountValue, SighashRequest, TxCodec};
use crate::error::TxBuildError;
use crate::keys::{ec_sign, encode_der, pubkey_from_privkey};
use crate::script::{self, MultisigScript, Unlocking};
use crate::types::{HashType, Outpoint, SigHashType, decode_hex};

/// One signature to place into an unlocking stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignParameter {
    /// Hex signature, or any other stack item when `der_encode` is false.
    pub data: String,
    /// Converts a 64-byte compact signature to DER and appends the sighash byte.
    pub der_encode: bool,
    pub sighash: SigHashType,
}

impl SignParameter {
    #[must_use]
    pub fn der(data: &str, sighash: SigHashType) -> Self {
        Self {
            data: data.to_string(),
            der_encode: true,
            sighash,
        }
    }

    #[must_use]
    pub fn raw(data: &str) -> Self {
        Self {
            data: data.to_string(),
            der_encode: false,
            sighash: SigHashType::ALL,
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, TxBuildError> {
        if self.der_encode && self.data.len() == 128 {
            decode_hex("signature", &encode_der(&self.data, self.sighash)?)
        } else {
            decode_hex("signature", &self.data)
        }
    }
}

/// A signature for a multisig input, optionally tied to the key it was made with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSignature {
    pub signature: SignParameter,
    pub related_pubkey: Option<String>,
}

/// Script code committed to by the signature hash of an input.
pub fn script_code(hash_type: HashType, pubkey: &str, redeem_script: &str) -> Result<Vec<u8>, TxBuildError> {
    if hash_type.is_key_hash() {
        if pubkey.is_empty() {
            return Err(TxBuildError::UnresolvedParameter("pubkey"));
        }
        Ok(script::p2pkh_script(&crate::keys::parse_pubkey("pubkey", pubkey)?))
    } else {
        if redeem_script.is_empty() {
            return Err(TxBuildError::UnresolvedParameter("script"));
        }
        decode_hex("script", redeem_script)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn signature_hash(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    pubkey: &str,
    redeem_script: &str,
    value: &AmountValue,
    sighash_type: SigHashType,
) -> Result<[u8; 32], TxBuildError> {
    let code = script_code(hash_type, pubkey, redeem_script)?;
    codec.signature_hash(
        tx_hex,
        &SighashRequest {
            outpoint,
            script_code: &code,
            segwit: hash_type.is_witness(),
            value,
            sighash_type,
        },
    )
}

fn require_key_hash(hash_type: HashType) -> Result<(), TxBuildError> {
    if hash_type.is_key_hash() {
        Ok(())
    } else {
        Err(TxBuildError::validation(
            "addresstype",
            format!("{hash_type} is not a pubkey-hash type"),
        ))
    }
}

fn require_script_hash(hash_type: HashType) -> Result<(), TxBuildError> {
    if hash_type.is_key_hash() {
        Err(TxBuildError::validation(
            "addresstype",
            format!("{hash_type} is not a script-hash type"),
        ))
    } else {
        Ok(())
    }
}

/// Lays out `stack` (which ends with the witness or redeem script) for a script-hash input.
fn script_hash_unlocking(
    hash_type: HashType,
    stack: Vec<Vec<u8>>,
    redeem: &[u8],
) -> Result<Unlocking, TxBuildError> {
    Ok(match hash_type {
        HashType::P2sh => Unlocking {
            script_sig: script::push_only(&stack)?,
            witness: Vec::new(),
        },
        HashType::P2shP2wsh => Unlocking {
            script_sig: script::push_only(&[script::p2wsh_script(redeem)])?,
            witness: stack,
        },
        _ => Unlocking {
            script_sig: Vec::new(),
            witness: stack,
        },
    })
}

pub fn add_pubkey_hash_sign(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    pubkey: &str,
    signature: &SignParameter,
) -> Result<String, TxBuildError> {
    require_key_hash(hash_type)?;
    let pubkey = crate::keys::parse_pubkey("pubkey", pubkey)?;
    let stack = vec![signature.to_bytes()?, pubkey.clone()];

    let unlocking = match hash_type {
        HashType::P2pkh => Unlocking {
            script_sig: script::push_only(&stack)?,
            witness: Vec::new(),
        },
        HashType::P2shP2wpkh => Unlocking {
            script_sig: script::push_only(&[script::p2wpkh_script(&pubkey)])?,
            witness: stack,
        },
        _ => Unlocking {
            script_sig: Vec::new(),
            witness: stack,
        },
    };
    codec.set_input_unlocking(tx_hex, outpoint, &unlocking)
}

pub fn add_script_hash_sign(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    signatures: &[SignParameter],
    redeem_script: &str,
) -> Result<String, TxBuildError> {
    require_script_hash(hash_type)?;
    let redeem = decode_hex("script", redeem_script)?;

    let mut stack = signatures
        .iter()
        .map(SignParameter::to_bytes)
        .collect::<Result<Vec<_>, _>>()?;
    stack.push(redeem.clone());

    codec.set_input_unlocking(tx_hex, outpoint, &script_hash_unlocking(hash_type, stack, &redeem)?)
}

/// Places multisig signatures in the order of their keys in the redeem script.
///
/// Signatures without a known key keep their relative order after the matched ones.
pub fn add_multisig_sign(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    signatures: &[MultisigSignature],
    redeem_script: &str,
) -> Result<String, TxBuildError> {
    require_script_hash(hash_type)?;
    let redeem = decode_hex("script", redeem_script)?;
    let multisig = MultisigScript::parse(&redeem)
        .ok_or_else(|| TxBuildError::crypto("multisig sign", "script is not a multisig"))?;

    let mut ordered = Vec::with_capacity(signatures.len());
    for entry in signatures {
        let position = match &entry.related_pubkey {
            Some(pubkey) if !pubkey.is_empty() => {
                let key = decode_hex("pubkey", pubkey)?;
                multisig
                    .pubkeys
                    .iter()
                    .position(|candidate| *candidate == key)
                    .ok_or_else(|| {
                        TxBuildError::crypto("multisig sign", format!("pubkey {pubkey} is not in the script"))
                    })?
            }
            _ => usize::MAX,
        };
        ordered.push((position, entry.signature.to_bytes()?));
    }
    ordered.sort_by_key(|(position, _)| *position);
    debug!(signatures = ordered.len(), required = multisig.required, "multisig signatures ordered");

    let mut stack = Vec::with_capacity(ordered.len() + 2);
    stack.push(Vec::new());
    stack.extend(ordered.into_iter().map(|(_, signature)| signature));
    stack.push(redeem.clone());

    codec.set_input_unlocking(tx_hex, outpoint, &script_hash_unlocking(hash_type, stack, &redeem)?)
}

/// Signs a key-hash input with `privkey` and places the signature and compressed pubkey.
#[allow(clippy::too_many_arguments)]
pub fn sign_with_privkey(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    privkey: &SecretKey,
    value: &AmountValue,
    sighash_type: SigHashType,
    grind_r: bool,
) -> Result<String, TxBuildError> {
    require_key_hash(hash_type)?;
    let pubkey = pubkey_from_privkey(privkey, true);
    let sighash = signature_hash(codec, tx_hex, outpoint, hash_type, &pubkey, "", value, sighash_type)?;
    let signature = ec_sign(&sighash, privkey, grind_r);

    add_pubkey_hash_sign(
        codec,
        tx_hex,
        outpoint,
        hash_type,
        &pubkey,
        &SignParameter::der(&signature, sighash_type),
    )
}
