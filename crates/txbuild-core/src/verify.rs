//! Signature checks against the signature hash of an input.

use tracing::debug;

use crate::codec::{AmountValue, SighashRequest, TxCodec};
use crate::error::TxBuildError;
use crate::keys::{verify_der, verify_ecdsa};
use crate::script::{self, MultisigScript};
use crate::sign::signature_hash;
use crate::types::{HashType, Outpoint, SigHashType};

/// Checks one compact signature made over the input's signature hash.
#[allow(clippy::too_many_arguments)]
pub fn verify_signature(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    pubkey: &str,
    redeem_script: &str,
    value: &AmountValue,
    sighash_type: SigHashType,
    signature: &str,
) -> Result<bool, TxBuildError> {
    if pubkey.is_empty() {
        return Err(TxBuildError::UnresolvedParameter("pubkey"));
    }
    let sighash = signature_hash(
        codec,
        tx_hex,
        outpoint,
        hash_type,
        pubkey,
        redeem_script,
        value,
        sighash_type,
    )?;
    let pubkey = crate::keys::parse_pubkey("pubkey", pubkey)?;
    verify_ecdsa(&sighash, signature, &pubkey)
}

struct InputContext<'a> {
    codec: &'a dyn TxCodec,
    tx_hex: &'a str,
    outpoint: &'a Outpoint,
    segwit: bool,
    value: &'a AmountValue,
}

impl InputContext<'_> {
    fn check(&self, script_code: &[u8], signature: &[u8], pubkey: &[u8]) -> Result<bool, TxBuildError> {
        verify_der(
            |sighash_type| {
                self.codec.signature_hash(
                    self.tx_hex,
                    &SighashRequest {
                        outpoint: self.outpoint,
                        script_code,
                        segwit: self.segwit,
                        value: self.value,
                        sighash_type,
                    },
                )
            },
            signature,
            pubkey,
        )
    }

    fn key_hash(&self, stack: &[Vec<u8>]) -> Result<Option<Vec<u8>>, TxBuildError> {
        let [signature, pubkey] = stack else {
            return Ok(None);
        };
        if !self.check(&script::p2pkh_script(pubkey), signature, pubkey)? {
            return Ok(None);
        }
        Ok(Some(pubkey.clone()))
    }

    /// Evaluates `OP_CHECKMULTISIG` with the leading dummy item already present in `stack`.
    fn multisig(&self, multisig: &MultisigScript, redeem: &[u8], stack: &[Vec<u8>]) -> Result<bool, TxBuildError> {
        let Some((dummy, signatures)) = stack.split_first() else {
            return Ok(false);
        };
        if !dummy.is_empty() || signatures.len() != multisig.required {
            return Ok(false);
        }

        let mut keys = multisig.pubkeys.iter();
        for signature in signatures {
            let mut matched = false;
            for pubkey in keys.by_ref() {
                if self.check(redeem, signature, pubkey)? {
                    matched = true;
                    break;
                }
            }
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Checks that an input's unlocking data satisfies its locking script.
///
/// Pubkey-hash inputs and multisig scripts are evaluated, and the script the unlocking data
/// commits to must equal `expected_locking`.
pub fn verify_fully_signed(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    expected_locking: &[u8],
    value: &AmountValue,
) -> Result<bool, TxBuildError> {
    let unlocking = codec.input_unlocking(tx_hex, outpoint)?;
    let ctx = InputContext {
        codec,
        tx_hex,
        outpoint,
        segwit: hash_type.is_witness(),
        value,
    };

    let stack = if hash_type.is_witness() {
        unlocking.witness
    } else {
        script::parse_pushes(&unlocking.script_sig)?
    };
    if stack.is_empty() {
        debug!(%outpoint, "input has no unlocking data");
        return Ok(false);
    }

    let locking = if hash_type.is_key_hash() {
        let Some(pubkey) = ctx.key_hash(&stack)? else {
            return Ok(false);
        };
        match hash_type {
            HashType::P2pkh => script::p2pkh_script(&pubkey),
            HashType::P2wpkh => script::p2wpkh_script(&pubkey),
            _ => script::p2sh_script(&script::p2wpkh_script(&pubkey)),
        }
    } else {
        let Some((redeem, items)) = stack.split_last() else {
            return Ok(false);
        };
        let multisig = MultisigScript::parse(redeem).ok_or_else(|| {
            TxBuildError::crypto(
                "verify sign",
                "only pubkey-hash and multisig scripts can be evaluated",
            )
        })?;
        if !ctx.multisig(&multisig, redeem, items)? {
            return Ok(false);
        }
        match hash_type {
            HashType::P2sh => script::p2sh_script(redeem),
            HashType::P2wsh => script::p2wsh_script(redeem),
            _ => script::p2sh_script(&script::p2wsh_script(redeem)),
        }
    };

    if locking != expected_locking {
        debug!(%outpoint, "unlocking data commits to a different script");
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use lwk_wollet::bitcoin::secp256k1::SecretKey;

    use super::*;
    use crate::codec::{BitcoinCodec, OutputSpec, OutputTarget};
    use crate::keys::{ec_sign, pubkey_from_privkey};
    use crate::network::Network;
    use crate::sign::{MultisigSignature, SignParameter, add_multisig_sign, sign_with_privkey};

    fn key(n: u8) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        SecretKey::from_slice(&bytes).unwrap()
    }

    fn setup() -> (BitcoinCodec, String, Outpoint) {
        let codec = BitcoinCodec::new(Network::Mainnet);
        let outpoint = Outpoint::new(&"c".repeat(64), 2).unwrap();
        let tx = codec.initialize(2, 0).unwrap();
        let tx = codec.add_input(&tx, &outpoint, 0xffff_ffff).unwrap();
        let tx = codec
            .add_output(
                &tx,
                &OutputSpec {
                    amount: 900,
                    asset: None,
                    target: OutputTarget::Script(vec![0x51]),
                },
            )
            .unwrap();
        (codec, tx, outpoint)
    }

    #[test]
    fn privkey_signature_verifies() {
        let (codec, tx, outpoint) = setup();
        let value = AmountValue::Explicit(1000);
        let signed = sign_with_privkey(
            &codec,
            &tx,
            &outpoint,
            HashType::P2wpkh,
            &key(1),
            &value,
            SigHashType::ALL,
            true,
        )
        .unwrap();

        let pubkey = pubkey_from_privkey(&key(1), true);
        let expected = script::p2wpkh_script(&hex::decode(&pubkey).unwrap());
        assert!(verify_fully_signed(&codec, &signed, &outpoint, HashType::P2wpkh, &expected, &value).unwrap());

        // a different amount changes the segwit signature hash
        let other = AmountValue::Explicit(1001);
        assert!(!verify_fully_signed(&codec, &signed, &outpoint, HashType::P2wpkh, &expected, &other).unwrap());
        // unsigned input
        assert!(!verify_fully_signed(&codec, &tx, &outpoint, HashType::P2wpkh, &expected, &value).unwrap());
        // a valid signature by a key the output does not pay to
        let elsewhere = script::p2wpkh_script(&hex::decode(pubkey_from_privkey(&key(2), true)).unwrap());
        assert!(!verify_fully_signed(&codec, &signed, &outpoint, HashType::P2wpkh, &elsewhere, &value).unwrap());
    }

    #[test]
    fn compact_signature_check() {
        let (codec, tx, outpoint) = setup();
        let value = AmountValue::Explicit(5000);
        let pubkey = pubkey_from_privkey(&key(3), true);
        let sighash = signature_hash(&codec, &tx, &outpoint, HashType::P2pkh, &pubkey, "", &value, SigHashType::ALL)
            .unwrap();
        let signature = ec_sign(&sighash, &key(3), false);

        let verify = |pubkey: &str| {
            verify_signature(&codec, &tx, &outpoint, HashType::P2pkh, pubkey, "", &value, SigHashType::ALL, &signature)
        };
        assert!(verify(&pubkey).unwrap());
        assert!(!verify(&pubkey_from_privkey(&key(4), true)).unwrap());
        assert!(matches!(verify(""), Err(TxBuildError::UnresolvedParameter("pubkey"))));
    }

    #[test]
    fn multisig_needs_threshold_signatures() {
        let (codec, tx, outpoint) = setup();
        let value = AmountValue::Explicit(2000);
        let pubkeys: Vec<Vec<u8>> = (1..=3)
            .map(|n| hex::decode(pubkey_from_privkey(&key(n), true)).unwrap())
            .collect();
        let redeem = script::multisig_script(2, &pubkeys).unwrap();
        let redeem_hex = hex::encode(&redeem);

        let sign = |n: u8| {
            let sighash = signature_hash(&codec, &tx, &outpoint, HashType::P2wsh, "", &redeem_hex, &value, SigHashType::ALL)
                .unwrap();
            MultisigSignature {
                signature: SignParameter::der(&ec_sign(&sighash, &key(n), true), SigHashType::ALL),
                related_pubkey: Some(hex::encode(&pubkeys[usize::from(n) - 1])),
            }
        };

        let expected = script::p2wsh_script(&redeem);
        let partial = add_multisig_sign(&codec, &tx, &outpoint, HashType::P2wsh, &[sign(3)], &redeem_hex).unwrap();
        assert!(!verify_fully_signed(&codec, &partial, &outpoint, HashType::P2wsh, &expected, &value).unwrap());

        let full = add_multisig_sign(&codec, &tx, &outpoint, HashType::P2wsh, &[sign(3), sign(1)], &redeem_hex)
            .unwrap();
        assert!(verify_fully_signed(&codec, &full, &outpoint, HashType::P2wsh, &expected, &value).unwrap());
    }

    #[test]
    fn other_scripts_are_not_evaluated() {
        let (codec, tx, outpoint) = setup();
        let signed = crate::sign::add_script_hash_sign(
            &codec,
            &tx,
            &outpoint,
            HashType::P2wsh,
            &[SignParameter::raw("01")],
            "51",
        )
        .unwrap();
        let value = AmountValue::Explicit(1);
        assert!(matches!(
            verify_fully_signed(&codec, &signed, &outpoint, HashType::P2wsh, &script::p2wsh_script(&[0x51]), &value),
            Err(TxBuildError::Crypto { .. })
        ));
    }
}
