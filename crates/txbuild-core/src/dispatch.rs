//! Routing of `add-sign` requests to the unlocking layout of the input type.

use tracing::debug;

use crate::codec::TxCodec;
use crate::error::TxBuildError;
use crate::network::Network;
use crate::resolve::ResolvedParameters;
use crate::script::multisig_addresses;
use crate::sign::{
    MultisigSignature, SignParameter, add_multisig_sign, add_pubkey_hash_sign, add_script_hash_sign,
};
use crate::types::{HashType, Outpoint, SigHashType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    KeyHash,
    ScriptHashMultisig,
    ScriptHashOther,
}

/// Key-hash types need no script; any other type is multisig exactly when its redeem script
/// yields multisig addresses.
#[must_use]
pub fn classify(hash_type: HashType, redeem_script: &str, network: Network) -> InputClass {
    if hash_type.is_key_hash() {
        InputClass::KeyHash
    } else if multisig_addresses(redeem_script, network).is_ok() {
        InputClass::ScriptHashMultisig
    } else {
        InputClass::ScriptHashOther
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignSubmission {
    KeyHash {
        pubkey: String,
        signature: SignParameter,
    },
    Multisig {
        signatures: Vec<MultisigSignature>,
        redeem_script: String,
    },
    Script {
        signatures: Vec<SignParameter>,
        redeem_script: String,
    },
}

fn require_redeem(params: &ResolvedParameters) -> Result<String, TxBuildError> {
    if params.redeem_script.is_empty() {
        Err(TxBuildError::UnresolvedParameter("script"))
    } else {
        Ok(params.redeem_script.clone())
    }
}

/// Turns the comma-separated `signatures` (and, for multisig, `pubkeys`) into a submission.
///
/// An empty `pubkeys` string means no key list was given. Empty signature slots are skipped.
pub fn plan(
    class: InputClass,
    params: &ResolvedParameters,
    signatures: &str,
    pubkeys: &str,
    sighash: SigHashType,
) -> Result<SignSubmission, TxBuildError> {
    match class {
        InputClass::KeyHash => {
            if params.pubkey.is_empty() {
                return Err(TxBuildError::UnresolvedParameter("pubkey"));
            }
            Ok(SignSubmission::KeyHash {
                pubkey: params.pubkey.clone(),
                signature: SignParameter::der(signatures, sighash),
            })
        }
        InputClass::ScriptHashMultisig => {
            let signature_list: Vec<&str> = signatures.split(',').collect();
            let pubkey_list: Option<Vec<&str>> =
                (!pubkeys.is_empty()).then(|| pubkeys.split(',').collect());
            if let Some(list) = &pubkey_list {
                if list.len() != signature_list.len() {
                    return Err(TxBuildError::PubkeyCountMismatch {
                        signatures: signature_list.len(),
                        pubkeys: list.len(),
                    });
                }
            }

            let signatures = signature_list
                .iter()
                .enumerate()
                .filter(|(_, signature)| !signature.is_empty())
                .map(|(index, signature)| MultisigSignature {
                    signature: SignParameter::der(signature, sighash),
                    related_pubkey: pubkey_list.as_ref().map(|list| list[index].to_string()),
                })
                .collect();
            Ok(SignSubmission::Multisig {
                signatures,
                redeem_script: require_redeem(params)?,
            })
        }
        InputClass::ScriptHashOther => Ok(SignSubmission::Script {
            signatures: signatures
                .split(',')
                .filter(|signature| !signature.is_empty())
                .map(SignParameter::raw)
                .collect(),
            redeem_script: require_redeem(params)?,
        }),
    }
}

pub fn submit(
    codec: &dyn TxCodec,
    tx_hex: &str,
    outpoint: &Outpoint,
    hash_type: HashType,
    submission: &SignSubmission,
) -> Result<String, TxBuildError> {
    debug!(%outpoint, %hash_type, ?submission, "adding signatures");
    match submission {
        SignSubmission::KeyHash { pubkey, signature } => {
            add_pubkey_hash_sign(codec, tx_hex, outpoint, hash_type, pubkey, signature)
        }
        SignSubmission::Multisig {
            signatures,
            redeem_script,
        } => add_multisig_sign(codec, tx_hex, outpoint, hash_type, signatures, redeem_script),
        SignSubmission::Script {
            signatures,
            redeem_script,
        } => add_script_hash_sign(codec, tx_hex, outpoint, hash_type, signatures, redeem_script),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::multisig_script;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const G2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    fn multisig_params() -> ResolvedParameters {
        let script = multisig_script(2, &[hex::decode(G).unwrap(), hex::decode(G2).unwrap()]).unwrap();
        ResolvedParameters {
            redeem_script: hex::encode(script),
            hash_type: Some(HashType::P2wsh),
            ..ResolvedParameters::default()
        }
    }

    #[test]
    fn classification() {
        let params = multisig_params();
        assert_eq!(classify(HashType::P2shP2wpkh, "", Network::Mainnet), InputClass::KeyHash);
        assert_eq!(
            classify(HashType::P2wsh, &params.redeem_script, Network::LiquidV1),
            InputClass::ScriptHashMultisig
        );
        assert_eq!(classify(HashType::P2sh, "51", Network::Mainnet), InputClass::ScriptHashOther);
    }

    #[test]
    fn multisig_pairs_signatures_with_keys_and_skips_gaps() {
        let plan = plan(
            InputClass::ScriptHashMultisig,
            &multisig_params(),
            "s1,,s3",
            "p1,p2,p3",
            SigHashType::ALL,
        )
        .unwrap();
        let SignSubmission::Multisig { signatures, .. } = plan else {
            panic!("expected a multisig submission");
        };
        let pairs: Vec<_> = signatures
            .iter()
            .map(|entry| (entry.signature.data.as_str(), entry.related_pubkey.as_deref()))
            .collect();
        assert_eq!(pairs, vec![("s1", Some("p1")), ("s3", Some("p3"))]);
    }

    #[test]
    fn multisig_count_mismatch() {
        let err = plan(
            InputClass::ScriptHashMultisig,
            &multisig_params(),
            "s1,s2,s3",
            "p1,p2",
            SigHashType::ALL,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TxBuildError::PubkeyCountMismatch {
                signatures: 3,
                pubkeys: 2
            }
        ));
    }

    #[test]
    fn multisig_without_key_list() {
        let plan = plan(
            InputClass::ScriptHashMultisig,
            &multisig_params(),
            "s1,s2",
            "",
            SigHashType::ALL,
        )
        .unwrap();
        let SignSubmission::Multisig { signatures, .. } = plan else {
            panic!("expected a multisig submission");
        };
        assert!(signatures.iter().all(|entry| entry.related_pubkey.is_none()));
    }

    #[test]
    fn other_script_signatures_use_sighash_all_raw() {
        let plan = plan(
            InputClass::ScriptHashOther,
            &ResolvedParameters {
                redeem_script: "51".to_string(),
                ..ResolvedParameters::default()
            },
            "aa,,bb",
            "",
            SigHashType::new(crate::types::SigHashKind::None, true),
        )
        .unwrap();
        assert_eq!(
            plan,
            SignSubmission::Script {
                signatures: vec![SignParameter::raw("aa"), SignParameter::raw("bb")],
                redeem_script: "51".to_string(),
            }
        );
    }

    #[test]
    fn key_hash_needs_pubkey() {
        let err = plan(
            InputClass::KeyHash,
            &ResolvedParameters::default(),
            "aa",
            "",
            SigHashType::ALL,
        )
        .unwrap_err();
        assert!(matches!(err, TxBuildError::UnresolvedParameter("pubkey")));
    }
}
