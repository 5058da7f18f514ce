//! Script construction and inspection shared by both chains.

use lwk_wollet::bitcoin::hashes::{Hash, hash160, sha256};
use lwk_wollet::bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_CHECKSIG, OP_PUSHNUM_1, OP_PUSHNUM_16, OP_RETURN};
use lwk_wollet::bitcoin::script::{Builder, Instruction, PushBytesBuf};
use lwk_wollet::bitcoin::{PubkeyHash, Script, ScriptBuf, ScriptHash, WPubkeyHash, WScriptHash};

use crate::error::TxBuildError;
use crate::network::Network;
use crate::types::HashType;

/// Maximum number of keys in a standard `OP_CHECKMULTISIG` script.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// scriptSig plus witness stack of one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unlocking {
    pub script_sig: Vec<u8>,
    pub witness: Vec<Vec<u8>>,
}

#[must_use]
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(data).to_byte_array()
}

fn push_bytes(data: &[u8]) -> Result<PushBytesBuf, TxBuildError> {
    PushBytesBuf::try_from(data.to_vec()).map_err(|e| TxBuildError::validation("script", e.to_string()))
}

/// A script that pushes each item in turn, as a scriptSig does.
pub fn push_only(items: &[Vec<u8>]) -> Result<Vec<u8>, TxBuildError> {
    let mut builder = Builder::new();
    for item in items {
        builder = builder.push_slice(push_bytes(item)?);
    }
    Ok(builder.into_script().into_bytes())
}

#[must_use]
pub fn p2pkh_script(pubkey: &[u8]) -> Vec<u8> {
    ScriptBuf::new_p2pkh(&PubkeyHash::hash(pubkey)).into_bytes()
}

#[must_use]
pub fn p2wpkh_script(pubkey: &[u8]) -> Vec<u8> {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(pubkey)).into_bytes()
}

#[must_use]
pub fn p2sh_script(redeem_script: &[u8]) -> Vec<u8> {
    ScriptBuf::new_p2sh(&ScriptHash::hash(redeem_script)).into_bytes()
}

#[must_use]
pub fn p2wsh_script(witness_script: &[u8]) -> Vec<u8> {
    ScriptBuf::new_p2wsh(&WScriptHash::hash(witness_script)).into_bytes()
}

/// A bare `OP_RETURN` output script.
#[must_use]
pub fn burn_script() -> Vec<u8> {
    Builder::new().push_opcode(OP_RETURN).into_script().into_bytes()
}

/// Builds `OP_m <keys...> OP_n OP_CHECKMULTISIG`.
pub fn multisig_script(required: usize, pubkeys: &[Vec<u8>]) -> Result<Vec<u8>, TxBuildError> {
    if pubkeys.is_empty() || pubkeys.len() > MAX_MULTISIG_KEYS {
        return Err(TxBuildError::Descriptor(format!(
            "multisig needs 1 to {MAX_MULTISIG_KEYS} keys, got {}",
            pubkeys.len()
        )));
    }
    if required == 0 || required > pubkeys.len() {
        return Err(TxBuildError::Descriptor(format!(
            "multisig threshold {required} out of range for {} keys",
            pubkeys.len()
        )));
    }

    let mut builder = Builder::new().push_int(small_int(required));
    for pubkey in pubkeys {
        builder = builder.push_slice(push_bytes(pubkey)?);
    }
    Ok(builder
        .push_int(small_int(pubkeys.len()))
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
        .into_bytes())
}

// Callers keep `n` within 1..=16.
fn small_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or_default()
}

/// Value of an `OP_1`..`OP_16` instruction.
fn pushnum(instruction: &Instruction<'_>) -> Option<usize> {
    let Instruction::Op(opcode) = instruction else {
        return None;
    };
    let byte = opcode.to_u8();
    (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8())
        .contains(&byte)
        .then(|| usize::from(byte - OP_PUSHNUM_1.to_u8() + 1))
}

/// Splits a push-only script (a scriptSig) into its pushed items.
pub fn parse_pushes(script: &[u8]) -> Result<Vec<Vec<u8>>, TxBuildError> {
    let malformed = || TxBuildError::validation("scriptSig", "not a push-only script");
    Script::from_bytes(script)
        .instructions()
        .map(|instruction| match instruction.map_err(|_| malformed())? {
            Instruction::PushBytes(data) => Ok(data.as_bytes().to_vec()),
            op => pushnum(&op)
                .and_then(|n| u8::try_from(n).ok())
                .map(|n| vec![n])
                .ok_or_else(malformed),
        })
        .collect()
}

/// Key of a `<pubkey> OP_CHECKSIG` script.
#[must_use]
pub fn checksig_key(script: &[u8]) -> Option<Vec<u8>> {
    let instructions = Script::from_bytes(script)
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    match instructions.as_slice() {
        [Instruction::PushBytes(key), Instruction::Op(op)]
            if *op == OP_CHECKSIG && matches!(key.len(), 33 | 65) =>
        {
            Some(key.as_bytes().to_vec())
        }
        _ => None,
    }
}

/// An `m`-of-`n` bare multisig script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigScript {
    pub required: usize,
    pub pubkeys: Vec<Vec<u8>>,
}

impl MultisigScript {
    pub fn parse(script: &[u8]) -> Option<Self> {
        let instructions = Script::from_bytes(script)
            .instructions()
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let (first, rest) = instructions.split_first()?;
        let (last, rest) = rest.split_last()?;
        let (count, keys) = rest.split_last()?;
        if *last != Instruction::Op(OP_CHECKMULTISIG) {
            return None;
        }

        let required = pushnum(first)?;
        let count = pushnum(count)?;
        let pubkeys = keys
            .iter()
            .map(|instruction| match instruction {
                Instruction::PushBytes(key) if matches!(key.len(), 33 | 65) => Some(key.as_bytes().to_vec()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        if pubkeys.len() != count || required > count {
            return None;
        }
        Some(Self { required, pubkeys })
    }
}

/// Addresses of the keys in a multisig redeem script. Fails if the script is not a multisig.
pub fn multisig_addresses(redeem_script: &str, network: Network) -> Result<Vec<String>, TxBuildError> {
    let script = hex::decode(redeem_script)
        .map_err(|e| TxBuildError::validation("script", e.to_string()))?;
    let multisig = MultisigScript::parse(&script)
        .ok_or_else(|| TxBuildError::crypto("multisig address lookup", "script is not a multisig"))?;

    multisig
        .pubkeys
        .iter()
        .map(|pubkey| {
            let locking = if pubkey.len() == 33 {
                p2wpkh_script(pubkey)
            } else {
                p2pkh_script(pubkey)
            };
            network.encode_address(&locking).ok_or_else(|| {
                TxBuildError::crypto("multisig address lookup", "address encoding failed")
            })
        })
        .collect()
}

/// Hash type of a standard locking script.
///
/// A P2SH script is reported as plain `p2sh`, the wrapped form is not visible from the outside.
#[must_use]
pub fn locking_hash_type(script_pubkey: &[u8]) -> Option<HashType> {
    let script = Script::from_bytes(script_pubkey);
    if script.is_p2pkh() {
        Some(HashType::P2pkh)
    } else if script.is_p2sh() {
        Some(HashType::P2sh)
    } else if script.is_p2wpkh() {
        Some(HashType::P2wpkh)
    } else if script.is_p2wsh() {
        Some(HashType::P2wsh)
    } else {
        None
    }
}

#[must_use]
pub fn to_asm(script: &[u8]) -> String {
    Script::from_bytes(script).to_asm_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const G2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    fn key(hex_key: &str) -> Vec<u8> {
        hex::decode(hex_key).unwrap()
    }

    #[test]
    fn standard_scripts_for_generator_key() {
        let g = key(G);
        assert_eq!(
            hex::encode(p2wpkh_script(&g)),
            "0014751e76e8199196d454941c45d1b3a323f1433bd6"
        );
        assert_eq!(
            hex::encode(p2pkh_script(&g)),
            "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac"
        );
        assert_eq!(locking_hash_type(&p2pkh_script(&g)), Some(HashType::P2pkh));
        assert_eq!(locking_hash_type(&p2wpkh_script(&g)), Some(HashType::P2wpkh));
        assert_eq!(locking_hash_type(&burn_script()), None);
    }

    #[test]
    fn multisig_parse_and_addresses() {
        let script = multisig_script(1, &[key(G), key(G2)]).unwrap();
        assert_eq!(script.first(), Some(&0x51));
        assert_eq!(&script[script.len() - 2..], &[0x52, 0xae]);

        let parsed = MultisigScript::parse(&script).unwrap();
        assert_eq!(parsed.required, 1);
        assert_eq!(parsed.pubkeys, vec![key(G), key(G2)]);

        let addresses = multisig_addresses(&hex::encode(&script), Network::Mainnet).unwrap();
        assert_eq!(addresses[0], "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
        assert_eq!(addresses.len(), 2);
    }

    #[test]
    fn non_multisig_is_rejected() {
        let g = key(G);
        let pk = hex::decode(format!("21{G}ac")).unwrap();
        assert!(MultisigScript::parse(&pk).is_none());
        assert_eq!(checksig_key(&pk), Some(g.clone()));
        assert!(multisig_addresses(&hex::encode(p2pkh_script(&g)), Network::Mainnet).is_err());
        assert!(multisig_script(3, &[g.clone(), g]).is_err());
    }

    #[test]
    fn pushes_round_trip_through_parser() {
        let items = vec![Vec::new(), vec![0xab; 72], vec![0xcd; 300]];
        let script = push_only(&items).unwrap();
        assert_eq!(&script[..3], &[0x00, 0x48, 0xab]);
        assert_eq!(parse_pushes(&script).unwrap(), items);
        assert_eq!(parse_pushes(&[0x52]).unwrap(), vec![vec![2]]);
        assert!(parse_pushes(&[0x76]).is_err());
    }

    #[test]
    fn asm_names_opcodes() {
        let asm = to_asm(&p2pkh_script(&key(G)));
        assert!(asm.starts_with("OP_DUP OP_HASH160"));
        assert!(asm.ends_with("OP_EQUALVERIFY OP_CHECKSIG"));
    }
}
