//! Key material helpers: BIP32/BIP39 derivation, WIF, ECDSA and DER handling, commitments.

use std::str::FromStr;

use bip39::{Language, Mnemonic};
use lwk_wollet::bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use lwk_wollet::bitcoin::secp256k1::{self, Message, PublicKey, Secp256k1, SecretKey, ecdsa};
use lwk_wollet::bitcoin::{NetworkKind, PrivateKey};
use lwk_wollet::elements;
use lwk_wollet::elements::confidential::{Asset, AssetBlindingFactor, Value, ValueBlindingFactor};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::TxBuildError;
use crate::network::Network;
use crate::types::{SigHashType, check_hex, decode_hex, decode_hex32};

/// Parses `m/44h/0'/1` style paths. The leading `m` is optional and an empty path is the root.
pub fn parse_path(path: &str) -> Result<DerivationPath, TxBuildError> {
    let path = path.trim();
    let mut steps = Vec::new();
    if path.is_empty() {
        return Ok(DerivationPath::from(steps));
    }
    for (i, part) in path.split('/').enumerate() {
        if i == 0 && part == "m" {
            continue;
        }
        if part.is_empty() {
            return Err(TxBuildError::validation("bip32path", format!("empty step in '{path}'")));
        }
        let (index, hardened) = match part.strip_suffix(['h', 'H', '\'']) {
            Some(index) => (index, true),
            None => (part, false),
        };
        let index: u32 = index
            .parse()
            .map_err(|_| TxBuildError::validation("bip32path", format!("bad step '{part}'")))?;
        let step = if hardened {
            ChildNumber::from_hardened_idx(index)
        } else {
            ChildNumber::from_normal_idx(index)
        }
        .map_err(|e| TxBuildError::validation("bip32path", e.to_string()))?;
        steps.push(step);
    }
    Ok(DerivationPath::from(steps))
}

/// Decodes a WIF key, accepting it only if it was encoded for `kind`.
pub fn privkey_from_wif(wif: &str, kind: NetworkKind) -> Result<SecretKey, TxBuildError> {
    let key = PrivateKey::from_wif(wif).map_err(|e| TxBuildError::crypto("WIF decode", e))?;
    if key.network != kind {
        return Err(TxBuildError::crypto("WIF decode", "network mismatch"));
    }
    Ok(key.inner)
}

/// Accepts a 32-byte hex key or a WIF, trying mainnet WIF before testnet.
pub fn parse_privkey(privkey: &str) -> Result<SecretKey, TxBuildError> {
    if privkey.len() == 64 {
        let bytes = decode_hex32("privkey", privkey)?;
        return SecretKey::from_slice(&bytes).map_err(|e| TxBuildError::validation("privkey", e.to_string()));
    }
    privkey_from_wif(privkey, NetworkKind::Main)
        .or_else(|_| privkey_from_wif(privkey, NetworkKind::Test))
}

/// Private key of an extended private key, optionally derived along `path` first.
///
/// The key's own version bytes decide its network.
pub fn privkey_from_extpriv(extpriv: &str, path: Option<&str>) -> Result<SecretKey, TxBuildError> {
    let secp = Secp256k1::new();
    let mut xpriv = Xpriv::from_str(extpriv).map_err(|e| TxBuildError::validation("extpriv", e.to_string()))?;
    if let Some(path) = path.filter(|p| !p.is_empty()) {
        xpriv = xpriv
            .derive_priv(&secp, &parse_path(path)?)
            .map_err(|e| TxBuildError::crypto("bip32 derivation", e))?;
    }
    debug!(network = ?xpriv.network, depth = xpriv.depth, "using extended private key");
    Ok(xpriv.private_key)
}

#[must_use]
pub fn pubkey_from_privkey(privkey: &SecretKey, compressed: bool) -> String {
    let pubkey = PublicKey::from_secret_key(&Secp256k1::new(), privkey);
    if compressed {
        hex::encode(pubkey.serialize())
    } else {
        hex::encode(pubkey.serialize_uncompressed())
    }
}

/// An extended key in either flavour.
#[derive(Debug, Clone)]
pub enum ExtendedKey {
    Public(Xpub),
    Private(Xpriv),
}

impl ExtendedKey {
    pub fn parse(text: &str) -> Result<Self, TxBuildError> {
        if let Ok(xpub) = Xpub::from_str(text) {
            return Ok(Self::Public(xpub));
        }
        Xpriv::from_str(text)
            .map(Self::Private)
            .map_err(|e| TxBuildError::validation("extkey", e.to_string()))
    }

    #[must_use]
    pub fn network(&self) -> NetworkKind {
        match self {
            Self::Public(xpub) => xpub.network,
            Self::Private(xpriv) => xpriv.network,
        }
    }

    #[must_use]
    pub fn xpub(&self) -> Xpub {
        match self {
            Self::Public(xpub) => *xpub,
            Self::Private(xpriv) => Xpub::from_priv(&Secp256k1::new(), xpriv),
        }
    }

    pub fn derive(&self, path: &DerivationPath) -> Result<Self, TxBuildError> {
        let secp = Secp256k1::new();
        match self {
            Self::Public(xpub) => xpub
                .derive_pub(&secp, path)
                .map(Self::Public)
                .map_err(|e| TxBuildError::crypto("bip32 derivation", e)),
            Self::Private(xpriv) => xpriv
                .derive_priv(&secp, path)
                .map(Self::Private)
                .map_err(|e| TxBuildError::crypto("bip32 derivation", e)),
        }
    }

    #[must_use]
    pub fn pubkey(&self) -> [u8; 33] {
        self.xpub().public_key.serialize()
    }
}

impl std::fmt::Display for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public(xpub) => write!(f, "{xpub}"),
            Self::Private(xpriv) => write!(f, "{xpriv}"),
        }
    }
}

/// Compressed pubkey of an extended key, accepted only if the key's version matches `network`.
pub fn pubkey_from_extkey(extkey: &str, network: Network) -> Result<String, TxBuildError> {
    let key = ExtendedKey::parse(extkey)?;
    if key.network() != network.key_kind() {
        return Err(TxBuildError::crypto(
            "extkey pubkey",
            format!("key version does not belong to {network}"),
        ));
    }
    Ok(hex::encode(key.pubkey()))
}

/// Derives `path` from an extended key and returns the child xpub with its pubkey.
pub fn pubkey_from_parent_path(
    extkey: &str,
    path: &str,
    network: Network,
) -> Result<(String, String), TxBuildError> {
    let parent = ExtendedKey::parse(extkey)?;
    if parent.network() != network.key_kind() {
        return Err(TxBuildError::validation(
            "key",
            format!("key version does not belong to {network}"),
        ));
    }
    let child = parent.derive(&parse_path(path)?)?.xpub();
    Ok((child.to_string(), hex::encode(child.public_key.serialize())))
}

/// One derived extended key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtKeyPair {
    pub path: String,
    pub xpriv: String,
    pub xpub: String,
}

fn keypair_from_master(master: &Xpriv, path: &str) -> Result<ExtKeyPair, TxBuildError> {
    let secp = Secp256k1::new();
    let xpriv = if path.is_empty() {
        *master
    } else {
        master
            .derive_priv(&secp, &parse_path(path)?)
            .map_err(|e| TxBuildError::crypto("bip32 derivation", e))?
    };
    Ok(ExtKeyPair {
        path: if path.is_empty() { "m".to_string() } else { path.to_string() },
        xpriv: xpriv.to_string(),
        xpub: Xpub::from_priv(&secp, &xpriv).to_string(),
    })
}

pub fn ext_keypair_from_seed(
    seed_hex: &str,
    network: Network,
    path: &str,
) -> Result<ExtKeyPair, TxBuildError> {
    let seed = decode_hex("seed", seed_hex)?;
    let master = Xpriv::new_master(network.key_kind(), &seed)
        .map_err(|e| TxBuildError::crypto("bip32 master key", e))?;
    keypair_from_master(&master, path)
}

/// Language codes accepted for mnemonics.
pub fn mnemonic_language(code: &str) -> Result<Language, TxBuildError> {
    match code {
        "en" => Ok(Language::English),
        "jp" => Ok(Language::Japanese),
        "fr" => Ok(Language::French),
        "it" => Ok(Language::Italian),
        "es" => Ok(Language::Spanish),
        "zht" => Ok(Language::TraditionalChinese),
        "zhs" => Ok(Language::SimplifiedChinese),
        other => Err(TxBuildError::validation(
            "lang",
            format!("{other} is unknown language"),
        )),
    }
}

/// Key pairs for each comma-separated path, derived from a BIP39 mnemonic.
pub fn ext_keypairs_from_mnemonic(
    words: &str,
    passphrase: &str,
    language: Language,
    network: Network,
    paths: &str,
) -> Result<Vec<ExtKeyPair>, TxBuildError> {
    let mnemonic = Mnemonic::parse_in(language, words)
        .map_err(|e| TxBuildError::validation("mnemonic", e.to_string()))?;
    let seed = mnemonic.to_seed(passphrase);
    let master = Xpriv::new_master(network.key_kind(), &seed)
        .map_err(|e| TxBuildError::crypto("bip32 master key", e))?;

    paths
        .split(',')
        .map(|path| keypair_from_master(&master, path.trim()))
        .collect()
}

/// Compact (64-byte) ECDSA signature over a 32-byte sighash.
pub fn ec_sign(sighash: &[u8; 32], privkey: &SecretKey, grind_r: bool) -> String {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(*sighash);
    let signature = if grind_r {
        secp.sign_ecdsa_low_r(&message, privkey)
    } else {
        secp.sign_ecdsa(&message, privkey)
    };
    hex::encode(signature.serialize_compact())
}

/// Takes `hash` from inputs of the form `label: hash`.
#[must_use]
pub fn strip_sighash_label(sighash: &str) -> &str {
    sighash.rsplit(':').next().unwrap_or(sighash).trim()
}

fn parse_compact(signature: &str) -> Result<ecdsa::Signature, TxBuildError> {
    check_hex("signature", signature, 64, false)?;
    let bytes = decode_hex("signature", signature)?;
    ecdsa::Signature::from_compact(&bytes).map_err(|e| TxBuildError::validation("signature", e.to_string()))
}

/// DER-encodes a compact signature and appends the sighash byte.
pub fn encode_der(signature: &str, sighash: SigHashType) -> Result<String, TxBuildError> {
    let mut der = parse_compact(signature)?.serialize_der().to_vec();
    der.push(sighash.to_byte());
    Ok(hex::encode(der))
}

/// Splits a DER signature with trailing sighash byte into its compact form and sighash type.
pub fn decode_der(signature: &str) -> Result<(String, SigHashType), TxBuildError> {
    let bytes = decode_hex("signature", signature)?;
    let (&sighash, der) = bytes
        .split_last()
        .ok_or_else(|| TxBuildError::validation("signature", "empty signature"))?;
    let parsed = ecdsa::Signature::from_der(der)
        .or_else(|_| ecdsa::Signature::from_der_lax(der))
        .map_err(|e| TxBuildError::crypto("DER decode", e))?;
    Ok((hex::encode(parsed.serialize_compact()), SigHashType::from_byte(sighash)?))
}

/// Verifies a compact signature, tolerating high-S encodings.
pub fn verify_ecdsa(sighash: &[u8; 32], signature: &str, pubkey: &[u8]) -> Result<bool, TxBuildError> {
    let mut signature = parse_compact(signature)?;
    signature.normalize_s();
    let pubkey = PublicKey::from_slice(pubkey).map_err(|e| TxBuildError::validation("pubkey", e.to_string()))?;
    let secp = Secp256k1::verification_only();
    Ok(secp
        .verify_ecdsa(&Message::from_digest(*sighash), &signature, &pubkey)
        .is_ok())
}

/// Verifies a DER signature with trailing sighash byte, returning the sighash type it commits to.
pub fn verify_der(
    sighash_of: impl Fn(SigHashType) -> Result<[u8; 32], TxBuildError>,
    der_signature: &[u8],
    pubkey: &[u8],
) -> Result<bool, TxBuildError> {
    let Ok((compact, sighash_type)) = decode_der(&hex::encode(der_signature)) else {
        return Ok(false);
    };
    let sighash = sighash_of(sighash_type)?;
    verify_ecdsa(&sighash, &compact, pubkey)
}

/// Asset and amount Pedersen commitments for explicit values and their blinding factors.
pub fn commitments(
    asset: &str,
    amount: u64,
    asset_blinder: &str,
    amount_blinder: &str,
) -> Result<(String, String), TxBuildError> {
    check_hex("asset", asset, 32, false)?;
    check_hex("assetblinder", asset_blinder, 32, false)?;
    check_hex("blinder", amount_blinder, 32, false)?;

    let asset_id = elements::AssetId::from_str(asset)
        .map_err(|e| TxBuildError::validation("asset", e.to_string()))?;
    let abf = AssetBlindingFactor::from_str(asset_blinder)
        .map_err(|e| TxBuildError::validation("assetblinder", e.to_string()))?;
    let vbf = ValueBlindingFactor::from_str(amount_blinder)
        .map_err(|e| TxBuildError::validation("blinder", e.to_string()))?;

    let secp = elements::secp256k1_zkp::Secp256k1::new();
    let asset_commitment = Asset::new_confidential(&secp, asset_id, abf);
    let generator = asset_commitment
        .commitment()
        .ok_or_else(|| TxBuildError::crypto("asset commitment", "blinding produced no generator"))?;
    let amount_commitment = Value::new_confidential(&secp, amount, generator, vbf);

    Ok((
        elements::encode::serialize_hex(&asset_commitment),
        elements::encode::serialize_hex(&amount_commitment),
    ))
}

/// Private key seeded by the SHA-256 of the trimmed `|`-separated texts, concatenated.
#[must_use]
pub fn privkey_from_strings(text: &str) -> (Vec<String>, String) {
    let parts: Vec<String> = text.split('|').map(|part| part.trim_matches(' ').to_string()).collect();
    let digest = Sha256::digest(parts.concat().as_bytes());
    (parts, hex::encode(digest))
}

pub(crate) fn parse_pubkey(field: &'static str, pubkey: &str) -> Result<Vec<u8>, TxBuildError> {
    let bytes = decode_hex(field, pubkey)?;
    secp256k1::PublicKey::from_slice(&bytes).map_err(|e| TxBuildError::validation(field, e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SigHashKind;

    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const TV1_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const TV1_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const TV1_PUBKEY: &str = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2";
    const TV1_M0H_PUBKEY: &str = "035a784662a4a20a65bf6aab9ae98a6c068a81c52e4b032c0fb5400c706cfccc56";
    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn one() -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SecretKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn master_key_from_seed() {
        let pair = ext_keypair_from_seed(TV1_SEED, Network::Mainnet, "").unwrap();
        assert_eq!(pair.path, "m");
        assert_eq!(pair.xpriv, TV1_XPRV);
        assert_eq!(pair.xpub, TV1_XPUB);
    }

    #[test]
    fn extkey_pubkey_requires_matching_network() {
        assert_eq!(pubkey_from_extkey(TV1_XPUB, Network::Mainnet).unwrap(), TV1_PUBKEY);
        assert_eq!(pubkey_from_extkey(TV1_XPRV, Network::LiquidV1).unwrap(), TV1_PUBKEY);
        assert!(pubkey_from_extkey(TV1_XPUB, Network::Testnet).is_err());
    }

    #[test]
    fn path_steps_must_not_be_empty() {
        let expected = DerivationPath::from(vec![
            ChildNumber::from_hardened_idx(0).unwrap(),
            ChildNumber::from_normal_idx(1).unwrap(),
        ]);
        assert_eq!(parse_path("m/0'/1").unwrap(), expected);
        assert_eq!(parse_path("").unwrap(), DerivationPath::from(Vec::new()));
        assert_eq!(parse_path("m").unwrap(), DerivationPath::from(Vec::new()));
        for bad in ["0//1", "/0", "m/0/", "m//"] {
            assert!(
                matches!(parse_path(bad), Err(TxBuildError::Validation { field: "bip32path", .. })),
                "{bad} should fail"
            );
        }
    }

    #[test]
    fn hardened_path_from_private_key() {
        let (_, pubkey) = pubkey_from_parent_path(TV1_XPRV, "m/0h", Network::Mainnet).unwrap();
        assert_eq!(pubkey, TV1_M0H_PUBKEY);
        assert!(pubkey_from_parent_path(TV1_XPUB, "0'", Network::Mainnet).is_err());

        let sk = privkey_from_extpriv(TV1_XPRV, Some("0'")).unwrap();
        assert_eq!(pubkey_from_privkey(&sk, true), TV1_M0H_PUBKEY);
    }

    #[test]
    fn wif_and_hex_private_keys() {
        let wif = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
        assert_eq!(parse_privkey(wif).unwrap(), one());
        assert!(privkey_from_wif(wif, NetworkKind::Test).is_err());

        let hex_key = format!("{}01", "00".repeat(31));
        let sk = parse_privkey(&hex_key).unwrap();
        assert_eq!(pubkey_from_privkey(&sk, true), G);
        assert_eq!(pubkey_from_privkey(&sk, false).len(), 130);
    }

    #[test]
    fn sign_encode_decode_verify() {
        let sighash = [7u8; 32];
        let signature = ec_sign(&sighash, &one(), true);
        assert_eq!(signature.len(), 128);

        let sighash_type = SigHashType::new(SigHashKind::Single, true);
        let der = encode_der(&signature, sighash_type).unwrap();
        assert!(der.ends_with("83"));

        let (compact, decoded_type) = decode_der(&der).unwrap();
        assert_eq!(compact, signature);
        assert_eq!(decoded_type, sighash_type);

        let g = hex::decode(G).unwrap();
        assert!(verify_ecdsa(&sighash, &compact, &g).unwrap());
        assert!(!verify_ecdsa(&[8u8; 32], &compact, &g).unwrap());
    }

    #[test]
    fn strips_sighash_label() {
        assert_eq!(strip_sighash_label("signature hash: abcd"), "abcd");
        assert_eq!(strip_sighash_label("abcd"), "abcd");
    }

    #[test]
    fn privkey_from_trimmed_strings() {
        let (parts, privkey) = privkey_from_strings(" a | b|c ");
        assert_eq!(parts, vec!["a", "b", "c"]);
        assert_eq!(
            privkey,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn mnemonic_paths() {
        let words = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let pairs = ext_keypairs_from_mnemonic(
            words,
            "",
            mnemonic_language("en").unwrap(),
            Network::Testnet,
            "m/84h/1h/0h,",
        )
        .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].path, "m/84h/1h/0h");
        assert!(pairs[0].xpriv.starts_with("tprv"));
        assert_eq!(pairs[1].path, "m");
        assert!(mnemonic_language("de").is_err());
    }

    #[test]
    fn commitments_are_33_bytes() {
        let (asset, amount) = commitments(
            &"11".repeat(32),
            1000,
            &"22".repeat(32),
            &"33".repeat(32),
        )
        .unwrap();
        assert_eq!(asset.len(), 66);
        assert_eq!(amount.len(), 66);
        assert!(asset.starts_with("0a") || asset.starts_with("0b"));
        assert!(amount.starts_with("08") || amount.starts_with("09"));
    }
}
