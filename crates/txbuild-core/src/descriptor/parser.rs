//! Output script descriptors parsed with rust-miniscript and flattened into script nodes.

use lwk_wollet::bitcoin::bip32::{ChildNumber, DerivationPath};
use lwk_wollet::bitcoin::secp256k1::Secp256k1;
use miniscript::descriptor::{
    checksum, DefiniteDescriptorKey, Descriptor, DescriptorPublicKey, DescriptorSecretKey, KeyMap, ShInner,
    SinglePubKey, Wildcard,
};
use miniscript::ForEachKey;
use tracing::trace;

use super::{DescriptorKey, DescriptorParser, KeyKind, NodeKind, ParsedDescriptor, ScriptNode};
use crate::error::TxBuildError;
use crate::keys::ExtendedKey;
use crate::network::Network;
use crate::script::{self, MultisigScript};
use crate::types::HashType;

/// Parser for the `sh`/`wsh`/`pkh`/`wpkh`/`pk`/`multi`/`sortedmulti` forms plus `raw`/`addr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDescriptorParser;

impl DescriptorParser for StandardDescriptorParser {
    fn parse(
        &self,
        descriptor: &str,
        network: Network,
        child: Option<u32>,
    ) -> Result<ParsedDescriptor, TxBuildError> {
        let descriptor = descriptor.trim();
        if let Some(node) = script_expression(descriptor, network)? {
            return Ok(ParsedDescriptor {
                nodes: vec![node],
                multisig_keys: Vec::new(),
            });
        }

        let secp = Secp256k1::new();
        let (parsed, keymap) = Descriptor::<DescriptorPublicKey>::parse_descriptor(&secp, descriptor)
            .map_err(|e| error(e.to_string()))?;
        if parsed.has_wildcard() && child.is_none() {
            return Err(error("wildcard key needs a child number"));
        }
        let index = child.unwrap_or_default();

        let mut public_keys = Vec::new();
        parsed.for_each_key(|key| {
            public_keys.push(key.clone());
            true
        });
        let keys = public_keys
            .iter()
            .map(|key| descriptor_key(key, &keymap, index))
            .collect::<Result<Vec<_>, _>>()?;

        let definite = parsed
            .at_derivation_index(index)
            .map_err(|e| error(e.to_string()))?;
        let mut flattener = Flattener {
            network,
            keys,
            multisig_keys: Vec::new(),
        };
        let nodes = flattener.flatten(&definite)?;
        trace!(nodes = nodes.len(), "descriptor parsed");

        Ok(ParsedDescriptor {
            nodes,
            multisig_keys: flattener.multisig_keys,
        })
    }
}

fn error(message: impl Into<String>) -> TxBuildError {
    TxBuildError::Descriptor(message.into())
}

/// `raw(HEX)` and `addr(ADDRESS)`, which carry a script rather than keys.
fn script_expression(descriptor: &str, network: Network) -> Result<Option<ScriptNode>, TxBuildError> {
    let body = checksum::verify_checksum(descriptor).map_err(|e| error(e.to_string()))?;
    let (kind, locking, address) = if let Some(hex_script) = strip_call(body, "raw") {
        let locking = hex::decode(hex_script).map_err(|e| error(format!("raw(): {e}")))?;
        let address = network.encode_address(&locking);
        (NodeKind::Raw, locking, address)
    } else if let Some(address) = strip_call(body, "addr") {
        let decoded = network.decode_address(address).map_err(|e| error(e.to_string()))?;
        (NodeKind::Addr, decoded.script_pubkey, Some(address.to_string()))
    } else {
        return Ok(None);
    };

    Ok(Some(ScriptNode {
        kind,
        hash_type: script::locking_hash_type(&locking),
        address,
        locking_script: locking,
        ..ScriptNode::default()
    }))
}

fn strip_call<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')
}

/// Key of a descriptor with its path (and wildcard) applied.
fn descriptor_key(key: &DescriptorPublicKey, keymap: &KeyMap, index: u32) -> Result<DescriptorKey, TxBuildError> {
    match (key, keymap.get(key)) {
        (_, Some(DescriptorSecretKey::XPrv(xprv))) => extended_key(
            ExtendedKey::Private(xprv.xkey),
            &xprv.derivation_path,
            xprv.wildcard,
            index,
        ),
        (DescriptorPublicKey::XPub(xpub), _) => extended_key(
            ExtendedKey::Public(xpub.xkey),
            &xpub.derivation_path,
            xpub.wildcard,
            index,
        ),
        (DescriptorPublicKey::Single(single), _) => match single.key {
            SinglePubKey::FullKey(pubkey) => Ok(DescriptorKey {
                kind: KeyKind::Public,
                text: pubkey.to_string(),
                pubkey: pubkey.to_bytes(),
            }),
            SinglePubKey::XOnly(_) => Err(error("x-only keys are not supported")),
        },
        (DescriptorPublicKey::MultiXPub(_), _) => Err(error("multipath keys are not supported")),
    }
}

fn extended_key(
    root: ExtendedKey,
    path: &DerivationPath,
    wildcard: Wildcard,
    index: u32,
) -> Result<DescriptorKey, TxBuildError> {
    let path = match wildcard {
        Wildcard::None => path.clone(),
        Wildcard::Unhardened => path.child(ChildNumber::from_normal_idx(index).map_err(|e| error(e.to_string()))?),
        Wildcard::Hardened => path.child(ChildNumber::from_hardened_idx(index).map_err(|e| error(e.to_string()))?),
    };
    let derived = root.derive(&path).map_err(|e| error(e.to_string()))?;
    let kind = match derived {
        ExtendedKey::Public(_) => KeyKind::ExtPublic,
        ExtendedKey::Private(_) => KeyKind::ExtPrivate,
    };

    Ok(DescriptorKey {
        kind,
        pubkey: derived.pubkey().to_vec(),
        text: derived.to_string(),
    })
}

struct Flattener {
    network: Network,
    keys: Vec<DescriptorKey>,
    multisig_keys: Vec<DescriptorKey>,
}

impl Flattener {
    fn flatten(&mut self, descriptor: &Descriptor<DefiniteDescriptorKey>) -> Result<Vec<ScriptNode>, TxBuildError> {
        match descriptor {
            Descriptor::Sh(sh) => {
                let locking = sh.script_pubkey().into_bytes();
                match sh.as_inner() {
                    ShInner::Wpkh(wpkh) => {
                        let redeem = wpkh.script_pubkey().into_bytes();
                        let child = self.leaf(1, &redeem)?;
                        Ok(vec![self.wrapper(0, NodeKind::Sh, HashType::P2shP2wpkh, locking, redeem), child])
                    }
                    ShInner::Wsh(wsh) => {
                        let redeem = wsh.script_pubkey().into_bytes();
                        let mut nodes = vec![self.wrapper(0, NodeKind::Sh, HashType::P2shP2wsh, locking, redeem.clone())];
                        nodes.extend(self.committed(
                            1,
                            NodeKind::Wsh,
                            HashType::P2wsh,
                            redeem,
                            wsh.inner_script().into_bytes(),
                        )?);
                        Ok(nodes)
                    }
                    _ => self.committed(0, NodeKind::Sh, HashType::P2sh, locking, sh.inner_script().into_bytes()),
                }
            }
            Descriptor::Wsh(wsh) => self.committed(
                0,
                NodeKind::Wsh,
                HashType::P2wsh,
                wsh.script_pubkey().into_bytes(),
                wsh.inner_script().into_bytes(),
            ),
            Descriptor::Tr(_) => Err(error("taproot descriptors are not supported")),
            other => Ok(vec![self.leaf(0, other.script_pubkey().as_bytes())?]),
        }
    }

    /// An `sh`/`wsh` node; a multisig it commits to is folded into it.
    fn committed(
        &mut self,
        depth: usize,
        kind: NodeKind,
        hash_type: HashType,
        locking: Vec<u8>,
        script: Vec<u8>,
    ) -> Result<Vec<ScriptNode>, TxBuildError> {
        if let Some(required) = self.multisig(&script)? {
            return Ok(vec![ScriptNode {
                required_signatures: Some(required),
                ..self.wrapper(depth, kind, hash_type, locking, script)
            }]);
        }
        let child = self.leaf(depth + 1, &script)?;
        Ok(vec![self.wrapper(depth, kind, hash_type, locking, script), child])
    }

    fn wrapper(
        &self,
        depth: usize,
        kind: NodeKind,
        hash_type: HashType,
        locking: Vec<u8>,
        redeem_script: Vec<u8>,
    ) -> ScriptNode {
        ScriptNode {
            hash_type: Some(hash_type),
            redeem_script,
            ..self.node(depth, kind, locking)
        }
    }

    fn node(&self, depth: usize, kind: NodeKind, locking: Vec<u8>) -> ScriptNode {
        ScriptNode {
            depth,
            kind,
            hash_type: script::locking_hash_type(&locking),
            address: self.network.encode_address(&locking),
            locking_script: locking,
            ..ScriptNode::default()
        }
    }

    fn leaf(&mut self, depth: usize, locking: &[u8]) -> Result<ScriptNode, TxBuildError> {
        if let Some(required) = self.multisig(locking)? {
            return Ok(ScriptNode {
                required_signatures: Some(required),
                ..self.node(depth, NodeKind::Multi, locking.to_vec())
            });
        }

        let (kind, key) = match script::checksig_key(locking) {
            Some(pubkey) => (NodeKind::Pk, self.key_for(&pubkey)?),
            None => self
                .keys
                .iter()
                .find_map(|key| {
                    if script::p2pkh_script(&key.pubkey) == locking {
                        Some((NodeKind::Pkh, key.clone()))
                    } else if script::p2wpkh_script(&key.pubkey) == locking {
                        Some((NodeKind::Wpkh, key.clone()))
                    } else {
                        None
                    }
                })
                .ok_or_else(|| error("only pk, pkh, wpkh and multisig scripts are supported"))?,
        };
        Ok(ScriptNode {
            key: Some(key),
            ..self.node(depth, kind, locking.to_vec())
        })
    }

    /// Records the keys of a multisig script and returns its threshold.
    fn multisig(&mut self, script: &[u8]) -> Result<Option<usize>, TxBuildError> {
        let Some(multisig) = MultisigScript::parse(script) else {
            return Ok(None);
        };
        self.multisig_keys = multisig
            .pubkeys
            .iter()
            .map(|pubkey| self.key_for(pubkey))
            .collect::<Result<_, _>>()?;
        Ok(Some(multisig.required))
    }

    fn key_for(&self, pubkey: &[u8]) -> Result<DescriptorKey, TxBuildError> {
        self.keys
            .iter()
            .find(|key| key.pubkey == pubkey)
            .cloned()
            .ok_or_else(|| error(format!("key {} is not in the descriptor", hex::encode(pubkey))))
    }
}
