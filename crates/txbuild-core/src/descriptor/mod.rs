//! Output descriptors: parsing into script nodes and resolving the signing data of an input.

pub mod parser;

use tracing::debug;

pub use parser::StandardDescriptorParser;

use crate::error::TxBuildError;
use crate::keys::pubkey_from_extkey;
use crate::network::Network;
use crate::types::HashType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    Sh,
    Wsh,
    Pkh,
    Wpkh,
    Pk,
    Multi,
    #[default]
    Raw,
    Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    ExtPublic,
    ExtPrivate,
}

/// Key expression of a descriptor, after any path derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorKey {
    pub kind: KeyKind,
    /// Hex pubkey, or the derived extended key in base58.
    pub text: String,
    pub pubkey: Vec<u8>,
}

/// One script level of a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptNode {
    pub depth: usize,
    pub kind: NodeKind,
    pub hash_type: Option<HashType>,
    pub locking_script: Vec<u8>,
    pub address: Option<String>,
    /// Script committed to by an `sh`/`wsh` node, empty otherwise.
    pub redeem_script: Vec<u8>,
    pub key: Option<DescriptorKey>,
    pub required_signatures: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDescriptor {
    /// Outermost node first.
    pub nodes: Vec<ScriptNode>,
    pub multisig_keys: Vec<DescriptorKey>,
}

pub trait DescriptorParser {
    /// `child` is the index a wildcard (`*`) key path is derived at.
    fn parse(
        &self,
        descriptor: &str,
        network: Network,
        child: Option<u32>,
    ) -> Result<ParsedDescriptor, TxBuildError>;
}

/// Signing data recovered from a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorInfo {
    /// Empty when the leaf carries no single key, as for multisig.
    pub pubkey: String,
    pub redeem_script: String,
    pub hash_type: Option<HashType>,
    pub address: String,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorResolver<P = StandardDescriptorParser> {
    parser: P,
}

impl<P: DescriptorParser> DescriptorResolver<P> {
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn resolve(&self, descriptor: &str, network: Network) -> Result<DescriptorInfo, TxBuildError> {
        let parsed = self.parser.parse(descriptor, network, None)?;
        let (outer, leaf) = match (parsed.nodes.first(), parsed.nodes.last()) {
            (Some(outer), Some(leaf)) => (outer, leaf),
            _ => return Err(TxBuildError::Descriptor("descriptor has no script".to_string())),
        };

        let pubkey = match &leaf.key {
            None => String::new(),
            Some(key) if key.kind == KeyKind::Public => key.text.clone(),
            Some(key) => extkey_pubkey(&key.text)?,
        };

        // A non-multisig script under sh/wsh is committed to as-is.
        let wrapped_script = parsed.nodes.len() > 1
            && leaf.redeem_script.is_empty()
            && outer.hash_type.is_some_and(|hash_type| !hash_type.is_key_hash());
        let redeem_script = if wrapped_script {
            &leaf.locking_script
        } else {
            &leaf.redeem_script
        };

        Ok(DescriptorInfo {
            pubkey,
            redeem_script: hex::encode(redeem_script),
            hash_type: outer.hash_type,
            address: outer.address.clone().unwrap_or_default(),
        })
    }
}

// The key's version bytes may be either family; mainnet is tried first.
fn extkey_pubkey(extkey: &str) -> Result<String, TxBuildError> {
    pubkey_from_extkey(extkey, Network::Mainnet)
        .or_else(|err| {
            debug!(%err, "extended key is not a mainnet key, retrying as testnet");
            pubkey_from_extkey(extkey, Network::Testnet)
        })
        .map_err(|e| TxBuildError::Descriptor(e.to_string()))
}
