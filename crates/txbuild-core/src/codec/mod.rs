//! Transaction encoding capabilities for each chain family.
//!
//! Every operation takes and returns serialized transaction hex, so the session artifact stays the
//! only state carried between invocations.

mod bitcoin;
mod elements;

pub use self::bitcoin::BitcoinCodec;
pub use self::elements::ElementsCodec;

use crate::error::TxBuildError;
use crate::network::Network;
use crate::script::Unlocking;
use crate::types::{Outpoint, SigHashType};

/// Value committed to by a signature hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountValue {
    Explicit(u64),
    /// 33-byte Pedersen value commitment.
    Commitment(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Address(String),
    Script(Vec<u8>),
    Fee,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub amount: u64,
    /// Asset id in display hex; Elements only.
    pub asset: Option<String>,
    pub target: OutputTarget,
}

#[derive(Debug, Clone, Copy)]
pub struct SighashRequest<'a> {
    pub outpoint: &'a Outpoint,
    pub script_code: &'a [u8],
    pub segwit: bool,
    pub value: &'a AmountValue,
    pub sighash_type: SigHashType,
}

/// Unblinding data of one spent output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlindInput {
    pub outpoint: Option<Outpoint>,
    pub amount: u64,
    pub asset: String,
    pub asset_blinder: String,
    pub amount_blinder: String,
    pub asset_commitment: String,
    pub amount_commitment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindOptions {
    pub minimum_range_value: u64,
    pub exponent: i32,
    pub minimum_bits: u32,
}

impl Default for BlindOptions {
    fn default() -> Self {
        Self {
            minimum_range_value: 1,
            exponent: 0,
            minimum_bits: 52,
        }
    }
}

/// Per-input issuance blinding key from `blind-raw-transaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceBlindingKey {
    pub outpoint: Outpoint,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlindRequest {
    pub inputs: Vec<BlindInput>,
    /// Confidential addresses whose blinding keys apply to outputs paying their scripts.
    pub confidential_addresses: Vec<String>,
    pub issuance_keys: Vec<IssuanceBlindingKey>,
    pub options: BlindOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReissueRequest {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub asset_blinder: String,
    pub entropy: String,
    pub target: OutputTarget,
}

/// Sizes used by fee estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxShape {
    /// Serialized size with every witness stripped.
    pub base_size: usize,
    pub total_size: usize,
    pub inputs: usize,
    /// Explicit, non-fee outputs that blinding would add proofs to.
    pub blindable_outputs: usize,
}

pub trait TxCodec {
    fn network(&self) -> Network;

    fn initialize(&self, version: u32, locktime: u32) -> Result<String, TxBuildError>;

    fn add_input(&self, tx_hex: &str, outpoint: &Outpoint, sequence: u32) -> Result<String, TxBuildError>;

    fn add_output(&self, tx_hex: &str, output: &OutputSpec) -> Result<String, TxBuildError>;

    fn find_input(&self, tx_hex: &str, outpoint: &Outpoint) -> Result<Option<usize>, TxBuildError>;

    fn signature_hash(&self, tx_hex: &str, request: &SighashRequest<'_>) -> Result<[u8; 32], TxBuildError>;

    fn input_unlocking(&self, tx_hex: &str, outpoint: &Outpoint) -> Result<Unlocking, TxBuildError>;

    fn set_input_unlocking(
        &self,
        tx_hex: &str,
        outpoint: &Outpoint,
        unlocking: &Unlocking,
    ) -> Result<String, TxBuildError>;

    fn blind(&self, tx_hex: &str, request: &BlindRequest) -> Result<String, TxBuildError>;

    /// Returns the new hex and the reissued asset id.
    fn set_reissue_asset(
        &self,
        tx_hex: &str,
        request: &ReissueRequest,
    ) -> Result<(String, String), TxBuildError>;

    fn decode(&self, tx_hex: &str) -> Result<serde_json::Value, TxBuildError>;

    fn shape(&self, tx_hex: &str) -> Result<TxShape, TxBuildError>;
}

#[must_use]
pub fn codec_for(network: Network) -> Box<dyn TxCodec> {
    if network.is_elements() {
        Box::new(ElementsCodec::new(network))
    } else {
        Box::new(BitcoinCodec::new(network))
    }
}

fn missing_input(outpoint: &Outpoint) -> TxBuildError {
    TxBuildError::crypto("input lookup", format!("input {outpoint} is not in the transaction"))
}

fn script_json(network: Network, script: &[u8]) -> serde_json::Value {
    let mut value = serde_json::json!({
        "asm": crate::script::to_asm(script),
        "hex": hex::encode(script),
    });
    if let Some(hash_type) = crate::script::locking_hash_type(script) {
        value["type"] = hash_type.as_str().into();
    }
    if let Some(address) = network.encode_address(script) {
        value["address"] = address.into();
    }
    value
}
