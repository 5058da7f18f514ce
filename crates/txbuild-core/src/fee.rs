//! Fee estimation from the current transaction plus the unlocking data its inputs will need.

use tracing::debug;

use crate::codec::TxCodec;
use crate::descriptor::{DescriptorParser, DescriptorResolver};
use crate::error::TxBuildError;
use crate::registry::{UtxoRecord, UtxoRegistry};
use crate::script::MultisigScript;
use crate::types::{HashType, check_hex, decode_hex};

/// Default fee rate in sat/vbyte.
pub const DEFAULT_FEE_RATE: f64 = 20.0;

/// Length byte plus a high-s DER signature with its sighash byte.
const SIGNATURE_PUSH: usize = 73;
/// Length byte plus a compressed pubkey.
const PUBKEY_PUSH: usize = 34;
const P2PKH_SCRIPT_SIG: usize = SIGNATURE_PUSH + PUBKEY_PUSH;
/// Item count plus signature and pubkey.
const P2WPKH_WITNESS: usize = 1 + SIGNATURE_PUSH + PUBKEY_PUSH;
/// Push of the 22-byte witness program.
const NESTED_P2WPKH_SCRIPT_SIG: usize = 23;
/// Push of the 34-byte witness program.
const NESTED_P2WSH_SCRIPT_SIG: usize = 35;
/// Explicit value (9 bytes) becomes a 33-byte commitment.
const VALUE_COMMITMENT_GROWTH: usize = 24;
/// Empty nonce (1 byte) becomes a 33-byte ECDH pubkey.
const NONCE_GROWTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct FeeOptions {
    /// sat/vbyte.
    pub fee_rate: f64,
    /// Adds proof sizes for outputs that are still explicit. Elements only.
    pub blind: bool,
    /// Fee asset; Elements only.
    pub asset: Option<String>,
    pub exponent: i32,
    pub minimum_bits: u32,
}

impl Default for FeeOptions {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            blind: true,
            asset: None,
            exponent: 0,
            minimum_bits: 52,
        }
    }
}

impl FeeOptions {
    fn validate(&self) -> Result<(), TxBuildError> {
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 {
            return Err(TxBuildError::validation("feerate", "must be a non-negative number"));
        }
        if !(-1..=18).contains(&self.exponent) {
            return Err(TxBuildError::validation("exponent", "must be between -1 and 18"));
        }
        if !(1..=64).contains(&self.minimum_bits) {
            return Err(TxBuildError::validation("minimumbits", "must be between 1 and 64"));
        }
        if let Some(asset) = &self.asset {
            check_hex("asset", asset, 32, true)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub total: u64,
    pub tx_fee: u64,
    pub input_fee: u64,
}

/// Unlocking data expected for one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InputSize {
    script_sig: usize,
    witness: usize,
}

impl InputSize {
    /// The scriptSig length prefix is already part of the unsigned input.
    fn weight(self) -> usize {
        let prefix_growth = varint_len(self.script_sig) - 1;
        (self.script_sig + prefix_growth) * 4 + self.witness
    }
}

#[must_use]
pub fn varint_len(n: usize) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Serialized Borromean rangeproof size for a value proven over `bits` bits.
#[must_use]
pub fn rangeproof_size(bits: u32) -> usize {
    let bits = bits as usize;
    let rings = bits.div_ceil(2);
    let pubkeys = if bits % 2 == 1 {
        4 * (rings - 1) + 2
    } else {
        4 * rings
    };
    10 + 32 * (pubkeys + rings - 1) + 32 + ((rings + 6) >> 3)
}

/// Serialized surjection proof size over `inputs` candidate assets.
#[must_use]
pub fn surjection_proof_size(inputs: usize) -> usize {
    2 + inputs.div_ceil(8) + 32 * (1 + inputs)
}

fn multisig_sizes(redeem: &[u8]) -> Option<(usize, usize)> {
    let multisig = MultisigScript::parse(redeem)?;
    let signatures = 1 + multisig.required * SIGNATURE_PUSH;
    let witness = 1 + signatures + varint_len(redeem.len()) + redeem.len();
    let push = if redeem.len() < 0x4c {
        1
    } else if redeem.len() <= 0xff {
        2
    } else {
        3
    };
    let script_sig = signatures + push + redeem.len();
    Some((script_sig, witness))
}

fn template_size(record: &UtxoRecord) -> Result<usize, TxBuildError> {
    Ok(decode_hex("scriptsigTemplate", &record.scriptsig_template)?.len())
}

fn input_size<P: DescriptorParser>(
    record: &UtxoRecord,
    resolver: &DescriptorResolver<P>,
    codec: &dyn TxCodec,
) -> Result<InputSize, TxBuildError> {
    if record.descriptor.is_empty() {
        return Ok(InputSize {
            script_sig: template_size(record)?,
            witness: 0,
        });
    }
    let info = resolver.resolve(&record.descriptor, codec.network())?;
    let Some(hash_type) = info.hash_type else {
        return Ok(InputSize {
            script_sig: template_size(record)?,
            witness: 0,
        });
    };
    let redeem = decode_hex("script", &info.redeem_script)?;

    let size = match hash_type {
        HashType::P2pkh => InputSize {
            script_sig: P2PKH_SCRIPT_SIG,
            witness: 0,
        },
        HashType::P2wpkh => InputSize {
            script_sig: 0,
            witness: P2WPKH_WITNESS,
        },
        HashType::P2shP2wpkh => InputSize {
            script_sig: NESTED_P2WPKH_SCRIPT_SIG,
            witness: P2WPKH_WITNESS,
        },
        HashType::P2sh | HashType::P2wsh | HashType::P2shP2wsh => {
            let (script_sig, witness) = match multisig_sizes(&redeem) {
                Some(sizes) => sizes,
                None => {
                    let template = template_size(record)?;
                    (template, 1 + varint_len(template) + template)
                }
            };
            match hash_type {
                HashType::P2sh => InputSize {
                    script_sig,
                    witness: 0,
                },
                HashType::P2wsh => InputSize {
                    script_sig: 0,
                    witness,
                },
                _ => InputSize {
                    script_sig: NESTED_P2WSH_SCRIPT_SIG,
                    witness,
                },
            }
        }
    };
    Ok(size)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fee_for(weight: usize, fee_rate: f64) -> u64 {
    let vsize = weight.div_ceil(4);
    (vsize as f64 * fee_rate).ceil() as u64
}

/// Estimates the fee of `tx_hex` once every input in `registry` is signed.
///
/// The transaction part covers the current serialization plus, for Elements, the proofs blinding
/// would add. The input part covers the signatures and scripts still missing.
///
/// # Errors
///
/// Returns an error if the options are out of range, the transaction does not parse, or a
/// record's descriptor cannot be resolved.
pub fn estimate_fee<P: DescriptorParser>(
    codec: &dyn TxCodec,
    tx_hex: &str,
    registry: &UtxoRegistry,
    resolver: &DescriptorResolver<P>,
    options: &FeeOptions,
) -> Result<FeeEstimate, TxBuildError> {
    options.validate()?;
    let shape = codec.shape(tx_hex)?;

    let mut tx_weight = shape.base_size * 3 + shape.total_size;
    if codec.network().is_elements() && options.blind && shape.blindable_outputs > 0 {
        let rangeproof = rangeproof_size(options.minimum_bits);
        let surjection = surjection_proof_size(shape.inputs);
        let base = VALUE_COMMITMENT_GROWTH + NONCE_GROWTH;
        // the empty proofs already carry one length byte each
        let witness = rangeproof + varint_len(rangeproof) - 1 + surjection + varint_len(surjection) - 1;
        tx_weight += shape.blindable_outputs * (base * 4 + witness);
    }

    let mut input_weight = 0;
    let mut adds_witness = false;
    for record in registry.iter() {
        let size = input_size(record, resolver, codec)?;
        adds_witness |= size.witness > 0;
        input_weight += size.weight();
    }
    // segwit marker and flag
    if adds_witness && shape.base_size == shape.total_size && !codec.network().is_elements() {
        input_weight += 2;
    }

    let tx_fee = fee_for(tx_weight, options.fee_rate);
    let input_fee = fee_for(input_weight, options.fee_rate);
    debug!(tx_weight, input_weight, fee_rate = options.fee_rate, "fee estimated");

    Ok(FeeEstimate {
        total: tx_fee + input_fee,
        tx_fee,
        input_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BitcoinCodec, ElementsCodec, OutputSpec, OutputTarget};
    use crate::network::Network;
    use crate::types::Outpoint;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const G2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
    const ASSET: &str = "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d";

    fn record(descriptor: &str) -> UtxoRecord {
        UtxoRecord {
            txid: "a".repeat(64),
            descriptor: descriptor.to_string(),
            ..UtxoRecord::default()
        }
    }

    fn unsigned_tx(codec: &dyn TxCodec, asset: Option<&str>) -> String {
        let tx = codec.initialize(2, 0).unwrap();
        let tx = codec
            .add_input(&tx, &Outpoint::new(&"a".repeat(64), 0).unwrap(), 0xffff_ffff)
            .unwrap();
        codec
            .add_output(
                &tx,
                &OutputSpec {
                    amount: 1000,
                    asset: asset.map(str::to_string),
                    target: OutputTarget::Script(vec![0x51]),
                },
            )
            .unwrap()
    }

    fn options(fee_rate: f64) -> FeeOptions {
        FeeOptions {
            fee_rate,
            ..FeeOptions::default()
        }
    }

    #[test]
    fn proof_sizes() {
        assert_eq!(rangeproof_size(52), 4174);
        assert_eq!(surjection_proof_size(3), 2 + 1 + 32 * 4);
        assert_eq!(surjection_proof_size(9), 2 + 2 + 32 * 10);
    }

    #[test]
    fn p2wpkh_input_on_bitcoin() {
        let codec = BitcoinCodec::new(Network::Mainnet);
        let tx = unsigned_tx(&codec, None);
        let registry = UtxoRegistry::from(vec![record(&format!("wpkh({G})"))]);

        let fee = estimate_fee(&codec, &tx, &registry, &DescriptorResolver::default(), &options(1.0)).unwrap();
        assert_eq!(fee.tx_fee, 61);
        // 108 witness bytes plus the segwit marker and flag
        assert_eq!(fee.input_fee, 28);
        assert_eq!(fee.total, 89);
    }

    #[test]
    fn fee_rate_scales_with_ceiling() {
        let codec = BitcoinCodec::new(Network::Mainnet);
        let tx = unsigned_tx(&codec, None);
        let registry = UtxoRegistry::from(vec![record(&format!("pkh({G})"))]);

        let fee = estimate_fee(&codec, &tx, &registry, &DescriptorResolver::default(), &options(1.5)).unwrap();
        assert_eq!(fee.tx_fee, 92);
        assert_eq!(fee.input_fee, 161);
    }

    #[test]
    fn multisig_and_template_inputs() {
        let codec = BitcoinCodec::new(Network::Mainnet);
        let tx = unsigned_tx(&codec, None);
        let resolver = DescriptorResolver::default();

        let multisig = UtxoRegistry::from(vec![record(&format!("sh(multi(2,{G},{G2}))"))]);
        let fee = estimate_fee(&codec, &tx, &multisig, &resolver, &options(1.0)).unwrap();
        // OP_0, two signatures and a pushed 71-byte redeem script
        assert_eq!(fee.input_fee, 1 + 2 * 73 + 1 + 71);

        let mut raw = record("");
        raw.scriptsig_template = "00".repeat(10);
        let fee = estimate_fee(&codec, &tx, &UtxoRegistry::from(vec![raw]), &resolver, &options(1.0)).unwrap();
        assert_eq!(fee.input_fee, 10);
    }

    #[test]
    fn elements_blinding_adds_proofs() {
        let codec = ElementsCodec::new(Network::LiquidV1);
        let tx = unsigned_tx(&codec, Some(ASSET));
        let registry = UtxoRegistry::from(vec![record(&format!("wpkh({G})"))]);
        let resolver = DescriptorResolver::default();

        let blinded = estimate_fee(&codec, &tx, &registry, &resolver, &options(1.0)).unwrap();
        let explicit = estimate_fee(
            &codec,
            &tx,
            &registry,
            &resolver,
            &FeeOptions {
                blind: false,
                ..options(1.0)
            },
        )
        .unwrap();

        assert_eq!(blinded.input_fee, explicit.input_fee);
        assert!(blinded.tx_fee > explicit.tx_fee + 1000);
    }

    #[test]
    fn invalid_options() {
        let codec = BitcoinCodec::new(Network::Mainnet);
        let tx = unsigned_tx(&codec, None);
        let resolver = DescriptorResolver::default();
        let registry = UtxoRegistry::default();

        let err = estimate_fee(&codec, &tx, &registry, &resolver, &options(-1.0)).unwrap_err();
        assert!(matches!(err, TxBuildError::Validation { field: "feerate", .. }));
        let err = estimate_fee(
            &codec,
            &tx,
            &registry,
            &resolver,
            &FeeOptions {
                exponent: 19,
                ..options(1.0)
            },
        )
        .unwrap_err();
        assert!(matches!(err, TxBuildError::Validation { field: "exponent", .. }));
    }
}
