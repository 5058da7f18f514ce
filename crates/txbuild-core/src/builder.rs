//! Mutations and queries over a [`BuildSession`].
//!
//! Every mutation computes the new transaction first and touches the session only after the
//! codec call succeeded, so a failed step leaves the session exactly as it was loaded.

use lwk_wollet::bitcoin::secp256k1::SecretKey;
use tracing::{debug, info, warn};

use crate::codec::{
    AmountValue, BlindInput, BlindOptions, BlindRequest, IssuanceBlindingKey, OutputSpec, OutputTarget,
    ReissueRequest, TxCodec, codec_for,
};
use crate::descriptor::{
    DescriptorInfo, DescriptorParser, DescriptorResolver, ParsedDescriptor, StandardDescriptorParser,
};
use crate::dispatch::{self, classify};
use crate::error::TxBuildError;
use crate::fee::{FeeEstimate, FeeOptions, estimate_fee};
use crate::keys::{decode_der, pubkey_from_privkey};
use crate::network::Network;
use crate::registry::{UtxoRecord, ZERO_BLINDER};
use crate::resolve::{ResolvedParameters, resolve_parameters};
use crate::session::BuildSession;
use crate::sign;
use crate::types::{Outpoint, SigHashType, check_hex, decode_hex};
use crate::verify;

/// Signatures longer than a 64-byte compact signature are DER encoded.
const COMPACT_SIGNATURE_HEX_LEN: usize = 130;

/// Identifies an input and the caller-supplied parameters for hashing or signing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInput {
    pub outpoint: Outpoint,
    pub explicit: ResolvedParameters,
    pub sighash_type: SigHashType,
    /// Lets the registry record's descriptor fill missing parameters.
    pub use_cache: bool,
}

impl SigningInput {
    #[must_use]
    pub fn new(outpoint: Outpoint) -> Self {
        Self {
            outpoint,
            explicit: ResolvedParameters::default(),
            sighash_type: SigHashType::ALL,
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSignRequest {
    pub input: SigningInput,
    /// Comma separated; empty slots are skipped.
    pub signatures: String,
    /// Comma separated and parallel to `signatures`, or empty.
    pub pubkeys: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindCommand {
    /// `txid,vout,key` entries separated by `|`.
    pub blinding_keys: String,
    pub addresses: Vec<String>,
    pub options: BlindOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReissueCommand {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub entropy: String,
    /// Falls back to the registry record's asset blinder.
    pub asset_blinder: Option<String>,
    pub target: OutputTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySignatureRequest {
    pub input: SigningInput,
    /// Compact hex, or DER with a trailing sighash byte.
    pub signature: String,
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySignedRequest {
    pub outpoint: Outpoint,
    pub explicit: ResolvedParameters,
    pub descriptor: Option<String>,
    /// Address the input is expected to spend from.
    pub address: Option<String>,
    pub use_cache: bool,
}

/// Parses `txid,vout,key|...`; entries with fewer than three parts are skipped.
pub fn parse_blinding_keys(text: &str) -> Result<Vec<IssuanceBlindingKey>, TxBuildError> {
    let mut keys = Vec::new();
    for entry in text.split('|') {
        let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
        let [txid, vout, key, ..] = parts.as_slice() else {
            continue;
        };
        let vout = vout
            .parse()
            .map_err(|_| TxBuildError::validation("blindingkeys", format!("invalid vout {vout}")))?;
        check_hex("blindingkeys", key, 32, false)?;
        keys.push(IssuanceBlindingKey {
            outpoint: Outpoint::new(txid, vout)?,
            key: (*key).to_string(),
        });
    }
    Ok(keys)
}

fn check_explicit(params: &ResolvedParameters) -> Result<(), TxBuildError> {
    check_hex("pubkey", &params.pubkey, 33, true)?;
    check_hex("amountcommitment", &params.amount_commitment, 33, true)?;
    decode_hex("script", &params.redeem_script)?;
    Ok(())
}

fn amount_value(params: &ResolvedParameters) -> Result<AmountValue, TxBuildError> {
    if params.amount_commitment.is_empty() {
        u64::try_from(params.amount)
            .map(AmountValue::Explicit)
            .map_err(|_| TxBuildError::validation("amount", "must not be negative"))
    } else {
        Ok(AmountValue::Commitment(decode_hex(
            "amountcommitment",
            &params.amount_commitment,
        )?))
    }
}

fn check_record(record: &UtxoRecord) -> Result<(), TxBuildError> {
    check_hex("asset", &record.asset, 32, true)?;
    check_hex("assetblinder", &record.asset_blinder, 32, true)?;
    check_hex("blinder", &record.amount_blinder, 32, true)?;
    check_hex("assetcommitment", &record.asset_commitment, 33, true)?;
    check_hex("amountcommitment", &record.amount_commitment, 33, true)?;
    decode_hex("scriptsigTemplate", &record.scriptsig_template)?;
    Ok(())
}

fn blind_input(record: &UtxoRecord) -> Result<BlindInput, TxBuildError> {
    let amount = u64::try_from(record.amount)
        .map_err(|_| TxBuildError::validation("amount", "must not be negative"))?;
    let blinder = |value: &str| {
        if value.is_empty() {
            ZERO_BLINDER.to_string()
        } else {
            value.to_string()
        }
    };
    Ok(BlindInput {
        outpoint: Some(record.outpoint()),
        amount,
        asset: record.asset.clone(),
        asset_blinder: blinder(&record.asset_blinder),
        amount_blinder: blinder(&record.amount_blinder),
        asset_commitment: record.asset_commitment.clone(),
        amount_commitment: record.amount_commitment.clone(),
    })
}

/// Runs build steps for one network.
pub struct TxBuilder<P = StandardDescriptorParser> {
    network: Network,
    codec: Box<dyn TxCodec>,
    resolver: DescriptorResolver<P>,
}

impl TxBuilder {
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self::with_parser(network, StandardDescriptorParser)
    }
}

impl<P: DescriptorParser> TxBuilder<P> {
    pub fn with_parser(network: Network, parser: P) -> Self {
        Self {
            network,
            codec: codec_for(network),
            resolver: DescriptorResolver::new(parser),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn codec(&self) -> &dyn TxCodec {
        self.codec.as_ref()
    }

    pub fn initialize(&self, version: u32, locktime: u32) -> Result<BuildSession, TxBuildError> {
        let hex = self.codec.initialize(version, locktime)?;
        info!(network = %self.network, version, locktime, "transaction initialized");
        Ok(BuildSession::new(hex))
    }

    /// Adds the input unless the transaction already spends it, and records its provenance.
    pub fn append_input(
        &self,
        session: &mut BuildSession,
        record: UtxoRecord,
        sequence: u32,
    ) -> Result<(), TxBuildError> {
        let outpoint = Outpoint::new(&record.txid, record.vout)?;
        check_record(&record)?;
        if !record.descriptor.is_empty() {
            self.resolver.parser().parse(&record.descriptor, self.network, None)?;
        }

        let hex = if self.codec.find_input(&session.transaction_hex, &outpoint)?.is_some() {
            info!(%outpoint, "input already present, updating its record only");
            session.transaction_hex.clone()
        } else {
            self.codec.add_input(&session.transaction_hex, &outpoint, sequence)?
        };

        session.transaction_hex = hex;
        let record = UtxoRecord {
            txid: outpoint.txid,
            ..record
        };
        if session.utxos.upsert(record) {
            debug!(vout = outpoint.vout, "registry record replaced");
        }
        Ok(())
    }

    pub fn append_output(&self, session: &mut BuildSession, output: &OutputSpec) -> Result<(), TxBuildError> {
        if let Some(asset) = &output.asset {
            check_hex("asset", asset, 32, true)?;
        }
        if matches!(output.target, OutputTarget::Fee | OutputTarget::Destroy) && !self.network.is_elements() {
            return Err(TxBuildError::validation(
                "target",
                "fee and destroy outputs exist only on Elements",
            ));
        }
        session.transaction_hex = self.codec.add_output(&session.transaction_hex, output)?;
        Ok(())
    }

    fn resolve(&self, session: &BuildSession, input: &SigningInput) -> Result<ResolvedParameters, TxBuildError> {
        resolve_parameters(
            &input.outpoint,
            input.explicit.clone(),
            &session.utxos,
            input.use_cache,
            self.network,
            &self.resolver,
        )
    }

    fn descriptor_info(&self, descriptor: Option<&str>) -> Result<Option<DescriptorInfo>, TxBuildError> {
        match descriptor {
            Some(descriptor) if !descriptor.is_empty() => {
                Ok(Some(self.resolver.resolve(descriptor, self.network)?))
            }
            _ => Ok(None),
        }
    }

    /// Signs a key-hash input. The registry only fills parameters the caller left out.
    pub fn sign_with_privkey(
        &self,
        session: &mut BuildSession,
        input: &SigningInput,
        privkey: &SecretKey,
        grind_r: bool,
    ) -> Result<(), TxBuildError> {
        check_explicit(&input.explicit)?;
        let params = self.resolve(session, input)?;
        let hash_type = params.require_hash_type()?;
        if !hash_type.is_key_hash() {
            return Err(TxBuildError::validation(
                "addresstype",
                format!("{hash_type} cannot be signed with a single private key"),
            ));
        }

        let signing_pubkey = pubkey_from_privkey(privkey, true);
        if !params.pubkey.is_empty() && !params.pubkey.eq_ignore_ascii_case(&signing_pubkey) {
            warn!(
                outpoint = %input.outpoint,
                expected = %params.pubkey,
                actual = %signing_pubkey,
                "signing key does not match the input's pubkey"
            );
        }

        session.transaction_hex = sign::sign_with_privkey(
            self.codec(),
            &session.transaction_hex,
            &input.outpoint,
            hash_type,
            privkey,
            &amount_value(&params)?,
            input.sighash_type,
            grind_r,
        )?;
        Ok(())
    }

    /// Places caller-made signatures, routed by the input's class.
    pub fn add_sign(&self, session: &mut BuildSession, request: &AddSignRequest) -> Result<(), TxBuildError> {
        let mut input = request.input.clone();
        input.explicit.pubkey.clone_from(&request.pubkeys);
        let params = self.resolve(session, &input)?;
        let hash_type = params.require_hash_type()?;

        let class = classify(hash_type, &params.redeem_script, self.network);
        let submission = dispatch::plan(
            class,
            &params,
            &request.signatures,
            &request.pubkeys,
            input.sighash_type,
        )?;
        session.transaction_hex = dispatch::submit(
            self.codec(),
            &session.transaction_hex,
            &input.outpoint,
            hash_type,
            &submission,
        )?;
        Ok(())
    }

    pub fn blind(&self, session: &mut BuildSession, command: &BlindCommand) -> Result<(), TxBuildError> {
        let issuance_keys = parse_blinding_keys(&command.blinding_keys)?;
        let inputs = session
            .utxos
            .iter()
            .map(blind_input)
            .collect::<Result<Vec<_>, _>>()?;
        let request = BlindRequest {
            inputs,
            confidential_addresses: command.addresses.clone(),
            issuance_keys,
            options: command.options,
        };
        session.transaction_hex = self.codec.blind(&session.transaction_hex, &request)?;
        Ok(())
    }

    /// Returns the reissued asset id.
    pub fn set_reissuance(
        &self,
        session: &mut BuildSession,
        command: &ReissueCommand,
    ) -> Result<String, TxBuildError> {
        let asset_blinder = match &command.asset_blinder {
            Some(blinder) if !blinder.is_empty() => blinder.clone(),
            _ => {
                let recorded = session
                    .utxos
                    .find(&command.outpoint)
                    .map(|record| record.asset_blinder.as_str())
                    .filter(|blinder| !blinder.is_empty())
                    .ok_or_else(|| {
                        TxBuildError::validation("assetblinder", "not given and not recorded for the input")
                    })?;
                info!(outpoint = %command.outpoint, "asset blinder taken from the registry");
                recorded.to_string()
            }
        };
        check_hex("assetblinder", &asset_blinder, 32, false)?;
        check_hex("entropy", &command.entropy, 32, false)?;

        let (hex, asset) = self.codec.set_reissue_asset(
            &session.transaction_hex,
            &ReissueRequest {
                outpoint: command.outpoint.clone(),
                amount: command.amount,
                asset_blinder,
                entropy: command.entropy.clone(),
                target: command.target.clone(),
            },
        )?;
        session.transaction_hex = hex;
        Ok(asset)
    }

    /// Checks one signature. A DER signature's own sighash type wins over the requested one.
    pub fn verify_signature(
        &self,
        session: &BuildSession,
        request: &VerifySignatureRequest,
    ) -> Result<bool, TxBuildError> {
        let mut input = request.input.clone();
        check_explicit(&input.explicit)?;

        let signature = if request.signature.len() > COMPACT_SIGNATURE_HEX_LEN {
            let (compact, sighash_type) = decode_der(&request.signature)?;
            if sighash_type != input.sighash_type {
                debug!(%sighash_type, "using the sighash type of the DER signature");
            }
            input.sighash_type = sighash_type;
            compact
        } else {
            request.signature.clone()
        };

        if let Some(info) = self.descriptor_info(request.descriptor.as_deref())? {
            input.explicit.fill_from_descriptor(&info);
        }
        let params = self.resolve(session, &input)?;

        verify::verify_signature(
            self.codec(),
            &session.transaction_hex,
            &input.outpoint,
            params.require_hash_type()?,
            &params.pubkey,
            &params.redeem_script,
            &amount_value(&params)?,
            input.sighash_type,
            &signature,
        )
    }

    pub fn verify_fully_signed(
        &self,
        session: &BuildSession,
        request: &VerifySignedRequest,
    ) -> Result<bool, TxBuildError> {
        check_explicit(&request.explicit)?;
        let mut explicit = request.explicit.clone();
        let mut address = request.address.clone().filter(|address| !address.is_empty());

        let mut descriptor = self.descriptor_info(request.descriptor.as_deref())?;
        if descriptor.is_none() && request.use_cache {
            let recorded = session
                .utxos
                .find(&request.outpoint)
                .map(|record| record.descriptor.as_str());
            descriptor = self.descriptor_info(recorded)?;
        }
        if let Some(info) = &descriptor {
            explicit.fill_from_descriptor(info);
            if address.is_none() && !info.address.is_empty() {
                address = Some(info.address.clone());
            }
        }

        // Without the spent output's script a self-consistent witness proves nothing.
        let address = address.ok_or(TxBuildError::UnresolvedParameter("address"))?;
        let expected = self.network.decode_address(&address)?.script_pubkey;

        let mut input = SigningInput::new(request.outpoint.clone());
        input.explicit = explicit;
        input.use_cache = request.use_cache;
        let params = self.resolve(session, &input)?;

        verify::verify_fully_signed(
            self.codec(),
            &session.transaction_hex,
            &request.outpoint,
            params.require_hash_type()?,
            &expected,
            &amount_value(&params)?,
        )
    }

    pub fn signature_hash(&self, session: &BuildSession, input: &SigningInput) -> Result<[u8; 32], TxBuildError> {
        check_explicit(&input.explicit)?;
        let params = self.resolve(session, input)?;
        sign::signature_hash(
            self.codec(),
            &session.transaction_hex,
            &input.outpoint,
            params.require_hash_type()?,
            &params.pubkey,
            &params.redeem_script,
            &amount_value(&params)?,
            input.sighash_type,
        )
    }

    pub fn decode(&self, tx_hex: &str) -> Result<serde_json::Value, TxBuildError> {
        self.codec.decode(tx_hex)
    }

    pub fn estimate_fee(&self, session: &BuildSession, options: &FeeOptions) -> Result<FeeEstimate, TxBuildError> {
        estimate_fee(
            self.codec(),
            &session.transaction_hex,
            &session.utxos,
            &self.resolver,
            options,
        )
    }

    pub fn parse_descriptor(
        &self,
        descriptor: &str,
        child: Option<u32>,
    ) -> Result<ParsedDescriptor, TxBuildError> {
        self.resolver.parser().parse(descriptor, self.network, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ec_sign, privkey_from_extpriv};
    use crate::types::HashType;

    const TV1_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const TV1_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const TV1_PUBKEY: &str = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2";
    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const G2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    fn outpoint() -> Outpoint {
        Outpoint::new(&"a".repeat(64), 0).unwrap()
    }

    fn record(amount: i64, descriptor: &str) -> UtxoRecord {
        UtxoRecord {
            txid: "a".repeat(64),
            vout: 0,
            amount,
            descriptor: descriptor.to_string(),
            ..UtxoRecord::default()
        }
    }

    fn session_with_input(builder: &TxBuilder, descriptor: &str) -> BuildSession {
        let mut session = builder.initialize(2, 0).unwrap();
        builder
            .append_input(&mut session, record(10_000, descriptor), 0xffff_ffff)
            .unwrap();
        builder
            .append_output(
                &mut session,
                &OutputSpec {
                    amount: 9_000,
                    asset: None,
                    target: OutputTarget::Script(vec![0x51]),
                },
            )
            .unwrap();
        session
    }

    #[test]
    fn descriptor_alone_resolves_signing_parameters() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = session_with_input(&builder, &format!("wpkh({TV1_XPUB})"));

        let privkey = privkey_from_extpriv(TV1_XPRV, None).unwrap();
        assert_eq!(pubkey_from_privkey(&privkey, true), TV1_PUBKEY);

        let input = SigningInput::new(outpoint());
        builder.sign_with_privkey(&mut session, &input, &privkey, true).unwrap();

        let verified = builder
            .verify_fully_signed(
                &session,
                &VerifySignedRequest {
                    outpoint: outpoint(),
                    explicit: ResolvedParameters::default(),
                    descriptor: None,
                    address: None,
                    use_cache: true,
                },
            )
            .unwrap();
        assert!(verified);
    }

    #[test]
    fn full_verification_needs_the_spent_script() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = session_with_input(&builder, "");

        let mut unrelated = [0u8; 32];
        unrelated[31] = 7;
        let privkey = lwk_wollet::bitcoin::secp256k1::SecretKey::from_slice(&unrelated).unwrap();
        let mut input = SigningInput::new(outpoint());
        input.explicit.hash_type = Some(HashType::P2wpkh);
        builder.sign_with_privkey(&mut session, &input, &privkey, true).unwrap();

        let mut request = VerifySignedRequest {
            outpoint: outpoint(),
            explicit: ResolvedParameters {
                hash_type: Some(HashType::P2wpkh),
                ..ResolvedParameters::default()
            },
            descriptor: None,
            address: None,
            use_cache: true,
        };
        let err = builder.verify_fully_signed(&session, &request).unwrap_err();
        assert!(matches!(err, TxBuildError::UnresolvedParameter("address")));

        request.descriptor = Some(format!("wpkh({G})"));
        assert!(!builder.verify_fully_signed(&session, &request).unwrap());
    }

    #[test]
    fn missing_descriptor_leaves_address_type_unresolved() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = session_with_input(&builder, "");
        let before = session.clone();

        let privkey = privkey_from_extpriv(TV1_XPRV, None).unwrap();
        let err = builder
            .sign_with_privkey(&mut session, &SigningInput::new(outpoint()), &privkey, true)
            .unwrap_err();
        assert!(matches!(err, TxBuildError::UnresolvedParameter("addresstype")));
        assert_eq!(session, before);
    }

    #[test]
    fn appending_same_input_twice_updates_record_only() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = builder.initialize(2, 0).unwrap();
        builder
            .append_input(&mut session, record(1, &format!("pkh({G})")), 0xffff_ffff)
            .unwrap();
        let after_first = session.transaction_hex.clone();
        builder
            .append_input(&mut session, record(2, &format!("wpkh({G})")), 0xffff_ffff)
            .unwrap();

        assert_eq!(session.transaction_hex, after_first);
        assert_eq!(builder.codec().shape(&session.transaction_hex).unwrap().inputs, 1);
        assert_eq!(session.utxos.len(), 1);
        let stored = session.utxos.find(&outpoint()).unwrap();
        assert_eq!(stored.amount, 2);
        assert_eq!(stored.descriptor, format!("wpkh({G})"));
    }

    #[test]
    fn append_input_rejects_bad_provenance() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = builder.initialize(2, 0).unwrap();
        let before = session.clone();

        let mut bad = record(1, "");
        bad.amount_commitment = "08".repeat(32);
        let err = builder.append_input(&mut session, bad, 0).unwrap_err();
        assert!(matches!(err, TxBuildError::Validation { field: "amountcommitment", .. }));

        let err = builder
            .append_input(&mut session, record(1, "wpkh(nonsense)"), 0)
            .unwrap_err();
        assert!(matches!(err, TxBuildError::Descriptor(_)));
        assert_eq!(session, before);
    }

    #[test]
    fn multisig_key_count_mismatch_changes_nothing() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = session_with_input(&builder, &format!("wsh(multi(2,{G},{G2}))"));
        let before = session.clone();

        let err = builder
            .add_sign(
                &mut session,
                &AddSignRequest {
                    input: SigningInput::new(outpoint()),
                    signatures: "aa,bb,cc".to_string(),
                    pubkeys: format!("{G},{G2}"),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TxBuildError::PubkeyCountMismatch {
                signatures: 3,
                pubkeys: 2
            }
        ));
        assert_eq!(session, before);
    }

    #[test]
    fn added_signature_verifies() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = session_with_input(&builder, &format!("pkh({TV1_XPUB})"));
        let privkey = privkey_from_extpriv(TV1_XPRV, None).unwrap();

        let input = SigningInput::new(outpoint());
        let sighash = builder.signature_hash(&session, &input).unwrap();
        let signature = ec_sign(&sighash, &privkey, true);

        let request = VerifySignatureRequest {
            input: input.clone(),
            signature: signature.clone(),
            descriptor: None,
        };
        assert!(builder.verify_signature(&session, &request).unwrap());

        builder
            .add_sign(
                &mut session,
                &AddSignRequest {
                    input,
                    signatures: signature,
                    pubkeys: String::new(),
                },
            )
            .unwrap();
        let request = VerifySignedRequest {
            outpoint: outpoint(),
            explicit: ResolvedParameters::default(),
            descriptor: None,
            address: None,
            use_cache: true,
        };
        assert!(builder.verify_fully_signed(&session, &request).unwrap());
    }

    #[test]
    fn der_signature_sighash_wins() {
        let builder = TxBuilder::new(Network::Mainnet);
        let session = session_with_input(&builder, "");
        let privkey = privkey_from_extpriv(TV1_XPRV, None).unwrap();

        let mut input = SigningInput::new(outpoint());
        input.use_cache = false;
        input.explicit.hash_type = Some(HashType::P2pkh);
        input.explicit.pubkey = TV1_PUBKEY.to_string();
        input.explicit.amount = 10_000;
        input.sighash_type = SigHashType::new(crate::types::SigHashKind::Single, false);

        let sighash = builder.signature_hash(&session, &input).unwrap();
        let der = crate::keys::encode_der(&ec_sign(&sighash, &privkey, true), input.sighash_type).unwrap();

        let mut request_input = input.clone();
        request_input.sighash_type = SigHashType::ALL;
        let request = VerifySignatureRequest {
            input: request_input,
            signature: der,
            descriptor: None,
        };
        assert!(builder.verify_signature(&session, &request).unwrap());
    }

    #[test]
    fn explicit_descriptor_fills_verification_parameters() {
        let builder = TxBuilder::new(Network::Mainnet);
        let session = session_with_input(&builder, "");
        let privkey = privkey_from_extpriv(TV1_XPRV, None).unwrap();

        let mut input = SigningInput::new(outpoint());
        input.explicit.amount = 10_000;
        input.explicit.hash_type = Some(HashType::P2wpkh);
        input.explicit.pubkey = TV1_PUBKEY.to_string();
        let signature = ec_sign(&builder.signature_hash(&session, &input).unwrap(), &privkey, true);

        let mut bare = SigningInput::new(outpoint());
        bare.explicit.amount = 10_000;
        let request = VerifySignatureRequest {
            input: bare,
            signature,
            descriptor: Some(format!("wpkh({TV1_XPUB})")),
        };
        assert!(builder.verify_signature(&session, &request).unwrap());
    }

    #[test]
    fn reissuance_blinder_comes_from_registry() {
        let builder = TxBuilder::new(Network::LiquidV1);
        let mut session = builder.initialize(2, 0).unwrap();
        let mut provenance = record(0, "");
        provenance.asset_blinder = "11".repeat(32);
        builder.append_input(&mut session, provenance, 0xffff_ffff).unwrap();

        let mut command = ReissueCommand {
            outpoint: outpoint(),
            amount: 500,
            entropy: "22".repeat(32),
            asset_blinder: None,
            target: OutputTarget::Script(vec![0x51]),
        };
        let asset = builder.set_reissuance(&mut session, &command).unwrap();
        assert_eq!(asset.len(), 64);

        let mut other = builder.initialize(2, 0).unwrap();
        let mut unblinded = record(0, "");
        unblinded.asset_blinder = String::new();
        builder.append_input(&mut other, unblinded, 0xffff_ffff).unwrap();
        let before = other.clone();
        command.asset_blinder = None;
        let err = builder.set_reissuance(&mut other, &command).unwrap_err();
        assert!(matches!(err, TxBuildError::Validation { field: "assetblinder", .. }));
        assert_eq!(other, before);
    }

    #[test]
    fn fee_and_destroy_outputs_need_elements() {
        let builder = TxBuilder::new(Network::Mainnet);
        let mut session = builder.initialize(2, 0).unwrap();
        let err = builder
            .append_output(
                &mut session,
                &OutputSpec {
                    amount: 100,
                    asset: None,
                    target: OutputTarget::Fee,
                },
            )
            .unwrap_err();
        assert!(matches!(err, TxBuildError::Validation { field: "target", .. }));
    }

    #[test]
    fn blinding_keys_skip_short_entries() {
        let key = "33".repeat(32);
        let text = format!("{},1,{key}|{},2|", "a".repeat(64), "b".repeat(64));
        let keys = parse_blinding_keys(&text).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].outpoint.vout, 1);
        assert_eq!(keys[0].key, key);

        assert!(parse_blinding_keys(&format!("{},x,{key}", "a".repeat(64))).is_err());
    }
}
