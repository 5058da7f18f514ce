use anyhow::{Context, Result, bail};
use txbuild_core::descriptor::{KeyKind, NodeKind, ParsedDescriptor};
use txbuild_core::keys::{parse_privkey, privkey_from_extpriv};
use txbuild_core::script::to_asm;
use txbuild_core::{
    AddSignRequest, BlindCommand, BlindOptions, FeeOptions, Outpoint, OutputSpec, OutputTarget,
    ReissueCommand, ResolvedParameters, SessionStore, SigHashType, SigningInput, TxBuilder,
    UtxoRecord, VerifySignatureRequest, VerifySignedRequest,
};

use super::{Workspace, print_verify};
use crate::cli::{
    AddSignArgs, AmountArgs, AppendTxinArgs, AppendTxoutArgs, BlindArgs, DecodeArgs,
    EstimateFeeArgs, InitializeArgs, InputArgs, ParseDescriptorArgs, ReissueArgs,
    SignWithPrivkeyArgs, SignatureHashArgs, VerifySignArgs, VerifySignatureArgs,
};
use crate::settings::Settings;

fn signing_input(
    input: &InputArgs,
    amount: Option<&AmountArgs>,
    pubkey: &str,
    script: &str,
) -> Result<SigningInput> {
    let mut explicit = ResolvedParameters {
        pubkey: pubkey.to_string(),
        redeem_script: script.to_string(),
        hash_type: input.address_type,
        ..ResolvedParameters::default()
    };
    if let Some(amount) = amount {
        explicit.amount = amount.amount;
        explicit.amount_commitment.clone_from(&amount.amount_commitment);
    }
    Ok(SigningInput {
        outpoint: Outpoint::new(&input.txid, input.vout)?,
        explicit,
        sighash_type: SigHashType::new(input.sighash_type, input.anyone_can_pay),
        use_cache: !input.disable_cache,
    })
}

fn output_target(address: Option<&String>, locking_script: Option<&String>) -> Result<OutputTarget> {
    match (address, locking_script) {
        (Some(address), _) => Ok(OutputTarget::Address(address.clone())),
        (None, Some(script)) => Ok(OutputTarget::Script(
            hex::decode(script).context("lockingscript is not hex")?,
        )),
        (None, None) => bail!("an output target is required"),
    }
}

pub fn run_initialize_transaction(args: InitializeArgs, settings: &Settings) -> Result<()> {
    let builder = TxBuilder::new(args.network.resolve()?);
    let session = builder.initialize(args.version, args.locktime)?;

    match &args.file {
        Some(path) => {
            let document = SessionStore::new(path, settings.store_options())
                .save(&session)
                .with_context(|| format!("failed to write session {}", path.display()))?;
            println!("initialize transaction:\n{document}");
        }
        None => println!("initialize transaction: {}", session.transaction_hex),
    }
    Ok(())
}

pub fn run_append_txin(args: AppendTxinArgs, settings: &Settings) -> Result<()> {
    let mut workspace = Workspace::open(&args.tx, settings)?;
    let record = UtxoRecord {
        txid: args.txid,
        vout: args.vout,
        amount: args.amount,
        asset: args.asset,
        asset_blinder: args.asset_blinder,
        asset_commitment: args.asset_commitment,
        amount_blinder: args.amount_blinder,
        amount_commitment: args.amount_commitment,
        descriptor: args.descriptor,
        scriptsig_template: args.scriptsig_template,
    };
    workspace
        .builder
        .append_input(&mut workspace.session, record, args.sequence)?;
    workspace.finish("append txin")
}

pub fn run_append_txout(args: AppendTxoutArgs, settings: &Settings) -> Result<()> {
    let mut workspace = Workspace::open(&args.tx, settings)?;
    let target = if args.fee {
        OutputTarget::Fee
    } else if args.destroy {
        OutputTarget::Destroy
    } else {
        output_target(args.address.as_ref(), args.locking_script.as_ref())?
    };
    let output = OutputSpec {
        amount: args.amount,
        asset: args.asset.filter(|asset| !asset.is_empty()),
        target,
    };
    workspace.builder.append_output(&mut workspace.session, &output)?;
    workspace.finish("append txout")
}

pub fn run_sign_with_privkey(args: SignWithPrivkeyArgs, settings: &Settings) -> Result<()> {
    let mut workspace = Workspace::open(&args.tx, settings)?;
    let privkey = match (&args.privkey, &args.extpriv) {
        (Some(privkey), _) => parse_privkey(privkey)?,
        (None, Some(extpriv)) => privkey_from_extpriv(extpriv, args.bip32_path.as_deref())?,
        (None, None) => bail!("--privkey or --extpriv is required"),
    };
    let input = signing_input(&args.input, Some(&args.amount), "", "")?;
    workspace
        .builder
        .sign_with_privkey(&mut workspace.session, &input, &privkey, args.grind_r)?;
    workspace.finish("sign with privkey")
}

pub fn run_add_sign_transaction(args: AddSignArgs, settings: &Settings) -> Result<()> {
    let mut workspace = Workspace::open(&args.tx, settings)?;
    let request = AddSignRequest {
        input: signing_input(&args.input, None, "", &args.script)?,
        signatures: args.signature,
        pubkeys: args.pubkey,
    };
    workspace.builder.add_sign(&mut workspace.session, &request)?;
    workspace.finish("add sign")
}

pub fn run_blind_raw_transaction(args: BlindArgs, settings: &Settings) -> Result<()> {
    let mut workspace = Workspace::open(&args.tx, settings)?;
    let command = BlindCommand {
        blinding_keys: args.blinding_keys,
        addresses: args
            .addresses
            .split(',')
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect(),
        options: BlindOptions {
            minimum_range_value: args.minimum_range_value,
            exponent: args.exponent,
            minimum_bits: args.minimum_bits,
        },
    };
    workspace.builder.blind(&mut workspace.session, &command)?;
    workspace.finish("blind transaction")
}

pub fn run_set_raw_reissue_asset(args: ReissueArgs, settings: &Settings) -> Result<()> {
    let mut workspace = Workspace::open(&args.tx, settings)?;
    let command = ReissueCommand {
        outpoint: Outpoint::new(&args.txid, args.vout)?,
        amount: args.amount,
        entropy: args.entropy,
        asset_blinder: args.asset_blinder,
        target: output_target(args.address.as_ref(), args.locking_script.as_ref())?,
    };
    let asset = workspace
        .builder
        .set_reissuance(&mut workspace.session, &command)?;
    workspace.save()?;
    println!("reissue asset: {asset}");
    println!("set reissue asset:\n{}", workspace.session.transaction_hex);
    Ok(())
}

pub fn run_verify_signature(args: VerifySignatureArgs, settings: &Settings) -> Result<()> {
    let workspace = Workspace::open_lenient(&args.tx, settings)?;
    let request = VerifySignatureRequest {
        input: signing_input(&args.input, Some(&args.amount), &args.pubkey, &args.script)?,
        signature: args.signature,
        descriptor: args.descriptor,
    };
    let verified = workspace
        .builder
        .verify_signature(&workspace.session, &request)?;
    print_verify(&request.input.outpoint, verified);
    Ok(())
}

pub fn run_verify_sign_transaction(args: VerifySignArgs, settings: &Settings) -> Result<()> {
    let workspace = Workspace::open_lenient(&args.tx, settings)?;
    let request = VerifySignedRequest {
        outpoint: Outpoint::new(&args.txid, args.vout)?,
        explicit: ResolvedParameters {
            hash_type: args.address_type,
            amount: args.amount.amount,
            amount_commitment: args.amount.amount_commitment,
            ..ResolvedParameters::default()
        },
        descriptor: args.descriptor,
        address: args.address,
        use_cache: !args.disable_cache,
    };
    let verified = workspace
        .builder
        .verify_fully_signed(&workspace.session, &request)?;
    print_verify(&request.outpoint, verified);
    Ok(())
}

pub fn run_decode_raw_transaction(args: DecodeArgs, settings: &Settings) -> Result<()> {
    let workspace = Workspace::open_lenient(&args.tx, settings)?;
    let decoded = workspace.builder.decode(&workspace.session.transaction_hex)?;
    println!("decode transaction:\n{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}

pub fn run_create_signature_hash(args: SignatureHashArgs, settings: &Settings) -> Result<()> {
    let workspace = Workspace::open(&args.tx, settings)?;
    let input = signing_input(&args.input, Some(&args.amount), &args.pubkey, &args.script)?;
    let sighash = workspace.builder.signature_hash(&workspace.session, &input)?;
    println!("signature hash: {}", hex::encode(sighash));
    Ok(())
}

pub fn run_estimate_fee(args: EstimateFeeArgs, settings: &Settings) -> Result<()> {
    let workspace = Workspace::open(&args.tx, settings)?;
    let options = FeeOptions {
        fee_rate: args.fee_rate,
        blind: !args.no_blind,
        asset: args.asset,
        exponent: args.exponent,
        minimum_bits: args.minimum_bits,
    };
    let fee = workspace.builder.estimate_fee(&workspace.session, &options)?;
    println!("fee = {} (tx: {}, input: {})", fee.total, fee.tx_fee, fee.input_fee);
    Ok(())
}

pub fn run_parse_descriptor(args: ParseDescriptorArgs) -> Result<()> {
    let builder = TxBuilder::new(args.network);
    let parsed = builder.parse_descriptor(&args.descriptor, args.child_num)?;
    print!("{}", render_descriptor(&parsed));
    Ok(())
}

fn render_descriptor(parsed: &ParsedDescriptor) -> String {
    let mut out = String::new();
    for node in &parsed.nodes {
        out.push_str(&format!("[Depth:{}]\n", node.depth));
        out.push_str(&format!("  - LockingScript: {}\n", hex::encode(&node.locking_script)));
        if node.kind != NodeKind::Raw {
            out.push_str(&format!(
                "  - Address      : {}\n",
                node.address.as_deref().unwrap_or_default()
            ));
            out.push_str(&format!(
                "  - Type         : {}\n",
                node.hash_type.map(|hash_type| hash_type.as_str()).unwrap_or_default()
            ));
        }
        if matches!(node.kind, NodeKind::Sh | NodeKind::Wsh) {
            out.push_str(&format!("  - RedeemScript : {}\n", hex::encode(&node.redeem_script)));
            out.push_str(&format!("                -> {}\n", to_asm(&node.redeem_script)));
        }
        if let Some(required) = node.required_signatures {
            out.push_str(&format!("  - requireNum   : {required}\n"));
            break;
        }
        if let Some(key) = &node.key {
            out.push_str(&format!("  - key          : {}\n", key.text));
        }
    }

    if !parsed.multisig_keys.is_empty() {
        out.push_str("  - multisig keys:\n");
    }
    for (index, key) in parsed.multisig_keys.iter().enumerate() {
        let label = match key.kind {
            KeyKind::Public => "",
            KeyKind::ExtPublic => "xpub ",
            KeyKind::ExtPrivate => "xprv ",
        };
        out.push_str(&format!("    - [{index}] {label}{}\n", key.text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use txbuild_core::Network;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const G2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    #[test]
    fn renders_multisig_with_key_list() {
        let builder = TxBuilder::new(Network::Mainnet);
        let parsed = builder
            .parse_descriptor(&format!("wsh(multi(1,{G},{G2}))"), None)
            .unwrap();
        let text = render_descriptor(&parsed);

        assert!(text.starts_with("[Depth:0]\n"));
        assert!(text.contains("  - Type         : p2wsh\n"));
        assert!(text.contains("  - requireNum   : 1\n"));
        assert!(text.contains("OP_CHECKMULTISIG"));
        assert!(text.contains(&format!("    - [0] {G}\n")));
        assert!(text.contains(&format!("    - [1] {G2}\n")));
    }

    #[test]
    fn renders_single_key_leaf() {
        let builder = TxBuilder::new(Network::Mainnet);
        let parsed = builder.parse_descriptor(&format!("sh(wpkh({G}))"), None).unwrap();
        let text = render_descriptor(&parsed);

        assert!(text.contains("  - Type         : p2sh-p2wpkh\n"));
        assert!(text.contains("[Depth:1]\n"));
        assert!(text.contains(&format!("  - key          : {G}\n")));
        assert!(!text.contains("multisig keys"));
    }
}
