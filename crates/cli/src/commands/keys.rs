use anyhow::{Context, Result, bail};
use txbuild_core::SigHashType;
use txbuild_core::keys::{
    commitments, ec_sign, encode_der, ext_keypair_from_seed, ext_keypairs_from_mnemonic,
    mnemonic_language, parse_privkey, privkey_from_extpriv, privkey_from_strings,
    pubkey_from_parent_path, pubkey_from_privkey, strip_sighash_label,
};

use crate::cli::{
    EncodeDerArgs, GenPrivkeyArgs, GetCommitmentArgs, GetPubkeyArgs, GetSignatureArgs,
    MnemonicArgs, ParentPathArgs, SeedArgs,
};

pub fn run_get_commitment(args: &GetCommitmentArgs) -> Result<()> {
    let (asset_commitment, amount_commitment) =
        commitments(&args.asset, args.amount, &args.asset_blinder, &args.blinder)?;
    println!("assetCommitment : {asset_commitment}");
    println!("amountCommitment: {amount_commitment}");
    Ok(())
}

pub fn run_encode_der_signature(args: &EncodeDerArgs) -> Result<()> {
    let der = encode_der(
        &args.signature,
        SigHashType::new(args.sighash_type, args.anyone_can_pay),
    )?;
    println!("der encoded signature: '{der}'");
    Ok(())
}

pub fn run_get_signature(args: &GetSignatureArgs) -> Result<()> {
    let sighash_hex = strip_sighash_label(&args.sighash);
    let sighash: [u8; 32] = hex::decode(sighash_hex)
        .context("sighash is not hex")?
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow::anyhow!("sighash must be 32 bytes, got {}", bytes.len()))?;

    let privkey = match (&args.privkey, &args.extpriv) {
        (Some(privkey), _) => parse_privkey(privkey)?,
        (None, Some(extpriv)) => privkey_from_extpriv(extpriv, args.bip32_path.as_deref())?,
        (None, None) => bail!("--privkey or --extpriv is required"),
    };
    println!("signature: {}", ec_sign(&sighash, &privkey, args.grind_r));
    Ok(())
}

pub fn run_get_pubkey_from_privkey(args: &GetPubkeyArgs) -> Result<()> {
    let privkey = match (&args.privkey, &args.wif) {
        (Some(privkey), _) => parse_privkey(privkey)?,
        (None, Some(wif)) => parse_privkey(wif).context("wif is not a valid WIF key")?,
        (None, None) => bail!("--privkey or --wif is required"),
    };
    println!("public key: '{}'", pubkey_from_privkey(&privkey, args.compressed));
    Ok(())
}

pub fn run_get_extkeypair_from_seed(args: &SeedArgs) -> Result<()> {
    let pair = ext_keypair_from_seed(&args.seed, args.network, &args.path)?;
    println!("xpriv: '{}'\nxpub: '{}'", pair.xpriv, pair.xpub);
    Ok(())
}

pub fn run_get_extkeypair_from_mnemonic(args: &MnemonicArgs) -> Result<()> {
    let pairs = ext_keypairs_from_mnemonic(
        &args.mnemonic,
        &args.passphrase,
        mnemonic_language(&args.lang)?,
        args.network,
        &args.path,
    )?;
    for pair in pairs {
        println!(
            "xpriv({path}): '{}',\nxpub ({path}): '{}',",
            pair.xpriv,
            pair.xpub,
            path = pair.path
        );
    }
    Ok(())
}

pub fn run_create_pubkey_from_parent_path(args: &ParentPathArgs) -> Result<()> {
    let (xpub, pubkey) = pubkey_from_parent_path(&args.key, &args.path, args.network)?;
    println!("xpub: {xpub}\npubkey: {pubkey}");
    Ok(())
}

pub fn run_gen_privkey_from_strings(args: &GenPrivkeyArgs) -> Result<()> {
    let (parts, privkey) = privkey_from_strings(&args.text);
    for (index, part) in parts.iter().enumerate() {
        println!("{index}: '{part}'");
    }
    println!("privkey: '{privkey}'");
    Ok(())
}
