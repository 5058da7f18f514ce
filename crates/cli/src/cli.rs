use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use txbuild_core::registry::ZERO_BLINDER;
use txbuild_core::{HashType, Network, SigHashKind};

#[derive(Debug, Parser)]
#[command(
    name = "txbuild",
    version,
    about = "Build Bitcoin and Elements transactions one step at a time"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new transaction; with --file, replaces the session artifact.
    #[command(alias = "initializetransaction")]
    InitializeTransaction(InitializeArgs),

    /// Add an input and remember where it came from.
    #[command(alias = "appendtxin")]
    AppendTxin(AppendTxinArgs),

    /// Add an output paying an address, a script, the fee, or nobody.
    #[command(alias = "appendtxout")]
    AppendTxout(AppendTxoutArgs),

    /// Sign a pubkey-hash input with a private key.
    #[command(alias = "signwithprivkey")]
    SignWithPrivkey(SignWithPrivkeyArgs),

    /// Place externally made signatures into an input.
    #[command(alias = "addsigntransaction")]
    AddSignTransaction(AddSignArgs),

    /// Blind the outputs of an Elements transaction.
    #[command(alias = "blindrawtransaction")]
    BlindRawTransaction(BlindArgs),

    /// Reissue an asset from an input holding its reissuance token.
    #[command(alias = "setrawreissueasset")]
    SetRawReissueAsset(ReissueArgs),

    /// Check one signature of an input.
    #[command(alias = "verifysignature")]
    VerifySignature(VerifySignatureArgs),

    /// Check that an input carries a complete set of valid signatures.
    #[command(alias = "verifysigntransaction")]
    VerifySignTransaction(VerifySignArgs),

    /// Print a transaction as JSON.
    #[command(alias = "decoderawtransaction")]
    DecodeRawTransaction(DecodeArgs),

    /// Print the signature hash of an input.
    #[command(alias = "createsignaturehash")]
    CreateSignatureHash(SignatureHashArgs),

    /// Estimate the fee once every recorded input is signed.
    #[command(alias = "estimatefee")]
    EstimateFee(EstimateFeeArgs),

    /// Print the script levels and keys of an output descriptor.
    #[command(alias = "parsedescriptor")]
    ParseDescriptor(ParseDescriptorArgs),

    /// Print asset and amount commitments for blinding factors.
    #[command(alias = "getcommitment")]
    GetCommitment(GetCommitmentArgs),

    /// DER-encode a compact signature and append its sighash byte.
    #[command(alias = "encodedersignature")]
    EncodeDerSignature(EncodeDerArgs),

    /// Sign a signature hash.
    #[command(alias = "getsignature")]
    GetSignature(GetSignatureArgs),

    /// Print the public key of a private key.
    #[command(alias = "getpubkeyfromprivkey")]
    GetPubkeyFromPrivkey(GetPubkeyArgs),

    /// Derive an extended key pair from a seed.
    #[command(alias = "getextkeypairfromseed")]
    GetExtkeypairFromSeed(SeedArgs),

    /// Derive extended key pairs from a BIP39 mnemonic.
    #[command(alias = "getextkeypairfrommnemonic")]
    GetExtkeypairFromMnemonic(MnemonicArgs),

    /// Derive a child xpub and pubkey from an extended key.
    #[command(alias = "createpubkeyfromparentpath")]
    CreatePubkeyFromParentPath(ParentPathArgs),

    /// Turn `|`-separated texts into a private key.
    #[command(alias = "genprivkeyfromstrings")]
    GenPrivkeyFromStrings(GenPrivkeyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct NetworkArgs {
    /// Elements (confidential) transaction.
    #[arg(long = "elements")]
    pub elements: bool,

    /// Network; defaults to liquidv1 with --elements and mainnet otherwise.
    #[arg(long = "network")]
    pub network: Option<Network>,
}

#[derive(Debug, Clone, Args)]
pub struct TxArgs {
    /// Session artifact to read and update.
    #[arg(long = "file", conflicts_with = "tx")]
    pub file: Option<PathBuf>,

    /// Transaction hex; nothing is persisted.
    #[arg(long = "tx")]
    pub tx: Option<String>,

    #[command(flatten)]
    pub network: NetworkArgs,
}

#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// Txid of the spent output.
    #[arg(long = "txid")]
    pub txid: String,

    #[arg(long = "vout", default_value_t = 0)]
    pub vout: u32,

    /// p2pkh, p2sh, p2wpkh, p2wsh, p2sh-p2wpkh or p2sh-p2wsh.
    #[arg(long = "addresstype")]
    pub address_type: Option<HashType>,

    #[arg(long = "sighashtype", default_value = "all")]
    pub sighash_type: SigHashKind,

    #[arg(long = "anyonecanpay")]
    pub anyone_can_pay: bool,

    /// Ignore the recorded descriptor of the input.
    #[arg(long = "disablecache")]
    pub disable_cache: bool,
}

#[derive(Debug, Clone, Args)]
pub struct AmountArgs {
    /// Value of the spent output.
    #[arg(long = "amount", default_value_t = 0)]
    pub amount: i64,

    /// Value commitment of the spent output (Elements).
    #[arg(long = "amountcommitment", visible_alias = "commitment", default_value = "")]
    pub amount_commitment: String,
}

#[derive(Debug, Clone, Args)]
pub struct InitializeArgs {
    /// Session artifact to create.
    #[arg(long = "file")]
    pub file: Option<PathBuf>,

    #[arg(long = "version", default_value_t = 2)]
    pub version: u32,

    #[arg(long = "locktime", default_value_t = 0)]
    pub locktime: u32,

    #[command(flatten)]
    pub network: NetworkArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AppendTxinArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[arg(long = "txid")]
    pub txid: String,

    #[arg(long = "vout", default_value_t = 0)]
    pub vout: u32,

    #[arg(long = "sequence", default_value_t = 0xffff_ffff)]
    pub sequence: u32,

    #[arg(long = "amount", default_value_t = 0)]
    pub amount: i64,

    #[arg(long = "asset", default_value = "")]
    pub asset: String,

    #[arg(long = "assetblinder", default_value = ZERO_BLINDER)]
    pub asset_blinder: String,

    #[arg(long = "blinder", default_value = ZERO_BLINDER)]
    pub amount_blinder: String,

    #[arg(long = "assetcommitment", default_value = "")]
    pub asset_commitment: String,

    #[arg(long = "amountcommitment", default_value = "")]
    pub amount_commitment: String,

    /// Output descriptor of the spent output.
    #[arg(long = "descriptor", default_value = "")]
    pub descriptor: String,

    /// Unlocking script used to size this input when estimating fees.
    #[arg(long = "scriptsig-template", alias = "scriptsigTemplate", default_value = "")]
    pub scriptsig_template: String,
}

#[derive(Debug, Clone, Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["address", "locking_script", "fee", "destroy"])
))]
pub struct AppendTxoutArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[arg(long = "amount", default_value_t = 0)]
    pub amount: u64,

    /// Asset id (Elements).
    #[arg(long = "asset")]
    pub asset: Option<String>,

    /// Address, confidential or not.
    #[arg(long = "address")]
    pub address: Option<String>,

    #[arg(long = "lockingscript")]
    pub locking_script: Option<String>,

    /// Fee output (Elements).
    #[arg(long = "fee")]
    pub fee: bool,

    /// Burn the amount with an OP_RETURN output (Elements).
    #[arg(long = "destroy")]
    pub destroy: bool,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("key").required(true).args(["privkey", "extpriv"])))]
pub struct SignWithPrivkeyArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub amount: AmountArgs,

    /// Hex or WIF private key.
    #[arg(long = "privkey")]
    pub privkey: Option<String>,

    #[arg(long = "extpriv")]
    pub extpriv: Option<String>,

    /// Path derived from --extpriv.
    #[arg(long = "bip32path", requires = "extpriv")]
    pub bip32_path: Option<String>,

    /// Grind for a low-R signature.
    #[arg(long = "grindr")]
    pub grind_r: bool,
}

#[derive(Debug, Clone, Args)]
pub struct AddSignArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[command(flatten)]
    pub input: InputArgs,

    /// Comma separated; leave a slot empty for a missing signer.
    #[arg(long = "signature")]
    pub signature: String,

    /// Comma separated, parallel to --signature.
    #[arg(long = "pubkey", default_value = "")]
    pub pubkey: String,

    /// Redeem or witness script.
    #[arg(long = "script", default_value = "")]
    pub script: String,
}

#[derive(Debug, Clone, Args)]
pub struct BlindArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    /// Issuance blinding keys as `txid,vout,key` entries separated by `|`.
    ///
    /// Issuances are always left explicit, so any key here fails the command.
    #[arg(long = "blindingkeys", default_value = "")]
    pub blinding_keys: String,

    /// Comma separated confidential addresses.
    #[arg(long = "addresses", default_value = "")]
    pub addresses: String,

    /// Range proof minimum value. Only the default is supported.
    #[arg(long = "minimumrangevalue", default_value_t = 1)]
    pub minimum_range_value: u64,

    /// Range proof exponent. Only the default is supported.
    #[arg(long = "exponent", default_value_t = 0, allow_hyphen_values = true)]
    pub exponent: i32,

    /// Range proof minimum bits. Only the default is supported.
    #[arg(long = "minimumbits", default_value_t = 52)]
    pub minimum_bits: u32,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["address", "locking_script"])))]
pub struct ReissueArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[arg(long = "txid")]
    pub txid: String,

    #[arg(long = "vout", default_value_t = 0)]
    pub vout: u32,

    #[arg(long = "amount")]
    pub amount: u64,

    /// Asset entropy.
    #[arg(long = "entropy")]
    pub entropy: String,

    /// Blinder of the token input; defaults to the recorded one.
    #[arg(long = "assetblinder")]
    pub asset_blinder: Option<String>,

    #[arg(long = "address")]
    pub address: Option<String>,

    #[arg(long = "lockingscript")]
    pub locking_script: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct VerifySignatureArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub amount: AmountArgs,

    /// Compact or DER signature.
    #[arg(long = "signature")]
    pub signature: String,

    #[arg(long = "descriptor")]
    pub descriptor: Option<String>,

    #[arg(long = "pubkey", default_value = "")]
    pub pubkey: String,

    #[arg(long = "script", default_value = "")]
    pub script: String,
}

#[derive(Debug, Clone, Args)]
pub struct VerifySignArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[arg(long = "txid")]
    pub txid: String,

    #[arg(long = "vout", default_value_t = 0)]
    pub vout: u32,

    #[arg(long = "descriptor")]
    pub descriptor: Option<String>,

    /// Address of the spent output, when no descriptor is known.
    #[arg(long = "address")]
    pub address: Option<String>,

    #[arg(long = "addresstype")]
    pub address_type: Option<HashType>,

    #[command(flatten)]
    pub amount: AmountArgs,

    #[arg(long = "disablecache")]
    pub disable_cache: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub tx: TxArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SignatureHashArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub amount: AmountArgs,

    /// Pubkey, for pubkey-hash inputs.
    #[arg(long = "pubkey", default_value = "")]
    pub pubkey: String,

    /// Redeem script, for script-hash inputs.
    #[arg(long = "script", default_value = "")]
    pub script: String,
}

#[derive(Debug, Clone, Args)]
pub struct EstimateFeeArgs {
    #[command(flatten)]
    pub tx: TxArgs,

    /// sat/vbyte.
    #[arg(long = "feerate", default_value_t = 20.0)]
    pub fee_rate: f64,

    /// Fee asset (Elements).
    #[arg(long = "asset")]
    pub asset: Option<String>,

    #[arg(long = "exponent", default_value_t = 0, allow_hyphen_values = true)]
    pub exponent: i32,

    #[arg(long = "minimumbits", default_value_t = 52)]
    pub minimum_bits: u32,

    /// Leave out the proofs blinding would add.
    #[arg(long = "no-blind")]
    pub no_blind: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ParseDescriptorArgs {
    #[arg(long = "descriptor")]
    pub descriptor: String,

    #[arg(long = "network", default_value = "mainnet")]
    pub network: Network,

    /// Child number substituted for a trailing wildcard.
    #[arg(long = "childnum")]
    pub child_num: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct GetCommitmentArgs {
    #[arg(long = "asset")]
    pub asset: String,

    #[arg(long = "assetblinder")]
    pub asset_blinder: String,

    #[arg(long = "blinder")]
    pub blinder: String,

    #[arg(long = "amount", default_value_t = 0)]
    pub amount: u64,
}

#[derive(Debug, Clone, Args)]
pub struct EncodeDerArgs {
    /// 64-byte compact signature.
    #[arg(long = "signature")]
    pub signature: String,

    #[arg(long = "sighashtype", default_value = "all")]
    pub sighash_type: SigHashKind,

    #[arg(long = "anyonecanpay")]
    pub anyone_can_pay: bool,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("key").required(true).args(["privkey", "extpriv"])))]
pub struct GetSignatureArgs {
    /// Signature hash; a `label: hash` form is accepted.
    #[arg(long = "sighash")]
    pub sighash: String,

    #[arg(long = "privkey")]
    pub privkey: Option<String>,

    #[arg(long = "extpriv")]
    pub extpriv: Option<String>,

    #[arg(long = "bip32path", requires = "extpriv")]
    pub bip32_path: Option<String>,

    #[arg(long = "grindr")]
    pub grind_r: bool,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("key").required(true).args(["privkey", "wif"])))]
pub struct GetPubkeyArgs {
    /// 32-byte hex private key.
    #[arg(long = "privkey")]
    pub privkey: Option<String>,

    #[arg(long = "wif")]
    pub wif: Option<String>,

    /// Print the compressed form.
    #[arg(long = "comp")]
    pub compressed: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SeedArgs {
    #[arg(long = "seed")]
    pub seed: String,

    #[arg(long = "network", default_value = "mainnet")]
    pub network: Network,

    /// Derivation path, e.g. m/44h/0h/0h/0/0.
    #[arg(long = "path", default_value = "")]
    pub path: String,
}

#[derive(Debug, Clone, Args)]
pub struct MnemonicArgs {
    #[arg(long = "mnemonic", env = "TXBUILD_MNEMONIC", hide_env_values = true)]
    pub mnemonic: String,

    #[arg(long = "passphrase", env = "TXBUILD_PASSPHRASE", hide_env_values = true, default_value = "")]
    pub passphrase: String,

    /// en, jp, fr, it, es, zht or zhs.
    #[arg(long = "lang", default_value = "en")]
    pub lang: String,

    #[arg(long = "network", default_value = "mainnet")]
    pub network: Network,

    /// One path or a comma separated list.
    #[arg(long = "path", default_value = "")]
    pub path: String,
}

#[derive(Debug, Clone, Args)]
pub struct ParentPathArgs {
    /// Parent extended key.
    #[arg(short = 'k', long = "key")]
    pub key: String,

    #[arg(short = 'p', long = "path")]
    pub path: String,

    #[arg(short = 'n', long = "network", default_value = "mainnet")]
    pub network: Network,
}

#[derive(Debug, Clone, Args)]
pub struct GenPrivkeyArgs {
    /// Texts separated by `|`.
    #[arg(long = "text")]
    pub text: String,
}
