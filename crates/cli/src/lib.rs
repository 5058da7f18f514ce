#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::needless_pass_by_value)]

pub mod cli;
mod commands;
pub mod settings;

use anyhow::Result;

use crate::cli::{Cli, Command};
use crate::commands::{keys, tx};
use crate::settings::Settings;

pub fn run(cli: Cli, settings: &Settings) -> Result<()> {
    match cli.command {
        Command::InitializeTransaction(args) => tx::run_initialize_transaction(args, settings),
        Command::AppendTxin(args) => tx::run_append_txin(args, settings),
        Command::AppendTxout(args) => tx::run_append_txout(args, settings),
        Command::SignWithPrivkey(args) => tx::run_sign_with_privkey(args, settings),
        Command::AddSignTransaction(args) => tx::run_add_sign_transaction(args, settings),
        Command::BlindRawTransaction(args) => tx::run_blind_raw_transaction(args, settings),
        Command::SetRawReissueAsset(args) => tx::run_set_raw_reissue_asset(args, settings),
        Command::VerifySignature(args) => tx::run_verify_signature(args, settings),
        Command::VerifySignTransaction(args) => tx::run_verify_sign_transaction(args, settings),
        Command::DecodeRawTransaction(args) => tx::run_decode_raw_transaction(args, settings),
        Command::CreateSignatureHash(args) => tx::run_create_signature_hash(args, settings),
        Command::EstimateFee(args) => tx::run_estimate_fee(args, settings),
        Command::ParseDescriptor(args) => tx::run_parse_descriptor(args),
        Command::GetCommitment(args) => keys::run_get_commitment(&args),
        Command::EncodeDerSignature(args) => keys::run_encode_der_signature(&args),
        Command::GetSignature(args) => keys::run_get_signature(&args),
        Command::GetPubkeyFromPrivkey(args) => keys::run_get_pubkey_from_privkey(&args),
        Command::GetExtkeypairFromSeed(args) => keys::run_get_extkeypair_from_seed(&args),
        Command::GetExtkeypairFromMnemonic(args) => keys::run_get_extkeypair_from_mnemonic(&args),
        Command::CreatePubkeyFromParentPath(args) => keys::run_create_pubkey_from_parent_path(&args),
        Command::GenPrivkeyFromStrings(args) => keys::run_gen_privkey_from_strings(&args),
    }
}
