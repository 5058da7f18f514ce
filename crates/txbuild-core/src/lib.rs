#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![cfg_attr(
    test,
    allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::too_many_lines
    )
)]

//! Step-by-step construction of Bitcoin and Elements transactions.
//!
//! A [`BuildSession`] carries the transaction under construction together with the provenance
//! of its inputs, so later steps (signing, blinding, verification) can recover descriptors,
//! amounts and blinders without the caller repeating them.

pub mod builder;
pub mod codec;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod fee;
pub mod keys;
pub mod network;
pub mod registry;
pub mod resolve;
pub mod script;
pub mod session;
pub mod sign;
pub mod types;
pub mod verify;

pub use builder::{
    AddSignRequest, BlindCommand, ReissueCommand, SigningInput, TxBuilder, VerifySignatureRequest,
    VerifySignedRequest,
};
pub use codec::{BlindOptions, OutputSpec, OutputTarget, TxCodec, codec_for};
pub use descriptor::{DescriptorInfo, DescriptorParser, DescriptorResolver, StandardDescriptorParser};
pub use error::TxBuildError;
pub use fee::{FeeEstimate, FeeOptions};
pub use network::Network;
pub use registry::{UtxoRecord, UtxoRegistry};
pub use resolve::ResolvedParameters;
pub use session::{BuildSession, SessionStore, StoreOptions};
pub use types::{HashType, Outpoint, SigHashKind, SigHashType};
