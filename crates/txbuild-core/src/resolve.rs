use tracing::debug;

use crate::descriptor::{DescriptorInfo, DescriptorParser, DescriptorResolver};
use crate::error::TxBuildError;
use crate::network::Network;
use crate::registry::UtxoRegistry;
use crate::types::{HashType, Outpoint};

/// Signing parameters of one input after merging caller values with registry provenance.
///
/// Empty strings, a zero amount and `None` mean "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParameters {
    pub pubkey: String,
    pub redeem_script: String,
    pub hash_type: Option<HashType>,
    pub amount: i64,
    pub amount_commitment: String,
}

impl ResolvedParameters {
    pub fn require_hash_type(&self) -> Result<HashType, TxBuildError> {
        self.hash_type
            .ok_or(TxBuildError::UnresolvedParameter("addresstype"))
    }

    /// Fills the key and script fields still empty from a descriptor.
    pub fn fill_from_descriptor(&mut self, info: &DescriptorInfo) {
        if self.hash_type.is_none() {
            self.hash_type = info.hash_type;
        }
        if self.redeem_script.is_empty() {
            self.redeem_script.clone_from(&info.redeem_script);
        }
        if self.pubkey.is_empty() {
            self.pubkey.clone_from(&info.pubkey);
        }
    }
}

/// Merges `explicit` with what the registry remembers about `outpoint`.
///
/// Caller values always win; the record's descriptor only fills gaps. Amount and commitment
/// come from the record itself.
pub fn resolve_parameters<P: DescriptorParser>(
    outpoint: &Outpoint,
    explicit: ResolvedParameters,
    registry: &UtxoRegistry,
    allow_cache: bool,
    network: Network,
    resolver: &DescriptorResolver<P>,
) -> Result<ResolvedParameters, TxBuildError> {
    if !allow_cache {
        return Ok(explicit);
    }
    let Some(record) = registry.find(outpoint) else {
        return Ok(explicit);
    };
    if record.descriptor.is_empty() {
        return Ok(explicit);
    }

    let info = resolver.resolve(&record.descriptor, network)?;
    let mut resolved = explicit;
    resolved.fill_from_descriptor(&info);
    if resolved.amount == 0 {
        resolved.amount = record.amount;
    }
    if resolved.amount_commitment.is_empty() {
        resolved.amount_commitment.clone_from(&record.amount_commitment);
    }
    debug!(%outpoint, hash_type = ?resolved.hash_type, "signing parameters filled from registry");

    Ok(resolved)
}
