use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Outpoint;

pub const ZERO_BLINDER: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Provenance of one input referenced by a build session.
///
/// Field names are the persisted artifact's identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtxoRecord {
    pub txid: String,
    pub vout: u32,
    /// Plaintext value, 0 when unknown.
    pub amount: i64,
    pub asset: String,
    #[serde(rename = "assetblinder")]
    pub asset_blinder: String,
    #[serde(rename = "assetcommitment")]
    pub asset_commitment: String,
    #[serde(rename = "blinder")]
    pub amount_blinder: String,
    #[serde(rename = "amountcommitment")]
    pub amount_commitment: String,
    pub descriptor: String,
    /// Only used to size the unlocking data when estimating fees.
    #[serde(rename = "scriptsigTemplate")]
    pub scriptsig_template: String,
}

impl Default for UtxoRecord {
    fn default() -> Self {
        Self {
            txid: String::new(),
            vout: 0,
            amount: 0,
            asset: String::new(),
            asset_blinder: ZERO_BLINDER.to_string(),
            asset_commitment: String::new(),
            amount_blinder: ZERO_BLINDER.to_string(),
            amount_commitment: String::new(),
            descriptor: String::new(),
            scriptsig_template: String::new(),
        }
    }
}

impl UtxoRecord {
    #[must_use]
    pub fn outpoint(&self) -> Outpoint {
        Outpoint {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }
}

/// Ordered set of [`UtxoRecord`]s keyed by `(txid, vout)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UtxoRegistry(Vec<UtxoRecord>);

impl UtxoRegistry {
    #[must_use]
    pub fn find(&self, outpoint: &Outpoint) -> Option<&UtxoRecord> {
        self.0
            .iter()
            .find(|record| outpoint.matches(&record.txid, record.vout))
    }

    /// Replaces the record for the same outpoint in place, or appends a new one.
    ///
    /// Returns `true` when an existing record was replaced.
    pub fn upsert(&mut self, record: UtxoRecord) -> bool {
        let key = record.outpoint();
        if let Some(slot) = self
            .0
            .iter_mut()
            .find(|existing| key.matches(&existing.txid, existing.vout))
        {
            *slot = record;
            true
        } else {
            self.0.push(record);
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UtxoRecord> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<UtxoRecord>> for UtxoRegistry {
    fn from(records: Vec<UtxoRecord>) -> Self {
        Self(records)
    }
}

// Older artifacts store a missing list as `null`.
impl<'de> Deserialize<'de> for UtxoRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Option::<Vec<UtxoRecord>>::deserialize(deserializer)?;
        Ok(Self(records.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(txid: &str, vout: u32, amount: i64) -> UtxoRecord {
        UtxoRecord {
            txid: txid.to_string(),
            vout,
            amount,
            ..UtxoRecord::default()
        }
    }

    #[test]
    fn upsert_is_last_write_wins() {
        let txid = "a".repeat(64);
        let mut registry = UtxoRegistry::default();

        assert!(!registry.upsert(record(&txid, 0, 1)));
        assert!(!registry.upsert(record(&txid, 1, 2)));
        assert!(registry.upsert(record(&txid, 0, 3)));

        assert_eq!(registry.len(), 2);
        let outpoint = Outpoint::new(&txid, 0).unwrap();
        assert_eq!(registry.find(&outpoint).unwrap().amount, 3);
        // insertion order is kept
        assert_eq!(registry.iter().next().unwrap().vout, 0);
    }

    #[test]
    fn find_misses_other_vout() {
        let txid = "b".repeat(64);
        let registry = UtxoRegistry::from(vec![record(&txid, 0, 1)]);
        assert!(registry.find(&Outpoint::new(&txid, 1).unwrap()).is_none());
    }

    #[test]
    fn record_uses_artifact_field_names() {
        let json = serde_json::to_value(record(&"c".repeat(64), 2, 5)).unwrap();
        for key in [
            "txid",
            "vout",
            "amount",
            "asset",
            "assetblinder",
            "assetcommitment",
            "blinder",
            "amountcommitment",
            "descriptor",
            "scriptsigTemplate",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["blinder"], ZERO_BLINDER);
    }
}
