use std::fmt;
use std::str::FromStr;

use crate::error::TxBuildError;

/// Locking-script family of a spent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2shP2wpkh,
    P2shP2wsh,
}

impl HashType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P2pkh => "p2pkh",
            Self::P2sh => "p2sh",
            Self::P2wpkh => "p2wpkh",
            Self::P2wsh => "p2wsh",
            Self::P2shP2wpkh => "p2sh-p2wpkh",
            Self::P2shP2wsh => "p2sh-p2wsh",
        }
    }

    /// Spent with a single signature and pubkey, no script arguments.
    #[must_use]
    pub const fn is_key_hash(self) -> bool {
        matches!(self, Self::P2pkh | Self::P2wpkh | Self::P2shP2wpkh)
    }

    /// Signature hash follows the segwit v0 algorithm.
    #[must_use]
    pub const fn is_witness(self) -> bool {
        !matches!(self, Self::P2pkh | Self::P2sh)
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = TxBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p2pkh" => Ok(Self::P2pkh),
            "p2sh" => Ok(Self::P2sh),
            "p2wpkh" => Ok(Self::P2wpkh),
            "p2wsh" => Ok(Self::P2wsh),
            "p2sh-p2wpkh" => Ok(Self::P2shP2wpkh),
            "p2sh-p2wsh" => Ok(Self::P2shP2wsh),
            other => Err(TxBuildError::validation(
                "addresstype",
                format!("{other} is unknown type"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigHashKind {
    #[default]
    All,
    None,
    Single,
}

impl FromStr for SigHashKind {
    type Err = TxBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            "single" => Ok(Self::Single),
            other => Err(TxBuildError::validation(
                "sighashtype",
                format!("{other} is unknown type"),
            )),
        }
    }
}

/// Sighash kind plus the independent anyone-can-pay flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SigHashType {
    pub kind: SigHashKind,
    pub anyone_can_pay: bool,
}

impl SigHashType {
    pub const ALL: Self = Self {
        kind: SigHashKind::All,
        anyone_can_pay: false,
    };

    #[must_use]
    pub const fn new(kind: SigHashKind, anyone_can_pay: bool) -> Self {
        Self {
            kind,
            anyone_can_pay,
        }
    }

    /// Consensus byte appended to DER signatures.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        let base = match self.kind {
            SigHashKind::All => 0x01,
            SigHashKind::None => 0x02,
            SigHashKind::Single => 0x03,
        };
        if self.anyone_can_pay { base | 0x80 } else { base }
    }

    pub fn from_byte(byte: u8) -> Result<Self, TxBuildError> {
        let kind = match byte & 0x1f {
            0x01 => SigHashKind::All,
            0x02 => SigHashKind::None,
            0x03 => SigHashKind::Single,
            _ => {
                return Err(TxBuildError::validation(
                    "sighashtype",
                    format!("unsupported sighash byte {byte:#04x}"),
                ));
            }
        };
        Ok(Self::new(kind, byte & 0x80 != 0))
    }
}

impl fmt::Display for SigHashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SigHashKind::All => "all",
            SigHashKind::None => "none",
            SigHashKind::Single => "single",
        };
        if self.anyone_can_pay {
            write!(f, "{kind}|anyonecanpay")
        } else {
            f.write_str(kind)
        }
    }
}

/// Reference to a previous output, with the txid in display (RPC) byte order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub txid: String,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: &str, vout: u32) -> Result<Self, TxBuildError> {
        check_hex("txid", txid, 32, false)?;
        Ok(Self {
            txid: txid.to_ascii_lowercase(),
            vout,
        })
    }

    #[must_use]
    pub fn matches(&self, txid: &str, vout: u32) -> bool {
        self.vout == vout && self.txid.eq_ignore_ascii_case(txid)
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.txid, self.vout)
    }
}

/// Checks that `value` is hex of exactly `bytes` bytes (or empty, when allowed).
pub fn check_hex(
    field: &'static str,
    value: &str,
    bytes: usize,
    allow_empty: bool,
) -> Result<(), TxBuildError> {
    if value.is_empty() && allow_empty {
        return Ok(());
    }
    if value.len() != bytes * 2 {
        return Err(TxBuildError::validation(field, "size invalid"));
    }
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TxBuildError::validation(field, "not a hex string"));
    }
    Ok(())
}

pub(crate) fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, TxBuildError> {
    hex::decode(value).map_err(|e| TxBuildError::validation(field, e.to_string()))
}

pub(crate) fn decode_hex32(field: &'static str, value: &str) -> Result<[u8; 32], TxBuildError> {
    check_hex(field, value, 32, false)?;
    let mut out = [0u8; 32];
    hex::decode_to_slice(value, &mut out)
        .map_err(|e| TxBuildError::validation(field, e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_type_names_round_trip() {
        for name in ["p2pkh", "p2sh", "p2wpkh", "p2wsh", "p2sh-p2wpkh", "p2sh-p2wsh"] {
            assert_eq!(name.parse::<HashType>().unwrap().as_str(), name);
        }
        let err = "p2tr".parse::<HashType>().unwrap_err();
        assert!(matches!(err, TxBuildError::Validation { field: "addresstype", .. }));
    }

    #[test]
    fn sighash_byte_encoding() {
        let single_acp = SigHashType::new(SigHashKind::Single, true);
        assert_eq!(single_acp.to_byte(), 0x83);
        assert_eq!(SigHashType::from_byte(0x83).unwrap(), single_acp);
        assert_eq!(SigHashType::from_byte(0x01).unwrap(), SigHashType::ALL);
        assert!(SigHashType::from_byte(0x00).is_err());
    }

    #[test]
    fn outpoint_requires_32_byte_txid() {
        assert!(Outpoint::new(&"a".repeat(63), 0).is_err());
        assert!(Outpoint::new(&"g".repeat(64), 0).is_err());

        let outpoint = Outpoint::new(&"AB".repeat(32), 3).unwrap();
        assert!(outpoint.matches(&"ab".repeat(32), 3));
        assert_eq!(outpoint.to_string(), format!("{},3", "ab".repeat(32)));
    }
}
