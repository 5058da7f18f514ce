use std::fmt;
use std::str::FromStr;

use lwk_wollet::bitcoin::{self, NetworkKind};
use lwk_wollet::elements::{self, AddressParams};

use crate::error::TxBuildError;

/// Chain and address encoding a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    LiquidV1,
    LiquidTestnet,
    ElementsRegtest,
}

/// An address decoded back to its locking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub script_pubkey: Vec<u8>,
    /// Blinding pubkey of a confidential Elements address.
    pub blinding_pubkey: Option<Vec<u8>>,
}

impl Network {
    /// Network used when the caller only says whether the transaction is an Elements one.
    #[must_use]
    pub const fn default_for(elements: bool) -> Self {
        if elements { Self::LiquidV1 } else { Self::Mainnet }
    }

    #[must_use]
    pub const fn is_elements(self) -> bool {
        matches!(
            self,
            Self::LiquidV1 | Self::LiquidTestnet | Self::ElementsRegtest
        )
    }

    /// BIP32 / WIF version family of keys on this network.
    #[must_use]
    pub const fn key_kind(self) -> NetworkKind {
        match self {
            Self::Mainnet | Self::LiquidV1 => NetworkKind::Main,
            _ => NetworkKind::Test,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
            Self::LiquidV1 => "liquidv1",
            Self::LiquidTestnet => "liquidtestnet",
            Self::ElementsRegtest => "elementsregtest",
        }
    }

    const fn bitcoin_network(self) -> bitcoin::Network {
        match self {
            Self::Mainnet | Self::LiquidV1 => bitcoin::Network::Bitcoin,
            Self::Testnet | Self::LiquidTestnet => bitcoin::Network::Testnet,
            Self::Regtest | Self::ElementsRegtest => bitcoin::Network::Regtest,
        }
    }

    const fn address_params(self) -> &'static AddressParams {
        match self {
            Self::LiquidV1 | Self::Mainnet => &AddressParams::LIQUID,
            Self::LiquidTestnet | Self::Testnet => &AddressParams::LIQUID_TESTNET,
            Self::ElementsRegtest | Self::Regtest => &AddressParams::ELEMENTS,
        }
    }

    /// Encodes a locking script as an (unconfidential) address, if the script has a standard form.
    #[must_use]
    pub fn encode_address(self, script_pubkey: &[u8]) -> Option<String> {
        if self.is_elements() {
            let script = elements::Script::from(script_pubkey.to_vec());
            elements::Address::from_script(&script, None, self.address_params())
                .map(|address| address.to_string())
        } else {
            let script = bitcoin::Script::from_bytes(script_pubkey);
            bitcoin::Address::from_script(script, self.bitcoin_network())
                .ok()
                .map(|address| address.to_string())
        }
    }

    pub fn decode_address(self, address: &str) -> Result<DecodedAddress, TxBuildError> {
        if self.is_elements() {
            let parsed = elements::Address::from_str(address)
                .map_err(|e| TxBuildError::validation("address", e.to_string()))?;
            if parsed.params != self.address_params() {
                return Err(TxBuildError::validation(
                    "address",
                    format!("{address} does not belong to network {self}"),
                ));
            }

            Ok(DecodedAddress {
                script_pubkey: parsed.script_pubkey().to_bytes(),
                blinding_pubkey: parsed.blinding_pubkey.map(|pk| pk.serialize().to_vec()),
            })
        } else {
            let parsed = bitcoin::Address::from_str(address)
                .map_err(|e| TxBuildError::validation("address", e.to_string()))?
                .require_network(self.bitcoin_network())
                .map_err(|e| TxBuildError::validation("address", e.to_string()))?;

            Ok(DecodedAddress {
                script_pubkey: parsed.script_pubkey().to_bytes(),
                blinding_pubkey: None,
            })
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = TxBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            "liquidv1" | "liquid" => Ok(Self::LiquidV1),
            "liquidtestnet" => Ok(Self::LiquidTestnet),
            "liquidregtest" | "elementsregtest" => Ok(Self::ElementsRegtest),
            other => Err(TxBuildError::validation(
                "network",
                format!("{other} is unknown type"),
            )),
        }
    }
}
