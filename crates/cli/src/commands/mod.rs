pub mod keys;
pub mod tx;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use txbuild_core::{BuildSession, Network, SessionStore, TxBuilder};

use crate::cli::{NetworkArgs, TxArgs};
use crate::settings::Settings;

impl NetworkArgs {
    /// `--network` when given, otherwise the default chain of `--elements`.
    pub fn resolve(&self) -> Result<Network> {
        match self.network {
            None => Ok(Network::default_for(self.elements)),
            Some(network) if network.is_elements() == self.elements => Ok(network),
            Some(network) => bail!(
                "network {network} does not match {}",
                if self.elements { "--elements" } else { "a Bitcoin transaction (pass --elements)" }
            ),
        }
    }
}

/// The session a transaction command works on and where to persist it.
pub struct Workspace {
    pub builder: TxBuilder,
    pub session: BuildSession,
    store: Option<SessionStore>,
}

impl Workspace {
    pub fn open(args: &TxArgs, settings: &Settings) -> Result<Self> {
        let (store, session) = match (&args.file, &args.tx) {
            (Some(path), _) => {
                let store = SessionStore::new(path, settings.store_options());
                let session = store
                    .load()
                    .with_context(|| format!("failed to load session {}", path.display()))?;
                debug!(path = %path.display(), utxos = session.utxos.len(), "session loaded");
                (Some(store), session)
            }
            (None, Some(hex)) => (None, BuildSession::new(hex.trim().to_string())),
            (None, None) => bail!("either --file or --tx is required"),
        };
        Ok(Self {
            builder: TxBuilder::new(args.network.resolve()?),
            session,
            store,
        })
    }

    /// Read-only variant that also accepts a file holding bare transaction hex.
    pub fn open_lenient(args: &TxArgs, settings: &Settings) -> Result<Self> {
        let Some(path) = &args.file else {
            return Self::open(args, settings);
        };
        let store = SessionStore::new(path, settings.store_options());
        let session = match store.load() {
            Ok(session) => session,
            Err(txbuild_core::TxBuildError::Serde(_)) => BuildSession::new(
                store
                    .load_transaction_hex()
                    .with_context(|| format!("failed to read {}", path.display()))?,
            ),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to load session {}", path.display()));
            }
        };
        Ok(Self {
            builder: TxBuilder::new(args.network.resolve()?),
            session,
            store: None,
        })
    }

    /// Persists the session when it came from a file.
    pub fn save(&self) -> Result<()> {
        if let Some(store) = &self.store {
            store
                .save(&self.session)
                .with_context(|| format!("failed to save session {}", store.path().display()))?;
            info!(path = %store.path().display(), "session file updated");
        }
        Ok(())
    }

    /// Saves, then prints the transaction hex under `label`.
    pub fn finish(&self, label: &str) -> Result<()> {
        self.save()?;
        println!("{label}:\n{}", self.session.transaction_hex);
        Ok(())
    }
}

pub fn print_verify(outpoint: &txbuild_core::Outpoint, verified: bool) {
    println!("outpoint: {},{}", outpoint.txid, outpoint.vout);
    println!("verify: {}", if verified { "success." } else { "fail." });
}
