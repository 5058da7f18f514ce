use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TxBuildError;
use crate::registry::UtxoRegistry;

pub const DEFAULT_SESSION_FILE_MODE: u32 = 0o600;

/// One transaction under construction plus the provenance of its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSession {
    #[serde(rename = "hex")]
    pub transaction_hex: String,
    #[serde(default)]
    pub utxos: UtxoRegistry,
}

impl BuildSession {
    #[must_use]
    pub fn new(transaction_hex: String) -> Self {
        Self {
            transaction_hex,
            utxos: UtxoRegistry::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Unix permission bits applied to every written artifact.
    pub file_mode: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            file_mode: DEFAULT_SESSION_FILE_MODE,
        }
    }
}

/// Loads and atomically replaces the session artifact at one path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    options: StoreOptions,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BuildSession, TxBuildError> {
        let text = self.read()?;
        Ok(serde_json::from_str(text.trim())?)
    }

    /// Reads either a session artifact or a bare transaction hex file.
    pub fn load_transaction_hex(&self) -> Result<String, TxBuildError> {
        let text = self.read()?;
        let text = text.trim();
        match serde_json::from_str::<BuildSession>(text) {
            Ok(session) => Ok(session.transaction_hex),
            Err(err) => {
                debug!(path = %self.path.display(), %err, "not a session artifact, reading raw hex");
                Ok(text.to_string())
            }
        }
    }

    /// Writes the pretty-printed artifact through a temp file in the same directory and
    /// renames it over the target, so readers never see a partial document.
    pub fn save(&self, session: &BuildSession) -> Result<String, TxBuildError> {
        let document = serde_json::to_string_pretty(session)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(document.as_bytes())?;
        tmp.as_file().sync_all()?;

        #[cfg(target_family = "unix")]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(self.options.file_mode))?;
        }

        tmp.persist(&self.path).map_err(|err| err.error)?;
        debug!(path = %self.path.display(), inputs = session.utxos.len(), "session saved");

        Ok(document)
    }

    fn read(&self) -> Result<String, TxBuildError> {
        if !self.path.exists() {
            return Err(TxBuildError::NotFound(self.path.clone()));
        }
        Ok(fs::read_to_string(&self.path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UtxoRecord;

    fn sample_session() -> BuildSession {
        let mut session = BuildSession::new("0200000000000000000000".to_string());
        session.utxos.upsert(UtxoRecord {
            txid: "a".repeat(64),
            vout: 1,
            amount: 5000,
            descriptor: "wpkh(0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798)"
                .to_string(),
            ..UtxoRecord::default()
        });
        session
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("tx.json"), StoreOptions::default());
        let session = sample_session();

        let document = store.save(&session).expect("save");
        assert!(document.contains("\n  \"hex\""));
        assert_eq!(store.load().expect("load"), session);

        // only the artifact itself is left behind
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("missing.json"), StoreOptions::default());
        assert!(matches!(store.load(), Err(TxBuildError::NotFound(_))));
    }

    #[test]
    fn null_utxos_load_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tx.json");
        fs::write(&path, r#"{ "hex": "02000000", "utxos": null }"#).unwrap();

        let session = SessionStore::new(&path, StoreOptions::default())
            .load()
            .expect("load");
        assert_eq!(session.transaction_hex, "02000000");
        assert!(session.utxos.is_empty());
    }

    #[test]
    fn raw_hex_file_is_accepted_for_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tx.hex");
        fs::write(&path, "02000000\n").unwrap();

        let hex = SessionStore::new(&path, StoreOptions::default())
            .load_transaction_hex()
            .expect("hex");
        assert_eq!(hex, "02000000");
    }

    #[cfg(target_family = "unix")]
    #[test]
    fn applies_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tx.json");
        let store = SessionStore::new(&path, StoreOptions { file_mode: 0o640 });
        store.save(&sample_session()).expect("save");

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
