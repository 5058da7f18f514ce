use anyhow::{Context, Result, bail};
use config::Config;
use txbuild_core::StoreOptions;

/// Environment prefix; `TXBUILD_SESSION_FILE_MODE=640` sets `session_file_mode`.
pub const ENV_PREFIX: &str = "TXBUILD";

#[derive(Clone, Debug)]
pub struct Settings {
    /// Permission bits of written session artifacts.
    pub session_file_mode: u32,
    /// Filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .set_default("session_file_mode", "600")?
            .set_default("log_filter", "info")?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Self::from_config(&cfg)
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mode = cfg
            .get_string("session_file_mode")
            .context("session_file_mode not readable")?;
        let settings = Self {
            session_file_mode: parse_file_mode(&mode)?,
            log_filter: cfg.get_string("log_filter").context("log_filter not readable")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_file_mode > 0o777 {
            bail!("session_file_mode {:o} is not a permission mode", self.session_file_mode);
        }
        if self.log_filter.trim().is_empty() {
            bail!("log_filter must not be empty");
        }
        Ok(())
    }

    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            file_mode: self.session_file_mode,
        }
    }
}

/// Octal, with or without a leading `0o`.
fn parse_file_mode(text: &str) -> Result<u32> {
    let digits = text.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    u32::from_str_radix(digits, 8).with_context(|| format!("session_file_mode '{text}' is not octal"))
}
