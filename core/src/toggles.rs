//! Policy toggles resolved from host properties and configuration.
//!
//! Pure decision functions are kept apart from the single IO boundary
//! ([`SystemProperties`]) so precedence rules are unit testable.
//!
//! | Host property | Config key | Default |
//! |---------------|------------|---------|
//! | `persist.sys.pixelprops.games` | `games_enabled` | `false` |
//! | `persist.sys.elixir.block.keyattestation` | `block_key_attestation` | `true` |
//!
//! A host property that is set and parses as a boolean wins over the
//! config value. An unparseable value is ignored with a warning.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::config::PropsConfig;

pub const PROP_GAMES_SPOOF: &str = "persist.sys.pixelprops.games";
pub const PROP_BLOCK_KEY_ATTESTATION: &str = "persist.sys.elixir.block.keyattestation";

/// Read access to host system properties.
pub trait SystemProperties {
    fn get(&self, key: &str) -> Option<String>;
}

impl SystemProperties for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl SystemProperties for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Host properties exposed as environment variables.
///
/// `persist.sys.pixelprops.games` is read from `PERSIST_SYS_PIXELPROPS_GAMES`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProperties;

impl EnvProperties {
    pub fn env_name(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl SystemProperties for EnvProperties {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_name(key)).ok()
    }
}

/// Toggles read once at engine initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyToggles {
    pub games_enabled: bool,
    pub block_key_attestation: bool,
}

impl Default for PolicyToggles {
    fn default() -> Self {
        Self {
            games_enabled: false,
            block_key_attestation: true,
        }
    }
}

impl PolicyToggles {
    /// Resolve toggles from host properties over config values.
    ///
    /// This is the IO boundary; call once at startup.
    pub fn resolve(props: &impl SystemProperties, config: &PropsConfig) -> Self {
        Self {
            games_enabled: resolve_toggle(
                PROP_GAMES_SPOOF,
                props.get(PROP_GAMES_SPOOF).as_deref(),
                config.games_enabled,
            ),
            block_key_attestation: resolve_toggle(
                PROP_BLOCK_KEY_ATTESTATION,
                props.get(PROP_BLOCK_KEY_ATTESTATION).as_deref(),
                config.block_key_attestation,
            ),
        }
    }
}

// ============================================================================
// PURE DECISION FUNCTIONS
// ============================================================================

/// Host property if it parses, otherwise the configured value.
pub fn resolve_toggle(key: &str, prop: Option<&str>, configured: bool) -> bool {
    match prop {
        None => configured,
        Some(raw) => parse_bool(raw).unwrap_or_else(|| {
            tracing::warn!(key, value = raw, "ignoring unparseable boolean property");
            configured
        }),
    }
}

/// Boolean property parsing with the host's accepted spellings.
///
/// `1`, `y`, `yes`, `on`, `true` are true; `0`, `n`, `no`, `off`, `false`
/// are false; anything else (including empty) is `None`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}
