//! Derivation path templates and BIP-32 path parsing

use std::fmt;

use crate::error::{Error, Result};

/// Offset applied to hardened BIP-32 indices
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Placeholder replaced by the account index in a path template
pub const INDEX_PLACEHOLDER: &str = "%d";

/// Default node key path, index in the trailing component
pub const DEFAULT_NODE_KEY_PATH: &str = "m/44'/60'/0'/0/%d";

/// Ledger Live node key path, index in the account component
pub const LEDGER_LIVE_NODE_KEY_PATH: &str = "m/44'/60'/%d/0/0";

/// MyEtherWallet node key path, index in the change component
pub const MY_ETHER_WALLET_NODE_KEY_PATH: &str = "m/44'/60'/0'/%d";

/// Path template used to derive the node key.
///
/// The known conventions differ only in which component receives the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NodeKeyPath {
    #[default]
    Default,
    LedgerLive,
    MyEtherWallet,
    /// Any other template containing exactly one index placeholder
    Custom(String),
}

impl NodeKeyPath {
    /// Build a path from a template string, mapping known templates onto their variants
    pub fn from_template(template: &str) -> Result<Self> {
        let path = match template {
            "" | DEFAULT_NODE_KEY_PATH => Self::Default,
            LEDGER_LIVE_NODE_KEY_PATH => Self::LedgerLive,
            MY_ETHER_WALLET_NODE_KEY_PATH => Self::MyEtherWallet,
            other => Self::Custom(other.to_string()),
        };
        path.validate()?;
        Ok(path)
    }

    /// The raw template string
    pub fn template(&self) -> &str {
        match self {
            Self::Default => DEFAULT_NODE_KEY_PATH,
            Self::LedgerLive => LEDGER_LIVE_NODE_KEY_PATH,
            Self::MyEtherWallet => MY_ETHER_WALLET_NODE_KEY_PATH,
            Self::Custom(template) => template,
        }
    }

    /// Substitute the index into the template
    pub fn render(&self, index: u32) -> String {
        self.template().replacen(INDEX_PLACEHOLDER, &index.to_string(), 1)
    }

    /// Render and parse the path for an index
    pub fn components(&self, index: u32) -> Result<Vec<u32>> {
        parse_derivation_path(&self.render(index))
    }

    /// Check the template has exactly one index placeholder and renders to a valid path
    pub(crate) fn validate(&self) -> Result<()> {
        let template = self.template();
        if template.matches(INDEX_PLACEHOLDER).count() != 1 {
            return Err(Error::KeyDerivation(format!(
                "Derivation path template must contain exactly one '{}': {}",
                INDEX_PLACEHOLDER, template
            )));
        }
        self.components(0).map(|_| ())
    }
}

impl fmt::Display for NodeKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template())
    }
}

/// Cache key for a derived node key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKeyId {
    pub path: NodeKeyPath,
    pub index: u32,
}

/// Parse a BIP-32 derivation path
pub fn parse_derivation_path(path: &str) -> Result<Vec<u32>> {
    if !path.starts_with("m/") {
        return Err(Error::KeyDerivation(format!("Invalid derivation path: {}", path)));
    }

    let components = path.trim_start_matches("m/").split('/');
    let mut result = Vec::new();

    for component in components {
        if component.is_empty() {
            continue;
        }

        let hardened = component.ends_with('\'');
        let index = component
            .trim_end_matches('\'')
            .parse::<u32>()
            .ok()
            .filter(|index| *index < HARDENED_OFFSET)
            .ok_or_else(|| {
                Error::KeyDerivation(format!("Invalid derivation path component: {}", component))
            })?;

        result.push(if hardened { HARDENED_OFFSET + index } else { index });
    }

    if result.is_empty() {
        return Err(Error::KeyDerivation(format!("Empty derivation path: {}", path)));
    }

    Ok(result)
}
