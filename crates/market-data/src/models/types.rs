use serde::{Deserialize, Serialize};

/// Asset classes served by the provider set.
///
/// Each provider declares the classes it can quote; the fallback chain
/// for a request never crosses class boundaries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Crypto,
    Fx,
    Commodity,
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equity => write!(f, "equity"),
            Self::Crypto => write!(f, "crypto"),
            Self::Fx => write!(f, "fx"),
            Self::Commodity => write!(f, "commodity"),
        }
    }
}
