//! Voting scales - the card decks a room can vote with

use serde::{Deserialize, Serialize};

/// Maximum number of cards in a custom scale
pub const MAX_CUSTOM_VALUES: usize = 20;

/// Maximum characters in a single card token
pub const MAX_TOKEN_LEN: usize = 8;

/// Preset scale identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    #[default]
    Fibonacci,
    Tshirt,
    Powers2,
    Custom,
}

impl ScaleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleKind::Fibonacci => "fibonacci",
            ScaleKind::Tshirt => "tshirt",
            ScaleKind::Powers2 => "powers2",
            ScaleKind::Custom => "custom",
        }
    }

    /// Parse a scale name. Unknown names are `None` so callers can pick a fallback.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fibonacci" => Some(ScaleKind::Fibonacci),
            "tshirt" => Some(ScaleKind::Tshirt),
            "powers2" => Some(ScaleKind::Powers2),
            "custom" => Some(ScaleKind::Custom),
            _ => None,
        }
    }
}

/// Ordered set of tokens a room accepts as votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingScale {
    #[serde(rename = "type")]
    pub kind: ScaleKind,
    pub name: String,
    pub values: Vec<String>,
}

impl VotingScale {
    /// Build one of the preset scales. `Custom` has no preset and yields Fibonacci.
    pub fn preset(kind: ScaleKind) -> Self {
        let (kind, name, values): (ScaleKind, &str, &[&str]) = match kind {
            ScaleKind::Tshirt => (
                ScaleKind::Tshirt,
                "T-Shirt Sizes",
                &["XS", "S", "M", "L", "XL", "XXL", "?"],
            ),
            ScaleKind::Powers2 => (
                ScaleKind::Powers2,
                "Powers of 2",
                &["1", "2", "4", "8", "16", "32", "64", "?"],
            ),
            ScaleKind::Fibonacci | ScaleKind::Custom => (
                ScaleKind::Fibonacci,
                "Fibonacci",
                &["1", "2", "3", "5", "8", "13", "21", "?"],
            ),
        };

        Self {
            kind,
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Resolve a scale by name, falling back to Fibonacci for unknown names
    pub fn from_name(name: &str) -> Self {
        Self::preset(ScaleKind::parse(name).unwrap_or_default())
    }

    /// Build a custom scale from caller-supplied tokens.
    ///
    /// Tokens are trimmed, blanks and duplicates are dropped (first occurrence
    /// wins), and over-long tokens are rejected. Returns `None` if nothing usable
    /// is left or the deck is too large.
    pub fn custom(values: &[String]) -> Option<Self> {
        let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
        for value in values {
            let token = value.trim();
            if token.is_empty() || cleaned.iter().any(|t| t == token) {
                continue;
            }
            if token.chars().count() > MAX_TOKEN_LEN {
                return None;
            }
            cleaned.push(token.to_string());
        }

        if cleaned.is_empty() || cleaned.len() > MAX_CUSTOM_VALUES {
            return None;
        }

        Some(Self {
            kind: ScaleKind::Custom,
            name: "Custom".to_string(),
            values: cleaned,
        })
    }

    /// All preset scales, in display order
    pub fn presets() -> Vec<Self> {
        [ScaleKind::Fibonacci, ScaleKind::Tshirt, ScaleKind::Powers2]
            .into_iter()
            .map(Self::preset)
            .collect()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.values.iter().any(|v| v == token)
    }
}

impl Default for VotingScale {
    fn default() -> Self {
        Self::preset(ScaleKind::Fibonacci)
    }
}
