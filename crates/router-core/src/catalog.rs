//! Static cross-vendor model catalog.
//!
//! Maps equivalent models across vendors by tier. The OpenAI name is the
//! canonical identifier of an equivalence class; a vendor slot is `None`
//! when that vendor has no equivalent model. The table is declaration
//! ordered: more-specific family entries precede generic aliases, and
//! lookups take the first mapping that lists the name under any vendor.
//!
//! Read-only after construction; safe to share without locking.

use crate::types::Vendor;
use serde::{Deserialize, Serialize};

/// Abstract quality class grouping equivalent models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Flagship models.
    Premium,
    /// Mid-range models.
    Standard,
    /// Small/cheap models.
    Economy,
    /// Image generation models.
    Images,
    /// Embedding models.
    Embeddings,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Premium => "premium",
            Self::Standard => "standard",
            Self::Economy => "economy",
            Self::Images => "images",
            Self::Embeddings => "embeddings",
        };
        f.write_str(s)
    }
}

/// What kind of request a model serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Chat completions.
    Chat,
    /// Image generation.
    Images,
    /// Embeddings.
    Embeddings,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Chat => "chat",
            Self::Images => "images",
            Self::Embeddings => "embeddings",
        };
        f.write_str(s)
    }
}

/// One equivalence class of models across vendors.
#[derive(Debug, Clone)]
pub struct ModelMapping {
    /// Quality tier of the class.
    pub tier: Tier,
    /// Capability the class serves.
    pub capability: Capability,
    /// Canonical (OpenAI) model name. Always present.
    pub openai: &'static str,
    /// Anthropic equivalent, if any.
    pub anthropic: Option<&'static str>,
    /// Google equivalent, if any.
    pub google: Option<&'static str>,
}

impl ModelMapping {
    /// The vendor-side name for this class, if the vendor serves it.
    #[must_use]
    pub fn name_for(&self, vendor: Vendor) -> Option<&'static str> {
        match vendor {
            Vendor::OpenAi => Some(self.openai),
            Vendor::Anthropic => self.anthropic,
            Vendor::Google => self.google,
        }
    }

    fn lists(&self, name: &str) -> bool {
        self.openai == name || self.anthropic == Some(name) || self.google == Some(name)
    }
}

/// The catalog: an ordered list of mappings with name lookup.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    mappings: Vec<ModelMapping>,
}

impl ModelCatalog {
    /// The mapping table compiled into the binary.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            mappings: vec![
                ModelMapping {
                    tier: Tier::Premium,
                    capability: Capability::Chat,
                    openai: "gpt-4o",
                    anthropic: Some("claude-opus-4-6"),
                    google: Some("gemini-1.5-pro"),
                },
                ModelMapping {
                    tier: Tier::Standard,
                    capability: Capability::Chat,
                    openai: "gpt-4-turbo",
                    anthropic: Some("claude-sonnet-4-5"),
                    google: Some("gemini-1.5-flash"),
                },
                ModelMapping {
                    tier: Tier::Economy,
                    capability: Capability::Chat,
                    openai: "gpt-4o-mini",
                    anthropic: Some("claude-3-5-haiku-latest"),
                    google: Some("gemini-1.5-flash-8b"),
                },
                // Generic family aliases; kept after the specific entries so
                // declaration-order lookup prefers the exact names above.
                ModelMapping {
                    tier: Tier::Premium,
                    capability: Capability::Chat,
                    openai: "gpt-4",
                    anthropic: Some("claude-opus-4-6"),
                    google: Some("gemini-1.5-pro"),
                },
                ModelMapping {
                    tier: Tier::Economy,
                    capability: Capability::Chat,
                    openai: "gpt-3.5-turbo",
                    anthropic: Some("claude-3-5-haiku-latest"),
                    google: Some("gemini-1.5-flash-8b"),
                },
                ModelMapping {
                    tier: Tier::Images,
                    capability: Capability::Images,
                    openai: "dall-e-3",
                    anthropic: None,
                    google: Some("imagen-3.0-generate-001"),
                },
                ModelMapping {
                    tier: Tier::Embeddings,
                    capability: Capability::Embeddings,
                    openai: "text-embedding-3-small",
                    anthropic: None,
                    google: Some("text-embedding-004"),
                },
                ModelMapping {
                    tier: Tier::Embeddings,
                    capability: Capability::Embeddings,
                    openai: "text-embedding-3-large",
                    anthropic: None,
                    google: Some("text-embedding-004"),
                },
            ],
        }
    }

    /// First mapping listing `name` under any vendor, in declaration order.
    #[must_use]
    pub fn find_mapping(&self, name: &str) -> Option<&ModelMapping> {
        self.mappings.iter().find(|m| m.lists(name))
    }

    /// The requested vendor's equivalent for `name`'s equivalence class.
    /// `None` means this vendor cannot serve it (or the name is unknown).
    #[must_use]
    pub fn model_for_vendor(&self, name: &str, vendor: Vendor) -> Option<&'static str> {
        self.find_mapping(name).and_then(|m| m.name_for(vendor))
    }

    /// Capability of `name`. Unknown names default to chat so they can
    /// still route best-effort.
    #[must_use]
    pub fn capability_for_model(&self, name: &str) -> Capability {
        self.find_mapping(name)
            .map_or(Capability::Chat, |m| m.capability)
    }

    /// Canonical (OpenAI) names of every class, in declaration order.
    #[must_use]
    pub fn canonical_names(&self) -> Vec<&'static str> {
        self.mappings.iter().map(|m| m.openai).collect()
    }
}
