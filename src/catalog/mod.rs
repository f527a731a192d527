use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const MB: u64 = 1024 * 1024;
const GB: u64 = MB * 1024;

/// A supported conversational model.
///
/// Every variant maps to exactly one [`CatalogEntry`]. The table is built once
/// and never mutated; an unknown key is always an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    NeoSmall,
    NeoMedium,
    NeoLarge,
    NeoX,
    DialoSmall,
    DialoMedium,
    DialoLarge,
    Rag,
    BlenderSmall,
    BlenderMedium,
    BlenderLarge,
    BlenderHuge,
    Aeona,
}

impl ModelKind {
    pub const ALL: [ModelKind; 13] = [
        ModelKind::NeoSmall,
        ModelKind::NeoMedium,
        ModelKind::NeoLarge,
        ModelKind::NeoX,
        ModelKind::DialoSmall,
        ModelKind::DialoMedium,
        ModelKind::DialoLarge,
        ModelKind::Rag,
        ModelKind::BlenderSmall,
        ModelKind::BlenderMedium,
        ModelKind::BlenderLarge,
        ModelKind::BlenderHuge,
        ModelKind::Aeona,
    ];

    pub fn key(self) -> &'static str {
        self.entry().key
    }

    pub fn entry(self) -> &'static CatalogEntry {
        // ENTRIES is ordered like ALL
        &ENTRIES[self as usize]
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        resolve(key).map(|entry| entry.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub kind: ModelKind,
    /// Short key used on the command line and as the cache directory name.
    pub key: &'static str,
    /// Canonical identifier on the upstream model hub.
    pub publisher_id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub approx_size: Option<u64>,
}

static ENTRIES: [CatalogEntry; 13] = [
    CatalogEntry {
        kind: ModelKind::NeoSmall,
        key: "neo-small",
        publisher_id: "EleutherAI/gpt-neo-125M",
        display_name: "GPT-NEO",
        description: "Smallest EleutherAI model with a GPT-3 like architecture and 125M \
                      parameters. Fastest of the family, least accurate.",
        approx_size: Some(600 * MB),
    },
    CatalogEntry {
        kind: ModelKind::NeoMedium,
        key: "neo-medium",
        publisher_id: "EleutherAI/gpt-neo-1.3B",
        display_name: "GPT-NEO",
        description: "Mid-sized EleutherAI model with 1.3B parameters, balanced between \
                      speed and accuracy.",
        approx_size: Some(5 * GB),
    },
    CatalogEntry {
        kind: ModelKind::NeoLarge,
        key: "neo-large",
        publisher_id: "EleutherAI/gpt-neo-2.7B",
        display_name: "GPT-NEO",
        description: "Large EleutherAI model with about 2.7B parameters, accurate but heavy.",
        approx_size: Some(10 * GB),
    },
    CatalogEntry {
        kind: ModelKind::NeoX,
        key: "neox",
        publisher_id: "EleutherAI/gpt-neox-20b",
        display_name: "GPT-NEOX",
        description: "The largest EleutherAI model, 20B parameters. By far the most \
                      accurate of the family.",
        approx_size: Some(45 * GB),
    },
    CatalogEntry {
        kind: ModelKind::DialoSmall,
        key: "dialo-small",
        publisher_id: "microsoft/DialoGPT-small",
        display_name: "DialoGPT-Small",
        description: "Smallest GPT-2 based conversational model by Microsoft. Accuracy \
                      varies a lot; a good candidate for further training.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::DialoMedium,
        key: "dialo-medium",
        publisher_id: "microsoft/DialoGPT-medium",
        display_name: "DialoGPT-Medium",
        description: "Mid-sized GPT-2 based conversational model by Microsoft.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::DialoLarge,
        key: "dialo-large",
        publisher_id: "microsoft/DialoGPT-large",
        display_name: "DialoGPT-Large",
        description: "Largest and most precise GPT-2 based conversational model by Microsoft.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::Rag,
        key: "rag",
        publisher_id: "facebook/rag-token-nq",
        display_name: "RAG",
        description: "Experimental retrieval-augmented model by Facebook. Results vary; \
                      useful for experiments or as a training base.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::BlenderSmall,
        key: "blender-small",
        publisher_id: "facebook/blenderbot_small-90M",
        display_name: "BLENDER-SMALL",
        description: "Tiny member of the Blenderbot conversational family by Facebook.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::BlenderMedium,
        key: "blender-medium",
        publisher_id: "facebook/blenderbot-400M-distill",
        display_name: "BLENDER-MEDIUM",
        description: "Mid-sized distilled member of the Blenderbot family.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::BlenderLarge,
        key: "blender-large",
        publisher_id: "facebook/blenderbot-1B-distill",
        display_name: "BLENDER-LARGE",
        description: "Large distilled member of the Blenderbot family.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::BlenderHuge,
        key: "blender-huge",
        publisher_id: "facebook/blenderbot-3B",
        display_name: "BLENDER-HUGE",
        description: "The most complete member of the Blenderbot family, 3B parameters.",
        approx_size: None,
    },
    CatalogEntry {
        kind: ModelKind::Aeona,
        key: "aeona",
        publisher_id: "deepparag/Aeona",
        display_name: "AEONA",
        description: "DialoGPT based model by deepparag tuned to sound as natural as possible.",
        approx_size: None,
    },
];

static INDEX: once_cell::sync::Lazy<HashMap<&'static str, &'static CatalogEntry>> =
    once_cell::sync::Lazy::new(|| ENTRIES.iter().map(|entry| (entry.key, entry)).collect());

/// Looks up a catalog entry by its short key.
pub fn resolve(key: &str) -> Result<&'static CatalogEntry> {
    INDEX
        .get(key)
        .copied()
        .ok_or_else(|| Error::UnknownModel(key.to_string()))
}

/// All entries, in catalog order.
pub fn entries() -> impl Iterator<Item = &'static CatalogEntry> {
    ENTRIES.iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_resolves() {
        for kind in ModelKind::ALL {
            let entry = resolve(kind.key()).unwrap();
            assert_eq!(entry.kind, kind);
            assert!(!entry.publisher_id.is_empty());
            assert!(!entry.display_name.is_empty());
        }
        assert_eq!(entries().count(), ModelKind::ALL.len());
    }

    #[test]
    fn test_neo_small() {
        let entry = resolve("neo-small").unwrap();
        assert_eq!(entry.publisher_id, "EleutherAI/gpt-neo-125M");
        assert_eq!(entry.display_name, "GPT-NEO");
        assert_eq!(ModelKind::NeoSmall.entry(), entry);
    }

    #[test]
    fn test_unknown_key() {
        for key in ["", "neo", "NEO-SMALL", "gpt-4", "neo-small "] {
            match resolve(key) {
                Err(Error::UnknownModel(k)) => assert_eq!(k, key),
                other => panic!("expected UnknownModel for {:?}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_parse_and_display() {
        let kind: ModelKind = "blender-huge".parse().unwrap();
        assert_eq!(kind, ModelKind::BlenderHuge);
        assert_eq!(kind.to_string(), "blender-huge");
        assert!("blender-tiny".parse::<ModelKind>().is_err());
    }
}
