// src/checkpoint/names.rs
// ============================================================================
// TENSOR NAMES - Nombre estructurado de tensor (por capa vs global)
// ============================================================================
//
// El loader reconoce el índice de capa UNA vez al cargar:
//   "model.blocks.3.mixer.Wqkv.weight" → Layer { "model.blocks", 3, "mixer.Wqkv.weight" }
//   "model.norm.weight"                → Global("model.norm.weight")
//
// Solo cuenta la PRIMERA aparición de ".<dígitos>.".
//
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static LAYER_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(\d+)\.").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TensorName {
    /// Tensor de una capa: `{prefix}.{index}.{suffix}`
    Layer {
        prefix: String,
        index: usize,
        suffix: String,
    },
    /// Tensor sin índice de capa (embedding, norm final, head)
    Global(String),
}

impl TensorName {
    pub fn parse(name: &str) -> Self {
        let Some(caps) = LAYER_TOKEN.captures(name) else {
            return Self::Global(name.to_string());
        };
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            return Self::Global(name.to_string());
        };

        match digits.as_str().parse::<usize>() {
            Ok(index) => Self::Layer {
                prefix: name[..whole.start()].to_string(),
                index,
                suffix: name[whole.end()..].to_string(),
            },
            // Índice que no cabe en usize: se trata como nombre opaco
            Err(_) => Self::Global(name.to_string()),
        }
    }

    pub fn layer_index(&self) -> Option<usize> {
        match self {
            Self::Layer { index, .. } => Some(*index),
            Self::Global(_) => None,
        }
    }

    /// Desplaza el índice de capa (no-op para nombres globales)
    pub fn shifted(self, shift: usize) -> Self {
        match self {
            Self::Layer { prefix, index, suffix } => Self::Layer {
                prefix,
                index: index + shift,
                suffix,
            },
            global => global,
        }
    }
}

impl fmt::Display for TensorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer { prefix, index, suffix } => write!(f, "{}.{}.{}", prefix, index, suffix),
            Self::Global(name) => write!(f, "{}", name),
        }
    }
}
