// src/mapping/types.rs
// ============================================================================
// MAPPING TYPES - Resultado del remapeo
// ============================================================================

use std::collections::BTreeMap;

use crate::tensor::Tensor;

use super::config::TargetConfig;

/// Checkpoint destino: tensores con nombres HF + config derivada
#[derive(Debug, Clone)]
pub struct RemappedCheckpoint {
    pub tensors: BTreeMap<String, Tensor>,
    pub config: TargetConfig,
    /// Tensores de origen consumidos (todos, si el remapeo terminó)
    pub consumed: usize,
}

impl RemappedCheckpoint {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Bytes totales de los tensores (dtype actual)
    pub fn total_bytes(&self) -> usize {
        self.tensors.values().map(|t| t.byte_len()).sum()
    }
}
