// src/merge/mod.rs
// ============================================================================
// MERGE - Fusión de etapas pipeline-parallel en un estado plano por rango TP
// ============================================================================
//
// Cada etapa numera sus capas desde 0. Al fusionar:
//   global = local + layer_shift
//   layer_shift += max(local de la etapa) + 1
//
// layer_shift vive durante todo el rango TP. El prefijo "model." se quita al
// insertar: si dos nombres colisionan tras desplazar y quitar el prefijo,
// gana la última escritura en orden de etapa.
//
// ============================================================================

use std::collections::BTreeMap;

use log::debug;

use crate::checkpoint::Shard;
use crate::tensor::Tensor;

/// Prefijo que se elimina de todos los nombres tras fusionar
pub const MODEL_PREFIX: &str = "model.";

/// Shards indexados por [rango TP][etapa PP]
pub type PartitionGrid = Vec<Vec<Shard>>;

/// Estado fusionado de un rango TP: nombre canónico → tensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedState {
    tensors: BTreeMap<String, Tensor>,
}

impl MergedState {
    pub fn new(tensors: BTreeMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn into_tensors(self) -> BTreeMap<String, Tensor> {
        self.tensors
    }
}

fn canonical_name(name: &str) -> &str {
    name.strip_prefix(MODEL_PREFIX).unwrap_or(name)
}

/// Fusiona las etapas de UN rango TP (en orden de etapa)
pub fn merge_pipeline_stages(stages: Vec<Shard>) -> MergedState {
    let mut layer_shift = 0usize;
    let mut merged: BTreeMap<String, Tensor> = BTreeMap::new();

    for (pp, stage) in stages.into_iter().enumerate() {
        let mut stage_max = 0usize;

        for (name, tensor) in stage.into_entries() {
            if let Some(local) = name.layer_index() {
                stage_max = stage_max.max(local);
            }
            let global = name.shifted(layer_shift).to_string();
            merged.insert(canonical_name(&global).to_string(), tensor);
        }

        debug!("stage {}: layer_shift={} stage_max={}", pp, layer_shift, stage_max);
        layer_shift += stage_max + 1;
    }

    MergedState::new(merged)
}

/// Fusiona cada rango TP de forma independiente (orden de rango TP)
pub fn merge_partitions(grid: PartitionGrid) -> Vec<MergedState> {
    grid.into_iter().map(merge_pipeline_stages).collect()
}
