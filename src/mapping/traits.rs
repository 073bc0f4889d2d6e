// src/mapping/traits.rs
// ============================================================================
// MAPPER TRAIT - Interfaz para remapear un estado fusionado a otro formato
// ============================================================================

use crate::error::Result;
use crate::merge::MergedState;

use super::types::RemappedCheckpoint;

/// Trait para mappers de checkpoint.
///
/// El mapper es PURO:
/// - Consume el estado fusionado de UN rango tensor-parallel
/// - No toca disco (eso lo hace export)
/// - Falla en cuanto falta un tensor esperado
pub trait CheckpointMapper {
    /// Nombre de la arquitectura de origen (ej: "internlm-vit")
    fn name(&self) -> &str;

    /// Número de capas que el mapper espera encontrar
    fn num_layers(&self) -> usize;

    /// Produce los tensores destino y su config.json
    fn remap(&self, state: MergedState) -> Result<RemappedCheckpoint>;
}
