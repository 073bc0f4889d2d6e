// src/builder.rs
// ============================================================================
// BUILDER - Orquestador de la conversión
// ============================================================================
//
// config + shards → merge PP → remap → save (staging) → patch auto_map
//
// El builder es TONTO:
// - NO sabe de nombres de tensores (eso es del mapper)
// - NO sabe de formatos en disco (eso es de checkpoint/export)
// - Solo encadena los pasos y reúne estadísticas
//
// ============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::checkpoint::{self, Shard};
use crate::export::{self, ExportOptions};
use crate::mapping::{CheckpointMapper, VitMapper};
use crate::merge;

/// Rango tensor-parallel que se convierte
pub const CONVERTED_TP_RANK: usize = 0;

/// Estadísticas de conversión
#[derive(Debug, Default)]
pub struct BuildStats {
    pub tp_size: usize,
    pub pp_size: usize,
    pub source_tensors: usize,
    pub merged_tensors: usize,
    pub target_tensors: usize,
    pub mlp_bias: bool,
    /// Bytes tras el remapeo, antes del cast de salida
    pub remapped_bytes: u64,
    pub shards: usize,
    pub total_bytes: u64,
}

/// Convierte el checkpoint de `src` y lo deja en `dst`
pub fn convert_checkpoint(src: &Path, dst: &Path, options: &ExportOptions) -> Result<BuildStats> {
    let mut stats = BuildStats::default();

    let mapper = VitMapper::new(checkpoint::load_model_config(src)?);
    let model_config = mapper.config();
    info!(
        "Model: hidden={} heads={} layers={} mlp_ratio={} vocab={}",
        model_config.hidden_size,
        model_config.num_attention_heads,
        mapper.num_layers(),
        model_config.mlp_ratio,
        model_config.vocab_size
    );

    // ═══════════════════════════════════════════════════════════════════
    // DESCUBRIR + CARGAR
    // ═══════════════════════════════════════════════════════════════════

    let layout = checkpoint::discover_partitions(src)?;
    stats.tp_size = layout.tp_size;
    stats.pp_size = layout.pp_size;
    info!("Found {} tensor-parallel rank(s) x {} pipeline stage(s)", layout.tp_size, layout.pp_size);

    if layout.tp_size > 1 {
        warn!(
            "{} tensor-parallel ranks found; only tp{} is converted",
            layout.tp_size, CONVERTED_TP_RANK
        );
    }

    let stages = checkpoint::load_rank(src, layout, CONVERTED_TP_RANK, options.progress)?;
    stats.source_tensors = stages.iter().map(Shard::len).sum();

    // ═══════════════════════════════════════════════════════════════════
    // MERGE + REMAP
    // ═══════════════════════════════════════════════════════════════════

    let state = merge::merge_partitions(vec![stages])
        .into_iter()
        .next()
        .context("Merge produced no tensor-parallel state")?;
    stats.merged_tensors = state.len();
    info!("Merged {} pipeline stages into {} tensors", layout.pp_size, state.len());

    let remapped = mapper
        .remap(state)
        .with_context(|| format!("Failed to remap checkpoint with {} mapper", mapper.name()))?;
    stats.target_tensors = remapped.len();
    stats.mlp_bias = remapped.config.mlp_bias;
    stats.remapped_bytes = remapped.total_bytes() as u64;
    info!(
        "Remapped into {} tensors, {:.1} MB before dtype conversion",
        remapped.len(),
        stats.remapped_bytes as f64 / 1024.0 / 1024.0
    );

    // ═══════════════════════════════════════════════════════════════════
    // GUARDAR + POST-PROCESO
    // ═══════════════════════════════════════════════════════════════════

    let export_stats = export::save_pretrained(remapped, dst, options)?;
    stats.shards = export_stats.shards;
    stats.total_bytes = export_stats.total_bytes;

    export::patch_auto_map(dst)?;

    Ok(stats)
}
