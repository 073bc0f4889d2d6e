// src/export/mod.rs
// ============================================================================
// EXPORT - Guarda el checkpoint destino en formato HuggingFace
// ============================================================================
//
// Todo se escribe primero en un directorio de staging (TempDir) dentro del
// destino. Solo cuando config.json y todos los shards están completos se
// mueven al destino. El staging se borra siempre (Drop).
//
// Salida:
//   config.json
//   model.safetensors                          (1 shard)
//   model-0000k-of-0000N.safetensors + model.safetensors.index.json
//
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use crate::error::ConvertError;
use crate::mapping::{RemappedCheckpoint, AUTO_MODEL_CLASS};
use crate::safetensor::write_safetensors;
use crate::tensor::{Dtype, Tensor};

pub const CONFIG_JSON: &str = "config.json";
pub const SINGLE_SHARD: &str = "model.safetensors";
pub const INDEX_JSON: &str = "model.safetensors.index.json";
pub const DEFAULT_MAX_SHARD_SIZE: &str = "20GB";

/// Opciones del paso de guardado
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Tope de bytes de payload por shard
    pub max_shard_size: u64,
    /// dtype de salida; None conserva el de cada tensor
    pub dtype: Option<Dtype>,
    pub progress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_shard_size: 20_000_000_000,
            dtype: Some(Dtype::F16),
            progress: false,
        }
    }
}

/// Resumen de lo escrito
#[derive(Debug, Default)]
pub struct ExportStats {
    pub files: Vec<String>,
    pub shards: usize,
    pub tensors: usize,
    pub total_bytes: u64,
}

#[derive(Serialize)]
struct IndexMetadata {
    total_size: u64,
}

#[derive(Serialize)]
struct ShardIndex<'a> {
    metadata: IndexMetadata,
    weight_map: BTreeMap<&'a str, String>,
}

/// "20GB" → 20_000_000_000, "2GiB" → 2 × 1024³, "512" → 512
pub fn parse_size(s: &str) -> std::result::Result<u64, ConvertError> {
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier: u64 = match unit.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        "KIB" => 1 << 10,
        "MIB" => 1 << 20,
        "GIB" => 1 << 30,
        "TIB" => 1 << 40,
        _ => return Err(ConvertError::InvalidSize(s.to_string())),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| ConvertError::InvalidSize(s.to_string()))?;
    let bytes = (value * multiplier as f64) as u64;
    if bytes == 0 {
        return Err(ConvertError::InvalidSize(s.to_string()));
    }
    Ok(bytes)
}

/// Agrupa tensores (en orden de nombre) en shards de como mucho `max_bytes`.
/// Un tensor mayor que el tope va solo en su shard.
pub fn plan_shards(tensors: &BTreeMap<String, Tensor>, max_bytes: u64) -> Vec<Vec<&str>> {
    let mut shards = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0u64;

    for (name, tensor) in tensors {
        let size = tensor.byte_len() as u64;
        if !current.is_empty() && current_size + size > max_bytes {
            shards.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(name.as_str());
        current_size += size;
    }

    if !current.is_empty() || shards.is_empty() {
        shards.push(current);
    }
    shards
}

fn shard_file_name(index: usize, total: usize) -> String {
    if total == 1 {
        SINGLE_SHARD.to_string()
    } else {
        format!("model-{:05}-of-{:05}.safetensors", index + 1, total)
    }
}

/// Guarda tensores + config.json en `target` pasando por staging
pub fn save_pretrained(
    checkpoint: RemappedCheckpoint,
    target: &Path,
    options: &ExportOptions,
) -> Result<ExportStats> {
    let RemappedCheckpoint { tensors, mut config, .. } = checkpoint;

    std::fs::create_dir_all(target)
        .with_context(|| format!("Cannot create {}", target.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(target)
        .with_context(|| format!("Cannot create staging dir in {}", target.display()))?;
    debug!("staging in {}", staging.path().display());

    // ═══════════════════════════════════════════════════════════════════
    // DTYPE DE SALIDA
    // ═══════════════════════════════════════════════════════════════════

    let tensors: BTreeMap<String, Tensor> = match options.dtype {
        Some(dtype) => tensors.into_iter().map(|(n, t)| (n, t.cast(dtype))).collect(),
        None => tensors,
    };

    let output_dtype = options
        .dtype
        .or_else(|| tensors.values().next().map(Tensor::dtype));
    config.torch_dtype = output_dtype.map(|d| d.torch_name().to_string());

    let mut stats = ExportStats {
        tensors: tensors.len(),
        ..Default::default()
    };

    // ═══════════════════════════════════════════════════════════════════
    // CONFIG + SHARDS EN STAGING
    // ═══════════════════════════════════════════════════════════════════

    let config_json = serde_json::to_string_pretty(&config)?;
    std::fs::write(staging.path().join(CONFIG_JSON), config_json)?;
    stats.files.push(CONFIG_JSON.to_string());

    let plan = plan_shards(&tensors, options.max_shard_size);
    let total = plan.len();
    let metadata = HashMap::from([("format".to_string(), "pt".to_string())]);

    let pb = if options.progress {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template("  [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░ "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut weight_map = BTreeMap::new();
    for (idx, names) in plan.iter().enumerate() {
        let file_name = shard_file_name(idx, total);
        pb.set_message(file_name.clone());

        let entries: Vec<(&str, &Tensor)> = names.iter().map(|n| (*n, &tensors[*n])).collect();
        write_safetensors(&staging.path().join(&file_name), &entries, Some(metadata.clone()))?;

        for (name, tensor) in &entries {
            stats.total_bytes += tensor.byte_len() as u64;
            weight_map.insert(*name, file_name.clone());
        }
        debug!("{}: {} tensors", file_name, entries.len());
        stats.files.push(file_name);
        pb.inc(1);
    }
    pb.finish_and_clear();
    stats.shards = total;

    if total > 1 {
        let index = ShardIndex {
            metadata: IndexMetadata { total_size: stats.total_bytes },
            weight_map,
        };
        std::fs::write(staging.path().join(INDEX_JSON), serde_json::to_string_pretty(&index)?)?;
        stats.files.push(INDEX_JSON.to_string());
    }

    // ═══════════════════════════════════════════════════════════════════
    // MOVER AL DESTINO
    // ═══════════════════════════════════════════════════════════════════

    for file_name in &stats.files {
        let from = staging.path().join(file_name);
        let to: PathBuf = target.join(file_name);
        std::fs::rename(&from, &to)
            .with_context(|| format!("Cannot move {} to {}", from.display(), to.display()))?;
    }

    staging.close()
        .with_context(|| format!("Cannot remove staging dir in {}", target.display()))?;

    info!(
        "Saved {} tensors in {} shard(s) to {}",
        stats.tensors,
        stats.shards,
        target.display()
    );
    Ok(stats)
}

/// Post-proceso: fija `auto_map.AutoModel` en el config.json ya guardado
pub fn patch_auto_map(target: &Path) -> Result<()> {
    let path = target.join(CONFIG_JSON);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: Value = serde_json::from_str(&data)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let obj = config
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("{} is not a JSON object", path.display()))?;

    let auto_map = obj
        .entry("auto_map")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if !auto_map.is_object() {
        *auto_map = Value::Object(serde_json::Map::new());
    }
    auto_map["AutoModel"] = Value::String(AUTO_MODEL_CLASS.to_string());

    std::fs::write(&path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    debug!("patched auto_map.AutoModel in {}", path.display());
    Ok(())
}
