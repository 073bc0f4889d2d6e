// src/checkpoint/mod.rs
// ============================================================================
// CHECKPOINT - Descubrimiento y carga del checkpoint de entrenamiento
// ============================================================================
//
// Carpeta de origen:
//   model_config.json
//   model_tp<T>_pp<P>.safetensors   (un archivo por rango TP × etapa PP)
//
// El número de rangos se infiere del máximo T/P visto en los nombres.
// Los archivos que no siguen el patrón se ignoran sin error.
//
// ============================================================================

pub mod names;

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::mapping::ModelConfig;
use crate::safetensor::SafetensorFile;
use crate::tensor::Tensor;

pub use names::TensorName;

pub const CONFIG_FILE: &str = "model_config.json";
pub const SHARD_PREFIX: &str = "model_t";
pub const SHARD_EXTENSION: &str = "safetensors";

/// Tensores de una etapa pipeline para un rango TP
#[derive(Debug, Clone, Default)]
pub struct Shard {
    entries: Vec<(TensorName, Tensor)>,
}

impl Shard {
    pub fn new(entries: Vec<(TensorName, Tensor)>) -> Self {
        Self { entries }
    }

    /// Construye el shard reconociendo los índices de capa de cada nombre
    pub fn from_named(tensors: Vec<(String, Tensor)>) -> Self {
        Self::new(
            tensors
                .into_iter()
                .map(|(name, t)| (TensorName::parse(&name), t))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[(TensorName, Tensor)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(TensorName, Tensor)> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dimensiones de la rejilla de particiones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    pub tp_size: usize,
    pub pp_size: usize,
}

/// "model_tp3_pp1.safetensors" → Some((3, 1))
///
/// Descarta `*.md5`. Un archivo con el prefijo pero sin el patrón completo
/// se ignora (no se reporta).
pub fn parse_shard_file_name(file_name: &str) -> Option<(usize, usize)> {
    if !file_name.starts_with(SHARD_PREFIX) || file_name.ends_with("md5") {
        return None;
    }

    let stem = Path::new(file_name).file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('_').collect();
    let [_, tp, pp] = parts.as_slice() else {
        return None;
    };

    let tp = tp.strip_prefix("tp")?.parse().ok()?;
    let pp = pp.strip_prefix("pp")?.parse().ok()?;
    Some((tp, pp))
}

pub fn shard_file_name(tp: usize, pp: usize) -> String {
    format!("model_tp{}_pp{}.{}", tp, pp, SHARD_EXTENSION)
}

/// Escanea la carpeta y deduce cuántos rangos TP y etapas PP hay
pub fn discover_partitions(folder: &Path) -> Result<PartitionLayout> {
    let mut max_tp: Option<usize> = None;
    let mut max_pp: Option<usize> = None;

    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("Cannot list {}", folder.display()))?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };

        match parse_shard_file_name(file_name) {
            Some((tp, pp)) => {
                max_tp = Some(max_tp.map_or(tp, |m| m.max(tp)));
                max_pp = Some(max_pp.map_or(pp, |m| m.max(pp)));
            }
            None => debug!("skipping {}", file_name),
        }
    }

    match (max_tp, max_pp) {
        (Some(tp), Some(pp)) => Ok(PartitionLayout {
            tp_size: tp + 1,
            pp_size: pp + 1,
        }),
        _ => anyhow::bail!("No model_tp<T>_pp<P> shards found in {}", folder.display()),
    }
}

pub fn load_model_config(folder: &Path) -> Result<ModelConfig> {
    let path = folder.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config: ModelConfig = serde_json::from_str(&data)
        .with_context(|| format!("Invalid model config in {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid model config in {}", path.display()))?;

    Ok(config)
}

pub fn load_shard(folder: &Path, tp: usize, pp: usize) -> Result<Shard> {
    let path = folder.join(shard_file_name(tp, pp));
    let file = SafetensorFile::open(&path)?;
    let tensors = file.read_all()
        .with_context(|| format!("Failed to load {}", path.display()))?;

    debug!("{}: {} tensors", path.display(), tensors.len());
    Ok(Shard::from_named(tensors))
}

/// Carga todas las etapas PP de un rango TP, en orden de etapa
pub fn load_rank(folder: &Path, layout: PartitionLayout, tp: usize, progress: bool) -> Result<Vec<Shard>> {
    let pb = if progress {
        let pb = ProgressBar::new(layout.pp_size as u64);
        pb.set_style(
            ProgressStyle::with_template("  [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░ "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut stages = Vec::with_capacity(layout.pp_size);
    for pp in 0..layout.pp_size {
        pb.set_message(shard_file_name(tp, pp));
        stages.push(load_shard(folder, tp, pp)?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Loaded tp{}: {} stages, {} tensors",
        tp,
        stages.len(),
        stages.iter().map(Shard::len).sum::<usize>()
    );
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safetensor::write_safetensors;

    #[test]
    fn test_parse_shard_file_name() {
        assert_eq!(parse_shard_file_name("model_tp0_pp0.safetensors"), Some((0, 0)));
        assert_eq!(parse_shard_file_name("model_tp3_pp12.pt"), Some((3, 12)));
        assert_eq!(parse_shard_file_name("model_tp0_pp0.md5"), None);
        assert_eq!(parse_shard_file_name("model_config.json"), None);
        assert_eq!(parse_shard_file_name("model_tp0.safetensors"), None);
        assert_eq!(parse_shard_file_name("model_tpX_pp0.safetensors"), None);
        assert_eq!(parse_shard_file_name("optimizer_tp0_pp0.pt"), None);
    }

    #[test]
    fn test_discover_partitions() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "model_tp0_pp0.safetensors",
            "model_tp0_pp1.safetensors",
            "model_tp1_pp2.safetensors",
            "model_tp0_pp0.md5",
            "model_tp_bogus.safetensors",
            "model_config.json",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let layout = discover_partitions(dir.path()).unwrap();
        assert_eq!(layout, PartitionLayout { tp_size: 2, pp_size: 3 });
    }

    #[test]
    fn test_discover_empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_partitions(dir.path()).is_err());
    }

    #[test]
    fn test_load_rank_in_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        for pp in 0..2 {
            let t = Tensor::from_f32(vec![1], &[pp as f32]).unwrap();
            write_safetensors(
                &dir.path().join(shard_file_name(0, pp)),
                &[("model.blocks.0.norm1.weight", &t)],
                None,
            )
            .unwrap();
        }

        let layout = discover_partitions(dir.path()).unwrap();
        let stages = load_rank(dir.path(), layout, 0, false).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].entries()[0].0.layer_index(), Some(0));
        assert_eq!(stages[1].entries()[0].1.to_values(), vec![1.0]);
    }

    #[test]
    fn test_load_model_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"hidden_size": 32, "num_attention_heads": 4, "num_layers": 2, "mlp_ratio": 4.0, "vocab_size": -1}"#,
        )
        .unwrap();
        let cfg = load_model_config(dir.path()).unwrap();
        assert_eq!(cfg.num_layers, 2);
        assert_eq!(cfg.head_dim(), 8);
    }

    #[test]
    fn test_load_model_config_rejects_negative_vocab() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"hidden_size": 32, "num_attention_heads": 4, "num_layers": 2, "mlp_ratio": 4.0, "vocab_size": -5}"#,
        )
        .unwrap();
        let err = load_model_config(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid model config: vocab_size=-5"));
    }
}
