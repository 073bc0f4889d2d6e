// src/mapping/vit.rs
// ============================================================================
// INTERNLM-VIT MAPPER - Estado de entrenamiento → InternLMForCausalLM (HF)
// ============================================================================
//
// Origen (tras merge, sin prefijo "model."):
//   embedding.vq_model.quantize.embedding.weight   [vocab, codebook_dim]
//   embedding.embed_proj.weight                     [hidden, codebook_dim]
//   norm.{weight,bias}, head.weight
//   blocks.{i}.mixer.Wqkv.{weight,bias}             QKV fusionado
//   blocks.{i}.mixer.out_proj.{weight,bias}
//   blocks.{i}.mlp.fc{1,2}.weight (+ .bias opcional)
//   blocks.{i}.norm{1,2}.{weight,bias}
//   blocks.{i}.mixer.rotary_emb.inv_freq            (se descarta)
//
// Destino: model.embed_tokens / model.layers.{i}.* / model.norm / lm_head
//
// ============================================================================

use std::collections::BTreeMap;

use log::{debug, info};

use crate::error::Result;
use crate::merge::MergedState;
use crate::tensor::Tensor;

use super::config::{ModelConfig, TargetConfig};
use super::pool::TensorPool;
use super::rotary;
use super::traits::CheckpointMapper;
use super::types::RemappedCheckpoint;

pub const VQ_EMBEDDING: &str = "embedding.vq_model.quantize.embedding.weight";
pub const EMBED_PROJ: &str = "embedding.embed_proj.weight";
pub const EMBED_TOKENS: &str = "model.embed_tokens.weight";

/// Renombres directos de tensores globales
const GLOBAL_RENAMES: &[(&str, &str)] = &[
    ("norm.weight", "model.norm.weight"),
    ("norm.bias", "model.norm.bias"),
    ("head.weight", "lm_head.weight"),
];

const ATTN_OUT_RENAMES: &[(&str, &str)] = &[
    ("mixer.out_proj.weight", "self_attn.o_proj.weight"),
    ("mixer.out_proj.bias", "self_attn.o_proj.bias"),
];

const MLP_RENAMES: &[(&str, &str)] = &[
    ("mlp.fc1.weight", "mlp.fc1.weight"),
    ("mlp.fc2.weight", "mlp.fc2.weight"),
];

const MLP_BIAS_RENAMES: &[(&str, &str)] = &[
    ("mlp.fc1.bias", "mlp.fc1.bias"),
    ("mlp.fc2.bias", "mlp.fc2.bias"),
];

const NORM_RENAMES: &[(&str, &str)] = &[
    ("norm1.weight", "input_layernorm.weight"),
    ("norm1.bias", "input_layernorm.bias"),
    ("norm2.weight", "post_attention_layernorm.weight"),
    ("norm2.bias", "post_attention_layernorm.bias"),
];

const ROTARY_SOURCE: &str = "mixer.rotary_emb.inv_freq";
const ROTARY_TARGET: &str = "self_attn.rotary_emb.inv_freq";

const QKV_PROJS: [&str; 3] = ["q", "k", "v"];

pub fn source_layer_name(layer: usize, suffix: &str) -> String {
    format!("blocks.{}.{}", layer, suffix)
}

pub fn target_layer_name(layer: usize, suffix: &str) -> String {
    format!("model.layers.{}.{}", layer, suffix)
}

pub struct VitMapper {
    config: ModelConfig,
}

impl VitMapper {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// ¿Algún bloque trae bias en el MLP? Se decide antes del bucle por capas.
    fn detect_mlp_bias(&self, pool: &TensorPool) -> bool {
        (0..self.config.num_layers)
            .any(|i| pool.contains(&source_layer_name(i, "mlp.fc1.bias")))
    }
}

/// Mueve `src` a `dst` sin transformar
fn rename(
    pool: &mut TensorPool,
    out: &mut BTreeMap<String, Tensor>,
    src: &str,
    dst: String,
) -> Result<()> {
    let tensor = pool.take(src)?;
    out.insert(dst, tensor);
    Ok(())
}

/// Parte un tensor QKV fusionado.
///
/// Pesos: [3, heads, -1, hidden] → 3 × [heads * head_dim, hidden]
/// Bias:  [3, heads, -1]         → 3 × [heads * head_dim]
pub fn split_fused_qkv(fused: Tensor, heads: usize, hidden: Option<usize>) -> Result<Vec<Tensor>> {
    let trailing = hidden.unwrap_or(1);
    let per_head = fused.numel() / (3 * heads * trailing);

    let mut logical = vec![3, heads, per_head];
    let mut flat = vec![heads * per_head];
    if let Some(h) = hidden {
        logical.push(h);
        flat.push(h);
    }

    fused
        .reshape(&logical)?
        .split_leading(3)?
        .into_iter()
        .map(|t| t.reshape(&flat))
        .collect()
}

impl CheckpointMapper for VitMapper {
    fn name(&self) -> &str {
        "internlm-vit"
    }

    fn num_layers(&self) -> usize {
        self.config.num_layers
    }

    fn remap(&self, state: MergedState) -> Result<RemappedCheckpoint> {
        self.config.validate()?;

        let c = &self.config;
        let heads = c.num_attention_heads;
        let hidden = c.hidden_size;

        let mut pool = TensorPool::new(state.into_tensors());
        let mut out = BTreeMap::new();

        // ═══════════════════════════════════════════════════════════════
        // EMBEDDING = codebook @ embed_proj^T
        // ═══════════════════════════════════════════════════════════════

        let codebook = pool.take(VQ_EMBEDDING)?;
        let embed_proj = pool.take(EMBED_PROJ)?;
        let embed_tokens = codebook.matmul_transposed(&embed_proj)?;
        debug!(
            "embed_tokens: {:?} @ {:?}^T -> {:?}",
            codebook.shape(),
            embed_proj.shape(),
            embed_tokens.shape()
        );
        out.insert(EMBED_TOKENS.to_string(), embed_tokens);

        // ═══════════════════════════════════════════════════════════════
        // NORM FINAL + HEAD
        // ═══════════════════════════════════════════════════════════════

        for (src, dst) in GLOBAL_RENAMES {
            rename(&mut pool, &mut out, src, dst.to_string())?;
        }

        // ═══════════════════════════════════════════════════════════════
        // CAPAS
        // ═══════════════════════════════════════════════════════════════

        let mlp_bias = self.detect_mlp_bias(&pool);
        let inv_freq = rotary::inv_freq_tensor(c.head_dim())?;

        for i in 0..c.num_layers {
            // La tabla RoPE se regenera desde config
            pool.take_if_present(&source_layer_name(i, ROTARY_SOURCE))?;

            // QKV fusionado
            let wqkv = pool.take(&source_layer_name(i, "mixer.Wqkv.weight"))?;
            let bqkv = pool.take(&source_layer_name(i, "mixer.Wqkv.bias"))?;
            let weights = split_fused_qkv(wqkv, heads, Some(hidden))?;
            let biases = split_fused_qkv(bqkv, heads, None)?;

            for ((proj, w), b) in QKV_PROJS.iter().zip(weights).zip(biases) {
                out.insert(target_layer_name(i, &format!("self_attn.{}_proj.weight", proj)), w);
                out.insert(target_layer_name(i, &format!("self_attn.{}_proj.bias", proj)), b);
            }

            for (src, dst) in ATTN_OUT_RENAMES.iter().chain(MLP_RENAMES) {
                rename(&mut pool, &mut out, &source_layer_name(i, src), target_layer_name(i, dst))?;
            }

            // fc1.bias presente ⇒ fc2.bias obligatorio
            if pool.contains(&source_layer_name(i, "mlp.fc1.bias")) {
                for (src, dst) in MLP_BIAS_RENAMES {
                    rename(&mut pool, &mut out, &source_layer_name(i, src), target_layer_name(i, dst))?;
                }
            }

            for (src, dst) in NORM_RENAMES {
                rename(&mut pool, &mut out, &source_layer_name(i, src), target_layer_name(i, dst))?;
            }

            out.insert(target_layer_name(i, ROTARY_TARGET), inv_freq.clone());

            debug!("layer {} remapped ({} source tensors consumed)", i, pool.consumed_count());
        }

        let consumed = pool.finish()?;
        let config = TargetConfig::derive(c, mlp_bias);

        info!(
            "Remapped {} source tensors into {} target tensors (mlp_bias={})",
            consumed,
            out.len(),
            mlp_bias
        );

        Ok(RemappedCheckpoint {
            tensors: out,
            config,
            consumed,
        })
    }
}
