// src/mapping/config.rs
// ============================================================================
// CONFIG - Configuración de origen (InternLM-ViT) y destino (HF InternLM)
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Vocabulario por defecto del formato destino
pub const DEFAULT_VOCAB_SIZE: usize = 103168;

/// Valor centinela de `vocab_size` en origen: "usar el default del destino"
pub const VOCAB_SIZE_UNSET: i64 = -1;

/// Epsilon fijo de las normas en destino
pub const NORM_EPS: f64 = 1e-6;

/// Clase que el hook de post-proceso escribe en `auto_map.AutoModel`
pub const AUTO_MODEL_CLASS: &str = "modeling_vit.InternLMForCausalLM";

/// Configuración del checkpoint de entrenamiento (model_config.json)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_attention_heads: usize,
    pub num_layers: usize,
    pub mlp_ratio: f64,
    pub vocab_size: i64,
}

impl ModelConfig {
    /// Dimensión por cabeza. No se comprueba que la división sea exacta.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Rechaza dimensiones a cero y vocabularios negativos distintos de -1
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 || self.num_attention_heads == 0 {
            return Err(ConvertError::InvalidConfig(format!(
                "hidden_size={} num_attention_heads={}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.vocab_size < 0 && self.vocab_size != VOCAB_SIZE_UNSET {
            return Err(ConvertError::InvalidConfig(format!(
                "vocab_size={} (expected >= 0 or {})",
                self.vocab_size, VOCAB_SIZE_UNSET
            )));
        }
        Ok(())
    }
}

/// config.json del checkpoint destino
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub architectures: Vec<String>,
    pub model_type: String,
    pub auto_map: BTreeMap<String, String>,
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub num_attention_heads: usize,
    pub num_hidden_layers: usize,
    pub bias: bool,
    pub mlp_bias: bool,
    pub norm_eps: f64,
    pub vocab_size: usize,
    pub hidden_act: String,
    pub max_position_embeddings: usize,
    pub initializer_range: f64,
    pub use_cache: bool,
    pub pad_token_id: u32,
    pub bos_token_id: u32,
    pub eos_token_id: u32,
    pub tie_word_embeddings: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torch_dtype: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        // auto_map.AutoModel lo añade el hook de post-proceso
        let auto_map = BTreeMap::from([
            ("AutoConfig".to_string(), "modeling_vit.InternLMConfig".to_string()),
            ("AutoModelForCausalLM".to_string(), "modeling_vit.InternLMForCausalLM".to_string()),
        ]);

        Self {
            architectures: vec!["InternLMForCausalLM".to_string()],
            model_type: "internlm".to_string(),
            auto_map,
            hidden_size: 4096,
            intermediate_size: 11008,
            num_attention_heads: 32,
            num_hidden_layers: 32,
            bias: true,
            mlp_bias: false,
            norm_eps: NORM_EPS,
            vocab_size: DEFAULT_VOCAB_SIZE,
            hidden_act: "silu".to_string(),
            max_position_embeddings: 2048,
            initializer_range: 0.02,
            use_cache: true,
            pad_token_id: 0,
            bos_token_id: 1,
            eos_token_id: 2,
            tie_word_embeddings: false,
            torch_dtype: None,
        }
    }
}

impl TargetConfig {
    /// Deriva la configuración destino. `mlp_bias` viene de los datos, no del origen.
    pub fn derive(source: &ModelConfig, mlp_bias: bool) -> Self {
        let mut config = Self {
            hidden_size: source.hidden_size,
            intermediate_size: (source.hidden_size as f64 * source.mlp_ratio).round() as usize,
            num_attention_heads: source.num_attention_heads,
            num_hidden_layers: source.num_layers,
            bias: true,
            mlp_bias,
            norm_eps: NORM_EPS,
            ..Self::default()
        };

        // -1 (y cualquier negativo que no pasó validate) conserva el default
        if let Ok(vocab_size) = usize::try_from(source.vocab_size) {
            config.vocab_size = vocab_size;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(vocab_size: i64) -> ModelConfig {
        ModelConfig {
            hidden_size: 1024,
            num_attention_heads: 16,
            num_layers: 24,
            mlp_ratio: 2.6875,
            vocab_size,
        }
    }

    #[test]
    fn test_derive_dimensions() {
        let cfg = TargetConfig::derive(&source(16384), true);
        assert_eq!(cfg.hidden_size, 1024);
        assert_eq!(cfg.intermediate_size, 2752);
        assert_eq!(cfg.num_attention_heads, 16);
        assert_eq!(cfg.num_hidden_layers, 24);
        assert!(cfg.bias);
        assert!(cfg.mlp_bias);
        assert_eq!(cfg.norm_eps, 1e-6);
        assert_eq!(cfg.vocab_size, 16384);
    }

    #[test]
    fn test_intermediate_size_rounds() {
        let mut src = source(-1);
        src.hidden_size = 10;
        src.mlp_ratio = 2.66;
        assert_eq!(TargetConfig::derive(&src, false).intermediate_size, 27);
    }

    #[test]
    fn test_vocab_sentinel_keeps_default() {
        let cfg = TargetConfig::derive(&source(VOCAB_SIZE_UNSET), false);
        assert_eq!(cfg.vocab_size, DEFAULT_VOCAB_SIZE);
        assert!(!cfg.mlp_bias);
    }

    #[test]
    fn test_negative_vocab_is_invalid() {
        assert!(source(VOCAB_SIZE_UNSET).validate().is_ok());
        assert!(source(0).validate().is_ok());
        assert!(matches!(source(-2).validate(), Err(ConvertError::InvalidConfig(_))));
        assert!(matches!(source(i64::MIN).validate(), Err(ConvertError::InvalidConfig(_))));

        // Sin validar, un negativo nunca se convierte en un usize enorme
        assert_eq!(TargetConfig::derive(&source(-7), false).vocab_size, DEFAULT_VOCAB_SIZE);
    }

    #[test]
    fn test_zero_dimensions_are_invalid() {
        let mut src = source(-1);
        src.num_attention_heads = 0;
        assert!(matches!(src.validate(), Err(ConvertError::InvalidConfig(_))));
    }

    #[test]
    fn test_model_config_from_json() {
        let json = r#"{"hidden_size": 64, "num_attention_heads": 4, "num_layers": 2,
                       "mlp_ratio": 4.0, "vocab_size": -1, "dtype": "torch.bfloat16"}"#;
        let cfg: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.head_dim(), 16);
        assert_eq!(cfg.vocab_size, -1);

        let missing = r#"{"hidden_size": 64}"#;
        assert!(serde_json::from_str::<ModelConfig>(missing).is_err());
    }

    #[test]
    fn test_target_config_json_has_no_auto_model() {
        let value = serde_json::to_value(TargetConfig::default()).unwrap();
        assert!(value["auto_map"].get("AutoModel").is_none());
        assert!(value.get("torch_dtype").is_none());
        assert_eq!(value["architectures"][0], "InternLMForCausalLM");
    }
}
