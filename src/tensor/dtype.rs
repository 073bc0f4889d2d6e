// src/tensor/dtype.rs
// ============================================================================
// DTYPE - Tipos de elemento soportados
// ============================================================================

use half::{bf16, f16};

/// Tipo de elemento de un tensor (little-endian en memoria y en disco)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    F16,
    BF16,
    F32,
    F64,
}

impl Dtype {
    /// Parsea el dtype tal como aparece en la cabecera safetensors
    pub fn from_safetensors(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "F16" => Some(Self::F16),
            "BF16" => Some(Self::BF16),
            "F32" => Some(Self::F32),
            "F64" => Some(Self::F64),
            _ => None,
        }
    }

    /// Parsea el nombre estilo torch ("float16", "bfloat16", ...)
    pub fn from_torch_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "float16" | "fp16" | "half" => Some(Self::F16),
            "bfloat16" | "bf16" => Some(Self::BF16),
            "float32" | "fp32" | "float" => Some(Self::F32),
            "float64" | "fp64" | "double" => Some(Self::F64),
            _ => None,
        }
    }

    /// Bytes por elemento
    pub fn size(&self) -> usize {
        match self {
            Self::F16 | Self::BF16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F16 => "F16",
            Self::BF16 => "BF16",
            Self::F32 => "F32",
            Self::F64 => "F64",
        }
    }

    /// Nombre para `torch_dtype` en config.json
    pub fn torch_name(&self) -> &'static str {
        match self {
            Self::F16 => "float16",
            Self::BF16 => "bfloat16",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    pub fn to_safetensors(&self) -> safetensors::Dtype {
        match self {
            Self::F16 => safetensors::Dtype::F16,
            Self::BF16 => safetensors::Dtype::BF16,
            Self::F32 => safetensors::Dtype::F32,
            Self::F64 => safetensors::Dtype::F64,
        }
    }

    /// Decodifica un elemento desde sus bytes little-endian
    #[inline]
    pub(crate) fn decode(&self, b: &[u8]) -> f64 {
        match self {
            Self::F16 => f16::from_le_bytes([b[0], b[1]]).to_f64(),
            Self::BF16 => bf16::from_le_bytes([b[0], b[1]]).to_f64(),
            Self::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Self::F64 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        }
    }

    /// Codifica un elemento en `dst` (len == self.size())
    #[inline]
    pub(crate) fn encode_into(&self, value: f64, dst: &mut [u8]) {
        match self {
            Self::F16 => dst.copy_from_slice(&f16::from_f64(value).to_le_bytes()),
            Self::BF16 => dst.copy_from_slice(&bf16::from_f64(value).to_le_bytes()),
            Self::F32 => dst.copy_from_slice(&(value as f32).to_le_bytes()),
            Self::F64 => dst.copy_from_slice(&value.to_le_bytes()),
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
