// src/error.rs
// ============================================================================
// ERRORES - Taxonomía de fallos de la conversión
// ============================================================================
//
// El núcleo (merge + remap + tensor) devuelve ConvertError.
// La capa de I/O (lectura, exportación, CLI) usa anyhow con contexto.
//
// ============================================================================

use thiserror::Error;

/// Errores del núcleo de conversión
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Un tensor esperado no existe en el estado fusionado
    #[error("missing tensor '{0}'")]
    MissingTensor(String),

    /// El mismo tensor se consumió dos veces
    #[error("tensor '{0}' was already consumed")]
    AlreadyConsumed(String),

    /// Tensores de origen que ningún paso del remapeo consumió
    #[error("{} source tensor(s) were never consumed: {}", .0.len(), .0.join(", "))]
    UnconsumedTensors(Vec<String>),

    /// Reshape/split/matmul con dimensiones incompatibles
    #[error("shape mismatch in {op}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: Vec<usize>,
    },

    /// Operación binaria entre tensores de dtype distinto
    #[error("dtype mismatch in {op}: {left} vs {right}")]
    DtypeMismatch {
        op: &'static str,
        left: String,
        right: String,
    },

    /// Configuración de modelo inutilizable (dimensiones a cero)
    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),

    #[error("invalid size '{0}' (expected e.g. 20GB, 500MB, 2GiB)")]
    InvalidSize(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
