// src/safetensor/writer.rs
// ============================================================================
// SAFETENSOR WRITER - Serializa tensores a un archivo .safetensors
// ============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use safetensors::tensor::{serialize_to_file, TensorView};

use crate::tensor::Tensor;

/// Escribe `tensors` en `path`. El crate safetensors ordena y alinea el header.
pub fn write_safetensors(
    path: &Path,
    tensors: &[(&str, &Tensor)],
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let views: Vec<(&str, TensorView<'_>)> = tensors
        .iter()
        .map(|(name, t)| {
            let view = TensorView::new(t.dtype().to_safetensors(), t.shape().to_vec(), t.data())
                .map_err(|e| anyhow!("TensorView {}: {}", name, e))?;
            Ok((*name, view))
        })
        .collect::<Result<_>>()?;

    serialize_to_file(views, metadata, path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
