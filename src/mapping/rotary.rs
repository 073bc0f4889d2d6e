// src/mapping/rotary.rs
// ============================================================================
// ROTARY - Tabla inv_freq de RoPE
// ============================================================================
//
// inv_freq[i] = 1 / base^(2i / head_dim),  i ∈ [0, head_dim/2)
// Se calcula en f32, igual que el runtime destino al recomputarla.
//
// ============================================================================

use crate::error::Result;
use crate::tensor::Tensor;

pub const ROPE_BASE: f32 = 10000.0;

pub fn inv_freq(head_dim: usize, base: f32) -> Vec<f32> {
    (0..head_dim)
        .step_by(2)
        .map(|i| 1.0 / base.powf(i as f32 / head_dim as f32))
        .collect()
}

/// Tabla como tensor F32 de forma [head_dim / 2]
pub fn inv_freq_tensor(head_dim: usize) -> Result<Tensor> {
    let table = inv_freq(head_dim, ROPE_BASE);
    Tensor::from_f32(vec![table.len()], &table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_entry_is_one() {
        for head_dim in [2, 16, 64, 128] {
            assert_eq!(inv_freq(head_dim, ROPE_BASE)[0], 1.0);
        }
    }

    #[test]
    fn test_length_and_decay() {
        let t = inv_freq(64, ROPE_BASE);
        assert_eq!(t.len(), 32);
        assert!(t.windows(2).all(|w| w[1] < w[0]));
        // i = 16 → 10000^(-0.5) = 0.01
        assert!((t[16] - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let a = inv_freq_tensor(128).unwrap();
        let b = inv_freq_tensor(128).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), &[64]);
    }
}
