// src/tensor/mod.rs
// ============================================================================
// TENSOR - Valor n-dimensional en memoria + operaciones del remapeo
// ============================================================================
//
// Los datos se guardan como bytes little-endian en el dtype original.
// reshape/split/stack solo mueven bytes: conservan el dtype bit a bit.
// matmul y cast pasan por f64 y vuelven a codificar en el dtype destino.
//
// ============================================================================

pub mod dtype;

pub use dtype::Dtype;

use rayon::prelude::*;

use crate::error::{ConvertError, Result};

/// Tensor denso contiguo (row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: Dtype,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Tensor {
    /// Crea un tensor validando que los bytes cuadran con shape × dtype
    pub fn new(dtype: Dtype, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel * dtype.size() {
            return Err(ConvertError::ShapeMismatch {
                op: "new",
                expected: format!("{} bytes", numel * dtype.size()),
                actual: shape,
            });
        }
        Ok(Self { dtype, shape, data })
    }

    /// Construye un tensor desde valores f64 codificándolos en `dtype`
    pub fn from_values(dtype: Dtype, shape: Vec<usize>, values: &[f64]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if values.len() != numel {
            return Err(ConvertError::ShapeMismatch {
                op: "from_values",
                expected: format!("{} elements", values.len()),
                actual: shape,
            });
        }
        Ok(Self {
            dtype,
            shape,
            data: encode_all(dtype, values),
        })
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if values.len() != numel {
            return Err(ConvertError::ShapeMismatch {
                op: "from_f32",
                expected: format!("{} elements", values.len()),
                actual: shape,
            });
        }
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Self { dtype: Dtype::F32, shape, data })
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Decodifica todos los elementos a f64
    pub fn to_values(&self) -> Vec<f64> {
        self.data
            .chunks_exact(self.dtype.size())
            .map(|b| self.dtype.decode(b))
            .collect()
    }

    /// Reinterpreta la forma. El número de elementos debe coincidir.
    pub fn reshape(mut self, shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != self.numel() {
            return Err(ConvertError::ShapeMismatch {
                op: "reshape",
                expected: format!("{:?}", shape),
                actual: self.shape,
            });
        }
        self.shape = shape.to_vec();
        Ok(self)
    }

    /// Parte el tensor en `parts` trozos a lo largo del eje 0 (que debe medir `parts`)
    pub fn split_leading(&self, parts: usize) -> Result<Vec<Tensor>> {
        if parts == 0 || self.shape.first() != Some(&parts) {
            return Err(ConvertError::ShapeMismatch {
                op: "split_leading",
                expected: format!("leading axis of size {}", parts),
                actual: self.shape.clone(),
            });
        }

        let chunk = self.data.len() / parts;
        let rest = self.shape[1..].to_vec();

        Ok((0..parts)
            .map(|i| Tensor {
                dtype: self.dtype,
                shape: rest.clone(),
                data: self.data[i * chunk..(i + 1) * chunk].to_vec(),
            })
            .collect())
    }

    /// Apila tensores de igual forma y dtype sobre un nuevo eje 0
    pub fn stack(tensors: &[Tensor]) -> Result<Tensor> {
        let first = tensors.first().ok_or(ConvertError::ShapeMismatch {
            op: "stack",
            expected: "at least one tensor".to_string(),
            actual: Vec::new(),
        })?;

        for t in &tensors[1..] {
            if t.dtype != first.dtype {
                return Err(ConvertError::DtypeMismatch {
                    op: "stack",
                    left: first.dtype.to_string(),
                    right: t.dtype.to_string(),
                });
            }
            if t.shape != first.shape {
                return Err(ConvertError::ShapeMismatch {
                    op: "stack",
                    expected: format!("{:?}", first.shape),
                    actual: t.shape.clone(),
                });
            }
        }

        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);

        let data = tensors.iter().flat_map(|t| t.data.iter().copied()).collect();
        Ok(Tensor { dtype: first.dtype, shape, data })
    }

    /// `self @ rhs^T`: [V, C] × [H, C] -> [V, H], en el dtype de `self`
    pub fn matmul_transposed(&self, rhs: &Tensor) -> Result<Tensor> {
        if self.dtype != rhs.dtype {
            return Err(ConvertError::DtypeMismatch {
                op: "matmul",
                left: self.dtype.to_string(),
                right: rhs.dtype.to_string(),
            });
        }
        let (rows, inner) = match self.shape.as_slice() {
            [r, c] => (*r, *c),
            _ => {
                return Err(ConvertError::ShapeMismatch {
                    op: "matmul",
                    expected: "2-D left operand".to_string(),
                    actual: self.shape.clone(),
                })
            }
        };
        let cols = match rhs.shape.as_slice() {
            [h, c] if *c == inner => *h,
            _ => {
                return Err(ConvertError::ShapeMismatch {
                    op: "matmul",
                    expected: format!("[_, {}] right operand", inner),
                    actual: rhs.shape.clone(),
                })
            }
        };

        let a = self.to_values();
        let b = rhs.to_values();
        let mut out = vec![0.0f64; rows * cols];

        if cols > 0 {
            out.par_chunks_mut(cols).enumerate().for_each(|(v, row)| {
                let a_row = &a[v * inner..(v + 1) * inner];
                for (h, dst) in row.iter_mut().enumerate() {
                    let b_row = &b[h * inner..(h + 1) * inner];
                    *dst = a_row.iter().zip(b_row).map(|(x, y)| x * y).sum();
                }
            });
        }

        Tensor::from_values(self.dtype, vec![rows, cols], &out)
    }

    /// Convierte al dtype pedido (no-op si ya lo es)
    pub fn cast(self, dtype: Dtype) -> Tensor {
        if self.dtype == dtype {
            return self;
        }
        let values = self.to_values();
        Tensor {
            dtype,
            shape: self.shape,
            data: encode_all(dtype, &values),
        }
    }
}

fn encode_all(dtype: Dtype, values: &[f64]) -> Vec<u8> {
    let size = dtype.size();
    let mut data = vec![0u8; values.len() * size];
    data.par_chunks_mut(size)
        .zip(values.par_iter())
        .for_each(|(dst, &v)| dtype.encode_into(v, dst));
    data
}
