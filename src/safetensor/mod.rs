// src/safetensor/mod.rs
// ============================================================================
// SAFETENSOR - Lectura (mmap) y escritura de archivos .safetensors
// ============================================================================

pub mod writer;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use serde::Deserialize;

use crate::error::ConvertError;
use crate::tensor::{Dtype, Tensor};

pub use writer::write_safetensors;

/// Información de un tensor en el archivo safetensor
#[derive(Debug, Clone, Deserialize)]
pub struct TensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: [usize; 2],
}

/// Header del archivo safetensor
#[derive(Debug, Deserialize)]
pub struct SafetensorHeader {
    #[serde(flatten)]
    pub tensors: HashMap<String, TensorInfo>,
    #[serde(rename = "__metadata__")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Archivo safetensor abierto
#[derive(Debug)]
pub struct SafetensorFile {
    pub path: PathBuf,
    pub header: SafetensorHeader,
    pub header_size: usize,
    mmap: Mmap,
}

impl SafetensorFile {
    /// Abre un archivo safetensor
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("Cannot open {}", path.display()))?;

        let file_len = file.metadata()?.len();

        // Tamaño del header: primeros 8 bytes, u64 little-endian
        let mut reader = BufReader::new(&file);
        let header_len = reader.read_u64::<LittleEndian>()
            .with_context(|| format!("Truncated safetensor file {}", path.display()))?;

        if header_len > file_len.saturating_sub(8) {
            return Err(anyhow!(
                "Header length {} exceeds file size {} in {}",
                header_len,
                file_len,
                path.display()
            ));
        }
        let header_size = usize::try_from(header_len)?;

        let mut header_bytes = vec![0u8; header_size];
        reader.read_exact(&mut header_bytes)?;

        let header: SafetensorHeader = serde_json::from_slice(&header_bytes)
            .with_context(|| format!("Invalid safetensor header JSON in {}", path.display()))?;

        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self {
            path,
            header,
            header_size: 8 + header_size,
            mmap,
        })
    }

    /// Nombres de tensores en orden de aparición en disco
    pub fn tensor_names(&self) -> Vec<&str> {
        let mut entries: Vec<(&String, &TensorInfo)> = self.header.tensors.iter().collect();
        entries.sort_by_key(|(_, info)| info.data_offsets[0]);
        entries.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn tensor_info(&self, name: &str) -> Option<&TensorInfo> {
        self.header.tensors.get(name)
    }

    /// Lee un tensor como bytes raw
    pub fn read_raw(&self, name: &str) -> Result<&[u8]> {
        let info = self.header.tensors.get(name)
            .ok_or_else(|| anyhow!("Tensor '{}' not found in {}", name, self.path.display()))?;

        let [begin, end] = info.data_offsets;
        let (Some(start), Some(end)) = (
            self.header_size.checked_add(begin),
            self.header_size.checked_add(end),
        ) else {
            return Err(anyhow!("Tensor '{}' has invalid offsets in {}", name, self.path.display()));
        };

        // get(start..end) devuelve None si start > end o end > len
        self.mmap.get(start..end)
            .ok_or_else(|| anyhow!("Tensor '{}' out of bounds in {}", name, self.path.display()))
    }

    /// Copia un tensor a memoria conservando su dtype
    pub fn read_tensor(&self, name: &str) -> Result<Tensor> {
        let info = self.tensor_info(name)
            .ok_or_else(|| anyhow!("Tensor '{}' not found in {}", name, self.path.display()))?;
        let dtype = Dtype::from_safetensors(&info.dtype)
            .ok_or_else(|| ConvertError::UnsupportedDtype(format!("{} ({})", info.dtype, name)))?;
        let data = self.read_raw(name)?;

        Ok(Tensor::new(dtype, info.shape.clone(), data.to_vec())
            .with_context(|| format!("Corrupt tensor '{}' in {}", name, self.path.display()))?)
    }

    /// Carga todos los tensores del archivo (orden de disco)
    pub fn read_all(&self) -> Result<Vec<(String, Tensor)>> {
        self.tensor_names()
            .into_iter()
            .map(|name| Ok((name.to_string(), self.read_tensor(name)?)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.header.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.tensors.is_empty()
    }
}
