// src/lib.rs
// ============================================================================
// INTERNLM-VIT-CONVERT - Checkpoint TP×PP de entrenamiento → HuggingFace
// ============================================================================

pub mod builder;
pub mod checkpoint;
pub mod error;
pub mod export;
pub mod mapping;
pub mod merge;
pub mod safetensor;
pub mod tensor;

// Re-exports principales
pub use builder::{convert_checkpoint, BuildStats};
pub use checkpoint::{Shard, TensorName};
pub use error::ConvertError;
pub use export::{patch_auto_map, save_pretrained, ExportOptions};
pub use mapping::{CheckpointMapper, ModelConfig, RemappedCheckpoint, TargetConfig, VitMapper};
pub use merge::{merge_partitions, merge_pipeline_stages, MergedState, PartitionGrid};
pub use safetensor::SafetensorFile;
pub use tensor::{Dtype, Tensor};
