// src/mapping/mod.rs
// ============================================================================
// MAPPING - Remapeo de tensores al formato HuggingFace
// ============================================================================

pub mod config;
pub mod pool;
pub mod rotary;
pub mod traits;
pub mod types;
pub mod vit;

// Re-exports
pub use config::{ModelConfig, TargetConfig, AUTO_MODEL_CLASS};
pub use pool::TensorPool;
pub use traits::CheckpointMapper;
pub use types::RemappedCheckpoint;
pub use vit::VitMapper;
