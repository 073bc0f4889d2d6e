// src/main.rs
// ============================================================================
// INTERNLM-VIT-CONVERT CLI
// ============================================================================
//
// Uso:
//   internlm-vit-convert ./internlm_ckpt ./hf_model
//
// Opcional:
//   --max-shard-size 5GB     tope por shard (default 20GB)
//   --dtype bfloat16         dtype de salida (default float16, "keep" = sin cast)
//
// ============================================================================

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use internlm_vit_convert::{
    builder::convert_checkpoint,
    export::{parse_size, ExportOptions, DEFAULT_MAX_SHARD_SIZE},
    tensor::Dtype,
};

#[derive(Parser, Debug)]
#[command(name = "internlm-vit-convert")]
#[command(about = "Convert a sharded InternLM-ViT training checkpoint to HuggingFace format")]
#[command(version)]
struct Args {
    /// Source folder (model_config.json + model_tp<T>_pp<P>.safetensors)
    #[arg(value_name = "SRC_FOLDER")]
    src_folder: PathBuf,

    /// Target HuggingFace model folder
    #[arg(value_name = "TGT_FOLDER")]
    tgt_folder: PathBuf,

    /// Maximum payload size per output shard
    #[arg(long, default_value = DEFAULT_MAX_SHARD_SIZE)]
    max_shard_size: String,

    /// Output dtype (float16, bfloat16, float32, keep)
    #[arg(long, default_value = "float16")]
    dtype: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let start = Instant::now();

    let max_shard_size = parse_size(&args.max_shard_size)?;
    let dtype = match args.dtype.as_str() {
        "keep" => None,
        name => Some(
            Dtype::from_torch_name(name)
                .ok_or_else(|| anyhow::anyhow!("Invalid dtype: {}", name))?,
        ),
    };

    let options = ExportOptions {
        max_shard_size,
        dtype,
        progress: true,
    };

    println!("═══════════════════════════════════════════════════════════════");
    println!("  INTERNLM-VIT CONVERTER v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Source:     {}", args.src_folder.display());
    println!("  Target:     {}", args.tgt_folder.display());
    println!("  Max shard:  {}", args.max_shard_size);
    println!("  Dtype:      {}", dtype.map_or("keep", |d| d.torch_name()));
    println!("═══════════════════════════════════════════════════════════════");

    let stats = convert_checkpoint(&args.src_folder, &args.tgt_folder, &options)?;

    let elapsed = start.elapsed();

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("  CONVERSION COMPLETE");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Time:       {:.1}s", elapsed.as_secs_f64());
    println!("  Partitions: tp={} pp={}", stats.tp_size, stats.pp_size);
    println!("  Tensors:    {} source → {} merged → {} target",
        stats.source_tensors, stats.merged_tensors, stats.target_tensors);
    println!("  MLP bias:   {}", stats.mlp_bias);
    println!("  Shards:     {}", stats.shards);
    println!("  Size:       {:.1} MB", stats.total_bytes as f64 / 1024.0 / 1024.0);
    println!("  Output:     {}", args.tgt_folder.display());
    println!("═══════════════════════════════════════════════════════════════");

    Ok(())
}
