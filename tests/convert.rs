// tests/convert.rs
// ============================================================================
// Conversión completa sobre un checkpoint sintético (1 TP × 2 PP, 2+2 capas)
// ============================================================================

use std::path::Path;

use internlm_vit_convert::export::{ExportOptions, CONFIG_JSON, INDEX_JSON, SINGLE_SHARD};
use internlm_vit_convert::safetensor::write_safetensors;
use internlm_vit_convert::{convert_checkpoint, Dtype, SafetensorFile, Tensor};
use serde_json::Value;

const HIDDEN: usize = 8;
const HEADS: usize = 2;
const VOCAB: usize = 6;
const CODEBOOK: usize = 4;
const FFN: usize = 16;
const LAYERS_PER_STAGE: usize = 2;

fn filled(shape: Vec<usize>, value: f32) -> Tensor {
    let n: usize = shape.iter().product();
    Tensor::from_f32(shape, &vec![value; n]).unwrap()
}

/// Tensores de una capa; todos llevan el índice global esperado como valor
fn layer_tensors(local: usize, global: usize, mlp_bias: bool) -> Vec<(String, Tensor)> {
    let v = global as f32;
    let name = |suffix: &str| format!("model.blocks.{}.{}", local, suffix);
    let mut out = vec![
        (name("mixer.Wqkv.weight"), filled(vec![3 * HIDDEN, HIDDEN], v)),
        (name("mixer.Wqkv.bias"), filled(vec![3 * HIDDEN], v)),
        (name("mixer.out_proj.weight"), filled(vec![HIDDEN, HIDDEN], v)),
        (name("mixer.out_proj.bias"), filled(vec![HIDDEN], v)),
        (name("mixer.rotary_emb.inv_freq"), filled(vec![HIDDEN / HEADS / 2], 7.0)),
        (name("mlp.fc1.weight"), filled(vec![FFN, HIDDEN], v)),
        (name("mlp.fc2.weight"), filled(vec![HIDDEN, FFN], v)),
        (name("norm1.weight"), filled(vec![HIDDEN], v)),
        (name("norm1.bias"), filled(vec![HIDDEN], v)),
        (name("norm2.weight"), filled(vec![HIDDEN], v)),
        (name("norm2.bias"), filled(vec![HIDDEN], v)),
    ];
    if mlp_bias {
        out.push((name("mlp.fc1.bias"), filled(vec![FFN], v)));
        out.push((name("mlp.fc2.bias"), filled(vec![HIDDEN], v)));
    }
    out
}

fn write_stage(folder: &Path, pp: usize, tensors: &[(String, Tensor)]) {
    let refs: Vec<(&str, &Tensor)> = tensors.iter().map(|(n, t)| (n.as_str(), t)).collect();
    write_safetensors(&folder.join(format!("model_tp0_pp{}.safetensors", pp)), &refs, None).unwrap();
}

fn write_source(folder: &Path, vocab_size: i64, mlp_bias: bool) {
    std::fs::write(
        folder.join("model_config.json"),
        format!(
            r#"{{"hidden_size": {}, "num_attention_heads": {}, "num_layers": {}, "mlp_ratio": 2.0, "vocab_size": {}}}"#,
            HIDDEN,
            HEADS,
            2 * LAYERS_PER_STAGE,
            vocab_size
        ),
    )
    .unwrap();

    let mut stage0 = vec![
        (
            "model.embedding.vq_model.quantize.embedding.weight".to_string(),
            filled(vec![VOCAB, CODEBOOK], 1.0),
        ),
        ("model.embedding.embed_proj.weight".to_string(), filled(vec![HIDDEN, CODEBOOK], 0.5)),
    ];
    for local in 0..LAYERS_PER_STAGE {
        stage0.extend(layer_tensors(local, local, mlp_bias));
    }

    let mut stage1 = Vec::new();
    for local in 0..LAYERS_PER_STAGE {
        stage1.extend(layer_tensors(local, LAYERS_PER_STAGE + local, mlp_bias));
    }
    stage1.push(("model.norm.weight".to_string(), filled(vec![HIDDEN], 1.0)));
    stage1.push(("model.norm.bias".to_string(), filled(vec![HIDDEN], 0.0)));
    stage1.push(("model.head.weight".to_string(), filled(vec![VOCAB, HIDDEN], 0.25)));

    write_stage(folder, 0, &stage0);
    write_stage(folder, 1, &stage1);

    // Ruido que el descubrimiento debe ignorar
    std::fs::write(folder.join("model_tp0_pp0.safetensors.md5"), b"x").unwrap();
    std::fs::write(folder.join("model_tx.txt"), b"x").unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_end_to_end_single_shard() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_source(src.path(), 1234, false);

    let stats = convert_checkpoint(src.path(), dst.path(), &ExportOptions::default()).unwrap();
    assert_eq!(stats.tp_size, 1);
    assert_eq!(stats.pp_size, 2);
    assert_eq!(stats.shards, 1);
    assert!(!stats.mlp_bias);
    // Todo llega en F32 y sale en F16
    assert_eq!(stats.remapped_bytes, 2 * stats.total_bytes);
    // 4 globales + 15 por capa
    assert_eq!(stats.target_tensors, 4 + 15 * 4);

    let config = read_json(&dst.path().join(CONFIG_JSON));
    assert_eq!(config["auto_map"]["AutoModel"], "modeling_vit.InternLMForCausalLM");
    assert_eq!(config["num_hidden_layers"], 4);
    assert_eq!(config["intermediate_size"], 16);
    assert_eq!(config["vocab_size"], 1234);
    assert_eq!(config["mlp_bias"], false);
    assert_eq!(config["bias"], true);
    assert_eq!(config["torch_dtype"], "float16");

    let file = SafetensorFile::open(dst.path().join(SINGLE_SHARD)).unwrap();

    // Capa local 0 de la etapa 1 → capa global 2
    for global in 0..4 {
        let q = file
            .read_tensor(&format!("model.layers.{}.self_attn.q_proj.weight", global))
            .unwrap();
        assert_eq!(q.dtype(), Dtype::F16);
        assert_eq!(q.shape(), &[HIDDEN, HIDDEN]);
        assert!(q.to_values().iter().all(|&x| x == global as f64));
    }

    let embed = file.read_tensor("model.embed_tokens.weight").unwrap();
    assert_eq!(embed.shape(), &[VOCAB, HIDDEN]);
    // 4 × (1.0 × 0.5)
    assert!(embed.to_values().iter().all(|&x| x == 2.0));

    let inv_freq = file.read_tensor("model.layers.3.self_attn.rotary_emb.inv_freq").unwrap();
    assert_eq!(inv_freq.to_values()[0], 1.0);

    assert!(file.read_tensor("model.layers.0.mlp.fc1.bias").is_err());
    assert!(file.read_tensor("model.layers.4.self_attn.q_proj.weight").is_err());
}

#[test]
fn test_end_to_end_sharded_with_mlp_bias() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_source(src.path(), -1, true);

    let options = ExportOptions {
        max_shard_size: 1024,
        dtype: None,
        progress: false,
    };
    let stats = convert_checkpoint(src.path(), dst.path(), &options).unwrap();
    assert!(stats.mlp_bias);
    assert!(stats.shards > 1);
    assert_eq!(stats.remapped_bytes, stats.total_bytes);

    let config = read_json(&dst.path().join(CONFIG_JSON));
    assert_eq!(config["vocab_size"], 103168);
    assert_eq!(config["mlp_bias"], true);
    assert_eq!(config["torch_dtype"], "float32");

    let index = read_json(&dst.path().join(INDEX_JSON));
    let shard = index["weight_map"]["model.layers.2.mlp.fc1.bias"].as_str().unwrap();
    let file = SafetensorFile::open(dst.path().join(shard)).unwrap();
    let bias = file.read_tensor("model.layers.2.mlp.fc1.bias").unwrap();
    assert_eq!(bias.dtype(), Dtype::F32);
    assert!(bias.to_values().iter().all(|&x| x == 2.0));
}

#[test]
fn test_missing_tensor_leaves_no_output() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_source(src.path(), -1, false);

    // Sin la etapa 1 faltan norm/head y las capas 2-3
    std::fs::remove_file(src.path().join("model_tp0_pp1.safetensors")).unwrap();

    let err = convert_checkpoint(src.path(), dst.path(), &ExportOptions::default()).unwrap_err();
    assert!(format!("{:#}", err).contains("missing tensor"));
    assert!(!dst.path().join(CONFIG_JSON).exists());
}
