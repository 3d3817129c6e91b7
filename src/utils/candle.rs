// src/utils/candle.rs - Candle-backed cosine similarity for context
// embeddings.

use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Tensor};
use once_cell::sync::Lazy;

use crate::store::MatchingError;

// One Device instance for the whole process. Embedding vectors here are short
// (sentence-embedding sized), so the CPU device is the right default; swapping
// in an accelerator only requires changing this initializer.
static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| Device::Cpu);

fn cosine_similarity_with_device(
    v1_slice: &[f32],
    v2_slice: &[f32],
    device: &Device,
) -> AnyhowResult<f64> {
    if v1_slice.len() != v2_slice.len() {
        anyhow::bail!(
            "Input vector lengths differ: {} vs {}",
            v1_slice.len(),
            v2_slice.len()
        );
    }
    if v1_slice.is_empty() {
        anyhow::bail!("Input vectors must not be empty");
    }

    let v1 = Tensor::from_slice(v1_slice, (v1_slice.len(),), device)
        .with_context(|| format!("Failed to create tensor from slice with len {}", v1_slice.len()))?;
    let v2 = Tensor::from_slice(v2_slice, (v2_slice.len(),), device)
        .with_context(|| format!("Failed to create tensor from slice with len {}", v2_slice.len()))?;

    let dot = (&v1 * &v2)?.sum_all()?.to_scalar::<f32>()? as f64;
    let norm1 = (&v1 * &v1)?.sum_all()?.to_scalar::<f32>()?.sqrt() as f64;
    let norm2 = (&v2 * &v2)?.sum_all()?.to_scalar::<f32>()?.sqrt() as f64;

    if norm1 == 0.0 || norm2 == 0.0 {
        anyhow::bail!("Cannot compute cosine similarity for a zero-magnitude vector");
    }

    Ok(dot / (norm1 * norm2))
}

/// Cosine similarity between two embedding vectors, in [-1, 1]. Errors on
/// mismatched lengths or zero-magnitude inputs; the engine treats those as
/// per-pair failures.
pub fn cosine_similarity_candle(v1: &[f32], v2: &[f32]) -> Result<f64, MatchingError> {
    cosine_similarity_with_device(v1, v2, &CANDLE_DEVICE).map_err(MatchingError::Storage)
}
