// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All neural components of the tagger. Data-pipeline code
// hands this layer an NerBatch; it hands back a loss tensor
// or a Prediction.
//
//   embedder.rs   - transformer over subwords, pooled to words
//   gcn.rs        - dependency-labeled graph convolution
//   encoder.rs    - BiLSTM or linear emission scorer
//   crf.rs        - linear-chain CRF: forward algorithm, Viterbi
//   span.rs       - endpoint and self-attentive span extractors
//   classifier.rs - span label classifier and masked span loss
//   model.rs      - wires the above by DepModel × ParserMode
//
// Reference: Burn Book §3 (Building Blocks)
//            Devlin et al. (2019) BERT

use burn::prelude::*;

use crate::error::{NerError, Result};

/// Transformer encoder over subwords, pooled to one vector per word
pub mod embedder;

/// Graph convolution over the dependency parse
pub mod gcn;

/// BiLSTM / linear emission scorer
pub mod encoder;

/// Linear-chain CRF
pub mod crf;

/// Span representations
pub mod span;

/// Span label classifier and loss
pub mod classifier;

/// Top-level NER model
pub mod model;

/// Copy a float tensor back to the host, row-major
pub(crate) fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NerError::TensorData(format!("{e:?}")))
}
