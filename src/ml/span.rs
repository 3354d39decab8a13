// ============================================================
// Layer 5 - Span Extractors
// ============================================================
// Candidate span (start, end) + word vectors → span vector.
//
// EndpointSpanExtractor
//   combination "x,y" over the start (x) and end (y) vectors,
//   plus a learned embedding of the bucketed span width:
//
//     "x,y"      → [x ; y ; w]
//     "x,y,x*y"  → [x ; y ; x⊙y ; w]
//
// SelfAttentiveSpanExtractor
//   one attention logit per word, softmax over the words
//   inside the span, weighted sum of their vectors:
//
//     span (2, 4) → α₂·h₂ + α₃·h₃ + α₄·h₄,   Σα = 1
//
// Padding spans are zeroed by the span mask in both.
//
// Reference: Lee et al. (2017) End-to-end Neural Coreference
//            Resolution (endpoint + attention span features)

use std::str::FromStr;

use burn::{
    module::Ignored,
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};
use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};

/// One term of an endpoint combination string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinationTerm {
    Start,
    End,
    Sum,
    Difference,
    Product,
}

impl FromStr for CombinationTerm {
    type Err = NerError;

    fn from_str(term: &str) -> Result<Self> {
        match term.trim() {
            "x"   => Ok(Self::Start),
            "y"   => Ok(Self::End),
            "x+y" => Ok(Self::Sum),
            "x-y" => Ok(Self::Difference),
            "x*y" => Ok(Self::Product),
            other => Err(NerError::UnknownCombination(other.to_string())),
        }
    }
}

/// Parse "x,y,x*y" into its terms
pub fn parse_combination(combination: &str) -> Result<Vec<CombinationTerm>> {
    let terms = combination
        .split(',')
        .map(CombinationTerm::from_str)
        .collect::<Result<Vec<_>>>()?;
    if terms.is_empty() {
        return Err(NerError::UnknownCombination(combination.to_string()));
    }
    Ok(terms)
}

/// `[B, N, 2]` span ids → start and end index tensors `[B, N]`
fn span_bounds<B: Backend>(span_ids: Tensor<B, 3, Int>) -> (Tensor<B, 2, Int>, Tensor<B, 2, Int>) {
    let [batch_size, num_spans, _] = span_ids.dims();
    let starts = span_ids
        .clone()
        .slice([0..batch_size, 0..num_spans, 0..1])
        .reshape([batch_size, num_spans]);
    let ends = span_ids
        .slice([0..batch_size, 0..num_spans, 1..2])
        .reshape([batch_size, num_spans]);
    (starts, ends)
}

/// Rows of `words [B, T, D]` at `index [B, N]` → `[B, N, D]`
fn gather_words<B: Backend>(words: Tensor<B, 3>, index: Tensor<B, 2, Int>) -> Tensor<B, 3> {
    let [batch_size, num] = index.dims();
    let dim = words.dims()[2];
    words.gather(1, index.reshape([batch_size, num, 1]).repeat_dim(2, dim))
}

fn zero_padding<B: Backend>(spans: Tensor<B, 3>, span_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
    let [batch_size, num_spans, dim] = spans.dims();
    let keep = span_mask
        .float()
        .reshape([batch_size, num_spans, 1])
        .repeat_dim(2, dim);
    spans * keep
}

// ─── Endpoint ─────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct EndpointSpanExtractorConfig {
    pub input_dim:                usize,
    pub num_width_embeddings:     usize,
    #[config(default = "\"x,y\".to_string()")]
    pub combination:              String,
    #[config(default = 50)]
    pub span_width_embedding_dim: usize,
}

impl EndpointSpanExtractorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<EndpointSpanExtractor<B>> {
        let terms = parse_combination(&self.combination)?;
        let output_dim = terms.len() * self.input_dim + self.span_width_embedding_dim;
        Ok(EndpointSpanExtractor {
            width_embedding: EmbeddingConfig::new(
                self.num_width_embeddings.max(1),
                self.span_width_embedding_dim,
            )
            .init(device),
            terms: Ignored(terms),
            output_dim,
        })
    }
}

#[derive(Module, Debug)]
pub struct EndpointSpanExtractor<B: Backend> {
    width_embedding: Embedding<B>,
    terms:           Ignored<Vec<CombinationTerm>>,
    output_dim:      usize,
}

impl<B: Backend> EndpointSpanExtractor<B> {
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// words `[B, T, D]`, span ids `[B, N, 2]`, width buckets `[B, N]`,
    /// span mask `[B, N]` → `[B, N, output_dim]`
    pub fn forward(
        &self,
        words:         Tensor<B, 3>,
        span_ids:      Tensor<B, 3, Int>,
        width_buckets: Tensor<B, 2, Int>,
        span_mask:     Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let (starts, ends) = span_bounds(span_ids);
        let x = gather_words(words.clone(), starts);
        let y = gather_words(words, ends);

        let mut parts: Vec<Tensor<B, 3>> = self
            .terms
            .iter()
            .map(|term| match term {
                CombinationTerm::Start      => x.clone(),
                CombinationTerm::End        => y.clone(),
                CombinationTerm::Sum        => x.clone() + y.clone(),
                CombinationTerm::Difference => x.clone() - y.clone(),
                CombinationTerm::Product    => x.clone() * y.clone(),
            })
            .collect();
        parts.push(self.width_embedding.forward(width_buckets));

        zero_padding(Tensor::cat(parts, 2), span_mask)
    }
}

// ─── Self-attentive ───────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct SelfAttentiveSpanExtractorConfig {
    pub input_dim:      usize,
    /// Widest span the attention window covers
    pub max_span_width: usize,
}

impl SelfAttentiveSpanExtractorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SelfAttentiveSpanExtractor<B> {
        SelfAttentiveSpanExtractor {
            global_attention: LinearConfig::new(self.input_dim, 1).init(device),
            max_span_width:   self.max_span_width.max(1),
            input_dim:        self.input_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct SelfAttentiveSpanExtractor<B: Backend> {
    global_attention: Linear<B>,
    max_span_width:   usize,
    input_dim:        usize,
}

impl<B: Backend> SelfAttentiveSpanExtractor<B> {
    pub fn output_dim(&self) -> usize {
        self.input_dim
    }

    /// words `[B, T, D]`, span ids `[B, N, 2]`, span mask `[B, N]` → `[B, N, D]`
    pub fn forward(
        &self,
        words:     Tensor<B, 3>,
        span_ids:  Tensor<B, 3, Int>,
        span_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len, dim] = words.dims();
        let [_, num_spans, _] = span_ids.dims();
        let w = self.max_span_width;
        let device = words.device();

        let logits = self
            .global_attention
            .forward(words.clone())
            .reshape([batch_size, seq_len]);

        // word index start + k for every offset k < max width
        let (starts, ends) = span_bounds(span_ids);
        let starts = starts.reshape([batch_size, num_spans, 1]).repeat_dim(2, w);
        let ends = ends.reshape([batch_size, num_spans, 1]).repeat_dim(2, w);
        let offsets = Tensor::<B, 1, Int>::arange(0..w as i64, &device)
            .reshape([1, 1, w])
            .repeat_dim(0, batch_size)
            .repeat_dim(1, num_spans);
        let index = starts.clone() + offsets;
        let outside = index.clone().greater(ends);
        let index = index
            .mask_where(outside.clone(), starts)
            .reshape([batch_size, num_spans * w]);

        let weights = logits
            .gather(1, index.clone())
            .reshape([batch_size, num_spans, w])
            .mask_fill(outside, -1e9);
        let weights = softmax(weights, 2)
            .reshape([batch_size, num_spans, w, 1])
            .repeat_dim(3, dim);

        let members = gather_words(words, index).reshape([batch_size, num_spans, w, dim]);
        let pooled = (members * weights)
            .sum_dim(2)
            .reshape([batch_size, num_spans, dim]);

        zero_padding(pooled, span_mask)
    }
}
