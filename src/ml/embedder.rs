// ============================================================
// Layer 5 - Transformer Embedder
// ============================================================
// Subword ids in, one vector per ORIGINAL word out.
//
//   subword_ids [B, S] ─► token + position embeddings
//                      ─► N × encoder block (self-attention, FFN)
//                      ─► final layer norm            [B, S, D]
//                      ─► gather at orig_to_tok_index [B, T, D]
//
// Padding subwords are excluded from attention through the
// attention mask, and each word is represented by its first
// subword.
//
// Known backbone names resolve to their published sizes via
// `from_preset`. Weights start randomly initialised; loading
// pretrained weights is left to the caller (burn records).

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::error::{NerError, Result};

#[derive(Config, Debug)]
pub struct TransformerEmbedderConfig {
    /// Backbone identifier, kept for logging and config files
    pub name:         String,
    pub vocab_size:   usize,
    #[config(default = 512)]
    pub max_position: usize,
    pub d_model:      usize,
    pub num_heads:    usize,
    pub num_layers:   usize,
    pub d_ff:         usize,
    #[config(default = 0.1)]
    pub dropout:      f64,
}

/// (name, vocab, d_model, heads, layers, d_ff)
const PRESETS: [(&str, usize, usize, usize, usize, usize); 7] = [
    ("bert-tiny",         30522, 128,  2,  2,  512),
    ("bert-mini",         30522, 256,  4,  4,  1024),
    ("bert-small",        30522, 512,  8,  4,  2048),
    ("bert-medium",       30522, 512,  8,  8,  2048),
    ("bert-base-uncased", 30522, 768, 12, 12, 3072),
    ("bert-base-cased",   28996, 768, 12, 12, 3072),
    ("roberta-base",      50265, 768, 12, 12, 3072),
];

impl TransformerEmbedderConfig {
    /// Architecture sizes for a known backbone name
    pub fn from_preset(name: &str) -> Result<Self> {
        PRESETS
            .iter()
            .find(|p| p.0 == name)
            .map(|&(name, vocab, d_model, heads, layers, d_ff)| {
                Self::new(name.to_string(), vocab, d_model, heads, layers, d_ff)
            })
            .ok_or_else(|| NerError::UnknownEmbedder(name.to_string()))
    }

    pub fn preset_names() -> impl Iterator<Item = &'static str> {
        PRESETS.iter().map(|p| p.0)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerEmbedder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        tracing::debug!(
            "Embedder '{}': {} layers, d_model={}, heads={}",
            self.name, self.num_layers, self.d_model, self.num_heads
        );
        TransformerEmbedder {
            token_embedding, position_embedding, layers, final_norm, dropout,
            vocab_size:   self.vocab_size,
            max_position: self.max_position,
            d_model:      self.d_model,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad_mask`: true at padding subwords - [B, S]
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerEmbedder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
    pub vocab_size:         usize,
    pub max_position:       usize,
    pub d_model:            usize,
}

impl<B: Backend> TransformerEmbedder<B> {
    pub fn output_dim(&self) -> usize {
        self.d_model
    }

    /// Contextual subword states - [B, S, D]
    pub fn encode_subwords(
        &self,
        subword_ids:    Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Result<Tensor<B, 3>> {
        let [batch_size, seq_len] = subword_ids.dims();
        if seq_len > self.max_position {
            return Err(NerError::SequenceTooLong { len: seq_len, max: self.max_position });
        }
        let max_id: i64 = subword_ids.clone().max().into_scalar().elem();
        if max_id as usize >= self.vocab_size {
            return Err(NerError::SubwordOutOfVocab { id: max_id as usize, vocab_size: self.vocab_size });
        }

        let tok_emb = self.token_embedding.forward(subword_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let pad_mask = attention_mask.equal_elem(0);
        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        Ok(self.final_norm.forward(x))
    }

    /// One vector per word, taken at its first subword - [B, T, D]
    pub fn forward(
        &self,
        subword_ids:       Tensor<B, 2, Int>,
        orig_to_tok_index: Tensor<B, 2, Int>,
        attention_mask:    Tensor<B, 2, Int>,
    ) -> Result<Tensor<B, 3>> {
        let subword_rep = self.encode_subwords(subword_ids, attention_mask)?;
        let [batch_size, max_words] = orig_to_tok_index.dims();
        let index = orig_to_tok_index
            .reshape([batch_size, max_words, 1])
            .repeat_dim(2, self.d_model);
        Ok(subword_rep.gather(1, index))
    }
}
