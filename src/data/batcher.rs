// ============================================================
// Layer 4 - NER Batcher
// ============================================================
// Implements Burn's Batcher trait: the DataLoader hands it a
// Vec<NerSample> and gets back one padded NerBatch.
//
// Sentences differ in both subword count (S) and word count
// (T), so every sequence is padded to the batch maximum here:
//
//   subword_ids        [B, S]   padded with 0
//   attention_mask     [B, S]   1 = real subword
//   orig_to_tok_index  [B, T]   padded with 0 (masked later)
//   word_mask          [B, T]   true = real word
//   tags               [B, T]   padded with the <PAD> tag id
//
// Span mode adds a SpanBatch padded to the largest candidate
// count N: padding spans are (0,0) with label -1, weight 0
// and real_span_mask = false.
//
// Dependency heads stay on the host; the model turns them into
// adjacency tensors only when the GCN is enabled.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::sample::NerSample;

/// Label id used for padding spans; ignored by the span loss
pub const IGNORE_SPAN_LABEL: i32 = -1;

#[derive(Debug, Clone)]
pub struct SpanBatch<B: Backend> {
    /// Inclusive (start, end) word indices - [B, N, 2]
    pub span_ids: Tensor<B, 3, Int>,

    /// Bucketed span width - [B, N]
    pub width_buckets: Tensor<B, 2, Int>,

    /// Per-span loss weight - [B, N]
    pub weights: Tensor<B, 2>,

    /// true for real candidates, false for padding - [B, N]
    pub real_span_mask: Tensor<B, 2, Bool>,

    /// Gold span label ids, -1 on padding - [B, N]
    pub labels: Option<Tensor<B, 2, Int>>,

    /// Number of real candidates per sentence
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct NerBatch<B: Backend> {
    /// Position of each row's sentence in the input file
    pub sentence_indices: Vec<usize>,

    pub subword_ids:       Tensor<B, 2, Int>,
    pub attention_mask:    Tensor<B, 2, Int>,
    pub orig_to_tok_index: Tensor<B, 2, Int>,

    /// True word count per sentence (host copy)
    pub word_seq_lens: Vec<usize>,

    /// True word count per sentence - [B]
    pub word_lens: Tensor<B, 1, Int>,

    pub word_mask: Tensor<B, 2, Bool>,

    pub dep_heads:  Vec<Vec<Option<usize>>>,
    pub dep_labels: Vec<Vec<usize>>,

    pub tags:  Option<Tensor<B, 2, Int>>,
    pub spans: Option<SpanBatch<B>>,
}

impl<B: Backend> NerBatch<B> {
    /// Padded word length T
    pub fn max_words(&self) -> usize {
        self.orig_to_tok_index.dims()[1]
    }
}

#[derive(Clone, Debug)]
pub struct NerBatcher {
    pad_tag: usize,
}

impl NerBatcher {
    /// `pad_tag` fills tag positions past each sentence's end
    pub fn new(pad_tag: usize) -> Self {
        Self { pad_tag }
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// Samples were validated by SampleBuilder, so batching cannot fail.
impl<B: Backend> Batcher<B, NerSample, NerBatch<B>> for NerBatcher {
    fn batch(&self, items: Vec<NerSample>, device: &B::Device) -> NerBatch<B> {
        let batch_size = items.len();
        let max_sub    = items.iter().map(|s| s.subword_ids.len()).max().unwrap_or(0).max(1);
        let max_words  = items.iter().map(NerSample::len).max().unwrap_or(0).max(1);

        // ── Subwords ──────────────────────────────────────────────────────────
        let mut ids  = vec![0i32; batch_size * max_sub];
        let mut attn = vec![0i32; batch_size * max_sub];
        for (row, s) in items.iter().enumerate() {
            for (k, &id) in s.subword_ids.iter().enumerate() {
                ids[row * max_sub + k]  = id as i32;
                attn[row * max_sub + k] = 1;
            }
        }

        // ── Words ─────────────────────────────────────────────────────────────
        let mut align = vec![0i32; batch_size * max_words];
        let mut mask  = vec![0i32; batch_size * max_words];
        for (row, s) in items.iter().enumerate() {
            for (w, &pos) in s.orig_to_tok_index.iter().enumerate() {
                align[row * max_words + w] = pos as i32;
                mask[row * max_words + w]  = 1;
            }
        }
        let word_seq_lens: Vec<usize> = items.iter().map(NerSample::len).collect();
        let lens: Vec<i32> = word_seq_lens.iter().map(|&l| l as i32).collect();

        // ── Gold tags (only when every sentence has them) ─────────────────────
        let tags = if items.iter().all(|s| s.tags.is_some()) {
            let mut flat = vec![self.pad_tag as i32; batch_size * max_words];
            for (row, tags) in items.iter().filter_map(|s| s.tags.as_ref()).enumerate() {
                for (w, &t) in tags.iter().enumerate() {
                    flat[row * max_words + w] = t as i32;
                }
            }
            Some(int_2d(device, &flat, [batch_size, max_words]))
        } else {
            None
        };

        let spans = span_batch(&items, device);

        tracing::debug!(
            "Batched {} sentences: max_subwords={}, max_words={}, spans={}",
            batch_size,
            max_sub,
            max_words,
            spans.as_ref().map(|s| s.real_span_mask.dims()[1]).unwrap_or(0),
        );

        NerBatch {
            sentence_indices:  items.iter().map(|s| s.sentence_index).collect(),
            subword_ids:       int_2d(device, &ids, [batch_size, max_sub]),
            attention_mask:    int_2d(device, &attn, [batch_size, max_sub]),
            orig_to_tok_index: int_2d(device, &align, [batch_size, max_words]),
            word_lens:         Tensor::<B, 1, Int>::from_ints(lens.as_slice(), device),
            word_mask:         int_2d(device, &mask, [batch_size, max_words]).equal_elem(1),
            word_seq_lens,
            dep_heads:         items.iter().map(|s| s.heads.clone()).collect(),
            dep_labels:        items.iter().map(|s| s.dep_labels.clone()).collect(),
            tags,
            spans,
        }
    }
}

fn span_batch<B: Backend>(items: &[NerSample], device: &B::Device) -> Option<SpanBatch<B>> {
    let max_spans = items.iter().map(|s| s.spans.len()).max().unwrap_or(0);
    if max_spans == 0 {
        return None;
    }
    let batch_size = items.len();
    let cells = batch_size * max_spans;

    let mut ids     = vec![0i32; cells * 2];
    let mut buckets = vec![0i32; cells];
    let mut weights = vec![0f32; cells];
    let mut real    = vec![0i32; cells];
    let mut labels  = vec![IGNORE_SPAN_LABEL; cells];
    let all_gold = items.iter().all(|s| s.spans.iter().all(|sp| sp.label.is_some()));

    for (row, s) in items.iter().enumerate() {
        for (k, span) in s.spans.iter().enumerate() {
            let c = row * max_spans + k;
            ids[c * 2]     = span.start as i32;
            ids[c * 2 + 1] = span.end as i32;
            buckets[c]     = span.width_bucket as i32;
            weights[c]     = span.weight;
            real[c]        = 1;
            if let Some(label) = span.label {
                labels[c] = label as i32;
            }
        }
    }

    let shape = [batch_size, max_spans];
    Some(SpanBatch {
        span_ids:       Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device)
            .reshape([batch_size, max_spans, 2]),
        width_buckets:  int_2d(device, &buckets, shape),
        weights:        Tensor::<B, 1>::from_floats(weights.as_slice(), device).reshape(shape),
        real_span_mask: int_2d(device, &real, shape).equal_elem(1),
        labels:         all_gold.then(|| int_2d(device, &labels, shape)),
        counts:         items.iter().map(|s| s.spans.len()).collect(),
    })
}

fn int_2d<B: Backend>(device: &B::Device, flat: &[i32], shape: [usize; 2]) -> Tensor<B, 2, Int> {
    Tensor::<B, 1, Int>::from_ints(flat, device).reshape(shape)
}
