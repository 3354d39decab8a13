// ============================================================
// Layer 5 - Linear-Chain CRF
// ============================================================
// Scores whole tag sequences instead of independent tags:
//
//   score(y) = T[START, y₀] + Σₜ E[t, yₜ]
//            + Σₜ T[yₜ₋₁, yₜ] + T[y_last, STOP]
//
// Training minimises  log Σ_y exp(score(y)) − score(gold),
// the partition computed with the forward algorithm in log
// space. Decoding is Viterbi on the host, one sentence at a
// time over exactly its own length.
//
// The transition matrix is indexed transition[prev, cur].
// Impossible moves hold IMPOSSIBLE rather than −∞ so that the
// forward algorithm never produces NaN.
//
// Reference: Lafferty et al. (2001) Conditional Random Fields
//            Lample et al. (2016) Neural Architectures for NER

use burn::{
    module::Param,
    prelude::*,
    tensor::Distribution,
};
use serde::Serialize;

use crate::domain::labels::{iobes_allowed, split_tag, LabelVocab, Sentinels, TagKind};
use crate::error::{NerError, Result};
use crate::ml::to_host;

/// Score standing in for −∞ on forbidden transitions
pub const IMPOSSIBLE: f32 = -10_000.0;

#[derive(Config, Debug)]
pub struct LinearCrfConfig {
    #[config(default = true)]
    pub add_iobes_constraint: bool,
}

impl LinearCrfConfig {
    pub fn init<B: Backend>(&self, labels: &LabelVocab, device: &B::Device) -> Result<LinearCrf<B>> {
        let sentinels = labels.sentinels()?;
        let num_labels = labels.len();
        if num_labels <= 3 {
            return Err(NerError::NoTags);
        }

        let forbidden: Vec<i32> = forbidden_transitions(labels, sentinels, self.add_iobes_constraint)
            .into_iter()
            .map(i32::from)
            .collect();
        let blocked = forbidden.iter().filter(|&&f| f == 1).count();
        let forbidden = Tensor::<B, 1, Int>::from_ints(forbidden.as_slice(), device)
            .reshape([num_labels, num_labels])
            .equal_elem(1);

        let transition = Tensor::<B, 2>::random(
            [num_labels, num_labels],
            Distribution::Normal(0.0, 1.0),
            device,
        )
        .mask_fill(forbidden, IMPOSSIBLE);

        tracing::debug!(
            "CRF over {} labels, {} forbidden transitions (iobes={})",
            num_labels, blocked, self.add_iobes_constraint
        );

        Ok(LinearCrf {
            transition: Param::from_tensor(transition),
            start:      sentinels.start,
            stop:       sentinels.stop,
            pad:        sentinels.pad,
        })
    }
}

/// Flat `[prev * L + cur]` table of transitions fixed to IMPOSSIBLE.
pub fn forbidden_transitions(labels: &LabelVocab, sentinels: Sentinels, iobes: bool) -> Vec<bool> {
    let names = labels.labels();
    let n = names.len();
    let mut forbidden = vec![false; n * n];
    for prev in 0..n {
        for cur in 0..n {
            let structural = cur == sentinels.start
                || prev == sentinels.stop
                || cur == sentinels.pad
                || prev == sentinels.pad;
            let scheme = iobes && {
                let (prev_kind, _) = split_tag(&names[prev]);
                let (cur_kind, _) = split_tag(&names[cur]);
                if prev == sentinels.start {
                    matches!(cur_kind, TagKind::Inside | TagKind::End)
                } else if cur == sentinels.stop {
                    matches!(prev_kind, TagKind::Begin | TagKind::Inside)
                } else {
                    !iobes_allowed(&names[prev], &names[cur])
                }
            };
            forbidden[prev * n + cur] = structural || scheme;
        }
    }
    forbidden
}

/// Both halves of the CRF objective, each summed over the batch
#[derive(Debug, Clone)]
pub struct CrfLoss<B: Backend> {
    pub partition: Tensor<B, 1>,
    pub gold:      Tensor<B, 1>,
}

impl<B: Backend> CrfLoss<B> {
    /// Negative log-likelihood: partition − gold
    pub fn nll(self) -> Tensor<B, 1> {
        self.partition - self.gold
    }
}

/// Best tag path for one sentence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedSequence {
    pub score: f32,
    pub tags:  Vec<usize>,
}

#[derive(Module, Debug)]
pub struct LinearCrf<B: Backend> {
    transition: Param<Tensor<B, 2>>,
    start:      usize,
    stop:       usize,
    pad:        usize,
}

impl<B: Backend> LinearCrf<B> {
    /// Current transition scores - [L, L]
    pub fn transitions(&self) -> Tensor<B, 2> {
        self.transition.val()
    }

    /// emissions `[B, T, L]`, lens `[B]`, gold tags `[B, T]`, word mask `[B, T]`.
    /// Every sentence must have at least one word.
    pub fn forward(
        &self,
        emissions: Tensor<B, 3>,
        lens:      Tensor<B, 1, Int>,
        tags:      Tensor<B, 2, Int>,
        mask:      Tensor<B, 2, Bool>,
    ) -> CrfLoss<B> {
        CrfLoss {
            partition: self.partition(emissions.clone(), mask.clone()),
            gold:      self.gold_score(emissions, lens, tags, mask),
        }
    }

    /// Forward algorithm. Past a sentence's end alpha is carried over unchanged.
    fn partition(&self, emissions: Tensor<B, 3>, mask: Tensor<B, 2, Bool>) -> Tensor<B, 1> {
        let [batch_size, max_len, l] = emissions.dims();
        let trans = self.transition.val();
        let emit_at = |t: usize| {
            emissions
                .clone()
                .slice([0..batch_size, t..t + 1, 0..l])
                .reshape([batch_size, l])
        };

        let from_start = trans
            .clone()
            .slice([self.start..self.start + 1, 0..l])
            .repeat_dim(0, batch_size);
        let pairwise = trans.clone().reshape([1, l, l]).repeat_dim(0, batch_size);
        let mask = mask.int();

        let mut alpha = from_start + emit_at(0);
        for t in 1..max_len {
            let scores = alpha.clone().reshape([batch_size, l, 1]).repeat_dim(2, l)
                + pairwise.clone()
                + emit_at(t).reshape([batch_size, 1, l]).repeat_dim(1, l);
            let next = log_sum_exp(scores, 1).reshape([batch_size, l]);
            let finished = mask
                .clone()
                .slice([0..batch_size, t..t + 1])
                .repeat_dim(1, l)
                .equal_elem(0);
            alpha = next.mask_where(finished, alpha);
        }

        let to_stop = trans
            .slice([0..l, self.stop..self.stop + 1])
            .reshape([1, l])
            .repeat_dim(0, batch_size);
        log_sum_exp(alpha + to_stop, 1).reshape([batch_size]).sum()
    }

    fn gold_score(
        &self,
        emissions: Tensor<B, 3>,
        lens:      Tensor<B, 1, Int>,
        tags:      Tensor<B, 2, Int>,
        mask:      Tensor<B, 2, Bool>,
    ) -> Tensor<B, 1> {
        let [batch_size, max_len, l] = emissions.dims();
        let device = emissions.device();
        let trans = self.transition.val();
        let mask = mask.float();

        let emitted = emissions
            .gather(2, tags.clone().reshape([batch_size, max_len, 1]))
            .reshape([batch_size, max_len]);

        // prev → cur pairs, with START before the first word
        let start_col = Tensor::<B, 2, Int>::full([batch_size, 1], self.start as i64, &device);
        let prev = if max_len > 1 {
            Tensor::cat(vec![start_col, tags.clone().slice([0..batch_size, 0..max_len - 1])], 1)
        } else {
            start_col
        };
        let pair_index = (prev.mul_scalar(l as i64) + tags.clone()).reshape([batch_size * max_len]);
        let moved = trans
            .clone()
            .reshape([l * l])
            .select(0, pair_index)
            .reshape([batch_size, max_len]);

        let last_index = lens.sub_scalar(1).clamp_min(0).reshape([batch_size, 1]);
        let last_tags = tags.gather(1, last_index).reshape([batch_size]);
        let to_stop = trans
            .slice([0..l, self.stop..self.stop + 1])
            .reshape([l])
            .select(0, last_tags);

        ((emitted + moved) * mask).sum() + to_stop.sum()
    }

    /// Viterbi over each sentence's first `lens[i]` positions
    pub fn decode(&self, emissions: Tensor<B, 3>, lens: &[usize]) -> Result<Vec<DecodedSequence>> {
        let [batch_size, max_len, l] = emissions.dims();
        let scores = to_host(emissions)?;
        let trans = to_host(self.transition.val())?;
        let sentinels = Sentinels { start: self.start, stop: self.stop, pad: self.pad };
        let stride = max_len * l;

        Ok((0..batch_size)
            .map(|b| {
                let len = lens.get(b).copied().unwrap_or(0).min(max_len);
                viterbi(&scores[b * stride..(b + 1) * stride], &trans, l, len, sentinels)
            })
            .collect())
    }
}

/// log Σ exp along `dim`, keeping the dimension
fn log_sum_exp<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let size = x.dims()[dim];
    let max = x.clone().max_dim(dim);
    let shifted = x - max.clone().repeat_dim(dim, size);
    shifted.exp().sum_dim(dim).log() + max
}

/// Host Viterbi for one sentence. `emissions` is row-major `[T, L]`,
/// `trans` is `[L, L]`. Sentinel labels are never emitted.
/// Ties keep the lowest label id.
pub(crate) fn viterbi(
    emissions: &[f32],
    trans:     &[f32],
    num_labels: usize,
    len:       usize,
    sentinels: Sentinels,
) -> DecodedSequence {
    if len == 0 {
        return DecodedSequence { score: 0.0, tags: Vec::new() };
    }
    let l = num_labels;
    let candidates: Vec<usize> = (0..l)
        .filter(|&y| y != sentinels.start && y != sentinels.stop && y != sentinels.pad)
        .collect();
    // LinearCrfConfig::init rejects vocabularies made only of sentinels
    let Some(&first) = candidates.first() else {
        return DecodedSequence { score: f32::NEG_INFINITY, tags: Vec::new() };
    };

    let mut best = vec![f32::NEG_INFINITY; l];
    for &y in &candidates {
        best[y] = trans[sentinels.start * l + y] + emissions[y];
    }
    let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(len);

    for t in 1..len {
        let mut next = vec![f32::NEG_INFINITY; l];
        let mut pointer = vec![0usize; l];
        for &cur in &candidates {
            let mut arg = first;
            let mut top = f32::NEG_INFINITY;
            for &prev in &candidates {
                let s = best[prev] + trans[prev * l + cur];
                if s > top {
                    top = s;
                    arg = prev;
                }
            }
            next[cur] = top + emissions[t * l + cur];
            pointer[cur] = arg;
        }
        backpointers.push(pointer);
        best = next;
    }

    let mut last = first;
    let mut score = f32::NEG_INFINITY;
    for &y in &candidates {
        let s = best[y] + trans[y * l + sentinels.stop];
        if s > score {
            score = s;
            last = y;
        }
    }

    let mut tags = vec![last; len];
    for t in (1..len).rev() {
        tags[t - 1] = backpointers[t - 1][tags[t]];
    }
    DecodedSequence { score, tags }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type B = burn::backend::NdArray;

    fn seq_score(e: &[f32], trans: &[f32], l: usize, s: Sentinels, tags: &[usize]) -> f64 {
        let mut score = (trans[s.start * l + tags[0]] + e[tags[0]]) as f64;
        for t in 1..tags.len() {
            score += (trans[tags[t - 1] * l + tags[t]] + e[t * l + tags[t]]) as f64;
        }
        score + trans[tags[tags.len() - 1] * l + s.stop] as f64
    }

    /// Every sequence of length `len` over `alphabet`
    fn all_sequences(alphabet: &[usize], len: usize) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new()];
        for _ in 0..len {
            out = out
                .into_iter()
                .flat_map(|p| alphabet.iter().map(move |&y| [p.clone(), vec![y]].concat()))
                .collect();
        }
        out
    }

    fn pseudo_random(n: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((state >> 16) % 1000) as f32 / 250.0 - 2.0
            })
            .collect()
    }

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_forbidden_transitions() {
        let labels = LabelVocab::for_sequence(["O", "B-PER", "I-PER", "E-PER", "S-PER", "B-LOC"]);
        let s = labels.sentinels().unwrap();
        let n = labels.len();
        let id = |t: &str| labels.id(t).unwrap();
        let table = forbidden_transitions(&labels, s, true);
        let blocked = |a: usize, b: usize| table[a * n + b];

        assert!(blocked(id("O"), s.start));
        assert!(blocked(s.stop, id("O")));
        assert!(blocked(s.pad, id("O")) && blocked(id("O"), s.pad));
        assert!(blocked(id("O"), id("I-PER")));
        assert!(blocked(id("B-PER"), id("O")));
        assert!(blocked(id("B-LOC"), id("E-PER")));
        assert!(blocked(id("S-PER"), id("E-PER")));
        assert!(blocked(s.start, id("I-PER")));
        assert!(blocked(id("I-PER"), s.stop));
        assert!(!blocked(id("B-PER"), id("E-PER")));
        assert!(!blocked(s.start, id("B-PER")));
        assert!(!blocked(id("E-PER"), s.stop));

        let plain = forbidden_transitions(&labels, s, false);
        assert!(!plain[id("O") * n + id("I-PER")]);
        assert!(plain[id("O") * n + s.start]);
    }

    #[test]
    fn test_partition_and_gold_match_enumeration() {
        let device = Default::default();
        let labels = LabelVocab::for_sequence(["O", "S-PER"]);
        let s = labels.sentinels().unwrap();
        let l = labels.len();
        let crf = LinearCrfConfig::new().with_add_iobes_constraint(false).init::<B>(&labels, &device).unwrap();

        let e = pseudo_random(3 * l, 7);
        let emissions = Tensor::<B, 1>::from_floats(e.as_slice(), &device).reshape([1, 3, l]);
        let lens = Tensor::<B, 1, Int>::from_ints([3].as_slice(), &device);
        let gold = [1usize, 2, 1];
        let tags = Tensor::<B, 1, Int>::from_ints([1, 2, 1].as_slice(), &device).reshape([1, 3]);
        let mask = Tensor::<B, 2, Int>::ones([1, 3], &device).equal_elem(1);

        let loss = crf.forward(emissions, lens, tags, mask);
        let trans = to_host(crf.transitions()).unwrap();

        let all: Vec<usize> = (0..l).collect();
        let scores: Vec<f64> = all_sequences(&all, 3).iter().map(|y| seq_score(&e, &trans, l, s, y)).collect();
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let expected = max + scores.iter().map(|v| (v - max).exp()).sum::<f64>().ln();

        let partition = scalar(loss.partition.clone());
        let gold_score = scalar(loss.gold.clone());
        assert!((partition as f64 - expected).abs() < 1e-3, "{partition} vs {expected}");
        assert!((gold_score as f64 - seq_score(&e, &trans, l, s, &gold)).abs() < 1e-3);
        assert!(scalar(loss.nll()) >= 0.0);
    }

    #[test]
    fn test_viterbi_matches_enumeration() {
        let s = Sentinels { start: 3, stop: 4, pad: 0 };
        let l = 5;
        let trans = pseudo_random(l * l, 11);
        let e = pseudo_random(4 * l, 23);

        let decoded = viterbi(&e, &trans, l, 4, s);
        let best = all_sequences(&[1, 2], 4)
            .into_iter()
            .map(|y| (seq_score(&e, &trans, l, s, &y), y))
            .fold((f64::NEG_INFINITY, Vec::new()), |acc, cur| if cur.0 > acc.0 { cur } else { acc });

        assert_eq!(decoded.tags, best.1);
        assert!((decoded.score as f64 - best.0).abs() < 1e-3);
    }

    #[test]
    fn test_sentinel_only_vocab_is_rejected() {
        let labels = LabelVocab::for_sequence(Vec::<String>::new());
        assert_eq!(labels.len(), 3);
        let crf = LinearCrfConfig::new().init::<B>(&labels, &Default::default());
        assert!(matches!(crf, Err(NerError::NoTags)));
    }

    #[test]
    fn test_viterbi_tie_keeps_lowest_id() {
        let s = Sentinels { start: 3, stop: 4, pad: 0 };
        let decoded = viterbi(&[0.0; 10], &[0.0; 25], 5, 2, s);
        assert_eq!(decoded.tags, vec![1, 1]);
    }

    #[test]
    fn test_batch_masking_and_decode_lengths() {
        let device = Default::default();
        let labels = LabelVocab::for_sequence(["O", "B-PER", "E-PER", "S-PER"]);
        let s = labels.sentinels().unwrap();
        let l = labels.len();
        let crf = LinearCrfConfig::new().init::<B>(&labels, &device).unwrap();

        let e = pseudo_random(2 * 5 * l, 3);
        let batch = Tensor::<B, 1>::from_floats(e.as_slice(), &device).reshape([2, 5, l]);
        let o = labels.id("O").unwrap() as i32;
        let p = s.pad as i32;
        let tags = Tensor::<B, 1, Int>::from_ints([o, o, o, p, p, o, o, o, o, o].as_slice(), &device)
            .reshape([2, 5]);
        let mask = Tensor::<B, 1, Int>::from_ints([1, 1, 1, 0, 0, 1, 1, 1, 1, 1].as_slice(), &device)
            .reshape([2, 5])
            .equal_elem(1);
        let lens = Tensor::<B, 1, Int>::from_ints([3, 5].as_slice(), &device);

        let joint = crf.forward(batch.clone(), lens, tags.clone(), mask);

        // first sentence on its own, truncated to 3 words
        let alone = crf.forward(
            batch.clone().slice([0..1, 0..3, 0..l]),
            Tensor::<B, 1, Int>::from_ints([3].as_slice(), &device),
            tags.slice([0..1, 0..3]),
            Tensor::<B, 2, Int>::ones([1, 3], &device).equal_elem(1),
        );
        let second = crf.forward(
            batch.clone().slice([1..2, 0..5, 0..l]),
            Tensor::<B, 1, Int>::from_ints([5].as_slice(), &device),
            Tensor::<B, 1, Int>::from_ints([o; 5].as_slice(), &device).reshape([1, 5]),
            Tensor::<B, 2, Int>::ones([1, 5], &device).equal_elem(1),
        );
        let sum_alone = scalar(alone.partition) + scalar(second.partition);
        assert!((scalar(joint.partition) - sum_alone).abs() < 1e-2);

        let decoded = crf.decode(batch, &[3, 5]).unwrap();
        assert_eq!(decoded[0].tags.len(), 3);
        assert_eq!(decoded[1].tags.len(), 5);
        for tag in decoded.iter().flat_map(|d| &d.tags) {
            assert!(![s.start, s.stop, s.pad].contains(tag));
        }
    }
}
