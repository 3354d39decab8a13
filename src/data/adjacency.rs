// ============================================================
// Layer 4 - Dependency Adjacency Builder
// ============================================================
// Turns per-word dependency heads into the two matrices the
// GCN consumes, for a whole batch at once.
//
//   heads:  [Some(1), None, Some(1)]     (word 1 is the root)
//   labels: [nsubj,   root, obj]
//
//   unlabeled           labeled
//   0 1 0               0     nsubj 0
//   1 0 1               nsubj root  obj
//   0 1 0               0     obj   0
//
// Edges are mirrored (the graph is undirected), a root word
// gets a self-loop in the labeled matrix only, and every
// row/column past a sentence's length stays zero.
//
// Both buffers are allocated once for [batch, max_len, max_len]
// and filled one sentence at a time.

use burn::prelude::*;

use crate::error::{NerError, Result};

pub struct AdjacencyBuilder {
    batch_size: usize,
    max_len:    usize,
    unlabeled:  Vec<f32>,
    labeled:    Vec<i32>,
}

impl AdjacencyBuilder {
    pub fn new(batch_size: usize, max_len: usize) -> Self {
        let cells = batch_size * max_len * max_len;
        Self {
            batch_size,
            max_len,
            unlabeled: vec![0.0; cells],
            labeled:   vec![0; cells],
        }
    }

    /// Write sentence `row` of the batch.
    /// `dep_labels[i]` is the relation id of word i to its head.
    pub fn fill(
        &mut self,
        row:        usize,
        heads:      &[Option<usize>],
        dep_labels: &[usize],
        root_label: usize,
    ) -> Result<()> {
        let len = heads.len();
        if row >= self.batch_size || len > self.max_len || dep_labels.len() != len {
            return Err(NerError::MalformedSentence(format!(
                "sentence {row} with {len} heads / {} labels does not fit a [{}, {}] adjacency batch",
                dep_labels.len(),
                self.batch_size,
                self.max_len
            )));
        }

        let max_len = self.max_len;
        let base = row * max_len * max_len;
        let cell = |i: usize, j: usize| base + i * max_len + j;

        for (word, (head, &label)) in heads.iter().zip(dep_labels).enumerate() {
            match *head {
                None => {
                    self.labeled[cell(word, word)] = root_label as i32;
                }
                Some(head) if head < len => {
                    self.unlabeled[cell(head, word)] = 1.0;
                    self.unlabeled[cell(word, head)] = 1.0;
                    self.labeled[cell(head, word)] = label as i32;
                    self.labeled[cell(word, head)] = label as i32;
                }
                Some(head) => {
                    return Err(NerError::InvalidHead { sentence: row, word, head, len });
                }
            }
        }
        Ok(())
    }

    pub fn unlabeled(&self) -> &[f32] {
        &self.unlabeled
    }

    pub fn labeled(&self) -> &[i32] {
        &self.labeled
    }

    /// Move both buffers onto the device as
    /// `[batch, max_len, max_len]` float and int tensors.
    pub fn into_tensors<B: Backend>(self, device: &B::Device) -> (Tensor<B, 3>, Tensor<B, 3, Int>) {
        let shape = [self.batch_size, self.max_len, self.max_len];
        let unlabeled = Tensor::<B, 1>::from_floats(self.unlabeled.as_slice(), device).reshape(shape);
        let labeled   = Tensor::<B, 1, Int>::from_ints(self.labeled.as_slice(), device).reshape(shape);
        (unlabeled, labeled)
    }
}

/// Build both adjacency tensors for a batch of sentences
pub fn build_adjacency<B: Backend>(
    heads:      &[Vec<Option<usize>>],
    dep_labels: &[Vec<usize>],
    max_len:    usize,
    root_label: usize,
    device:     &B::Device,
) -> Result<(Tensor<B, 3>, Tensor<B, 3, Int>)> {
    let mut builder = AdjacencyBuilder::new(heads.len(), max_len);
    for (row, (h, l)) in heads.iter().zip(dep_labels).enumerate() {
        builder.fill(row, h, l, root_label)?;
    }
    tracing::debug!("Built dependency adjacency for {} sentences (max_len={})", heads.len(), max_len);
    Ok(builder.into_tensors(device))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: usize = 9;

    fn at(buf: &[f32], max_len: usize, row: usize, i: usize, j: usize) -> f32 {
        buf[row * max_len * max_len + i * max_len + j]
    }

    #[test]
    fn test_symmetric_and_zero_padded() {
        let mut b = AdjacencyBuilder::new(2, 4);
        b.fill(0, &[Some(1), None, Some(1)], &[3, ROOT, 4], ROOT).unwrap();
        b.fill(1, &[None, Some(0), Some(0), Some(2)], &[ROOT, 5, 6, 7], ROOT).unwrap();

        let adj = b.unlabeled();
        for row in 0..2 {
            for i in 0..4 {
                for j in 0..4 {
                    assert_eq!(at(adj, 4, row, i, j), at(adj, 4, row, j, i));
                }
            }
        }
        // sentence 0 has 3 words: row/column 3 must be empty
        for k in 0..4 {
            assert_eq!(at(adj, 4, 0, 3, k), 0.0);
            assert_eq!(at(adj, 4, 0, k, 3), 0.0);
        }
        assert_eq!(at(adj, 4, 0, 0, 1), 1.0);
        assert_eq!(at(adj, 4, 0, 1, 1), 0.0);
        assert_eq!(adj.iter().filter(|&&v| v == 1.0).count(), 2 * 2 + 2 * 3);
    }

    #[test]
    fn test_labeled_edges_and_root_loop() {
        let mut b = AdjacencyBuilder::new(1, 3);
        b.fill(0, &[Some(1), None, Some(1)], &[3, ROOT, 4], ROOT).unwrap();
        let lab = b.labeled();
        assert_eq!(&lab[0..3], &[0, 3, 0]);
        assert_eq!(&lab[3..6], &[3, ROOT as i32, 4]);
        assert_eq!(&lab[6..9], &[0, 4, 0]);
    }

    #[test]
    fn test_invalid_head() {
        let mut b = AdjacencyBuilder::new(1, 5);
        let err = b.fill(0, &[Some(3), None], &[1, ROOT], ROOT).unwrap_err();
        assert!(matches!(err, NerError::InvalidHead { word: 0, head: 3, len: 2, .. }));
    }

    #[test]
    fn test_into_tensors_shape() {
        type B = burn::backend::NdArray;
        let device = Default::default();
        let (adj, lab) = build_adjacency::<B>(
            &[vec![None, Some(0)], vec![None]],
            &[vec![ROOT, 2], vec![ROOT]],
            2,
            ROOT,
            &device,
        )
        .unwrap();
        assert_eq!(adj.dims(), [2, 2, 2]);
        let lab: Vec<i64> = lab.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(lab, vec![ROOT as i64, 2, 2, 0, ROOT as i64, 0, 0, 0]);
    }
}
