// ============================================================
// Layer 5 - Dependency-Labeled GCN
// ============================================================
// Refines word vectors by passing messages along the
// dependency parse. Each layer mixes a word with its syntactic
// neighbours, and every edge also contributes an embedding of
// its relation label (nsubj, obj, ...):
//
//   h⁰    = relu(W_in · x)
//   m_i   = Σ_j [L_ij ≠ 0] · E(L_ij)            label messages
//   hˡ⁺¹  = relu( (Wˡ(A·hˡ + m) + Wˡ hˡ) / (deg + 1) )
//   out   = W_out · hᴸ                            zeroed on padding
//
// A is the symmetric 0/1 adjacency, L the labeled adjacency
// (root self-loops included), deg the row sum of A.
//
// Reference: Kipf & Welling (2017) GCN
//            Jie & Lu (2019) Dependency-guided LSTM-CRF for NER

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct DepLabeledGcnConfig {
    pub input_dim:      usize,
    pub graph_dim:      usize,
    pub output_dim:     usize,
    pub num_dep_labels: usize,
    #[config(default = 2)]
    pub num_layers:     usize,
    #[config(default = 0.5)]
    pub dropout:        f64,
}

impl DepLabeledGcnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DepLabeledGcn<B> {
        DepLabeledGcn {
            input_proj:      LinearConfig::new(self.input_dim, self.graph_dim).init(device),
            layers:          (0..self.num_layers)
                .map(|_| LinearConfig::new(self.graph_dim, self.graph_dim).init(device))
                .collect(),
            label_embedding: EmbeddingConfig::new(self.num_dep_labels, self.graph_dim).init(device),
            output:          LinearConfig::new(self.graph_dim, self.output_dim).init(device),
            dropout:         DropoutConfig::new(self.dropout).init(),
            graph_dim:       self.graph_dim,
            output_dim:      self.output_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct DepLabeledGcn<B: Backend> {
    input_proj:      Linear<B>,
    layers:          Vec<Linear<B>>,
    label_embedding: Embedding<B>,
    output:          Linear<B>,
    dropout:         Dropout,
    graph_dim:       usize,
    output_dim:      usize,
}

impl<B: Backend> DepLabeledGcn<B> {
    /// words `[B, T, In]`, word_mask `[B, T]`, adjacency `[B, T, T]`,
    /// labeled adjacency `[B, T, T]` → `[B, T, Out]`
    pub fn forward(
        &self,
        words:         Tensor<B, 3>,
        word_mask:     Tensor<B, 2, Bool>,
        adjacency:     Tensor<B, 3>,
        dep_label_adj: Tensor<B, 3, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len, _] = words.dims();
        let g = self.graph_dim;

        let denom = adjacency.clone().sum_dim(2).add_scalar(1.0).repeat_dim(2, g);

        // Relation embeddings summed over each word's labeled edges
        let edge_mask = dep_label_adj
            .clone()
            .greater_elem(0)
            .float()
            .reshape([batch_size, seq_len, seq_len, 1])
            .repeat_dim(3, g);
        let label_msg = self
            .label_embedding
            .forward(dep_label_adj.reshape([batch_size, seq_len * seq_len]))
            .reshape([batch_size, seq_len, seq_len, g]);
        let label_msg = (label_msg * edge_mask)
            .sum_dim(2)
            .reshape([batch_size, seq_len, g]);

        let mut h = relu(self.input_proj.forward(words));
        let last = self.layers.len().saturating_sub(1);
        for (l, weight) in self.layers.iter().enumerate() {
            let neighbours = adjacency.clone().matmul(h.clone()) + label_msg.clone();
            let combined = (weight.forward(neighbours) + weight.forward(h)) / denom.clone();
            h = relu(combined);
            if l < last {
                h = self.dropout.forward(h);
            }
        }

        let keep = word_mask
            .float()
            .reshape([batch_size, seq_len, 1])
            .repeat_dim(2, self.output_dim);
        self.output.forward(h) * keep
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::adjacency::build_adjacency;

    type B = burn::backend::NdArray;

    #[test]
    fn test_output_shape_and_padding() {
        let device = Default::default();
        let gcn = DepLabeledGcnConfig::new(8, 6, 5, 4).with_dropout(0.0).init::<B>(&device);

        let (adj, lab) = build_adjacency::<B>(
            &[vec![Some(1), None, Some(1)], vec![None, Some(0)]],
            &[vec![1, 3, 2], vec![3, 1]],
            3,
            3,
            &device,
        )
        .unwrap();
        let mask = Tensor::<B, 1, Int>::from_ints([1, 1, 1, 1, 1, 0].as_slice(), &device)
            .reshape([2, 3])
            .equal_elem(1);
        let words = Tensor::<B, 3>::ones([2, 3, 8], &device);

        let out = gcn.forward(words, mask, adj, lab);
        assert_eq!(out.dims(), [2, 3, 5]);
        let padded: f32 = out.slice([1..2, 2..3, 0..5]).abs().sum().into_scalar().elem();
        assert_eq!(padded, 0.0);
    }

    #[test]
    fn test_graph_changes_representation() {
        // Same words, different parses → different outputs
        let device = Default::default();
        let gcn = DepLabeledGcnConfig::new(4, 4, 4, 3).with_dropout(0.0).init::<B>(&device);
        let words = Tensor::<B, 1>::from_floats(
            [0.1, 0.2, 0.3, 0.4, -0.5, 0.6, -0.7, 0.8].as_slice(),
            &device,
        )
        .reshape([1, 2, 4]);
        let mask = Tensor::<B, 2, Int>::ones([1, 2], &device).equal_elem(1);

        let (a1, l1) = build_adjacency::<B>(&[vec![None, Some(0)]], &[vec![2, 1]], 2, 2, &device).unwrap();
        let (a2, l2) = build_adjacency::<B>(&[vec![None, None]], &[vec![2, 2]], 2, 2, &device).unwrap();

        let o1 = gcn.forward(words.clone(), mask.clone(), a1, l1);
        let o2 = gcn.forward(words, mask, a2, l2);
        let diff: f32 = (o1 - o2).abs().sum().into_scalar().elem();
        assert!(diff > 0.0);
    }
}
