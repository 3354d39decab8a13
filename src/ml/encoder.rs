// ============================================================
// Layer 5 - Sequence Encoder
// ============================================================
// Word features → per-word label scores (CRF emissions).
//
//   hidden_dim > 0:  dropout ─► BiLSTM ─► dropout ─► Linear
//   hidden_dim = 0:  Linear
//
// The BiLSTM is two unidirectional LSTMs. The backward one
// reads every sentence reversed within its OWN length, so the
// first word of a short sentence never sees padding:
//
//   lens = [3]   positions 0 1 2 3 4
//   reversed     index     2 1 0 3 4
//
// The same permutation maps the backward outputs back.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig},
    prelude::*,
};

#[derive(Config, Debug)]
pub struct SequenceEncoderConfig {
    pub input_dim:  usize,
    /// Total BiLSTM width (both directions). 0 disables the LSTM.
    pub hidden_dim: usize,
    pub num_labels: usize,
    #[config(default = 0.5)]
    pub dropout:    f64,
}

impl SequenceEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SequenceEncoder<B> {
        let (recurrent, tag_input) = if self.hidden_dim > 0 {
            let per_direction = (self.hidden_dim / 2).max(1);
            let stage = BiLstm {
                forward_lstm:  LstmConfig::new(self.input_dim, per_direction, true).init(device),
                backward_lstm: LstmConfig::new(self.input_dim, per_direction, true).init(device),
                word_drop:     DropoutConfig::new(self.dropout).init(),
                drop_lstm:     DropoutConfig::new(self.dropout).init(),
            };
            (Some(stage), per_direction * 2)
        } else {
            (None, self.input_dim)
        };
        SequenceEncoder {
            recurrent,
            hidden2tag: LinearConfig::new(tag_input, self.num_labels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct BiLstm<B: Backend> {
    forward_lstm:  Lstm<B>,
    backward_lstm: Lstm<B>,
    word_drop:     Dropout,
    drop_lstm:     Dropout,
}

impl<B: Backend> BiLstm<B> {
    fn forward(&self, features: Tensor<B, 3>, lens: &[usize]) -> Tensor<B, 3> {
        let [batch_size, max_len, dim] = features.dims();
        let device = features.device();
        let x = self.word_drop.forward(features);

        let (fwd, _) = self.forward_lstm.forward(x.clone(), None);

        let perm = Tensor::<B, 1, Int>::from_ints(
            reversed_positions(lens, max_len).as_slice(),
            &device,
        )
        .reshape([batch_size, max_len, 1]);
        let reversed = x.gather(1, perm.clone().repeat_dim(2, dim));
        let (bwd, _) = self.backward_lstm.forward(reversed, None);
        let hidden = bwd.dims()[2];
        let bwd = bwd.gather(1, perm.repeat_dim(2, hidden));

        self.drop_lstm.forward(Tensor::cat(vec![fwd, bwd], 2))
    }
}

#[derive(Module, Debug)]
pub struct SequenceEncoder<B: Backend> {
    recurrent:  Option<BiLstm<B>>,
    hidden2tag: Linear<B>,
}

impl<B: Backend> SequenceEncoder<B> {
    /// features `[B, T, F]`, true lengths → emissions `[B, T, L]`
    pub fn forward(&self, features: Tensor<B, 3>, lens: &[usize]) -> Tensor<B, 3> {
        let hidden = match &self.recurrent {
            Some(lstm) => lstm.forward(features, lens),
            None => features,
        };
        self.hidden2tag.forward(hidden)
    }

    pub fn is_recurrent(&self) -> bool {
        self.recurrent.is_some()
    }
}

/// Flat `[B * T]` gather index reversing each row within its length.
/// Positions past the length map to themselves.
pub(crate) fn reversed_positions(lens: &[usize], max_len: usize) -> Vec<i32> {
    let mut index = Vec::with_capacity(lens.len() * max_len);
    for &len in lens {
        let len = len.min(max_len);
        for t in 0..max_len {
            let src = if t < len { len - 1 - t } else { t };
            index.push(src as i32);
        }
    }
    index
}
