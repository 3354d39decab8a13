// ============================================================
// Layer 5 - Span Classifier
// ============================================================
// Span vector → label logits, and the masked span loss.
//
//   Linear(h, h/2) ─► ReLU ─► Dropout(0.2) ─► Linear(h/2, C)
//
// Loss per span is cross entropy times the span's weight.
// Only real candidates count, and the sum is divided by their
// number (at least 1, so an empty batch gives 0).

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

#[derive(Config, Debug)]
pub struct MultiNonLinearClassifierConfig {
    pub hidden_size: usize,
    pub num_labels:  usize,
    #[config(default = 0.2)]
    pub dropout:     f64,
}

impl MultiNonLinearClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiNonLinearClassifier<B> {
        let intermediate = (self.hidden_size / 2).max(1);
        MultiNonLinearClassifier {
            classifier1: LinearConfig::new(self.hidden_size, intermediate).init(device),
            classifier2: LinearConfig::new(intermediate, self.num_labels).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct MultiNonLinearClassifier<B: Backend> {
    classifier1: Linear<B>,
    classifier2: Linear<B>,
    dropout:     Dropout,
}

impl<B: Backend> MultiNonLinearClassifier<B> {
    /// `[B, N, H]` → logits `[B, N, C]`
    pub fn forward(&self, spans: Tensor<B, 3>) -> Tensor<B, 3> {
        let hidden = self.dropout.forward(relu(self.classifier1.forward(spans)));
        self.classifier2.forward(hidden)
    }
}

/// Weighted cross entropy over real spans.
///
/// logits `[B, N, C]`, labels `[B, N]` (−1 = ignore), weights `[B, N]`,
/// real_mask `[B, N]` → scalar `[1]`
pub fn masked_span_loss<B: Backend>(
    logits:    Tensor<B, 3>,
    labels:    Tensor<B, 2, Int>,
    weights:   Tensor<B, 2>,
    real_mask: Tensor<B, 2, Bool>,
) -> Tensor<B, 1> {
    let [batch_size, num_spans, _] = logits.dims();

    let ignored = labels.clone().lower_elem(0);
    let target = labels.clamp_min(0).reshape([batch_size, num_spans, 1]);
    let nll = log_softmax(logits, 2)
        .gather(2, target)
        .reshape([batch_size, num_spans])
        .neg()
        .mask_fill(ignored, 0.0);

    let real = real_mask.float();
    let count = real.clone().sum().clamp_min(1.0);
    (nll * weights * real).sum() / count
}
