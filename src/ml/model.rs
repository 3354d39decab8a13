// ============================================================
// Layer 5 - Dependency-Aware NER Model
// ============================================================
// Two switches pick the wiring once, at construction:
//
//                      ParserMode::Crf          ParserMode::Span
//   DepModel::None     embed → enc → CRF        embed → spans → clf
//   DepModel::DgGcn    embed → GCN → enc → CRF  embed → GCN → spans → clf
//
//   embed  TransformerEmbedder     (subwords → one vector per word)
//   GCN    DepLabeledGcn           (messages along the parse)
//   enc    SequenceEncoder         (BiLSTM or linear → emissions)
//   spans  Endpoint + SelfAttentive span extractors
//   clf    MultiNonLinearClassifier
//
// `loss` and `decode` are separate operations over one shared
// scoring routine, so no boolean train flag threads through the
// branches.

use burn::{prelude::*, tensor::activation::softmax};

use crate::data::adjacency::build_adjacency;
use crate::data::batcher::NerBatch;
use crate::domain::{
    labels::{DepLabelVocab, LabelVocab},
    mode::{DepModel, ParserMode},
};
use crate::error::{NerError, Result};
use crate::ml::{
    classifier::{masked_span_loss, MultiNonLinearClassifier, MultiNonLinearClassifierConfig},
    crf::{DecodedSequence, LinearCrf, LinearCrfConfig},
    embedder::{TransformerEmbedder, TransformerEmbedderConfig},
    encoder::{SequenceEncoder, SequenceEncoderConfig},
    gcn::{DepLabeledGcn, DepLabeledGcnConfig},
    span::{
        EndpointSpanExtractor, EndpointSpanExtractorConfig,
        SelfAttentiveSpanExtractor, SelfAttentiveSpanExtractorConfig,
    },
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct NerModelConfig {
    pub embedder:   TransformerEmbedderConfig,
    pub labels:     LabelVocab,
    pub dep_labels: DepLabelVocab,

    /// BiLSTM width; 0 means a linear encoder
    #[config(default = 0)]
    pub hidden_dim: usize,

    #[config(default = "DepModel::None")]
    pub dep_model: DepModel,

    #[config(default = "ParserMode::Crf")]
    pub parser_mode: ParserMode,

    #[config(default = true)]
    pub add_iobes_constraint: bool,

    /// Widest candidate span, also the number of width buckets
    #[config(default = 8)]
    pub max_entity_length: usize,

    #[config(default = 200)]
    pub gcn_output_dim: usize,

    #[config(default = 2)]
    pub gcn_layers: usize,

    #[config(default = 0.5)]
    pub dropout: f64,

    #[config(default = "\"x,y\".to_string()")]
    pub span_combination: String,

    #[config(default = 50)]
    pub span_width_embedding_dim: usize,

    #[config(default = 0.2)]
    pub classifier_dropout: f64,

    /// Loss weight of candidate spans that are not entities
    #[config(default = 1.0)]
    pub negative_span_weight: f32,
}

impl NerModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<NerModel<B>> {
        let embedder = self.embedder.init(device);
        let word_dim = embedder.output_dim();

        let (gcn, feature_dim) = match self.dep_model {
            DepModel::None => (None, word_dim),
            DepModel::DgGcn => {
                let gcn = DepLabeledGcnConfig::new(
                    word_dim,
                    word_dim,
                    self.gcn_output_dim,
                    self.dep_labels.len(),
                )
                .with_num_layers(self.gcn_layers)
                .with_dropout(self.dropout)
                .init(device);
                (Some(gcn), self.gcn_output_dim)
            }
        };

        let (crf_head, span_head) = match self.parser_mode {
            ParserMode::Crf => {
                let head = CrfHead {
                    encoder: SequenceEncoderConfig::new(feature_dim, self.hidden_dim, self.labels.len())
                        .with_dropout(self.dropout)
                        .init(device),
                    crf: LinearCrfConfig::new()
                        .with_add_iobes_constraint(self.add_iobes_constraint)
                        .init(&self.labels, device)?,
                };
                (Some(head), None)
            }
            ParserMode::Span => {
                let endpoint = EndpointSpanExtractorConfig::new(feature_dim, self.max_entity_length)
                    .with_combination(self.span_combination.clone())
                    .with_span_width_embedding_dim(self.span_width_embedding_dim)
                    .init(device)?;
                let attentive = SelfAttentiveSpanExtractorConfig::new(feature_dim, self.max_entity_length)
                    .init(device);
                let classifier = MultiNonLinearClassifierConfig::new(
                    endpoint.output_dim() + attentive.output_dim(),
                    self.labels.len(),
                )
                .with_dropout(self.classifier_dropout)
                .init(device);
                (None, Some(SpanHead { endpoint, attentive, classifier }))
            }
        };

        tracing::info!(
            "NER model: embedder={}, dep_model={:?}, parser={:?}, labels={}, features={}",
            self.embedder.name,
            self.dep_model,
            self.parser_mode,
            self.labels.len(),
            feature_dim,
        );

        Ok(NerModel {
            embedder,
            gcn,
            crf_head,
            span_head,
            root_dep_label: self.dep_labels.root_id(),
            feature_dim,
        })
    }
}

/// Sequence-labelling head: emissions + CRF
#[derive(Module, Debug)]
pub struct CrfHead<B: Backend> {
    encoder: SequenceEncoder<B>,
    crf:     LinearCrf<B>,
}

/// Span-classification head
#[derive(Module, Debug)]
pub struct SpanHead<B: Backend> {
    endpoint:   EndpointSpanExtractor<B>,
    attentive:  SelfAttentiveSpanExtractor<B>,
    classifier: MultiNonLinearClassifier<B>,
}

#[derive(Module, Debug)]
pub struct NerModel<B: Backend> {
    embedder:       TransformerEmbedder<B>,
    gcn:            Option<DepLabeledGcn<B>>,
    crf_head:       Option<CrfHead<B>>,
    span_head:      Option<SpanHead<B>>,
    root_dep_label: usize,
    feature_dim:    usize,
}

/// The head chosen at construction
enum Head<'a, B: Backend> {
    Crf(&'a CrfHead<B>),
    Span(&'a SpanHead<B>),
}

/// Raw head output before loss or decoding
#[derive(Debug, Clone)]
pub enum Scores<B: Backend> {
    /// CRF emissions - [B, T, L]
    Emissions(Tensor<B, 3>),
    /// Span label logits - [B, N, C]
    SpanLogits(Tensor<B, 3>),
}

#[derive(Debug, Clone)]
pub enum Prediction<B: Backend> {
    /// Best tag path per sentence, exactly as long as the sentence
    Tags(Vec<DecodedSequence>),
    /// Label distribution per candidate span - [B, N, C]
    SpanProbabilities(Tensor<B, 3>),
}

impl<B: Backend> NerModel<B> {
    /// Width of the vectors fed to the head
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn parser_mode(&self) -> ParserMode {
        if self.span_head.is_some() { ParserMode::Span } else { ParserMode::Crf }
    }

    pub fn dep_model(&self) -> DepModel {
        if self.gcn.is_some() { DepModel::DgGcn } else { DepModel::None }
    }

    fn head(&self) -> Result<Head<'_, B>> {
        match (&self.crf_head, &self.span_head) {
            (Some(crf), _) => Ok(Head::Crf(crf)),
            (None, Some(span)) => Ok(Head::Span(span)),
            (None, None) => Err(NerError::MissingHead),
        }
    }

    /// Per-word features: transformer output, GCN-refined when enabled - [B, T, F]
    pub fn word_features(&self, batch: &NerBatch<B>) -> Result<Tensor<B, 3>> {
        let word_rep = self.embedder.forward(
            batch.subword_ids.clone(),
            batch.orig_to_tok_index.clone(),
            batch.attention_mask.clone(),
        )?;
        match &self.gcn {
            None => Ok(word_rep),
            Some(gcn) => {
                let (adjacency, labeled) = build_adjacency::<B>(
                    &batch.dep_heads,
                    &batch.dep_labels,
                    batch.max_words(),
                    self.root_dep_label,
                    &word_rep.device(),
                )?;
                Ok(gcn.forward(word_rep, batch.word_mask.clone(), adjacency, labeled))
            }
        }
    }

    /// Shared scoring routine behind `loss` and `decode`
    pub fn scores(&self, batch: &NerBatch<B>) -> Result<Scores<B>> {
        let head = self.head()?;
        let features = self.word_features(batch)?;
        match head {
            Head::Crf(crf) => Ok(Scores::Emissions(crf.encoder.forward(features, &batch.word_seq_lens))),
            Head::Span(span) => {
                let spans = batch.spans.as_ref().ok_or(NerError::MissingSpans)?;
                let endpoint = span.endpoint.forward(
                    features.clone(),
                    spans.span_ids.clone(),
                    spans.width_buckets.clone(),
                    spans.real_span_mask.clone(),
                );
                let attentive = span.attentive.forward(
                    features,
                    spans.span_ids.clone(),
                    spans.real_span_mask.clone(),
                );
                let reps = Tensor::cat(vec![endpoint, attentive], 2);
                Ok(Scores::SpanLogits(span.classifier.forward(reps)))
            }
        }
    }

    /// Training objective for one batch - `[1]`
    ///
    /// CRF mode: negative log-likelihood summed over the batch.
    /// Span mode: weighted cross entropy averaged over real spans.
    pub fn loss(&self, batch: &NerBatch<B>) -> Result<Tensor<B, 1>> {
        match self.head()? {
            Head::Crf(head) => {
                let tags = batch.tags.clone().ok_or(NerError::MissingLabels)?;
                let Scores::Emissions(emissions) = self.scores(batch)? else {
                    return Err(NerError::MissingHead);
                };
                let loss = head.crf.forward(
                    emissions,
                    batch.word_lens.clone(),
                    tags,
                    batch.word_mask.clone(),
                );
                Ok(loss.nll())
            }
            Head::Span(_) => {
                let spans = batch.spans.as_ref().ok_or(NerError::MissingSpans)?;
                let labels = spans.labels.clone().ok_or(NerError::MissingLabels)?;
                let Scores::SpanLogits(logits) = self.scores(batch)? else {
                    return Err(NerError::MissingHead);
                };
                Ok(masked_span_loss(
                    logits,
                    labels,
                    spans.weights.clone(),
                    spans.real_span_mask.clone(),
                ))
            }
        }
    }

    /// Best tag paths (CRF) or per-span label probabilities (span)
    pub fn decode(&self, batch: &NerBatch<B>) -> Result<Prediction<B>> {
        match (self.head()?, self.scores(batch)?) {
            (Head::Crf(head), Scores::Emissions(emissions)) => {
                Ok(Prediction::Tags(head.crf.decode(emissions, &batch.word_seq_lens)?))
            }
            (_, Scores::SpanLogits(logits)) => Ok(Prediction::SpanProbabilities(softmax(logits, 2))),
            (Head::Span(_), Scores::Emissions(_)) => Err(NerError::MissingHead),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::NerBatcher, sample::SampleBuilder};
    use burn::data::dataloader::batcher::Batcher;
    use crate::domain::sentence::Sentence;

    type B = burn::backend::NdArray;

    fn sentence(n: usize, labels: &[&str]) -> Sentence {
        Sentence {
            words:             (0..n).map(|i| format!("w{i}")).collect(),
            subword_ids:       (0..n as u32 + 2).map(|i| i + 4).collect(),
            orig_to_tok_index: (1..=n).collect(),
            heads:             (0..n).map(|i| if i == 0 { None } else { Some(i - 1) }).collect(),
            dep_labels:        (0..n).map(|i| if i == 0 { "root" } else { "nsubj" }.to_string()).collect(),
            labels:            Some(labels.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn sentences() -> Vec<Sentence> {
        vec![
            sentence(3, &["B-PER", "E-PER", "O"]),
            sentence(5, &["O", "S-PER", "O", "B-PER", "E-PER"]),
        ]
    }

    fn model_config(dep_model: DepModel, mode: ParserMode) -> NerModelConfig {
        let embedder = TransformerEmbedderConfig::new("test-tiny".into(), 50, 16, 2, 1, 32)
            .with_max_position(32)
            .with_dropout(0.0);
        let labels = match mode {
            ParserMode::Crf => LabelVocab::for_sequence(["O", "B-PER", "E-PER", "S-PER"]),
            ParserMode::Span => LabelVocab::for_spans(["PER"]),
        };
        NerModelConfig::new(embedder, labels, DepLabelVocab::new(["nsubj", "obj"], "root"))
            .with_dep_model(dep_model)
            .with_parser_mode(mode)
            .with_gcn_output_dim(12)
            .with_max_entity_length(3)
            .with_dropout(0.0)
            .with_classifier_dropout(0.0)
    }

    fn batch_for<BB: Backend>(cfg: &NerModelConfig, with_gold: bool) -> NerBatch<BB> {
        let mut sentences = sentences();
        if !with_gold {
            sentences.iter_mut().for_each(|s| s.labels = None);
        }
        let samples = SampleBuilder::new(&cfg.labels, &cfg.dep_labels, cfg.parser_mode, cfg.max_entity_length)
            .build_all(&sentences)
            .unwrap();
        let pad = cfg.labels.sentinels().map(|s| s.pad).unwrap_or(0);
        NerBatcher::new(pad).batch(samples, &Default::default())
    }

    #[test]
    fn test_word_feature_shape_is_mode_independent() {
        let device = Default::default();
        for (dep_model, dim) in [(DepModel::None, 16), (DepModel::DgGcn, 12)] {
            for mode in [ParserMode::Crf, ParserMode::Span] {
                let cfg = model_config(dep_model, mode);
                let model = cfg.init::<B>(&device).unwrap();
                assert_eq!(model.feature_dim(), dim);
                assert_eq!((model.dep_model(), model.parser_mode()), (dep_model, mode));
                let features = model.word_features(&batch_for::<B>(&cfg, true)).unwrap();
                assert_eq!(features.dims(), [2, 5, dim]);
            }
        }
    }

    #[test]
    fn test_crf_decode_respects_lengths() {
        let device = Default::default();
        for dep_model in [DepModel::None, DepModel::DgGcn] {
            for hidden_dim in [0, 8] {
                let cfg = model_config(dep_model, ParserMode::Crf).with_hidden_dim(hidden_dim);
                let model = cfg.init::<B>(&device).unwrap();
                let Prediction::Tags(decoded) = model.decode(&batch_for::<B>(&cfg, false)).unwrap() else {
                    panic!("CRF model must decode tags");
                };
                let lens: Vec<usize> = decoded.iter().map(|d| d.tags.len()).collect();
                assert_eq!(lens, vec![3, 5]);

                let s = cfg.labels.sentinels().unwrap();
                assert!(decoded
                    .iter()
                    .flat_map(|d| &d.tags)
                    .all(|t| *t != s.start && *t != s.stop && *t != s.pad));
            }
        }
    }

    #[test]
    fn test_crf_loss_is_non_negative() {
        let device = Default::default();
        let cfg = model_config(DepModel::DgGcn, ParserMode::Crf).with_hidden_dim(8);
        let model = cfg.init::<B>(&device).unwrap();
        let loss: f32 = model.loss(&batch_for::<B>(&cfg, true)).unwrap().into_scalar().elem();
        assert!(loss.is_finite() && loss >= 0.0);
    }

    #[test]
    fn test_loss_requires_gold() {
        let device = Default::default();
        for mode in [ParserMode::Crf, ParserMode::Span] {
            let cfg = model_config(DepModel::None, mode);
            let model = cfg.init::<B>(&device).unwrap();
            let err = model.loss(&batch_for::<B>(&cfg, false)).unwrap_err();
            assert!(matches!(err, NerError::MissingLabels));
        }
    }

    #[test]
    fn test_span_mode_probabilities_and_loss() {
        let device = Default::default();
        let cfg = model_config(DepModel::DgGcn, ParserMode::Span).with_span_combination("x,y,x*y".into());
        let model = cfg.init::<B>(&device).unwrap();
        let batch = batch_for::<B>(&cfg, true);
        let num_spans = batch.spans.as_ref().unwrap().counts.iter().copied().max().unwrap();

        let Prediction::SpanProbabilities(probs) = model.decode(&batch).unwrap() else {
            panic!("span model must decode probabilities");
        };
        assert_eq!(probs.dims(), [2, num_spans, 2]);
        let total: f32 = probs.sum().into_scalar().elem();
        assert!((total - (2 * num_spans) as f32).abs() < 1e-3);

        let loss: f32 = model.loss(&batch).unwrap().into_scalar().elem();
        assert!(loss.is_finite() && loss > 0.0);
    }

    #[test]
    fn test_crf_config_without_sentinels_fails() {
        let device = Default::default();
        let mut cfg = model_config(DepModel::None, ParserMode::Crf);
        cfg.labels = LabelVocab::for_spans(["PER"]);
        assert!(matches!(cfg.init::<B>(&device), Err(NerError::MissingSentinel(_))));
    }

    #[test]
    fn test_gradients_reach_transitions() {
        type AB = burn::backend::Autodiff<B>;
        let device = Default::default();
        let cfg = model_config(DepModel::DgGcn, ParserMode::Crf);
        let model = cfg.init::<AB>(&device).unwrap();
        let loss = model.loss(&batch_for::<AB>(&cfg, true)).unwrap();
        let grads = loss.backward();

        let crf = &model.crf_head.as_ref().unwrap().crf;
        assert!(crf.transitions().grad(&grads).is_some());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = model_config(DepModel::DgGcn, ParserMode::Span);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        cfg.save(&path).unwrap();
        let loaded = NerModelConfig::load(&path).unwrap();
        assert_eq!(loaded.dep_model, DepModel::DgGcn);
        assert_eq!(loaded.parser_mode, ParserMode::Span);
        assert_eq!(loaded.labels, cfg.labels);
        assert_eq!(loaded.gcn_output_dim, 12);
    }
}
