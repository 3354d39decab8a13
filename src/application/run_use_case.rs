// ============================================================
// Layer 2 - Run Use Case
// ============================================================
// Runs a freshly initialised model over a sentence file:
//
//   Step 1: Load the model config             (burn Config)
//   Step 2: Load sentences                    (Layer 4 - data)
//   Step 3: Align words to subwords if needed (Layer 4 + 6)
//   Step 4: Build samples                     (Layer 4 - data)
//   Step 5: DataLoader batches + score        (Layer 4 + 5)
//   Step 6: Mean loss  OR  decoded entities
//
// The backend is a type parameter so tests can run on NdArray
// while the binary uses Wgpu.

use anyhow::{Context, Result};
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    alignment::SubwordAligner,
    batcher::{NerBatch, NerBatcher},
    dataset::NerDataset,
    loader::JsonlLoader,
    sample::SampleBuilder,
};
use crate::domain::{
    sentence::Sentence,
    span::{entities_from_tags, resolve_spans, Entity},
    traits::SentenceSource,
};
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::{
    model::{NerModel, NerModelConfig, Prediction},
    to_host,
};

pub type RunBackend = burn::backend::Wgpu;
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub config_path: PathBuf,
    pub input:       PathBuf,
    /// tokenizer.json (or its directory); required when the
    /// input sentences carry no subword alignment
    pub tokenizer:   Option<PathBuf>,
    pub batch_size:  usize,
    /// Report the training loss instead of decoding
    pub train:       bool,
}

/// Decoded entities for one input sentence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentencePrediction {
    pub words:    Vec<String>,
    /// Decoded tags (CRF mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags:     Option<Vec<String>>,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RunReport {
    Loss { mean: f32, batches: usize },
    Predictions { sentences: Vec<SentencePrediction> },
}

pub struct RunUseCase {
    config: RunConfig,
}

impl RunUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<RunReport> {
        if self.config.train {
            self.execute_on::<TrainBackend>(&Default::default())
        } else {
            self.execute_on::<RunBackend>(&Default::default())
        }
    }

    pub fn execute_on<B: Backend>(&self, device: &B::Device) -> Result<RunReport> {
        let model_config = NerModelConfig::load(&self.config.config_path).with_context(|| {
            format!("Cannot load model config '{}'", self.config.config_path.display())
        })?;

        let mut sentences = JsonlLoader::new(&self.config.input)
            .load_all()
            .context("Cannot load input sentences")?;
        if sentences.is_empty() {
            anyhow::bail!("No sentences in '{}'", self.config.input.display());
        }
        self.align(&mut sentences, model_config.embedder.vocab_size)?;

        let samples = SampleBuilder::new(
            &model_config.labels,
            &model_config.dep_labels,
            model_config.parser_mode,
            model_config.max_entity_length,
        )
        .with_negative_span_weight(model_config.negative_span_weight)
        .build_all(&sentences)
        .context("Cannot convert sentences to samples")?;

        let model: NerModel<B> = model_config.init(device).context("Cannot build model")?;
        let pad = model_config.labels.sentinels().map(|s| s.pad).unwrap_or(0);
        let lookup = NerDataset::new(samples.clone());
        let loader = DataLoaderBuilder::<B, _, NerBatch<B>>::new(NerBatcher::new(pad))
            .batch_size(self.config.batch_size.max(1))
            .set_device(device.clone())
            .build(NerDataset::new(samples));

        if self.config.train {
            let mut total = 0.0f32;
            let mut batches = 0usize;
            for batch in loader.iter() {
                let loss: f32 = model.loss(&batch)?.into_scalar().elem();
                tracing::debug!("Batch {}: loss={:.4}", batches, loss);
                total += loss;
                batches += 1;
            }
            let mean = total / batches.max(1) as f32;
            tracing::info!("Mean loss over {} batches: {:.4}", batches, mean);
            return Ok(RunReport::Loss { mean, batches });
        }

        let mut predictions = Vec::with_capacity(sentences.len());
        for batch in loader.iter() {
            let prediction = model.decode(&batch)?;
            predictions.extend(read_prediction(
                &model_config,
                &batch.sentence_indices,
                &sentences,
                &lookup,
                prediction,
            )?);
        }
        tracing::info!(
            "Decoded {} sentences, {} entities",
            predictions.len(),
            predictions.iter().map(|p| p.entities.len()).sum::<usize>()
        );
        Ok(RunReport::Predictions { sentences: predictions })
    }

    fn align(&self, sentences: &mut [Sentence], vocab_size: usize) -> Result<()> {
        if sentences.iter().all(Sentence::is_aligned) {
            return Ok(());
        }
        let path = self.config.tokenizer.as_ref().with_context(|| {
            "Input sentences carry no subword ids; pass a tokenizer to align them"
        })?;
        let tokenizer = TokenizerStore::new(path).load()?;
        let tokenizer_vocab = tokenizer.get_vocab_size(true);
        if tokenizer_vocab > vocab_size {
            anyhow::bail!(
                "Tokenizer '{}' has {} tokens but the embedder vocabulary holds {}",
                path.display(),
                tokenizer_vocab,
                vocab_size
            );
        }
        let aligner = SubwordAligner::new(&tokenizer);
        for (i, sentence) in sentences.iter_mut().enumerate() {
            aligner
                .align_sentence(sentence)
                .with_context(|| format!("Cannot align sentence {i}"))?;
        }
        Ok(())
    }
}

/// Turn one batch's prediction into per-sentence output.
/// Rows are matched to their sentences through `sentence_indices`.
fn read_prediction<B: Backend>(
    model_config:     &NerModelConfig,
    sentence_indices: &[usize],
    sentences:        &[Sentence],
    samples:          &NerDataset,
    prediction:       Prediction<B>,
) -> Result<Vec<SentencePrediction>> {
    let labels = &model_config.labels;
    let sentence = move |index: usize| {
        sentences
            .get(index)
            .with_context(|| format!("Batch refers to unknown sentence {index}"))
    };
    match prediction {
        Prediction::Tags(decoded) => decoded
            .into_iter()
            .zip(sentence_indices)
            .map(|(seq, &index)| {
                let tags: Vec<String> = seq
                    .tags
                    .iter()
                    .map(|&id| labels.label(id).unwrap_or("O").to_string())
                    .collect();
                Ok(SentencePrediction {
                    words:    sentence(index)?.words.clone(),
                    entities: entities_from_tags(&tags),
                    tags:     Some(tags),
                })
            })
            .collect(),
        Prediction::SpanProbabilities(probs) => {
            let [_, num_spans, num_labels] = probs.dims();
            let probs = to_host(probs)?;
            let outside = labels.outside_id().unwrap_or(0);
            sentence_indices
                .iter()
                .enumerate()
                .map(|(row, &index)| {
                    let sample = samples
                        .by_sentence(index)
                        .with_context(|| format!("No sample for sentence {index}"))?;
                    let candidates: Vec<(usize, usize)> =
                        sample.spans.iter().map(|s| (s.start, s.end)).collect();
                    let offset = row * num_spans * num_labels;
                    let rows = &probs[offset..offset + candidates.len() * num_labels];
                    let entities = resolve_spans(&candidates, rows, num_labels, outside)
                        .into_iter()
                        .map(|s| Entity::new(s.start, s.end, labels.label(s.label).unwrap_or("?")))
                        .collect();
                    Ok(SentencePrediction { words: sentence(index)?.words.clone(), tags: None, entities })
                })
                .collect()
        }
    }
}
