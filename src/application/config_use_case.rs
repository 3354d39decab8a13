// ============================================================
// Layer 2 - Init Config Use Case
// ============================================================
// Writes a model configuration file that `run` later reads:
//
//   Step 1: Resolve the embedder preset        (Layer 5 - ml)
//   Step 2: Build label + dependency vocabs    (Layer 3 - domain)
//           CRF tags are expanded to the full IOBES set
//   Step 3: Apply the mode switches
//   Step 4: Save as JSON                       (burn Config)

use anyhow::{Context, Result};
use burn::config::Config;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::{
    labels::{iobes_tag_set, DepLabelVocab, LabelVocab},
    mode::{DepModel, ParserMode},
};
use crate::ml::{embedder::TransformerEmbedderConfig, model::NerModelConfig};

/// Everything needed to describe a model before it exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    pub output:            PathBuf,
    pub embedder:          String,
    /// CRF: full tags ("B-PER"); span mode: entity types ("PER")
    pub labels:            Vec<String>,
    pub dep_labels:        Vec<String>,
    pub root_dep_label:    String,
    pub hidden_dim:        usize,
    pub dep_model:         DepModel,
    pub parser_mode:       ParserMode,
    pub iobes:             bool,
    pub max_entity_length: usize,
    pub gcn_output_dim:    usize,
}

pub struct InitConfigUseCase {
    config: InitConfig,
}

impl InitConfigUseCase {
    pub fn new(config: InitConfig) -> Self {
        Self { config }
    }

    /// The model config this use case would write
    pub fn build(&self) -> Result<NerModelConfig> {
        let c = &self.config;
        let embedder = TransformerEmbedderConfig::from_preset(&c.embedder).with_context(|| {
            let known: Vec<&str> = TransformerEmbedderConfig::preset_names().collect();
            format!("Known embedders: {}", known.join(", "))
        })?;

        if c.labels.is_empty() {
            anyhow::bail!("At least one label is required");
        }
        let labels = match c.parser_mode {
            ParserMode::Crf  => LabelVocab::for_sequence(iobes_tag_set(&c.labels)),
            ParserMode::Span => LabelVocab::for_spans(&c.labels),
        };
        let dep_labels = DepLabelVocab::new(&c.dep_labels, c.root_dep_label.clone());

        Ok(NerModelConfig::new(embedder, labels, dep_labels)
            .with_hidden_dim(c.hidden_dim)
            .with_dep_model(c.dep_model)
            .with_parser_mode(c.parser_mode)
            .with_add_iobes_constraint(c.iobes)
            .with_max_entity_length(c.max_entity_length)
            .with_gcn_output_dim(c.gcn_output_dim))
    }

    pub fn execute(&self) -> Result<NerModelConfig> {
        let model_config = self.build()?;
        if let Some(parent) = self.config.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create '{}'", parent.display()))?;
            }
        }
        model_config
            .save(&self.config.output)
            .with_context(|| format!("Cannot write config to '{}'", self.config.output.display()))?;
        tracing::info!(
            "Wrote {} config with {} labels to '{}'",
            model_config.embedder.name,
            model_config.labels.len(),
            self.config.output.display()
        );
        Ok(model_config)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn init(output: PathBuf, mode: ParserMode, labels: &[&str]) -> InitConfig {
        InitConfig {
            output,
            embedder:          "bert-tiny".into(),
            labels:            labels.iter().map(|s| s.to_string()).collect(),
            dep_labels:        vec!["nsubj".into(), "obj".into()],
            root_dep_label:    "root".into(),
            hidden_dim:        0,
            dep_model:         DepModel::DgGcn,
            parser_mode:       mode,
            iobes:             true,
            max_entity_length: 6,
            gcn_output_dim:    64,
        }
    }

    #[test]
    fn test_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let written = InitConfigUseCase::new(init(path.clone(), ParserMode::Crf, &["O", "B-PER", "E-PER", "S-PER"]))
            .execute()
            .unwrap();

        let loaded = NerModelConfig::load(&path).unwrap();
        assert_eq!(loaded.labels, written.labels);
        assert_eq!(loaded.labels.len(), 5 + 3);
        assert_eq!(loaded.dep_labels.root_id(), 3);
        assert_eq!(loaded.embedder.d_model, 128);
        assert_eq!(loaded.dep_model, DepModel::DgGcn);
    }

    #[test]
    fn test_bio_labels_become_iobes_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = InitConfigUseCase::new(init(dir.path().join("m.json"), ParserMode::Crf, &["O", "B-PER", "I-PER"]))
            .build()
            .unwrap();
        for tag in ["B-PER", "I-PER", "E-PER", "S-PER"] {
            assert!(cfg.labels.id(tag).is_some(), "{tag} missing");
        }
    }

    #[test]
    fn test_span_mode_uses_entity_types() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = InitConfigUseCase::new(init(dir.path().join("m.json"), ParserMode::Span, &["PER", "LOC"]))
            .build()
            .unwrap();
        assert_eq!(cfg.labels.labels(), &["O", "PER", "LOC"]);
    }

    #[test]
    fn test_unknown_embedder_lists_presets() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = init(dir.path().join("m.json"), ParserMode::Crf, &["O"]);
        c.embedder = "gpt-17".into();
        let err = InitConfigUseCase::new(c).build().unwrap_err();
        assert!(format!("{err:#}").contains("bert-base-cased"));
    }
}
