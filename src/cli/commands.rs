// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `init-config` and `run`,
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use dep_ner::application::{config_use_case::InitConfig, run_use_case::RunConfig};
use dep_ner::domain::mode::{DepModel, ParserMode};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a model configuration file
    InitConfig(InitConfigArgs),

    /// Score or decode a JSON-lines sentence file
    Run(RunArgs),
}

/// clap-facing mirror of DepModel
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DepModelArg {
    None,
    Dggcn,
}

impl From<DepModelArg> for DepModel {
    fn from(a: DepModelArg) -> Self {
        match a {
            DepModelArg::None  => DepModel::None,
            DepModelArg::Dggcn => DepModel::DgGcn,
        }
    }
}

/// clap-facing mirror of ParserMode
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ParserModeArg {
    Crf,
    Span,
}

impl From<ParserModeArg> for ParserMode {
    fn from(a: ParserModeArg) -> Self {
        match a {
            ParserModeArg::Crf  => ParserMode::Crf,
            ParserModeArg::Span => ParserMode::Span,
        }
    }
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the JSON config
    #[arg(long, default_value = "model.json")]
    pub output: PathBuf,

    /// Embedder preset (bert-base-cased, roberta-base, bert-tiny, ...)
    #[arg(long, default_value = "bert-base-cased")]
    pub embedder: String,

    /// Comma-separated labels: tags for CRF mode ("O,B-PER,E-PER"),
    /// entity types for span mode ("PER,LOC")
    #[arg(long, value_delimiter = ',', required = true)]
    pub labels: Vec<String>,

    /// Comma-separated dependency relations
    #[arg(long, value_delimiter = ',', default_value = "nsubj,obj,obl,amod,compound,nmod,det,case,punct")]
    pub dep_labels: Vec<String>,

    /// Relation name carried by the root word
    #[arg(long, default_value = "root")]
    pub root_dep_label: String,

    /// BiLSTM width; 0 selects a linear encoder
    #[arg(long, default_value_t = 0)]
    pub hidden_dim: usize,

    #[arg(long, value_enum, default_value_t = DepModelArg::None)]
    pub dep_model: DepModelArg,

    #[arg(long, value_enum, default_value_t = ParserModeArg::Crf)]
    pub parser_mode: ParserModeArg,

    /// Disable the IOBES transition constraints
    #[arg(long)]
    pub no_iobes: bool,

    /// Widest candidate span in span mode
    #[arg(long, default_value_t = 8)]
    pub max_entity_length: usize,

    /// GCN output width
    #[arg(long, default_value_t = 200)]
    pub gcn_output_dim: usize,
}

/// The application layer never sees clap types.
impl From<InitConfigArgs> for InitConfig {
    fn from(a: InitConfigArgs) -> Self {
        InitConfig {
            output:            a.output,
            embedder:          a.embedder,
            labels:            a.labels,
            dep_labels:        a.dep_labels,
            root_dep_label:    a.root_dep_label,
            hidden_dim:        a.hidden_dim,
            dep_model:         a.dep_model.into(),
            parser_mode:       a.parser_mode.into(),
            iobes:             !a.no_iobes,
            max_entity_length: a.max_entity_length,
            gcn_output_dim:    a.gcn_output_dim,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Model config written by `init-config`
    #[arg(long, default_value = "model.json")]
    pub config: PathBuf,

    /// JSON-lines file, one dependency-parsed sentence per line
    #[arg(long)]
    pub input: PathBuf,

    /// tokenizer.json, or a directory containing it
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Report the training loss instead of decoded entities
    #[arg(long)]
    pub train: bool,
}

impl From<RunArgs> for RunConfig {
    fn from(a: RunArgs) -> Self {
        RunConfig {
            config_path: a.config,
            input:       a.input,
            tokenizer:   a.tokenizer,
            batch_size:  a.batch_size,
            train:       a.train,
        }
    }
}
