// ============================================================
// Layer 3 - Label Vocabularies
// ============================================================
// Two vocabularies drive the model:
//
//   LabelVocab     - entity labels predicted by the model.
//                    Sequence mode: tags (BIO / IOBES) plus the
//                    <PAD>, <START>, <STOP> sentinels the CRF needs.
//                    Span mode: flat entity types with "O" = 0.
//
//   DepLabelVocab  - dependency relation labels consumed by the
//                    GCN. Id 0 is reserved for "no edge" so the
//                    labeled adjacency matrix can be zero-padded.
//
// Both serialise as plain JSON lists inside the model config,
// which keeps label ids stable between training and decoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};

pub const PAD_TAG:   &str = "<PAD>";
pub const START_TAG: &str = "<START>";
pub const STOP_TAG:  &str = "<STOP>";
pub const OUTSIDE:   &str = "O";

/// Reserved "no edge" slot of the dependency vocabulary
pub const NO_EDGE: &str = "<none>";

// ─── Vocab ────────────────────────────────────────────────────────────────────
/// Ordered string ↔ id table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
struct Vocab {
    items: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocab {
    fn push(&mut self, item: &str) {
        if !self.index.contains_key(item) {
            self.index.insert(item.to_string(), self.items.len());
            self.items.push(item.to_string());
        }
    }
}

impl From<Vec<String>> for Vocab {
    fn from(items: Vec<String>) -> Self {
        let mut vocab = Vocab { items: Vec::with_capacity(items.len()), index: HashMap::new() };
        for item in &items {
            vocab.push(item);
        }
        vocab
    }
}

impl From<Vocab> for Vec<String> {
    fn from(v: Vocab) -> Self {
        v.items
    }
}

// ─── LabelVocab ───────────────────────────────────────────────────────────────
/// Entity label vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelVocab {
    vocab: Vocab,
}

/// Ids of the three CRF sentinel labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinels {
    pub start: usize,
    pub stop:  usize,
    pub pad:   usize,
}

impl LabelVocab {
    /// Tag vocabulary for CRF decoding:
    /// `[<PAD>, tags in first-seen order…, <START>, <STOP>]`
    pub fn for_sequence<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocab::from(vec![PAD_TAG.to_string()]);
        for tag in tags {
            let tag = tag.as_ref();
            if tag != START_TAG && tag != STOP_TAG {
                vocab.push(tag);
            }
        }
        vocab.push(START_TAG);
        vocab.push(STOP_TAG);
        Self { vocab }
    }

    /// Entity-type vocabulary for span classification, "O" is id 0
    pub fn for_spans<I, S>(entity_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocab::from(vec![OUTSIDE.to_string()]);
        for ty in entity_types {
            vocab.push(ty.as_ref());
        }
        Self { vocab }
    }

    pub fn len(&self) -> usize {
        self.vocab.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.items.is_empty()
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.vocab.index.get(label).copied()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.vocab.items.get(id).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.vocab.items
    }

    /// Map label strings to ids, failing on the first unknown label
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| {
                let l = l.as_ref();
                self.id(l).ok_or_else(|| NerError::UnknownLabel(l.to_string()))
            })
            .collect()
    }

    pub fn sentinels(&self) -> Result<Sentinels> {
        let find = |tag: &'static str| self.id(tag).ok_or(NerError::MissingSentinel(tag));
        Ok(Sentinels {
            start: find(START_TAG)?,
            stop:  find(STOP_TAG)?,
            pad:   find(PAD_TAG)?,
        })
    }

    pub fn outside_id(&self) -> Option<usize> {
        self.id(OUTSIDE)
    }
}

// ─── DepLabelVocab ────────────────────────────────────────────────────────────
/// Dependency relation vocabulary with a designated root relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepLabelVocab {
    labels: Vocab,
    root:   String,
}

impl DepLabelVocab {
    /// Build from relation names; `root` is added if it is not listed.
    pub fn new<I, S>(labels: I, root: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = root.into();
        let mut vocab = Vocab::from(vec![NO_EDGE.to_string()]);
        for label in labels {
            vocab.push(label.as_ref());
        }
        vocab.push(&root);
        Self { labels: vocab, root }
    }

    pub fn len(&self) -> usize {
        self.labels.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.items.is_empty()
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.labels.index.get(label).copied()
    }

    pub fn root_id(&self) -> usize {
        // `new` always inserts the root relation
        self.id(&self.root).unwrap_or(0)
    }

    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| {
                let l = l.as_ref();
                self.id(l).ok_or_else(|| NerError::UnknownDepLabel(l.to_string()))
            })
            .collect()
    }
}

// ─── Tag Scheme ───────────────────────────────────────────────────────────────
/// Position prefix of a BIO / IOBES tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Outside,
    Begin,
    Inside,
    End,
    Single,
    /// Sentinels and anything without a recognised prefix
    Other,
}

/// Split "B-PER" into (Begin, "PER"). "O" → (Outside, "").
pub fn split_tag(tag: &str) -> (TagKind, &str) {
    if tag == OUTSIDE {
        return (TagKind::Outside, "");
    }
    let kind = match tag.get(..2) {
        Some("B-") => TagKind::Begin,
        Some("I-") => TagKind::Inside,
        Some("E-") => TagKind::End,
        Some("S-") => TagKind::Single,
        _ => return (TagKind::Other, tag),
    };
    (kind, &tag[2..])
}

/// Whether `prev → next` is a structurally valid IOBES move.
/// Labels of kind `Other` are unconstrained here.
pub fn iobes_allowed(prev: &str, next: &str) -> bool {
    use TagKind::*;
    let (pk, pt) = split_tag(prev);
    let (nk, nt) = split_tag(next);
    match (pk, nk) {
        (Other, _) | (_, Other) => true,
        (Outside, Inside | End) => false,
        (Begin | Inside, Outside | Begin | Single) => false,
        (Begin | Inside, Inside | End) => pt == nt,
        (Single | End, Inside | End) => false,
        _ => true,
    }
}

/// Rewrite a BIO sequence into IOBES.
/// A B- or I- tag becomes S- / E- when the next tag does not continue it.
/// Sequences already in IOBES come back unchanged.
pub fn convert_to_iobes<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out = Vec::with_capacity(tags.len());
    for (pos, tag) in tags.iter().enumerate() {
        let tag = tag.as_ref();
        let (kind, ty) = split_tag(tag);
        let next_continues = tags
            .get(pos + 1)
            .map(|n| matches!(split_tag(n.as_ref()).0, TagKind::Inside | TagKind::End))
            .unwrap_or(false);
        let rewritten = match kind {
            TagKind::Begin  if !next_continues => format!("S-{ty}"),
            TagKind::Inside if !next_continues => format!("E-{ty}"),
            _ => tag.to_string(),
        };
        out.push(rewritten);
    }
    out
}

/// Every IOBES tag for the entity types named in `tags`.
/// "B-PER" or "I-PER" yields B-PER, I-PER, E-PER, S-PER; "O" and
/// unprefixed tags pass through. First-seen order, no duplicates.
pub fn iobes_tag_set<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |tag: String| {
        if !out.contains(&tag) {
            out.push(tag);
        }
    };
    for tag in tags {
        match split_tag(tag.as_ref()) {
            (TagKind::Begin | TagKind::Inside | TagKind::End | TagKind::Single, ty) => {
                for prefix in ["B", "I", "E", "S"] {
                    push(format!("{prefix}-{ty}"));
                }
            }
            _ => push(tag.as_ref().to_string()),
        }
    }
    out
}
