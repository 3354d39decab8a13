// ============================================================
// Layer 4 - Sample Builder
// ============================================================
// Converts a string-level Sentence into an id-level NerSample:
//
//   dep_labels  "nsubj"      → dependency vocab id
//   labels      "B-PER"      → tag id            (CRF mode)
//               entity spans → span label ids    (span mode)
//
// Gold tags are always rewritten to IOBES first, so BIO and
// IOBES input files map onto the same vocabulary.
//
// In span mode every window up to max_span_width becomes a
// candidate. A candidate matching a gold entity gets that
// entity's type; every other candidate gets "O" and the
// (configurable) negative-span weight.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    labels::{convert_to_iobes, DepLabelVocab, LabelVocab},
    mode::ParserMode,
    sentence::Sentence,
    span::{bucket_width, entities_from_tags, enumerate_spans, SpanDescriptor},
};
use crate::error::{NerError, Result};

/// One sentence in id form, ready for the batcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NerSample {
    /// Position of the source sentence in its input file
    pub sentence_index:    usize,
    pub subword_ids:       Vec<u32>,
    pub orig_to_tok_index: Vec<usize>,
    pub heads:             Vec<Option<usize>>,
    pub dep_labels:        Vec<usize>,
    /// Gold tag ids (CRF mode with labels)
    pub tags:              Option<Vec<usize>>,
    /// Candidate spans (span mode)
    pub spans:             Vec<SpanDescriptor>,
}

impl NerSample {
    /// Number of words
    pub fn len(&self) -> usize {
        self.orig_to_tok_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orig_to_tok_index.is_empty()
    }
}

pub struct SampleBuilder<'a> {
    labels:               &'a LabelVocab,
    dep_labels:           &'a DepLabelVocab,
    mode:                 ParserMode,
    max_span_width:       usize,
    negative_span_weight: f32,
}

impl<'a> SampleBuilder<'a> {
    pub fn new(
        labels:         &'a LabelVocab,
        dep_labels:     &'a DepLabelVocab,
        mode:           ParserMode,
        max_span_width: usize,
    ) -> Self {
        Self {
            labels,
            dep_labels,
            mode,
            max_span_width,
            negative_span_weight: 1.0,
        }
    }

    /// Weight applied to candidate spans that are not entities
    pub fn with_negative_span_weight(mut self, weight: f32) -> Self {
        self.negative_span_weight = weight;
        self
    }

    pub fn build(&self, sentence: &Sentence) -> Result<NerSample> {
        sentence.validate()?;
        let dep_labels = self.dep_labels.encode(&sentence.dep_labels)?;

        // BIO and IOBES gold both end up as IOBES
        let gold = sentence.labels.as_deref().map(convert_to_iobes);

        let (tags, spans) = match self.mode {
            ParserMode::Crf => {
                let tags = gold.as_ref().map(|g| self.labels.encode(g)).transpose()?;
                (tags, Vec::new())
            }
            ParserMode::Span => (None, self.candidate_spans(sentence.len(), gold.as_deref())?),
        };

        Ok(NerSample {
            sentence_index:    0,
            subword_ids:       sentence.subword_ids.clone(),
            orig_to_tok_index: sentence.orig_to_tok_index.clone(),
            heads:             sentence.heads.clone(),
            dep_labels,
            tags,
            spans,
        })
    }

    pub fn build_all(&self, sentences: &[Sentence]) -> Result<Vec<NerSample>> {
        sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let sample = self.build(s).map_err(|e| match e {
                    NerError::InvalidHead { word, head, len, .. } => {
                        NerError::InvalidHead { sentence: i, word, head, len }
                    }
                    other => other,
                })?;
                Ok(NerSample { sentence_index: i, ..sample })
            })
            .collect()
    }

    fn candidate_spans(&self, len: usize, gold: Option<&[String]>) -> Result<Vec<SpanDescriptor>> {
        let entities: Option<HashMap<(usize, usize), usize>> = match gold {
            None => None,
            Some(tags) => {
                let mut by_range = HashMap::new();
                for entity in entities_from_tags(tags) {
                    if entity.end - entity.start >= self.max_span_width {
                        tracing::debug!(
                            "Entity {}..={} ({}) is wider than {} words and has no candidate span",
                            entity.start, entity.end, entity.label, self.max_span_width
                        );
                        continue;
                    }
                    let id = self
                        .labels
                        .id(&entity.label)
                        .ok_or_else(|| NerError::UnknownLabel(entity.label.clone()))?;
                    by_range.insert((entity.start, entity.end), id);
                }
                Some(by_range)
            }
        };
        let outside = self.labels.outside_id().unwrap_or(0);

        Ok(enumerate_spans(len, self.max_span_width)
            .map(|(start, end)| {
                let gold_id = entities.as_ref().map(|e| e.get(&(start, end)).copied());
                let (label, weight) = match gold_id {
                    None => (None, 1.0),
                    Some(Some(id)) => (Some(id), 1.0),
                    Some(None) => (Some(outside), self.negative_span_weight),
                };
                SpanDescriptor {
                    start,
                    end,
                    width_bucket: bucket_width(end - start, self.max_span_width),
                    weight,
                    label,
                }
            })
            .collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(labels: Option<&[&str]>) -> Sentence {
        Sentence {
            words:             vec!["Ada".into(), "Lovelace".into(), "lived".into(), "in".into()],
            subword_ids:       vec![2, 4, 5, 6, 7, 3],
            orig_to_tok_index: vec![1, 2, 4, 4],
            heads:             vec![Some(1), Some(2), None, Some(2)],
            dep_labels:        vec!["compound".into(), "nsubj".into(), "root".into(), "obl".into()],
            labels:            labels.map(|l| l.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn deps() -> DepLabelVocab {
        DepLabelVocab::new(["compound", "nsubj", "obl"], "root")
    }

    #[test]
    fn test_crf_sample_with_iobes_conversion() {
        let labels = LabelVocab::for_sequence(["O", "B-PER", "E-PER", "S-PER"]);
        let deps = deps();
        let builder = SampleBuilder::new(&labels, &deps, ParserMode::Crf, 4);
        let sample = builder.build(&sentence(Some(&["B-PER", "I-PER", "O", "O"]))).unwrap();
        let expected = labels.encode(&["B-PER", "E-PER", "O", "O"]).unwrap();
        assert_eq!(sample.tags, Some(expected));
        assert_eq!(sample.dep_labels, vec![1, 2, 4, 3]);
        assert!(sample.spans.is_empty());
    }

    #[test]
    fn test_build_all_records_sentence_positions() {
        let labels = LabelVocab::for_sequence(["O", "B-PER", "E-PER", "S-PER"]);
        let deps = deps();
        let builder = SampleBuilder::new(&labels, &deps, ParserMode::Crf, 4);
        let sentences = vec![sentence(None), sentence(Some(&["S-PER", "O", "B-PER", "I-PER"]))];
        let samples = builder.build_all(&sentences).unwrap();
        assert_eq!(samples.iter().map(|s| s.sentence_index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(samples[1].tags, Some(labels.encode(&["S-PER", "O", "B-PER", "E-PER"]).unwrap()));
    }

    #[test]
    fn test_span_sample_labels_and_weights() {
        let labels = LabelVocab::for_spans(["PER"]);
        let deps = deps();
        let builder = SampleBuilder::new(&labels, &deps, ParserMode::Span, 2)
            .with_negative_span_weight(0.5);
        let sample = builder.build(&sentence(Some(&["B-PER", "I-PER", "O", "O"]))).unwrap();

        // 4 words, width ≤ 2 → 4 + 3 candidates
        assert_eq!(sample.spans.len(), 7);
        let per = sample.spans.iter().find(|s| (s.start, s.end) == (0, 1)).unwrap();
        assert_eq!((per.label, per.weight), (Some(1), 1.0));
        let neg = sample.spans.iter().find(|s| (s.start, s.end) == (2, 3)).unwrap();
        assert_eq!((neg.label, neg.weight), (Some(0), 0.5));
        assert_eq!(neg.width_bucket, 1);
    }

    #[test]
    fn test_span_sample_without_gold() {
        let labels = LabelVocab::for_spans(["PER"]);
        let deps = deps();
        let builder = SampleBuilder::new(&labels, &deps, ParserMode::Span, 3);
        let sample = builder.build(&sentence(None)).unwrap();
        assert!(sample.spans.iter().all(|s| s.label.is_none() && s.weight == 1.0));
    }

    #[test]
    fn test_unknown_dep_label() {
        let labels = LabelVocab::for_sequence(["O"]);
        let deps = DepLabelVocab::new(["nsubj"], "root");
        let builder = SampleBuilder::new(&labels, &deps, ParserMode::Crf, 4);
        assert!(matches!(builder.build(&sentence(None)), Err(NerError::UnknownDepLabel(_))));
    }
}
