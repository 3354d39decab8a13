// ============================================================
// Layer 4 - NER Dataset
// ============================================================
// Wraps built samples in Burn's Dataset trait so the
// DataLoader can index and batch them.

use burn::data::dataset::Dataset;

use crate::data::sample::NerSample;

pub struct NerDataset {
    samples: Vec<NerSample>,
}

impl NerDataset {
    pub fn new(samples: Vec<NerSample>) -> Self {
        Self { samples }
    }

    /// Sample built from the sentence at `sentence_index`
    pub fn by_sentence(&self, sentence_index: usize) -> Option<&NerSample> {
        self.samples
            .get(sentence_index)
            .filter(|s| s.sentence_index == sentence_index)
            .or_else(|| self.samples.iter().find(|s| s.sentence_index == sentence_index))
    }
}

impl Dataset<NerSample> for NerDataset {
    fn get(&self, index: usize) -> Option<NerSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sentence_index: usize) -> NerSample {
        NerSample {
            sentence_index,
            subword_ids:       vec![2, 4, 3],
            orig_to_tok_index: vec![1],
            heads:             vec![None],
            dep_labels:        vec![1],
            tags:              None,
            spans:             vec![],
        }
    }

    #[test]
    fn test_dataset_indexing() {
        let dataset = NerDataset::new(vec![sample(0), sample(1)]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).map(|s| s.sentence_index), Some(1));
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_lookup_by_sentence_survives_reordering() {
        let dataset = NerDataset::new(vec![sample(3), sample(0)]);
        assert_eq!(dataset.by_sentence(0).map(|s| s.sentence_index), Some(0));
        assert_eq!(dataset.by_sentence(3).map(|s| s.sentence_index), Some(3));
        assert!(dataset.by_sentence(1).is_none());
    }
}
