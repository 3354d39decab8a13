// ============================================================
// Layer 3 - Sentence Domain Type
// ============================================================
// One dependency-parsed sentence, as read from disk.
//
//   words               - the original (pre-tokenised) words
//   subword_ids         - transformer token ids, including any
//                         special tokens the tokenizer added
//   orig_to_tok_index   - for word i, the position of its FIRST
//                         subword inside subword_ids
//   heads               - dependency head of each word;
//                         None means attached to the root
//   dep_labels          - dependency relation of each word
//   labels              - optional gold tags (BIO or IOBES)
//
// Example:
//   words:             ["Ada", "Lovelace", "wrote"]
//   subword_ids:       [CLS, Ada, Love, ##lace, wrote, SEP]
//   orig_to_tok_index: [1, 2, 4]
//   heads:             [Some(1), Some(2), None]

use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub words: Vec<String>,

    #[serde(default)]
    pub subword_ids: Vec<u32>,

    #[serde(default)]
    pub orig_to_tok_index: Vec<usize>,

    pub heads: Vec<Option<usize>>,

    pub dep_labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl Sentence {
    /// Number of original words (not subwords)
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// True once subword ids and the word alignment are present
    pub fn is_aligned(&self) -> bool {
        !self.subword_ids.is_empty() && self.orig_to_tok_index.len() == self.words.len()
    }

    /// Check that every per-word array agrees with the word count
    /// and that every index stays inside its sequence.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if n == 0 {
            return Err(NerError::MalformedSentence("sentence has no words".into()));
        }
        let per_word = [
            ("orig_to_tok_index", self.orig_to_tok_index.len()),
            ("heads", self.heads.len()),
            ("dep_labels", self.dep_labels.len()),
        ];
        for (name, len) in per_word {
            if len != n {
                return Err(NerError::MalformedSentence(format!(
                    "{name} has {len} entries for {n} words"
                )));
            }
        }
        if let Some(labels) = &self.labels {
            if labels.len() != n {
                return Err(NerError::MalformedSentence(format!(
                    "labels has {} entries for {n} words",
                    labels.len()
                )));
            }
        }
        if let Some(&pos) = self.orig_to_tok_index.iter().find(|&&p| p >= self.subword_ids.len()) {
            return Err(NerError::MalformedSentence(format!(
                "alignment index {pos} is outside {} subwords",
                self.subword_ids.len()
            )));
        }
        for (word, head) in self.heads.iter().enumerate() {
            if let Some(head) = *head {
                if head >= n {
                    return Err(NerError::InvalidHead { sentence: 0, word, head, len: n });
                }
            }
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sentence {
        Sentence {
            words:             vec!["Ada".into(), "Lovelace".into(), "wrote".into()],
            subword_ids:       vec![1, 10, 11, 12, 13, 2],
            orig_to_tok_index: vec![1, 2, 4],
            heads:             vec![Some(1), Some(2), None],
            dep_labels:        vec!["compound".into(), "nsubj".into(), "root".into()],
            labels:            Some(vec!["B-PER".into(), "E-PER".into(), "O".into()]),
        }
    }

    #[test]
    fn test_valid_sentence() {
        assert!(sample().validate().is_ok());
        assert!(sample().is_aligned());
    }

    #[test]
    fn test_head_out_of_range() {
        let mut s = sample();
        s.heads[0] = Some(7);
        assert!(matches!(s.validate(), Err(NerError::InvalidHead { word: 0, head: 7, .. })));
    }

    #[test]
    fn test_alignment_out_of_range() {
        let mut s = sample();
        s.orig_to_tok_index[2] = 6;
        assert!(matches!(s.validate(), Err(NerError::MalformedSentence(_))));
    }

    #[test]
    fn test_length_mismatch() {
        let mut s = sample();
        s.dep_labels.pop();
        assert!(matches!(s.validate(), Err(NerError::MalformedSentence(_))));
    }

    #[test]
    fn test_json_root_head_is_null() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains(r#""heads":[1,2,null]"#));
        let back: Sentence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
