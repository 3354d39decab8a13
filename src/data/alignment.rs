// ============================================================
// Layer 4 - Subword Alignment
// ============================================================
// The transformer sees subwords, the tagger labels words.
// For every word we record where its FIRST subword sits, and
// the embedder later gathers exactly those positions.
//
//   words:      Ada   Lovelace        wrote
//   subwords:   [CLS] ada  love ##lace wrote [SEP]
//   positions:  0     1    2    3      4     5
//   alignment:        1    2           4
//
// Words are passed to the tokenizer pre-split, so the
// tokenizer's word ids map straight back to word positions.

use tokenizers::Tokenizer;

use crate::domain::sentence::Sentence;
use crate::error::{NerError, Result};

const CLS_CANDIDATES: [&str; 2] = ["[CLS]", "<s>"];
const SEP_CANDIDATES: [&str; 2] = ["[SEP]", "</s>"];

/// Aligns pre-tokenised words with a HuggingFace tokenizer
pub struct SubwordAligner<'a> {
    tokenizer: &'a Tokenizer,
    cls_id:    Option<u32>,
    sep_id:    Option<u32>,
}

impl<'a> SubwordAligner<'a> {
    /// Special tokens are looked up by their BERT / RoBERTa names;
    /// a tokenizer with neither gets no wrapping tokens.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        let find = |names: [&str; 2]| names.iter().find_map(|n| tokenizer.token_to_id(n));
        Self {
            tokenizer,
            cls_id: find(CLS_CANDIDATES),
            sep_id: find(SEP_CANDIDATES),
        }
    }

    /// Returns (subword_ids, orig_to_tok_index) for the given words
    pub fn align<S: AsRef<str>>(&self, words: &[S]) -> Result<(Vec<u32>, Vec<usize>)> {
        let words: Vec<&str> = words.iter().map(AsRef::as_ref).collect();
        let encoding = self
            .tokenizer
            .encode(words.as_slice(), false)
            .map_err(|e| NerError::Tokenizer(e.to_string()))?;

        let offset = usize::from(self.cls_id.is_some());
        let mut ids = Vec::with_capacity(encoding.len() + 2);
        ids.extend(self.cls_id);
        ids.extend_from_slice(encoding.get_ids());
        ids.extend(self.sep_id);

        let mut first: Vec<Option<usize>> = vec![None; words.len()];
        for (pos, word) in encoding.get_word_ids().iter().enumerate() {
            if let Some(slot) = word.and_then(|w| first.get_mut(w as usize)) {
                slot.get_or_insert(pos + offset);
            }
        }

        // A word that produced no subword borrows its left neighbour's position
        let mut alignment = Vec::with_capacity(words.len());
        let mut last = offset;
        for (i, pos) in first.into_iter().enumerate() {
            let pos = pos.unwrap_or_else(|| {
                tracing::warn!("Word {} ('{}') produced no subwords", i, words[i]);
                last
            });
            alignment.push(pos);
            last = pos;
        }

        Ok((ids, alignment))
    }

    /// Fill `subword_ids` and `orig_to_tok_index` in place
    pub fn align_sentence(&self, sentence: &mut Sentence) -> Result<()> {
        let (ids, alignment) = self.align(&sentence.words)?;
        sentence.subword_ids = ids;
        sentence.orig_to_tok_index = alignment;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::str::FromStr;

    /// A tiny WordPiece tokenizer in HuggingFace JSON format
    pub(crate) fn wordpiece() -> Tokenizer {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordPiece",
                "unk_token": "[UNK]",
                "continuing_subword_prefix": "##",
                "max_input_chars_per_word": 100,
                "vocab": {
                    "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
                    "ada": 4, "love": 5, "##lace": 6, "wrote": 7, "paris": 8
                }
            }
        });
        Tokenizer::from_str(&json.to_string()).unwrap()
    }

    #[test]
    fn test_first_subword_alignment() {
        let tok = wordpiece();
        let aligner = SubwordAligner::new(&tok);
        let (ids, alignment) = aligner.align(&["ada", "lovelace", "wrote"]).unwrap();
        assert_eq!(ids, vec![2, 4, 5, 6, 7, 3]);
        assert_eq!(alignment, vec![1, 2, 4]);
    }

    #[test]
    fn test_unknown_word_maps_to_unk() {
        let tok = wordpiece();
        let (ids, alignment) = SubwordAligner::new(&tok).align(&["zzz", "paris"]).unwrap();
        assert_eq!(ids, vec![2, 1, 8, 3]);
        assert_eq!(alignment, vec![1, 2]);
    }

    #[test]
    fn test_align_sentence_in_place() {
        let tok = wordpiece();
        let mut s = Sentence {
            words:      vec!["paris".into()],
            heads:      vec![None],
            dep_labels: vec!["root".into()],
            ..Default::default()
        };
        SubwordAligner::new(&tok).align_sentence(&mut s).unwrap();
        assert!(s.is_aligned());
        assert!(s.validate().is_ok());
    }
}
