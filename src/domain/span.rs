// ============================================================
// Layer 3 - Spans and Entities
// ============================================================
// Span classification scores every contiguous word window up
// to a maximum width. For a 3-word sentence and width 2:
//
//   (0,0) (0,1) (1,1) (1,2) (2,2)
//
// Indices are inclusive word positions. Each candidate carries
// a width bucket (log-spaced beyond 4 words), a sample weight,
// and, when gold labels exist, the id of the entity it covers.

use serde::{Deserialize, Serialize};

use crate::domain::labels::{split_tag, TagKind};

/// Widths up to this distance get their own bucket
const IDENTITY_BUCKETS: usize = 4;

/// A candidate span fed to the span extractors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanDescriptor {
    pub start:        usize,
    pub end:          usize,
    pub width_bucket: usize,
    pub weight:       f32,
    /// Gold label id; None at inference time
    pub label:        Option<usize>,
}

/// A labelled entity: inclusive word range plus type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub start: usize,
    pub end:   usize,
    pub label: String,
}

impl Entity {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self { start, end, label: label.into() }
    }
}

/// All (start, end) pairs with `end - start < max_width`, ordered by start
pub fn enumerate_spans(len: usize, max_width: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..len).flat_map(move |start| {
        let last = (start + max_width).min(len);
        (start..last).map(move |end| (start, end))
    })
}

/// Bucket a span distance (end - start): identity up to 4,
/// then floor(log2(d)) + 3, clamped to the bucket count.
pub fn bucket_width(distance: usize, num_buckets: usize) -> usize {
    let bucket = if distance <= IDENTITY_BUCKETS {
        distance
    } else {
        (usize::BITS - 1 - distance.leading_zeros()) as usize + IDENTITY_BUCKETS - 1
    };
    bucket.min(num_buckets.saturating_sub(1))
}

/// Read entities off a BIO or IOBES tag sequence.
/// Ill-formed continuations (I-X after O) open a new entity.
pub fn entities_from_tags<S: AsRef<str>>(tags: &[S]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut open: Option<(usize, String)> = None;

    for (i, tag) in tags.iter().enumerate() {
        let (kind, ty) = split_tag(tag.as_ref());
        match kind {
            TagKind::Begin => {
                close(&mut open, i, &mut entities);
                open = Some((i, ty.to_string()));
            }
            TagKind::Single => {
                close(&mut open, i, &mut entities);
                entities.push(Entity::new(i, i, ty));
            }
            TagKind::Inside => {
                if !matches!(&open, Some((_, t)) if t == ty) {
                    close(&mut open, i, &mut entities);
                    open = Some((i, ty.to_string()));
                }
            }
            TagKind::End => match open.take() {
                Some((start, t)) if t == ty => entities.push(Entity::new(start, i, t)),
                other => {
                    open = other;
                    close(&mut open, i, &mut entities);
                    entities.push(Entity::new(i, i, ty));
                }
            },
            TagKind::Outside | TagKind::Other => close(&mut open, i, &mut entities),
        }
    }
    close(&mut open, tags.len(), &mut entities);
    entities
}

/// A span prediction kept after decoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSpan {
    pub start:       usize,
    pub end:         usize,
    pub label:       usize,
    pub probability: f32,
}

/// Pick entities from per-span label distributions.
///
/// `probs` is row-major `[candidates.len(), num_labels]`. A candidate
/// is kept when its best label is not `outside`; overlapping
/// candidates are resolved greedily, most probable first.
pub fn resolve_spans(
    candidates: &[(usize, usize)],
    probs:      &[f32],
    num_labels: usize,
    outside:    usize,
) -> Vec<ScoredSpan> {
    let mut scored: Vec<ScoredSpan> = candidates
        .iter()
        .enumerate()
        .filter_map(|(k, &(start, end))| {
            let row = probs.get(k * num_labels..(k + 1) * num_labels)?;
            let (label, &probability) = row
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, &f32)>, (i, p)| match best {
                    Some((_, bp)) if bp >= p => best,
                    _ => Some((i, p)),
                })?;
            (label != outside).then_some(ScoredSpan { start, end, label, probability })
        })
        .collect();

    scored.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    let mut kept: Vec<ScoredSpan> = Vec::new();
    for span in scored {
        if kept.iter().all(|k| span.end < k.start || span.start > k.end) {
            kept.push(span);
        }
    }
    kept.sort_by_key(|s| s.start);
    kept
}

/// Finish the open entity so that it ends just before `at`
fn close(open: &mut Option<(usize, String)>, at: usize, out: &mut Vec<Entity>) {
    if let Some((start, label)) = open.take() {
        out.push(Entity::new(start, at - 1, label));
    }
}
