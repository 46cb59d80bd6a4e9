//! Aggregation of per-frame results over a session.

use crate::types::{Emotion, EmotionResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// The highest-confidence face in one frame's results. First wins on ties.
pub fn strongest(results: &[EmotionResult]) -> Option<&EmotionResult> {
    results.iter().fold(None, |best: Option<&EmotionResult>, r| match best {
        Some(b) if b.confidence >= r.confidence => Some(b),
        _ => Some(r),
    })
}

/// Predominant emotion and mean confidence across every face in a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Most frequent label; `None` if no face was classified.
    pub predominant: Option<Emotion>,
    /// Mean predicted confidence over all faces (0.0 when empty).
    pub average_confidence: f32,
    pub frames: usize,
    pub faces: usize,
    pub counts: BTreeMap<Emotion, usize>,
}

impl SessionSummary {
    /// Summarise a sequence of per-frame result lists.
    ///
    /// Ties on count go to the label with the higher summed confidence, then
    /// to the earlier label in classifier order.
    pub fn from_frames<'a, I>(frames: I) -> Self
    where
        I: IntoIterator<Item = &'a [EmotionResult]>,
    {
        let mut counts: BTreeMap<Emotion, usize> = BTreeMap::new();
        let mut conf_by_label: BTreeMap<Emotion, f32> = BTreeMap::new();
        let mut total_conf = 0.0f32;
        let mut faces = 0usize;
        let mut frame_count = 0usize;

        for results in frames {
            frame_count += 1;
            for r in results {
                *counts.entry(r.emotion).or_default() += 1;
                *conf_by_label.entry(r.emotion).or_default() += r.confidence;
                total_conf += r.confidence;
                faces += 1;
            }
        }

        let mut predominant: Option<(Emotion, usize, f32)> = None;
        for (&emotion, &count) in &counts {
            let conf = conf_by_label.get(&emotion).copied().unwrap_or(0.0);
            let better = match predominant {
                None => true,
                Some((_, best_count, best_conf)) => {
                    count > best_count || (count == best_count && conf > best_conf)
                }
            };
            if better {
                predominant = Some((emotion, count, conf));
            }
        }

        Self {
            predominant: predominant.map(|(e, _, _)| e),
            average_confidence: if faces > 0 { total_conf / faces as f32 } else { 0.0 },
            frames: frame_count,
            faces,
            counts,
        }
    }

    /// Summarise a flat list of results as a single frame.
    pub fn from_results(results: &[EmotionResult]) -> Self {
        Self::from_frames(std::iter::once(results))
    }
}
