//! Greedy packing of document content into a character budget.

use std::borrow::Cow;

use crate::{sort_by_score_desc, RelevanceResult};

/// A document that does not fit whole is only truncated when more than this many
/// characters remain; at exactly this many it is dropped.
pub const MIN_TRUNCATION_CHARS: usize = 100;

/// Appended when rendering content that was cut short.
pub const TRUNCATION_MARKER: &str = "...";

/// Packs the highest scoring documents into `max_length` characters.
///
/// Results are re-sorted by score first. Documents are taken whole while they fit; the first
/// one that does not fit is truncated to the remaining budget if more than
/// [`MIN_TRUNCATION_CHARS`] remain, and packing stops there either way.
pub fn build_context(results: &[RelevanceResult], max_length: usize) -> Vec<RelevanceResult> {
    let mut ordered = results.to_vec();
    sort_by_score_desc(&mut ordered);

    let mut packed = Vec::with_capacity(ordered.len());
    let mut total = 0_usize;

    for result in ordered {
        let length = result.document.content_len();
        let next_total = total.saturating_add(length);
        if next_total <= max_length {
            total = next_total;
            packed.push(result);
            continue;
        }

        let remaining = max_length.saturating_sub(total);
        if remaining > MIN_TRUNCATION_CHARS {
            packed.push(truncate(result, remaining));
        }
        break;
    }

    packed
}

/// Total characters of content across `results`, markers excluded.
pub fn context_length(results: &[RelevanceResult]) -> usize {
    results
        .iter()
        .map(|result| result.document.content_len())
        .fold(0, usize::saturating_add)
}

/// Content as it should appear in a prompt, with the marker on truncated items.
pub fn render_content(result: &RelevanceResult) -> Cow<'_, str> {
    let content = result.document.content.as_deref().unwrap_or_default();
    if result.truncated {
        Cow::Owned(format!("{content}{TRUNCATION_MARKER}"))
    } else {
        Cow::Borrowed(content)
    }
}

fn truncate(mut result: RelevanceResult, keep_chars: usize) -> RelevanceResult {
    if let Some(content) = result.document.content.as_mut() {
        *content = content.chars().take(keep_chars).collect();
    }
    result.truncated = true;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{storage::types::document::Document, utils::llm::ScoreResult};

    fn result(title: &str, score: f32, content_len: usize) -> RelevanceResult {
        let content = "x".repeat(content_len);
        RelevanceResult::from_score(
            Document::new("c".into(), title.into(), vec![], Some(content)),
            ScoreResult {
                score,
                ..ScoreResult::zero()
            },
        )
    }

    fn titles(results: &[RelevanceResult]) -> Vec<&str> {
        results.iter().map(|r| r.document.title.as_str()).collect()
    }

    #[test]
    fn exactly_one_hundred_remaining_drops_the_document() {
        let packed = build_context(&[result("one", 0.9, 150), result("two", 0.8, 150)], 250);

        assert_eq!(titles(&packed), vec!["one"]);
        assert_eq!(context_length(&packed), 150);
        assert!(!packed[0].truncated);
    }

    #[test]
    fn more_than_one_hundred_remaining_truncates_and_stops() {
        let packed = build_context(
            &[
                result("one", 0.9, 150),
                result("two", 0.8, 300),
                result("three", 0.7, 10),
            ],
            300,
        );

        assert_eq!(titles(&packed), vec!["one", "two"]);
        assert!(packed[1].truncated);
        assert_eq!(packed[1].document.content_len(), 150);
        assert_eq!(context_length(&packed), 300);
    }

    #[test]
    fn dropped_document_stops_packing_even_if_later_ones_fit() {
        let packed = build_context(
            &[
                result("one", 0.9, 180),
                result("two", 0.8, 500),
                result("tiny", 0.1, 5),
            ],
            250,
        );

        assert_eq!(titles(&packed), vec!["one"]);
    }

    #[test]
    fn resorts_input_by_score() {
        let packed = build_context(
            &[
                result("low", 0.2, 10),
                result("high", 0.9, 10),
                result("mid", 0.5, 10),
            ],
            4000,
        );

        assert_eq!(titles(&packed), vec!["high", "mid", "low"]);
    }

    #[test]
    fn oversized_first_document_is_truncated_to_budget() {
        let packed = build_context(&[result("huge", 0.9, 10_000)], 4000);

        assert_eq!(packed.len(), 1);
        assert!(packed[0].truncated);
        assert_eq!(context_length(&packed), 4000);
    }

    #[test]
    fn packed_length_never_exceeds_budget() {
        let inputs: Vec<RelevanceResult> = (0_u16..12)
            .map(|i| result(&format!("d{i}"), f32::from(i) / 12.0, usize::from(i) * 37 + 20))
            .collect();

        for budget in [0, 50, 100, 101, 250, 777, 2000, 5000] {
            let packed = build_context(&inputs, budget);
            assert!(context_length(&packed) <= budget, "budget {budget}");
            assert!(packed.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let mut wide = result("wide", 0.9, 0);
        wide.document.content = Some("é".repeat(300));

        let packed = build_context(&[wide], 200);

        assert_eq!(packed[0].document.content_len(), 200);
    }

    #[test]
    fn render_marks_truncated_content() {
        let mut item = result("t", 0.5, 3);
        assert_eq!(render_content(&item), "xxx");

        item.truncated = true;
        assert_eq!(render_content(&item), "xxx...");
    }
}
