//! Context assembly and source citations for retrieved chunks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::vector::IndexedChunk;

pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub source_file: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub max_chars: usize,
    pub chunk_max_chars: usize,
}

/// Source id of a hit: `source`, else `file_path`, else `filename`.
pub fn source_id(metadata: &Map<String, Value>) -> Option<String> {
    ["source", "file_path", "filename"]
        .iter()
        .filter_map(|key| metadata.get(*key))
        .find_map(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}

/// Truncates to at most `max_chars` characters, the last being `…` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(max_chars - 1).collect();
    cut.push(ELLIPSIS);
    cut
}

/// Joins hits, in the given order, into `[Source n: id]` blocks.
///
/// Whitespace-only hits are skipped. Accumulation stops at the first block
/// that would push the total (separators included) past `budget.max_chars`.
pub fn build_context(hits: &[IndexedChunk], budget: ContextBudget) -> String {
    let mut context = String::new();
    let mut total = 0usize;
    let separator_len = BLOCK_SEPARATOR.chars().count();

    for (position, hit) in hits.iter().enumerate() {
        let text = hit.text.trim();
        if text.is_empty() {
            continue;
        }
        let source = source_id(&hit.metadata).unwrap_or_else(|| "unknown".to_string());
        let block = format!(
            "[Source {}: {}]\n{}",
            position + 1,
            source,
            truncate_chars(text, budget.chunk_max_chars)
        );
        let joiner = if context.is_empty() { 0 } else { separator_len };
        let block_len = block.chars().count();
        if total + joiner + block_len > budget.max_chars {
            break;
        }
        if joiner > 0 {
            context.push_str(BLOCK_SEPARATOR);
        }
        context.push_str(&block);
        total += joiner + block_len;
    }
    context
}

/// One citation per distinct source id, in retrieval order.
pub fn extract_sources(hits: &[IndexedChunk], snippet_chars: usize) -> Vec<SourceCitation> {
    let mut seen = std::collections::HashSet::new();
    let mut citations = Vec::new();
    for hit in hits {
        let Some(source) = source_id(&hit.metadata) else {
            continue;
        };
        if source.eq_ignore_ascii_case("unknown") || !seen.insert(source.clone()) {
            continue;
        }
        let text = hit.text.trim();
        let snippet = if text.chars().count() > snippet_chars {
            let mut cut: String = text.chars().take(snippet_chars).collect();
            cut.push(ELLIPSIS);
            cut
        } else {
            text.to_string()
        };
        citations.push(SourceCitation {
            source_file: source,
            snippet,
        });
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(text: &str, metadata: Value) -> IndexedChunk {
        IndexedChunk {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            metadata: metadata.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn context_stays_within_budget_in_order() {
        let hits: Vec<IndexedChunk> = (0..10)
            .map(|i| {
                hit(
                    &format!("chunk {} {}", i, "x".repeat(80)),
                    json!({ "source": format!("doc{}", i) }),
                )
            })
            .collect();
        let budget = ContextBudget {
            max_chars: 300,
            chunk_max_chars: 50,
        };

        let context = build_context(&hits, budget);

        assert!(context.chars().count() <= 300);
        let blocks: Vec<&str> = context.split(BLOCK_SEPARATOR).collect();
        assert!(blocks.len() >= 2);
        for (i, block) in blocks.iter().enumerate() {
            assert!(block.starts_with(&format!("[Source {}: doc{}]\n", i + 1, i)));
            let body = block.split_once('\n').unwrap().1;
            assert!(body.chars().count() <= 50);
            assert!(body.ends_with('…'));
        }
    }

    #[test]
    fn oversized_first_block_yields_empty_context() {
        let hits = vec![hit(&"y".repeat(100), json!({ "source": "big" }))];
        let budget = ContextBudget {
            max_chars: 20,
            chunk_max_chars: 2000,
        };
        assert_eq!(build_context(&hits, budget), "");
    }

    #[test]
    fn blank_hits_are_skipped_but_keep_numbering() {
        let hits = vec![
            hit("   ", json!({ "source": "blank" })),
            hit("real text", json!({})),
        ];
        let context = build_context(
            &hits,
            ContextBudget {
                max_chars: 1000,
                chunk_max_chars: 100,
            },
        );
        assert_eq!(context, "[Source 2: unknown]\nreal text");
    }

    #[test]
    fn sources_are_deduplicated_in_first_seen_order() {
        let hits = vec![
            hit("a", json!({ "source": "b.pdf#page=2" })),
            hit("b", json!({ "source": "a.txt" })),
            hit("c", json!({ "source": "b.pdf#page=2" })),
            hit("d", json!({ "source": "UNKNOWN" })),
            hit("e", json!({})),
            hit("f", json!({ "file_path": "/tmp/c.md" })),
            hit(&"z".repeat(400), json!({ "filename": "long.txt" })),
        ];

        let sources = extract_sources(&hits, 300);
        let ids: Vec<&str> = sources.iter().map(|s| s.source_file.as_str()).collect();
        assert_eq!(ids, vec!["b.pdf#page=2", "a.txt", "/tmp/c.md", "long.txt"]);
        assert_eq!(sources[0].snippet, "a");
        assert_eq!(sources[3].snippet.chars().count(), 301);
    }

    #[test]
    fn truncation_respects_ceiling() {
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("abc", 4), "abc");
        assert_eq!(truncate_chars("déjà vu", 3), "dé…");
    }
}
