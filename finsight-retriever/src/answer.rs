//! Turns search results into the context block handed to a language model.
//!
//! A failed or empty search always degrades to [`NO_INFORMATION`]; the model is
//! never given an error message to paraphrase.

use tracing::warn;

use crate::retrieval::{Retriever, SearchResults};

/// Reply used when nothing in the knowledge base is relevant.
pub const NO_INFORMATION: &str = "I don't have that information in my knowledge base.";

/// Label used in the context header when none is configured.
pub const DEFAULT_LIBRARY_NAME: &str = "NCFE e-Library";

/// Render hits as numbered source blocks, or [`NO_INFORMATION`] when there are none.
///
/// ```
/// use finsight_retriever::answer::{render_context, NO_INFORMATION};
/// use finsight_retriever::retrieval::SearchResults;
///
/// let empty = SearchResults { query: "crypto".to_string(), hits: vec![] };
/// assert_eq!(render_context(&empty, "NCFE e-Library"), NO_INFORMATION);
/// ```
pub fn render_context(results: &SearchResults, library: &str) -> String {
    if results.is_empty() {
        return NO_INFORMATION.to_string();
    }

    let mut context = format!("Based on the {library} content:\n");
    for (i, hit) in results.iter().enumerate() {
        context.push_str(&format!(
            "\n[Source {}: {}]\n{}\n",
            i + 1,
            hit.source,
            hit.text
        ));
    }
    context
}

/// Search with the configured defaults and render the answer context.
///
/// Never fails: retrieval errors are logged and answered with [`NO_INFORMATION`].
pub async fn knowledge_base_context(retriever: &Retriever, query: &str) -> String {
    match retriever.search_with_defaults(query).await {
        Ok(results) => render_context(&results, DEFAULT_LIBRARY_NAME),
        Err(e) => {
            warn!("Knowledge base search failed for {:?}: {}", query, e);
            NO_INFORMATION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SearchHit;
    use crate::storage::Relevance;

    fn hit(source: &str, text: &str, score: f32) -> SearchHit {
        SearchHit {
            text: text.to_string(),
            source: source.to_string(),
            sequence: 0,
            score,
            relevance: Relevance::High,
        }
    }

    #[test]
    fn test_empty_results_render_fallback() {
        let results = SearchResults {
            query: "What is bitcoin?".to_string(),
            hits: vec![],
        };
        assert_eq!(render_context(&results, "NCFE e-Library"), NO_INFORMATION);
    }

    #[test]
    fn test_sources_are_numbered_in_order() {
        let results = SearchResults {
            query: "What is compound interest?".to_string(),
            hits: vec![
                hit("savings.pdf", "Compound interest is interest on interest.", 0.4),
                hit("budgeting.txt", "Put savings aside before spending.", 1.1),
            ],
        };

        let context = render_context(&results, "NCFE e-Library");
        assert_eq!(
            context,
            "Based on the NCFE e-Library content:\n\
             \n[Source 1: savings.pdf]\nCompound interest is interest on interest.\n\
             \n[Source 2: budgeting.txt]\nPut savings aside before spending.\n"
        );
    }
}
