/// Tab routing: which collection does a URL belong to?
///
/// Algorithm:
/// 1. Score every (collection, filter) pair whose filter matches the URL
/// 2. Keep the pairs with the lowest stability (most specific)
/// 3. Collapse to distinct collections
/// 4. If several remain, keep those with the highest priority
/// 5. More than one left is an ambiguity; the tab is not routed
use crate::collection::Collection;
use crate::filter::Pattern;
use crate::stability::stability;
use std::ptr;

/// A collection together with its most specific matching filter
#[derive(Debug, Clone, Copy)]
pub struct FilterMatch<'a> {
    pub collection: &'a Collection,
    pub filter: &'a Pattern,
    pub stability: usize,
}

/// Routing decision for a single URL
#[derive(Debug, Clone)]
pub enum Routing<'a> {
    Unmatched,
    Routed(FilterMatch<'a>),
    /// Tied on both specificity and priority
    Ambiguous(Vec<FilterMatch<'a>>),
}

impl<'a> Routing<'a> {
    pub fn collection(&self) -> Option<&'a Collection> {
        match self {
            Routing::Routed(m) => Some(m.collection),
            _ => None,
        }
    }
}

/// Distinct collections holding a filter of minimal stability, in input order.
/// A collection with several tying filters appears once, with its first one.
pub fn most_specific<'a>(url: &str, collections: &'a [Collection]) -> Vec<FilterMatch<'a>> {
    let mut best: Option<usize> = None;
    let mut matches: Vec<FilterMatch<'a>> = Vec::new();

    for collection in collections {
        for filter in collection.filters() {
            if !filter.is_match(url) {
                continue;
            }

            let score = stability(filter, url);
            match best {
                Some(min) if score > min => continue,
                Some(min) if score == min => {}
                _ => {
                    best = Some(score);
                    matches.clear();
                }
            }

            if !matches.iter().any(|m| ptr::eq(m.collection, collection)) {
                matches.push(FilterMatch {
                    collection,
                    filter,
                    stability: score,
                });
            }
        }
    }

    matches
}

/// Keep only the candidates sharing the highest priority
fn highest_priority(candidates: Vec<FilterMatch<'_>>) -> Vec<FilterMatch<'_>> {
    let Some(max) = candidates.iter().map(|m| m.collection.priority).max() else {
        return candidates;
    };
    candidates
        .into_iter()
        .filter(|m| m.collection.priority == max)
        .collect()
}

/// Decide where `url` goes
pub fn route<'a>(url: &str, collections: &'a [Collection]) -> Routing<'a> {
    let mut candidates = most_specific(url, collections);
    if candidates.len() > 1 {
        candidates = highest_priority(candidates);
    }

    match candidates.len() {
        0 => Routing::Unmatched,
        1 => Routing::Routed(candidates[0]),
        _ => Routing::Ambiguous(candidates),
    }
}

/// The collections `url` resolves to: empty when nothing matches, one on an
/// unambiguous match, several when specificity and priority both tie.
pub fn match_collections<'a>(url: &str, collections: &'a [Collection]) -> Vec<&'a Collection> {
    match route(url, collections) {
        Routing::Unmatched => Vec::new(),
        Routing::Routed(m) => vec![m.collection],
        Routing::Ambiguous(tied) => tied.into_iter().map(|m| m.collection).collect(),
    }
}
