//! Radix-tree route matching.
//!
//! One tree per verb, plus one for `*`. O(path-length) lookup via
//! [`matchit`]. Trees hold indices into the route table's entry list.
//!
//! # Case
//!
//! Static segments match ignoring ASCII case. Templates are inserted
//! lowercased and lookups run on a lowercased copy of the path; captured
//! values are then re-read from the original path by
//! [`pattern::capture`](crate::pattern::capture), so they keep their case.

use std::collections::HashMap;

use matchit::Router as MatchitRouter;

use crate::method::Verb;

/// Outcome of a lookup.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Lookup {
    Found(usize),
    /// The path exists, but not under this verb. Carries the verbs it does
    /// answer to, sorted.
    NotAllowed(Vec<Verb>),
    NotFound,
}

#[derive(Default)]
pub(crate) struct Router {
    trees: HashMap<Verb, MatchitRouter<usize>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, verb: Verb, template: &str, index: usize) -> Result<(), matchit::InsertError> {
        self.trees.entry(verb).or_default().insert(match_key(template), index)
    }

    pub(crate) fn lookup(&self, method: &http::Method, path: &str) -> Lookup {
        let path = path.to_ascii_lowercase();
        let verb = Verb::from_method(method);

        if let Some(index) = verb.and_then(|v| self.at(v, &path)).or_else(|| self.at(Verb::Any, &path)) {
            return Lookup::Found(index);
        }

        let mut allowed: Vec<Verb> = self
            .trees
            .iter()
            .filter(|(v, tree)| **v != Verb::Any && tree.at(&path).is_ok())
            .map(|(v, _)| *v)
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort();
        Lookup::NotAllowed(allowed)
    }

    fn at(&self, verb: Verb, path: &str) -> Option<usize> {
        let matched = self.trees.get(&verb)?.at(path).ok()?;
        Some(*matched.value)
    }
}

/// The key a template is stored under: rooted at `/` and lowercased.
fn match_key(template: &str) -> String {
    if template.starts_with('/') {
        template.to_ascii_lowercase()
    } else {
        format!("/{}", template.to_ascii_lowercase())
    }
}
