//! Code for the phenotype ontology DAG and term lookup.

pub mod stats;

use indexmap::{IndexMap, IndexSet};

/// Default root of the phenotypic abnormality portion of the ontology.
pub const DEFAULT_ROOT_TERM: &str = "HP:0000118";

/// Errors that can occur when building an `Ontology`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum OntologyError {
    #[error("root term {0} not found in term file")]
    UnknownRoot(String),
    #[error("duplicate term {0} in term file")]
    DuplicateTerm(String),
    #[error("term {term} names unknown parent {parent}")]
    UnknownParent { term: String, parent: String },
}

/// A single term of the phenotype ontology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologyTerm {
    /// The term identifier, e.g. `HP:0001250`.
    pub id: String,
    /// The human-readable term name.
    pub name: String,
    /// Identifiers of the direct parent terms; empty for the root.
    pub parents: IndexSet<String>,
}

/// Lookup capability consumed by the scorers.
///
/// Scorers only need term resolution and the ancestor closure; keeping this
/// behind a trait allows tests to supply a hand-built ontology.
pub trait OntologyLookup {
    /// Resolve a term id to the term, or `None` if unknown.
    fn resolve(&self, term_id: &str) -> Option<&OntologyTerm>;

    /// Return the transitive parent closure of the term, including itself.
    ///
    /// An unknown term id yields an empty set.
    fn ancestors_and_self(&self, term_id: &str) -> IndexSet<String>;
}

/// In-memory phenotype ontology, a DAG rooted at a "phenotypic abnormality"
/// term.  Immutable once built.
#[derive(Debug, Clone)]
pub struct Ontology {
    /// All terms by id, in file order.
    terms: IndexMap<String, OntologyTerm>,
    /// Identifier of the root term.
    root: String,
}

impl Ontology {
    /// Build an ontology from a list of terms and the designated root id.
    pub fn new(terms: Vec<OntologyTerm>, root: &str) -> Result<Self, OntologyError> {
        let mut term_map: IndexMap<String, OntologyTerm> = IndexMap::with_capacity(terms.len());
        for term in terms {
            if term_map.contains_key(&term.id) {
                return Err(OntologyError::DuplicateTerm(term.id));
            }
            term_map.insert(term.id.clone(), term);
        }
        for term in term_map.values() {
            for parent in &term.parents {
                if !term_map.contains_key(parent) {
                    return Err(OntologyError::UnknownParent {
                        term: term.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        if !term_map.contains_key(root) {
            return Err(OntologyError::UnknownRoot(root.to_string()));
        }
        Ok(Self {
            terms: term_map,
            root: root.to_string(),
        })
    }

    /// Return the root term id.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Return the number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Return whether the ontology holds no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate over all terms in file order.
    pub fn terms(&self) -> impl Iterator<Item = &OntologyTerm> {
        self.terms.values()
    }

    /// Invert the parent lists into a parent id -> child ids map.
    ///
    /// Built once per statistics precomputation so the descendant traversal
    /// does not have to re-query the graph.
    pub fn children_map(&self) -> IndexMap<String, Vec<String>> {
        let mut children: IndexMap<String, Vec<String>> = IndexMap::new();
        for term in self.terms.values() {
            for parent in &term.parents {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(term.id.clone());
            }
        }
        children
    }

    /// Return the direct children of the root, ordered lexicographically by
    /// term id.  These are the top-level body-system categories used for
    /// feature clustering.
    pub fn top_level_categories(&self) -> Vec<OntologyTerm> {
        let mut categories: Vec<OntologyTerm> = self
            .terms
            .values()
            .filter(|term| term.parents.contains(&self.root))
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.id.cmp(&b.id));
        categories
    }
}

impl OntologyLookup for Ontology {
    fn resolve(&self, term_id: &str) -> Option<&OntologyTerm> {
        self.terms.get(term_id)
    }

    fn ancestors_and_self(&self, term_id: &str) -> IndexSet<String> {
        let mut closure = IndexSet::new();
        let Some(term) = self.terms.get(term_id) else {
            return closure;
        };
        let mut queue = vec![term.id.clone()];
        while let Some(id) = queue.pop() {
            if !closure.insert(id.clone()) {
                continue;
            }
            if let Some(term) = self.terms.get(&id) {
                queue.extend(term.parents.iter().cloned());
            }
        }
        closure
    }
}

/// Data structure for representing a row of the terms file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TermRecord {
    /// Term id.
    pub term_id: String,
    /// Term name.
    pub name: String,
    /// Semicolon-separated parent term ids; empty for the root.
    #[serde(default)]
    pub parents: String,
}

impl From<TermRecord> for OntologyTerm {
    fn from(record: TermRecord) -> Self {
        OntologyTerm {
            id: record.term_id,
            name: record.name,
            parents: record
                .parents
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

/// Read the TSV terms file and build the `Ontology` rooted at `root`.
///
/// # Errors
///
/// In the case that the file could not be read or the term graph is invalid.
pub fn load_ontology<P: AsRef<std::path::Path>>(
    path: &P,
    root: &str,
) -> Result<Ontology, anyhow::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path.as_ref())?;
    let mut terms = Vec::new();
    for result in rdr.deserialize() {
        let record: TermRecord = result?;
        terms.push(OntologyTerm::from(record));
    }
    tracing::info!("loaded {} ontology terms", terms.len());
    Ok(Ontology::new(terms, root)?)
}
