use std::fs;
use std::path::Path;
use tracing::debug;

use crate::common::WorkUnit;
use crate::error::CoordinatorError;
use crate::storage::ArtifactStore;

pub fn read_corpus(path: &Path) -> Result<String, CoordinatorError> {
    fs::read_to_string(path).map_err(|source| CoordinatorError::CorpusRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Non-blank lines of the corpus, in input order, as they will be stored.
pub fn split_lines(corpus: &str) -> Vec<&str> {
    corpus
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Persists one split artifact per non-blank line. Identifiers are dense
/// over the emitted units: blank lines do not use one up.
pub fn partition_corpus(
    corpus: &str,
    store: &dyn ArtifactStore,
) -> Result<Vec<WorkUnit>, CoordinatorError> {
    let mut units = Vec::new();
    for (id, line) in split_lines(corpus).into_iter().enumerate() {
        let unit = WorkUnit::new(id);
        store
            .write_lines(&unit.artifact, &[line.to_string()])
            .map_err(CoordinatorError::Split)?;
        units.push(unit);
    }
    debug!("corpus split into {} work units", units.len());
    Ok(units)
}
