use regex::Regex;
use tracing::debug;

use crate::common::{intermediate_artifact_name, matched_records_name, Operation};
use crate::error::WorkerError;
use crate::storage::ArtifactStore;

pub const PING_REPLY: &str = "OK";

/// Worker-side word count: the handlers behind `PING`, `MAP` and
/// `SHUFFLE_REDUCE`. Each returns the lines the worker reports back on its
/// result channel.
pub struct WordCount {
    separators: Regex,
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new()
    }
}

impl WordCount {
    pub fn new() -> Self {
        Self {
            separators: Regex::new(r"[ \t'.,]+").expect("invalid regex"),
        }
    }

    pub fn run(
        &self,
        store: &dyn ArtifactStore,
        operation: Operation,
        params: &[String],
    ) -> Result<Vec<String>, WorkerError> {
        debug!("starting [{} {:?}]", operation, params);
        let output = match operation {
            Operation::Ping => Ok(self.ping()),
            Operation::Map => self.map(store, params),
            Operation::ShuffleReduce => self.shuffle_reduce(store, params),
        };
        debug!("terminated [{}]", operation);
        output
    }

    pub fn ping(&self) -> Vec<String> {
        vec![PING_REPLY.to_string()]
    }

    pub fn words<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.separators.split(line).filter(|w| !w.is_empty())
    }

    /// `MAP <S_n>`: one `word: 1` record per occurrence into `UM_n`, and one
    /// `word:UM_n` line per occurrence back to the coordinator.
    pub fn map(
        &self,
        store: &dyn ArtifactStore,
        params: &[String],
    ) -> Result<Vec<String>, WorkerError> {
        let [split] = params else {
            return Err(WorkerError::Usage("MAP <S_n>".to_string()));
        };
        let intermediate = intermediate_artifact_name(split).ok_or_else(|| {
            WorkerError::Usage(format!("MAP expects a split artifact, got {:?}", split))
        })?;

        let mut records = Vec::new();
        let mut output = Vec::new();
        for line in store.read_lines(split)? {
            for word in self.words(&line) {
                records.push(format!("{}: 1", word));
                output.push(format!("{}:{}", word, intermediate));
            }
        }

        if !records.is_empty() {
            store.write_lines(&intermediate, &records)?;
        }
        debug!("map {} -> {} ({} records)", split, intermediate, records.len());
        Ok(output)
    }

    /// `SHUFFLE_REDUCE <key> <RM_n> <UM>...`: sums every record of `key`
    /// (case-insensitively) across the referenced intermediate artifacts.
    pub fn shuffle_reduce(
        &self,
        store: &dyn ArtifactStore,
        params: &[String],
    ) -> Result<Vec<String>, WorkerError> {
        let [key, result, sources @ ..] = params else {
            return Err(WorkerError::Usage(
                "SHUFFLE_REDUCE <key> <RM_n> <UM>...".to_string(),
            ));
        };
        if sources.is_empty() {
            return Err(WorkerError::Usage(
                "SHUFFLE_REDUCE <key> <RM_n> <UM>...".to_string(),
            ));
        }
        let matched_name = matched_records_name(result).ok_or_else(|| {
            WorkerError::Usage(format!(
                "SHUFFLE_REDUCE expects a result artifact, got {:?}",
                result
            ))
        })?;

        let folded_key = key.to_lowercase();
        let mut count: u64 = 0;
        let mut matched = Vec::new();
        for source in sources {
            for line in store.read_lines(source)? {
                if line.trim().is_empty() {
                    continue;
                }
                let (word, occurrences) = parse_record(source, &line)?;
                if word.to_lowercase() == folded_key {
                    matched.push(format!("{}: 1", key));
                    count += occurrences;
                }
            }
        }

        if !matched.is_empty() {
            store.write_lines(&matched_name, &matched)?;
        }
        let total = format!("{}:{}", key, count);
        store.write_lines(result, std::slice::from_ref(&total))?;
        Ok(vec![total])
    }
}

/// `word: <n>`, split at the last colon so words may contain colons. The
/// word is kept byte for byte: it has to match the key it was indexed under.
fn parse_record<'a>(artifact: &str, line: &'a str) -> Result<(&'a str, u64), WorkerError> {
    let malformed = || WorkerError::MalformedRecord {
        artifact: artifact.to_string(),
        line: line.to_string(),
    };
    let (word, occurrences) = line.rsplit_once(':').ok_or_else(malformed)?;
    let occurrences = occurrences
        .trim_matches(' ')
        .parse::<u64>()
        .map_err(|_| malformed())?;
    Ok((word, occurrences))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::FsArtifactStore;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn put(store: &FsArtifactStore, name: &str, lines: &[&str]) {
        store.write_lines(name, &strings(lines)).unwrap();
    }

    #[test]
    fn test_ping_replies_ok() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let output = WordCount::new()
            .run(&store, Operation::Ping, &[])
            .unwrap();
        assert_eq!(output, vec!["OK"]);
    }

    #[test]
    fn test_words_split_on_separator_class() {
        let app = WordCount::new();
        let words: Vec<_> = app.words(" it's\tthe cat,the.  end").collect();
        assert_eq!(words, vec!["it", "s", "the", "cat", "the", "end"]);
    }

    #[test]
    fn test_map_emits_one_pair_per_occurrence() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "S3", &["the cat saw the dog"]);

        let output = WordCount::new().map(&store, &strings(&["S3"])).unwrap();

        assert_eq!(
            output,
            vec!["the:UM3", "cat:UM3", "saw:UM3", "the:UM3", "dog:UM3"]
        );
        assert_eq!(
            store.read_lines("UM3").unwrap(),
            vec!["the: 1", "cat: 1", "saw: 1", "the: 1", "dog: 1"]
        );
    }

    #[test]
    fn test_map_without_words_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "S0", &["... ,,"]);

        let output = WordCount::new().map(&store, &strings(&["S0"])).unwrap();

        assert!(output.is_empty());
        assert!(!store.exists("UM0"));
    }

    #[test]
    fn test_map_rejects_bad_parameters() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let app = WordCount::new();

        assert!(matches!(app.map(&store, &[]), Err(WorkerError::Usage(_))));
        assert!(matches!(
            app.map(&store, &strings(&["RM1"])),
            Err(WorkerError::Usage(_))
        ));
        assert!(matches!(
            app.map(&store, &strings(&["S1"])),
            Err(WorkerError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_shuffle_reduce_sums_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "UM0", &["The: 1", "cat: 1", "the: 1"]);
        put(&store, "UM1", &["dog: 1", "THE: 1"]);

        let output = WordCount::new()
            .shuffle_reduce(&store, &strings(&["the", "RM5", "UM0", "UM1"]))
            .unwrap();

        assert_eq!(output, vec!["the:3"]);
        assert_eq!(store.read_lines("RM5").unwrap(), vec!["the:3"]);
        assert_eq!(
            store.read_lines("SM5").unwrap(),
            vec!["the: 1", "the: 1", "the: 1"]
        );
    }

    #[test]
    fn test_shuffle_reduce_without_match_writes_zero_and_no_side_artifact() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "UM0", &["cat: 1"]);

        let output = WordCount::new()
            .shuffle_reduce(&store, &strings(&["dog", "RM0", "UM0"]))
            .unwrap();

        assert_eq!(output, vec!["dog:0"]);
        assert!(!store.exists("SM0"));
    }

    #[test]
    fn test_shuffle_reduce_keeps_colons_inside_words() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "UM0", &["a:b: 1", "a:b: 1"]);

        let output = WordCount::new()
            .shuffle_reduce(&store, &strings(&["a:b", "RM0", "UM0"]))
            .unwrap();

        assert_eq!(output, vec!["a:b:2"]);
    }

    #[test]
    fn test_shuffle_reduce_keeps_unicode_whitespace_inside_words() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "UM0", &["caf\u{a0}: 1", "caf\u{a0}: 1", "caf: 1"]);
        let app = WordCount::new();

        let padded = app
            .shuffle_reduce(&store, &strings(&["caf\u{a0}", "RM0", "UM0"]))
            .unwrap();
        let plain = app
            .shuffle_reduce(&store, &strings(&["caf", "RM1", "UM0"]))
            .unwrap();

        assert_eq!(padded, vec!["caf\u{a0}:2"]);
        assert_eq!(plain, vec!["caf:1"]);
    }

    #[test]
    fn test_shuffle_reduce_fails_fast_on_malformed_record() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        put(&store, "UM0", &["cat: 1", "garbage"]);
        put(&store, "UM1", &["cat: x"]);
        let app = WordCount::new();

        let err = app
            .shuffle_reduce(&store, &strings(&["cat", "RM0", "UM0"]))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerError::MalformedRecord { artifact, line } if artifact == "UM0" && line == "garbage"
        ));
        assert!(matches!(
            app.shuffle_reduce(&store, &strings(&["cat", "RM1", "UM1"])),
            Err(WorkerError::MalformedRecord { .. })
        ));
        assert!(!store.exists("RM0"));
    }

    #[test]
    fn test_shuffle_reduce_requires_a_source() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());

        assert!(matches!(
            WordCount::new().shuffle_reduce(&store, &strings(&["cat", "RM0"])),
            Err(WorkerError::Usage(_))
        ));
    }
}
