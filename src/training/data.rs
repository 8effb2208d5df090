//! Training pair corpus.
//!
//! Pairs associate a natural-language description with the code it describes.
//! Corpora are stored as JSON lines, one pair per line, pre-partitioned into
//! train and validation files.

use super::TrainingError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// One positive (natural language, code) association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPair {
    pub natural_language: String,
    pub code: String,
}

/// Partitioned training corpus.
#[derive(Debug, Clone)]
pub struct PairCorpus {
    pub train: Vec<TrainingPair>,
    pub validation: Vec<TrainingPair>,
}

impl PairCorpus {
    pub fn new(train: Vec<TrainingPair>, validation: Vec<TrainingPair>) -> Self {
        Self { train, validation }
    }

    /// Load both partitions from JSONL files.
    pub fn from_jsonl(train_path: &Path, validation_path: &Path) -> Result<Self, TrainingError> {
        Ok(Self {
            train: read_jsonl(train_path)?,
            validation: read_jsonl(validation_path)?,
        })
    }

    /// Shuffled training batches for one epoch. Partial tail batches are kept.
    pub fn train_batches<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Vec<Batch<'_>> {
        let mut order: Vec<&TrainingPair> = self.train.iter().collect();
        order.shuffle(rng);
        to_batches(&order, batch_size)
    }

    /// Validation batches, in file order every epoch.
    pub fn validation_batches(&self, batch_size: usize) -> Vec<Batch<'_>> {
        let order: Vec<&TrainingPair> = self.validation.iter().collect();
        to_batches(&order, batch_size)
    }
}

/// One batch, split into its two text columns.
#[derive(Debug)]
pub struct Batch<'a> {
    pub natural_language: Vec<&'a str>,
    pub code: Vec<&'a str>,
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.natural_language.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natural_language.is_empty()
    }
}

fn to_batches<'a>(pairs: &[&'a TrainingPair], batch_size: usize) -> Vec<Batch<'a>> {
    let batch_size = batch_size.max(1);
    pairs
        .chunks(batch_size)
        .map(|chunk| Batch {
            natural_language: chunk.iter().map(|p| p.natural_language.as_str()).collect(),
            code: chunk.iter().map(|p| p.code.as_str()).collect(),
        })
        .collect()
}

fn read_jsonl(path: &Path) -> Result<Vec<TrainingPair>, TrainingError> {
    let file = std::fs::File::open(path)
        .map_err(|e| TrainingError::Corpus(format!("{}: {e}", path.display())))?;
    let reader = std::io::BufReader::new(file);

    let mut pairs = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TrainingError::Corpus(format!("{}: {e}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let pair: TrainingPair = serde_json::from_str(&line).map_err(|e| {
            TrainingError::Corpus(format!("{} line {}: {e}", path.display(), line_no + 1))
        })?;
        pairs.push(pair);
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::io::Write;

    fn pair(i: usize) -> TrainingPair {
        TrainingPair {
            natural_language: format!("description {i}"),
            code: format!("code_{i}()"),
        }
    }

    #[test]
    fn test_batching_keeps_partial_tail() {
        let corpus = PairCorpus::new((0..10).map(pair).collect(), vec![pair(0)]);
        let batches = corpus.validation_batches(4);
        assert_eq!(batches.len(), 1);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let train = corpus.train_batches(4, &mut rng);
        assert_eq!(train.len(), 3);
        assert_eq!(train[0].len(), 4);
        assert_eq!(train[2].len(), 2);
    }

    #[test]
    fn test_batch_columns_stay_paired() {
        let corpus = PairCorpus::new((0..6).map(pair).collect(), vec![]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        for batch in corpus.train_batches(3, &mut rng) {
            for (nl, code) in batch.natural_language.iter().zip(batch.code.iter()) {
                let i: usize = nl.rsplit(' ').next().unwrap().parse().unwrap();
                assert_eq!(*code, format!("code_{i}()"));
            }
        }
    }

    #[test]
    fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let train_path = dir.path().join("train.jsonl");
        let val_path = dir.path().join("valid.jsonl");

        let mut f = std::fs::File::create(&train_path).unwrap();
        writeln!(
            f,
            r#"{{"natural_language": "reverse a list", "code": "xs[::-1]"}}"#
        )
        .unwrap();
        writeln!(f).unwrap();
        writeln!(
            f,
            r#"{{"natural_language": "read a file", "code": "open(p).read()"}}"#
        )
        .unwrap();
        std::fs::File::create(&val_path).unwrap();

        let corpus = PairCorpus::from_jsonl(&train_path, &val_path).unwrap();
        assert_eq!(corpus.train.len(), 2);
        assert_eq!(corpus.train[0].natural_language, "reverse a list");
        assert!(corpus.validation.is_empty());
    }

    #[test]
    fn test_malformed_jsonl_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"natural_language\": 3}\n").unwrap();

        let err = read_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
