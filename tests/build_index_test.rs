//! End-to-end tests of the index build pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use shardex::analysis::tokenizer::{Tokenizer, WordTokenizer};
use shardex::error::{Result, ShardexError};
use shardex::parallel_index::config::IndexConfig;
use shardex::parallel_index::engine::ParallelIndexEngine;
use shardex::posting::Posting;
use shardex::shard_writer::list_shards;
use shardex::summary::IndexSummary;
use shardex::verify::verify_index;

const VOCABULARY: &[&str] = &[
    "casa", "perro", "gato", "árbol", "niño", "l'eau", "don't", "año", "2024", "x1",
    "straße", "Über", "ÉCOLE", "rock'n'roll", "café", "zeta", "alpha", "beta",
];

const SEPARATORS: &[&str] = &[" ", ", ", ". ", "! ", " - ", "\t", "; "];

fn write_corpus(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("corpus.txt");
    fs::write(&path, content).unwrap();
    path
}

/// Random corpus with empty lines, punctuation and mixed case.
fn random_corpus(seed: u64, lines: usize) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut corpus = String::new();
    for _ in 0..lines {
        let words = rng.random_range(0..12);
        for i in 0..words {
            if i > 0 {
                corpus.push_str(SEPARATORS[rng.random_range(0..SEPARATORS.len())]);
            }
            corpus.push_str(VOCABULARY[rng.random_range(0..VOCABULARY.len())]);
        }
        corpus.push('\n');
    }
    corpus
}

/// Brute-force index: every (term, doc_id) with its frequency, in key order.
fn reference_index(corpus: &str, lines_per_doc: usize) -> (u64, Vec<Posting>) {
    let tokenizer = WordTokenizer::new();
    let lines: Vec<&str> = corpus.lines().collect();
    let mut counts: BTreeMap<(String, u64), u64> = BTreeMap::new();

    for (doc_id, chunk) in lines.chunks(lines_per_doc).enumerate() {
        for line in chunk {
            for token in tokenizer.tokenize(line) {
                *counts.entry((token, doc_id as u64)).or_default() += 1;
            }
        }
    }

    let document_count = lines.len().div_ceil(lines_per_doc) as u64;
    let postings = counts
        .into_iter()
        .map(|((term, doc_id), tf)| Posting::new(term, doc_id, tf))
        .collect();
    (document_count, postings)
}

/// All postings of an index, shard after shard.
fn read_index(dir: &Path) -> Vec<Posting> {
    let mut postings = Vec::new();
    for (_, path) in list_shards(dir, "index").unwrap() {
        for line in fs::read_to_string(path).unwrap().lines() {
            postings.push(Posting::parse_record(line).unwrap());
        }
    }
    postings
}

fn run_dirs(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(".shardex-runs-"))
        })
        .collect()
}

fn build(config: IndexConfig, input: &Path, output: &Path) -> Result<IndexSummary> {
    let outcome = ParallelIndexEngine::new(config)?.build(input, output)?;
    assert!(outcome.report_warning.is_none());
    Ok(outcome.summary)
}

#[test]
fn test_trailing_partial_document_and_term_frequency() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let mut lines: Vec<String> = (0..25).map(|i| format!("linea {i}")).collect();
    lines[0] = "Casa grande".to_string();
    lines[3] = "la casa".to_string();
    let input = write_corpus(temp_dir.path(), &(lines.join("\n") + "\n"));
    let output = temp_dir.path().join("index");

    let summary = build(IndexConfig::default(), &input, &output)?;

    assert_eq!(summary.document_count, 3);
    let postings = read_index(&output);
    let casa: Vec<&Posting> = postings.iter().filter(|p| p.term() == "casa").collect();
    assert_eq!(casa, vec![&Posting::new("casa", 0, 2)]);
    assert!(postings.contains(&Posting::new("linea", 2, 5)));
    assert!(postings.contains(&Posting::new("24", 2, 1)));

    Ok(())
}

#[test]
fn test_merge_across_runs() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), "boda\nana\n");
    let output = temp_dir.path().join("index");

    let summary = build(
        IndexConfig::default()
            .with_lines_per_doc(1)
            .with_batch_docs(1),
        &input,
        &output,
    )?;

    assert_eq!(summary.run_count, 2);
    assert_eq!(
        fs::read_to_string(output.join("index_000.tsv")).unwrap(),
        "ana\t1\t1\nboda\t0\t1\n"
    );
    Ok(())
}

#[test]
fn test_matches_reference_index() -> Result<()> {
    let corpus = random_corpus(7, 2_000);

    for (lines_per_doc, batch_docs, concurrency) in [(10, 50_000, 1), (3, 17, 4), (1, 64, 3)] {
        let temp_dir = TempDir::new().unwrap();
        let input = write_corpus(temp_dir.path(), &corpus);
        let output = temp_dir.path().join("index");

        let summary = build(
            IndexConfig::default()
                .with_lines_per_doc(lines_per_doc)
                .with_batch_docs(batch_docs)
                .with_concurrency(concurrency)
                .with_shard_size_bytes(4 * 1024),
            &input,
            &output,
        )?;

        let (document_count, expected) = reference_index(&corpus, lines_per_doc);
        let actual = read_index(&output);
        assert_eq!(summary.document_count, document_count);
        assert_eq!(summary.posting_count, expected.len() as u64);
        assert_eq!(summary.duplicate_keys, 0);
        assert_eq!(actual, expected, "lines_per_doc={lines_per_doc}");
    }
    Ok(())
}

#[test]
fn test_output_is_independent_of_concurrency() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), &random_corpus(11, 500));

    let mut outputs = Vec::new();
    for concurrency in [1, 2, 8] {
        let output = temp_dir.path().join(format!("index-{concurrency}"));
        build(
            IndexConfig::default()
                .with_lines_per_doc(2)
                .with_batch_docs(5)
                .with_concurrency(concurrency),
            &input,
            &output,
        )?;
        outputs.push(fs::read_to_string(output.join("index_000.tsv")).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
    Ok(())
}

#[test]
fn test_tiny_shards_hold_one_record_each() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), "uno dos tres\ncuatro cinco\n");
    let output = temp_dir.path().join("index");

    let summary = build(
        IndexConfig::default()
            .with_lines_per_doc(1)
            .with_shard_size_bytes(1),
        &input,
        &output,
    )?;

    assert_eq!(summary.posting_count, 5);
    assert_eq!(summary.shard_count, 5);
    assert!(summary.shards.iter().all(|shard| shard.record_count == 1));
    assert_eq!(list_shards(&output, "index")?.len(), 5);
    Ok(())
}

#[test]
fn test_shards_are_ordered_and_size_bounded() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), &random_corpus(3, 800));
    let output = temp_dir.path().join("index");
    let threshold = 256;

    let summary = build(
        IndexConfig::default()
            .with_lines_per_doc(4)
            .with_batch_docs(20)
            .with_concurrency(4)
            .with_shard_size_bytes(threshold),
        &input,
        &output,
    )?;

    assert!(summary.shard_count > 1);
    let postings = read_index(&output);
    let longest_record = postings.iter().map(Posting::encoded_len).max().unwrap();
    for pair in postings.windows(2) {
        assert!(pair[0].key < pair[1].key, "{} before {}", pair[0], pair[1]);
    }

    let (last, full) = summary.shards.split_last().unwrap();
    for shard in full {
        assert!(shard.byte_size >= threshold);
        assert!(shard.byte_size < threshold + longest_record);
    }
    assert!(last.byte_size > 0);

    let on_disk: u64 = list_shards(&output, "index")?
        .iter()
        .map(|(_, path)| fs::metadata(path).unwrap().len())
        .sum();
    assert_eq!(on_disk, summary.shards.iter().map(|s| s.byte_size).sum::<u64>());

    let report = verify_index(&output, "index")?;
    assert_eq!(report.record_count, summary.posting_count);
    assert_eq!(report.term_count, summary.term_count);
    Ok(())
}

#[test]
fn test_empty_input_produces_shard_zero() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), "");
    let output = temp_dir.path().join("index");

    let summary = build(IndexConfig::default(), &input, &output)?;

    assert_eq!(summary.document_count, 0);
    assert_eq!(summary.posting_count, 0);
    assert_eq!(summary.shard_count, 1);
    assert_eq!(fs::metadata(output.join("index_000.tsv")).unwrap().len(), 0);
    Ok(())
}

#[test]
fn test_documents_without_tokens_keep_their_ids() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), "...\n\n!!\nhola\n");
    let output = temp_dir.path().join("index");

    let summary = build(IndexConfig::default().with_lines_per_doc(1), &input, &output)?;

    assert_eq!(summary.document_count, 4);
    assert_eq!(read_index(&output), vec![Posting::new("hola", 3, 1)]);
    Ok(())
}

#[test]
fn test_invalid_utf8_is_skipped() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("corpus.txt");
    fs::write(&input, b"ca\xffsa\nbien\n").unwrap();
    let output = temp_dir.path().join("index");

    build(IndexConfig::default(), &input, &output)?;

    let terms: Vec<String> = read_index(&output)
        .iter()
        .map(|p| p.term().to_string())
        .collect();
    assert_eq!(terms, vec!["bien", "casa"]);
    Ok(())
}

#[test]
fn test_runs_are_removed_after_success() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), &random_corpus(5, 300));
    let output = temp_dir.path().join("index");
    let runs = temp_dir.path().join("runs");

    build(
        IndexConfig::default()
            .with_lines_per_doc(1)
            .with_batch_docs(10)
            .with_run_directory(&runs),
        &input,
        &output,
    )?;

    assert!(run_dirs(&output).is_empty());
    assert_eq!(fs::read_dir(&runs).unwrap().count(), 0);
    Ok(())
}

#[test]
fn test_summary_files_are_written() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), "a b\nc\n");
    let output = temp_dir.path().join("index");

    let summary = build(IndexConfig::default().with_lines_per_doc(1), &input, &output)?;

    let text = fs::read_to_string(output.join("summary.txt")).unwrap();
    assert!(text.contains("Postings             : 3"));
    let loaded = IndexSummary::load(&output)?.unwrap();
    assert_eq!(loaded.document_count, summary.document_count);
    assert_eq!(loaded.shard_count, summary.shard_count);
    assert_eq!(loaded.shards, summary.shards);
    Ok(())
}

#[test]
fn test_custom_basename() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let input = write_corpus(temp_dir.path(), "hola\n");
    let output = temp_dir.path().join("index");

    build(IndexConfig::default().with_shard_basename("part"), &input, &output)?;

    assert!(output.join("part_000.tsv").exists());
    assert!(!output.join("index_000.tsv").exists());
    Ok(())
}

#[test]
fn test_failed_build_leaves_nothing_behind() {
    let temp_dir = TempDir::new().unwrap();
    let corpus: String = (0..50).map(|i| format!("campo\t{i}\n")).collect();
    let input = write_corpus(temp_dir.path(), &corpus);
    let output = temp_dir.path().join("index");
    let runs = temp_dir.path().join("runs");

    // Whole lines become terms, and a term with a tab cannot be stored.
    let result = build(
        IndexConfig::default()
            .with_lines_per_doc(1)
            .with_batch_docs(5)
            .with_concurrency(3)
            .with_token_pattern(r"[^\n]+")
            .with_run_directory(&runs),
        &input,
        &output,
    );

    assert!(matches!(result, Err(ShardexError::Spill(_))));
    assert!(list_shards(&output, "index").unwrap().is_empty());
    assert!(!output.join("summary.json").exists());
    assert_eq!(fs::read_dir(&runs).unwrap().count(), 0);
}

#[test]
fn test_failed_rebuild_removes_previous_summary() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("index");
    let input = write_corpus(temp_dir.path(), "hola mundo\n");
    build(IndexConfig::default(), &input, &output)?;
    assert!(output.join("summary.json").exists());

    let input = write_corpus(temp_dir.path(), "a\tb\n");
    let result = build(
        IndexConfig::default().with_token_pattern(r"[^\n]+"),
        &input,
        &output,
    );

    assert!(matches!(result, Err(ShardexError::Spill(_))));
    assert!(list_shards(&output, "index")?.is_empty());
    assert!(!output.join("summary.json").exists());
    assert!(!output.join("summary.txt").exists());
    assert!(IndexSummary::load(&output)?.is_none());
    Ok(())
}

#[test]
fn test_missing_input() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("index");

    let result = build(
        IndexConfig::default(),
        &temp_dir.path().join("missing.txt"),
        &output,
    );

    assert!(matches!(result, Err(ShardexError::Input(_))));
    assert!(!output.exists());
}
