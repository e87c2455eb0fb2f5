//! Header-once concatenation of projected sample files.
//!
//! Per-worker outputs sharing one header merge into a single table; the
//! header is emitted exactly once and validated identical across inputs,
//! and the total data-row count must equal the externally expected
//! replicate count. A mismatch aborts the surrounding analysis stage.

use std::path::{Path, PathBuf};

use abcpool_types::{Error, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

/// Concatenate `inputs` into `output` and validate the emitted data-row
/// total against `expected_rows`.
///
/// With `with_header` set, the first line of every input is a header: the
/// first input's header is written once, every later input's header must
/// match it byte for byte. Headerless inputs (the legacy rejection layout)
/// concatenate as-is. Returns the emitted data-row count.
pub async fn merge_projected_files(
    inputs: &[PathBuf],
    output: &Path,
    with_header: bool,
    expected_rows: u64,
) -> Result<u64> {
    if inputs.is_empty() {
        return Err(Error::Configuration(
            "merge requires at least one input file".into(),
        ));
    }
    let mut writer = BufWriter::new(File::create(output).await?);
    let mut header: Option<String> = None;
    let mut rows: u64 = 0;

    for input in inputs {
        let file = File::open(input).await?;
        let mut lines = BufReader::new(file).lines();
        let mut first = true;
        while let Some(line) = lines.next_line().await? {
            if with_header && first {
                first = false;
                match &header {
                    None => {
                        header = Some(line.clone());
                        writer.write_all(line.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                    }
                    Some(expected) if *expected == line => {}
                    Some(_) => {
                        return Err(Error::HeaderMismatch {
                            path: input.clone(),
                        });
                    }
                }
                continue;
            }
            rows += 1;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;

    if rows != expected_rows {
        return Err(Error::CountMismatch {
            path: output.to_path_buf(),
            expected: expected_rows,
            actual: rows,
        });
    }
    tracing::debug!(output = %output.display(), rows, "merged sample files");
    Ok(rows)
}

/// Count the lines of `path`, optionally ignoring the first (header) line.
pub async fn line_count(path: &Path, ignore_header: bool) -> Result<u64> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut count: u64 = 0;
    while lines.next_line().await?.is_some() {
        count += 1;
    }
    if ignore_header {
        count = count.saturating_sub(1);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_inputs(stem: &str, contents: &[&str]) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for (i, content) in contents.iter().enumerate() {
            let path = std::env::temp_dir().join(format!("abcpool-merge-{stem}-{i}.txt"));
            tokio::fs::write(&path, content).await.unwrap();
            paths.push(path);
        }
        paths
    }

    async fn cleanup(paths: &[PathBuf]) {
        for path in paths {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    fn five_rows(offset: usize) -> String {
        let mut s = String::from("a\tb\tc\n");
        for i in 0..5 {
            s.push_str(&format!("{0}\t{0}\t{0}\n", offset + i));
        }
        s
    }

    #[tokio::test]
    async fn merges_header_once_with_matching_count() {
        let inputs = write_inputs(
            "ok",
            &[&five_rows(0), &five_rows(10), &five_rows(20)],
        )
        .await;
        let output = std::env::temp_dir().join("abcpool-merge-ok-out.txt");
        let rows = merge_projected_files(&inputs, &output, true, 15)
            .await
            .unwrap();
        assert_eq!(rows, 15);

        let text = tokio::fs::read_to_string(&output).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 16);
        assert_eq!(lines[0], "a\tb\tc");
        assert_eq!(lines[1], "0\t0\t0");
        assert_eq!(lines[15], "24\t24\t24");
        assert_eq!(line_count(&output, true).await.unwrap(), 15);

        cleanup(&inputs).await;
        tokio::fs::remove_file(&output).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_expected_count_is_a_mismatch() {
        let inputs = write_inputs(
            "count",
            &[&five_rows(0), &five_rows(10), &five_rows(20)],
        )
        .await;
        let output = std::env::temp_dir().join("abcpool-merge-count-out.txt");
        let err = merge_projected_files(&inputs, &output, true, 20)
            .await
            .unwrap_err();
        match err {
            Error::CountMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 20);
                assert_eq!(actual, 15);
            }
            other => panic!("unexpected error: {other}"),
        }
        cleanup(&inputs).await;
        let _ = tokio::fs::remove_file(&output).await;
    }

    #[tokio::test]
    async fn differing_headers_are_rejected() {
        let inputs = write_inputs("head", &["a\tb\n1\t2\n", "a\tz\n3\t4\n"]).await;
        let output = std::env::temp_dir().join("abcpool-merge-head-out.txt");
        let err = merge_projected_files(&inputs, &output, true, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HeaderMismatch { .. }));
        cleanup(&inputs).await;
        let _ = tokio::fs::remove_file(&output).await;
    }

    #[tokio::test]
    async fn headerless_inputs_concatenate_in_order() {
        let inputs = write_inputs("raw", &["1\t\n2\t\n", "3\t\n"]).await;
        let output = std::env::temp_dir().join("abcpool-merge-raw-out.txt");
        let rows = merge_projected_files(&inputs, &output, false, 3)
            .await
            .unwrap();
        assert_eq!(rows, 3);
        let text = tokio::fs::read_to_string(&output).await.unwrap();
        assert_eq!(text, "1\t\n2\t\n3\t\n");
        cleanup(&inputs).await;
        tokio::fs::remove_file(&output).await.unwrap();
    }

    #[tokio::test]
    async fn no_inputs_is_a_configuration_error() {
        let output = std::env::temp_dir().join("abcpool-merge-none-out.txt");
        let err = merge_projected_files(&[], &output, true, 0).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
