//! Line-oriented bulk re-encryption.
//!
//! One envelope per input line. Every input line produces exactly one output
//! line, so the output can be written back record-for-record:
//! - rotated records are replaced by their new envelope;
//! - records that fail to rotate are echoed unchanged and counted;
//! - blank lines pass through.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use keyrotation::ReEncrypter;
use tracing::{debug, warn};

/// Per-run record counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub rotated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Re-encrypt every record read from `input`, writing results to `output`.
///
/// # Errors
///
/// Returns an error only for I/O failures. Records that cannot be rotated
/// are reported in the returned [`BatchSummary`].
pub fn run<E, R, W>(rotator: &E, serialized: bool, mut input: R, mut output: W) -> Result<BatchSummary>
where
    E: ReEncrypter + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut summary = BatchSummary::default();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read input line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let raw = strip_line_ending(&buf);

        // Not an envelope; echo the bytes as read.
        let Ok(line) = std::str::from_utf8(raw) else {
            summary.failed += 1;
            warn!(line = line_no, "record is not valid UTF-8, left unchanged");
            output.write_all(raw)?;
            writeln!(output)?;
            continue;
        };
        let record = line.trim();

        if record.is_empty() {
            summary.skipped += 1;
            writeln!(output)?;
            continue;
        }

        match rotator.re_encrypt(record, serialized) {
            Ok(envelope) => {
                summary.rotated += 1;
                debug!(line = line_no, "record rotated");
                writeln!(output, "{envelope}")?;
            }
            Err(e) => {
                summary.failed += 1;
                warn!(line = line_no, error = %e, "record left unchanged");
                writeln!(output, "{line}")?;
            }
        }
    }

    output.flush().context("failed to flush output")?;
    Ok(summary)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrotation::{Cipher, CipherEngine, KeyMaterial, KeyRotator, RotationError};
    use mockall::mock;

    mock! {
        Rotator {}
        impl ReEncrypter for Rotator {
            fn re_encrypt(&self, old_envelope: &str, serialized: bool) -> Result<String, RotationError>;
        }
    }

    fn run_to_bytes<E: ReEncrypter>(rotator: &E, serialized: bool, input: &[u8]) -> (BatchSummary, Vec<u8>) {
        let mut out = Vec::new();
        let summary = run(rotator, serialized, input, &mut out).unwrap();
        (summary, out)
    }

    fn run_to_string<E: ReEncrypter>(rotator: &E, serialized: bool, input: &str) -> (BatchSummary, String) {
        let (summary, out) = run_to_bytes(rotator, serialized, input.as_bytes());
        (summary, String::from_utf8(out).unwrap())
    }

    #[test]
    fn rotates_each_record_and_keeps_blank_lines() {
        let mut rotator = MockRotator::new();
        rotator
            .expect_re_encrypt()
            .times(2)
            .returning(|text, _| Ok(format!("new-{text}")));

        let (summary, out) = run_to_string(&rotator, false, "a\n\n  b  \n");
        assert_eq!(out, "new-a\n\nnew-b\n");
        assert_eq!(
            summary,
            BatchSummary {
                rotated: 2,
                failed: 0,
                skipped: 1
            }
        );
    }

    #[test]
    fn failed_record_is_echoed_unchanged() {
        let mut rotator = MockRotator::new();
        rotator.expect_re_encrypt().times(3).returning(|text, _| {
            if text == "bad" {
                Err(RotationError::OldKeyOrPayloadInvalid)
            } else {
                Ok(text.to_uppercase())
            }
        });

        let (summary, out) = run_to_string(&rotator, false, "one\nbad\ntwo");
        assert_eq!(out, "ONE\nbad\nTWO\n");
        assert_eq!(summary.rotated, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn serialized_flag_is_forwarded() {
        let mut rotator = MockRotator::new();
        rotator
            .expect_re_encrypt()
            .times(1)
            .returning(|_, serialized| Ok(serialized.to_string()));

        let (_, out) = run_to_string(&rotator, true, "x\n");
        assert_eq!(out, "true\n");
    }

    #[test]
    fn empty_input_writes_nothing() {
        let rotator = MockRotator::new();
        let (summary, out) = run_to_string(&rotator, false, "");
        assert_eq!(summary, BatchSummary::default());
        assert!(out.is_empty());
    }

    #[test]
    fn end_to_end_with_real_keys() {
        let old = CipherEngine::new(KeyMaterial::from_bytes(&[0u8; 32]), Cipher::Aes256Cbc).unwrap();
        let new = CipherEngine::new(KeyMaterial::from_bytes(&[1u8; 32]), Cipher::Aes256Cbc).unwrap();
        let rotator = KeyRotator::from_engines(old.clone(), new.clone()).unwrap();

        let input = format!(
            "{}\ncorrupted\n{}\n",
            old.encrypt_string("first").unwrap(),
            old.encrypt_string("second").unwrap()
        );
        let (summary, out) = run_to_string(&rotator, false, &input);
        assert_eq!(summary.rotated, 2);
        assert_eq!(summary.failed, 1);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(new.decrypt_string(lines[0]).unwrap(), "first");
        assert_eq!(lines[1], "corrupted");
        assert_eq!(new.decrypt_string(lines[2]).unwrap(), "second");
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let mut rotator = MockRotator::new();
        rotator
            .expect_re_encrypt()
            .times(2)
            .returning(|text, _| Ok(format!("<{text}>")));

        let (summary, out) = run_to_string(&rotator, false, "a\r\nb\r\n");
        assert_eq!(out, "<a>\n<b>\n");
        assert_eq!(summary.rotated, 2);
    }

    #[test]
    fn non_utf8_record_is_echoed_and_batch_continues() {
        let old = CipherEngine::new(KeyMaterial::from_bytes(&[0u8; 32]), Cipher::Aes256Cbc).unwrap();
        let new = CipherEngine::new(KeyMaterial::from_bytes(&[1u8; 32]), Cipher::Aes256Cbc).unwrap();
        let rotator = KeyRotator::from_engines(old.clone(), new.clone()).unwrap();

        let mut input = Vec::new();
        input.extend_from_slice(old.encrypt_string("first").unwrap().as_bytes());
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(old.encrypt_string("third").unwrap().as_bytes());
        input.push(b'\n');

        let (summary, out) = run_to_bytes(&rotator, false, &input);
        assert_eq!(
            summary,
            BatchSummary {
                rotated: 2,
                failed: 1,
                skipped: 0
            }
        );

        let lines: Vec<&[u8]> = out.split(|&b| b == b'\n').collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[3].is_empty());
        assert_eq!(new.decrypt_string(std::str::from_utf8(lines[0]).unwrap()).unwrap(), "first");
        assert_eq!(lines[1], b"\xff\xfe");
        assert_eq!(new.decrypt_string(std::str::from_utf8(lines[2]).unwrap()).unwrap(), "third");
    }
}
