use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::header::{StringSpan, parse_header};

use super::Anonymizer;

/// Replaces the user and machine names recorded in an artifact header with
/// same-length filler, so the file layout is unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderAnonymizer;

impl Anonymizer for HeaderAnonymizer {
    fn anonymize(&self, artifact: &Path) -> Result<()> {
        let mut bytes = fs::read(artifact)
            .with_context(|| format!("Failed to read artifact: {}", artifact.display()))?;
        let header = parse_header(artifact, &bytes)?;

        scrub(&mut bytes, header.user_name_span);
        scrub(&mut bytes, header.machine_name_span);

        fs::write(artifact, &bytes)
            .with_context(|| format!("Failed to write artifact: {}", artifact.display()))?;
        debug!(artifact = %artifact.display(), "Anonymized artifact");
        Ok(())
    }
}

fn scrub(bytes: &mut [u8], span: StringSpan) {
    let Some(field) = bytes.get_mut(span.offset..span.offset + span.len) else {
        return;
    };
    let filler = filler_for(field);
    field.copy_from_slice(&filler);
}

/// Lowercase ASCII letters derived from the original value.
fn filler_for(original: &[u8]) -> Vec<u8> {
    let mut filler = Vec::with_capacity(original.len());
    let mut block = Sha256::digest(original);
    while filler.len() < original.len() {
        for byte in block.iter() {
            if filler.len() == original.len() {
                break;
            }
            filler.push(b'a' + byte % 26);
        }
        block = Sha256::digest(block);
    }
    filler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ArtifactHeader, ByteOrder, encode_header};
    use tempfile::tempdir;

    fn header(user: &str, machine: &str) -> ArtifactHeader {
        ArtifactHeader {
            byte_order: ByteOrder::Little,
            major_version: 3,
            minor_version: 9,
            game_id: 2,
            compilation_time: 1_650_000_000,
            source_file_name: "Quest.psc".into(),
            user_name: user.into(),
            machine_name: machine.into(),
            user_name_span: StringSpan { offset: 0, len: 0 },
            machine_name_span: StringSpan { offset: 0, len: 0 },
        }
    }

    #[test]
    fn names_are_replaced_with_same_length_filler() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("Quest.pex");
        let mut original = encode_header(&header("alice", "A-VERY-LONG-MACHINE-NAME-FOR-TESTS-1234"));
        original.extend_from_slice(b"body");
        fs::write(&path, &original).unwrap();

        HeaderAnonymizer.anonymize(&path).unwrap();

        let rewritten = fs::read(&path).unwrap();
        assert_eq!(rewritten.len(), original.len());
        let parsed = parse_header(&path, &rewritten).unwrap();
        assert_eq!(parsed.source_file_name, "Quest.psc");
        assert_eq!(parsed.compilation_time, 1_650_000_000);
        assert_eq!(parsed.user_name.len(), 5);
        assert_ne!(parsed.user_name, "alice");
        assert_eq!(parsed.machine_name.len(), 39);
        assert!(parsed.machine_name.bytes().all(|b| b.is_ascii_lowercase()));
        assert!(rewritten.ends_with(b"body"));
    }

    #[test]
    fn unknown_format_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("Broken.pex");
        fs::write(&path, b"not a compiled script").unwrap();
        assert!(HeaderAnonymizer.anonymize(&path).is_err());
    }
}
