//! Artifact emission: the raw model binary and the C header embedding it.
//!
//! Both files are staged as temporary siblings before either destination is
//! touched. The binary is then renamed into place, then the header; if the
//! header cannot be placed the previous binary is restored, so a failed run
//! never leaves a binary without its matching header.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tracing::{info, warn};

use crate::config::OutputConfig;
use crate::error::{Error, Result};

/// Symbol names the firmware links against.
pub const ARRAY_NAME: &str = "model_tflite";
pub const LEN_NAME: &str = "model_tflite_len";

/// What was written and where.
#[derive(Clone, Debug)]
pub struct EmittedArtifact {
    pub binary: PathBuf,
    pub header: PathBuf,
    pub len: usize,
    pub digest: blake3::Hash,
}

/// C source declaring the bytes as an unsigned char array plus its length.
///
/// Literals are lowercase hex without zero padding (`0x0`, `0x1c`).
pub fn render_header(bytes: &[u8]) -> String {
    let literals: Vec<String> = bytes.iter().map(|b| format!("{b:#x}")).collect();
    format!(
        "const unsigned char {ARRAY_NAME}[] = {{{}}};\nconst int {LEN_NAME} = {};\n",
        literals.join(", "),
        bytes.len()
    )
}

/// Write `bytes` as the binary and header named in `out`.
///
/// Either both files are replaced or, on error, neither is.
pub fn write_artifacts(bytes: &[u8], out: &OutputConfig) -> Result<EmittedArtifact> {
    let binary = out.binary_path();
    let header = out.header_path();
    let digest = blake3::hash(bytes);

    let staged_binary = stage(&binary, bytes)?;
    let staged_header = stage(&header, render_header(bytes).as_bytes())?;

    let previous = set_aside(&binary)?;
    if let Err(e) = staged_binary.persist(&binary) {
        restore(&binary, previous);
        return Err(Error::io(&binary, e.error));
    }
    info!(path = %binary.display(), bytes = bytes.len(), "wrote model binary");

    if let Err(e) = staged_header.persist(&header) {
        restore(&binary, previous);
        return Err(Error::io(&header, e.error));
    }
    info!(path = %header.display(), blake3 = %digest.to_hex(), "wrote model header");
    println!(
        "[OK] {} written ({} bytes)",
        header
            .file_name()
            .map_or_else(|| header.display().to_string(), |n| n.to_string_lossy().into_owned()),
        bytes.len()
    );

    Ok(EmittedArtifact {
        binary,
        header,
        len: bytes.len(),
        digest,
    })
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Fully write and sync `contents` into a temporary sibling of `path`.
fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    Ok(tmp)
}

/// Move an existing file at `path` to a temporary sibling. The returned
/// path deletes the old contents when dropped.
fn set_aside(path: &Path) -> Result<Option<TempPath>> {
    if !path.is_file() {
        return Ok(None);
    }
    let dir = parent_dir(path);
    let backup = NamedTempFile::new_in(dir)
        .map_err(|e| Error::io(dir, e))?
        .into_temp_path();
    std::fs::rename(path, &backup).map_err(|e| Error::io(path, e))?;
    Ok(Some(backup))
}

/// Put the set-aside file back at `path`, or remove `path` if there was none.
fn restore(path: &Path, previous: Option<TempPath>) {
    let restored = match previous {
        Some(backup) => backup.persist(path).map_err(|e| e.error),
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    };
    if let Err(e) = restored {
        warn!(path = %path.display(), error = %e, "could not roll back model binary");
    }
}

/// Decode the byte array of a header produced by [`render_header`].
///
/// The declared length must match the number of literals.
pub fn parse_header(text: &str) -> Result<Vec<u8>> {
    let decl = format!("{ARRAY_NAME}[]");
    let start = text
        .find(&decl)
        .ok_or_else(|| Error::Header(format!("no `{ARRAY_NAME}` array")))?;
    let rest = &text[start..];
    let open = rest
        .find('{')
        .ok_or_else(|| Error::Header("array initializer not opened".into()))?;
    let close = rest
        .find('}')
        .ok_or_else(|| Error::Header("array initializer not closed".into()))?;
    if close < open {
        return Err(Error::Header("malformed array initializer".into()));
    }

    let body = rest[open + 1..close].trim();
    let bytes = if body.is_empty() {
        Vec::new()
    } else {
        body.split(',')
            .enumerate()
            .map(|(i, lit)| {
                let lit = lit.trim();
                parse_literal(lit).ok_or_else(|| {
                    Error::Header(format!("element {i}: `{lit}` is not a byte literal"))
                })
            })
            .collect::<Result<Vec<u8>>>()?
    };

    let declared = declared_len(&rest[close..])?;
    if declared != bytes.len() {
        return Err(Error::Header(format!(
            "{LEN_NAME} is {declared} but the array holds {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn parse_literal(lit: &str) -> Option<u8> {
    let hex = lit.strip_prefix("0x").or_else(|| lit.strip_prefix("0X"))?;
    u8::from_str_radix(hex, 16).ok()
}

fn declared_len(text: &str) -> Result<usize> {
    let missing = || Error::Header(format!("no `{LEN_NAME}` declaration"));
    let at = text.find(LEN_NAME).ok_or_else(missing)?;
    let after = &text[at + LEN_NAME.len()..];
    let value = after
        .trim_start()
        .strip_prefix('=')
        .and_then(|v| v.split(';').next())
        .ok_or_else(missing)?
        .trim();
    value
        .parse()
        .map_err(|_| Error::Header(format!("{LEN_NAME} `{value}` is not a length")))
}

/// Check that a header and a binary carry the same bytes. Returns the length.
pub fn verify(header: &Path, binary: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(header).map_err(|e| Error::io(header, e))?;
    let bin = std::fs::read(binary).map_err(|e| Error::io(binary, e))?;
    let embedded = parse_header(&text)?;
    if embedded.len() != bin.len() {
        return Err(Error::Header(format!(
            "header holds {} bytes, binary {}",
            embedded.len(),
            bin.len()
        )));
    }
    if let Some(offset) = embedded.iter().zip(&bin).position(|(a, b)| a != b) {
        return Err(Error::Header(format!(
            "header and binary differ at offset {offset}"
        )));
    }
    Ok(bin.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_in(dir: &Path) -> OutputConfig {
        OutputConfig {
            dir: dir.to_path_buf(),
            ..OutputConfig::default()
        }
    }

    #[test]
    fn header_matches_c_array_layout() {
        insta::assert_snapshot!(render_header(&[0x1c, 0x00, 0xff, 0x10]), @r"
        const unsigned char model_tflite[] = {0x1c, 0x0, 0xff, 0x10};
        const int model_tflite_len = 4;
        ");
    }

    #[test]
    fn header_parses_back_to_the_same_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(parse_header(&render_header(&bytes)).unwrap(), bytes);
        assert_eq!(parse_header(&render_header(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let text = "const unsigned char model_tflite[] = {0x1, 0x2};\nconst int model_tflite_len = 3;\n";
        assert!(matches!(parse_header(text), Err(Error::Header(_))));
        let bad = "const unsigned char model_tflite[] = {0x1, 0x100};\nconst int model_tflite_len = 2;\n";
        assert!(matches!(parse_header(bad), Err(Error::Header(_))));
        assert!(matches!(parse_header("int x;"), Err(Error::Header(_))));
    }

    #[test]
    fn artifacts_are_written_and_agree() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"HQ8\0\x01payload".to_vec();
        let art = write_artifacts(&bytes, &out_in(dir.path())).unwrap();
        assert_eq!(art.len, bytes.len());
        assert_eq!(art.digest, blake3::hash(&bytes));
        assert_eq!(std::fs::read(&art.binary).unwrap(), bytes);
        assert_eq!(verify(&art.header, &art.binary).unwrap(), bytes.len());

        // Only the two artifacts remain; no temp files are left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn overwrite_replaces_previous_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = out_in(dir.path());
        write_artifacts(&[1, 2, 3, 4, 5], &out).unwrap();
        let art = write_artifacts(&[9], &out).unwrap();
        assert_eq!(std::fs::read(&art.binary).unwrap(), vec![9]);
        assert_eq!(verify(&art.header, &art.binary).unwrap(), 1);
    }

    #[test]
    fn failed_header_write_keeps_the_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let out = out_in(dir.path());
        let first = write_artifacts(&[1, 2, 3], &out).unwrap();

        // A non-empty directory where the header goes cannot be replaced.
        std::fs::remove_file(&first.header).unwrap();
        std::fs::create_dir(&first.header).unwrap();
        std::fs::write(first.header.join("keep"), b"x").unwrap();

        assert!(matches!(
            write_artifacts(&[9, 9, 9, 9], &out),
            Err(Error::Io { path, .. }) if path == first.header
        ));
        assert_eq!(std::fs::read(&first.binary).unwrap(), vec![1, 2, 3]);

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["model.bin", "model.h"]);
    }

    #[test]
    fn failed_first_export_leaves_no_binary() {
        let dir = tempfile::tempdir().unwrap();
        let out = out_in(dir.path());
        std::fs::create_dir(out.header_path()).unwrap();
        std::fs::write(out.header_path().join("keep"), b"x").unwrap();

        assert!(write_artifacts(&[5, 6], &out).is_err());
        assert!(!out.binary_path().exists());
    }

    #[test]
    fn verify_detects_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let art = write_artifacts(&[1, 2, 3], &out_in(dir.path())).unwrap();
        std::fs::write(&art.binary, [1, 2, 4]).unwrap();
        assert!(matches!(
            verify(&art.header, &art.binary),
            Err(Error::Header(msg)) if msg.contains("offset 2")
        ));
    }

    #[test]
    fn missing_output_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let art = write_artifacts(&[7; 10], &out_in(&dir.path().join("fw/include"))).unwrap();
        assert!(art.header.exists());
    }
}
