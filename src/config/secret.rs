// ABOUTME: Secret values that may be given inline or as a path to a file holding them.
// ABOUTME: A value naming an existing file is replaced by the file's trimmed contents.

use crate::error::{Error, Result};
use std::path::Path;

/// Resolves a secret: an existing file path yields its trimmed contents,
/// anything else is taken literally.
pub fn resolve_secret(value: &str) -> Result<String> {
    let path = Path::new(value);
    if value.is_empty() || !path.is_file() {
        return Ok(value.to_string());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadSecret {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn literal_values_pass_through() {
        assert_eq!(resolve_secret("hunter2").unwrap(), "hunter2");
        assert_eq!(resolve_secret("").unwrap(), "");
    }

    #[test]
    fn file_paths_are_read_and_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  s3cret  ").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(resolve_secret(&path).unwrap(), "s3cret");
    }

    #[test]
    fn directories_are_not_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        assert_eq!(resolve_secret(&path).unwrap(), path);
    }
}
