use std::{
    fs,
    path::{Path, PathBuf},
};

use log::trace;
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::constants::DEFAULT_OUTPUT_DIGEST_FILE;

/// Picks the file the executor should write the image digest to.
///
/// Returns `None` when neither a digest file nor an output file is
/// requested. When only an output file is requested the digest is
/// written to a default location. The parent directory is created
/// if the file doesn't exist yet.
///
/// # Errors
/// Will error if the parent directory can't be created.
pub fn digest_file_name(
    digest_file: Option<&Path>,
    output_file: Option<&Path>,
) -> Result<Option<PathBuf>> {
    trace!("digest_file_name({digest_file:?}, {output_file:?})");

    let file_name = match (digest_file, output_file) {
        (None, None) => return Ok(None),
        (Some(digest_file), _) => digest_file.to_path_buf(),
        (None, Some(_)) => PathBuf::from(DEFAULT_OUTPUT_DIGEST_FILE),
    };

    if !file_name.exists() {
        if let Some(parent) = file_name.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to create {} directory", parent.display()))?;
        }
    }

    Ok(Some(file_name))
}

/// Reads the digest the executor wrote.
///
/// # Errors
/// Will error if the file can't be read.
pub fn read_digest_file<P>(path: P) -> Result<String>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    fs::read_to_string(path)
        .map(|digest| digest.trim().to_owned())
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read digest file {}", path.display()))
}

#[cfg(test)]
mod test {
    use std::{fs, path::Path};

    use tempfile::TempDir;

    use crate::constants::DEFAULT_OUTPUT_DIGEST_FILE;

    use super::{digest_file_name, read_digest_file};

    #[test]
    fn nothing_requested() {
        assert_eq!(digest_file_name(None, None).unwrap(), None);
    }

    #[test]
    fn digest_file_wins() {
        let temp_dir = TempDir::new().unwrap();
        let digest_file = temp_dir.path().join("nested").join("digest");

        let name = digest_file_name(Some(&digest_file), Some(Path::new("out.env"))).unwrap();

        assert_eq!(name, Some(digest_file.clone()));
        assert!(digest_file.parent().unwrap().is_dir());
    }

    #[test]
    fn default_for_output_file() {
        // The default lives under /kaniko so only check the name when it can't be created
        let name = digest_file_name(None, Some(Path::new("out.env")));

        if let Ok(name) = name {
            assert_eq!(name, Some(DEFAULT_OUTPUT_DIGEST_FILE.into()));
        }
    }

    #[test]
    fn reads_trimmed_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("digest");
        fs::write(&path, "sha256:abc\n").unwrap();

        assert_eq!(read_digest_file(&path).unwrap(), "sha256:abc");
        assert!(read_digest_file(temp_dir.path().join("missing")).is_err());
    }
}
