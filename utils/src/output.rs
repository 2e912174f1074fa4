//! Writes the dotenv formatted output file CI steps read the
//! build results from.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};
use miette::Diagnostic;
use thiserror::Error;

const DIGEST_KEY: &str = "digest";
const TAR_PATH_KEY: &str = "tar_path";

#[derive(Debug, Error, Diagnostic)]
pub enum OutputError {
    #[error("No values to write to output file")]
    NoValues,

    #[error("Failed to write output file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to verify written output in {}", path.display())]
    Verify {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Written output is missing {key}")]
    #[diagnostic(help("The file was changed while it was being written"))]
    Mismatch { key: String },
}

/// Writes `digest` and `tar_path` to a dotenv file, skipping empty values.
///
/// # Errors
/// Will error if both values are empty or if the file can't be
/// written and read back.
pub fn write_output_file<P>(path: P, digest: &str, tar_path: &str) -> Result<(), OutputError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    trace!("write_output_file({}, {digest}, {tar_path})", path.display());

    let mut output = BTreeMap::new();
    if !digest.is_empty() {
        output.insert(DIGEST_KEY, digest);
    }
    if tar_path.is_empty() {
        debug!("No tar path set, skipping");
    } else {
        output.insert(TAR_PATH_KEY, tar_path);
    }

    if output.is_empty() {
        return Err(OutputError::NoValues);
    }

    fs::write(path, marshal(&output)).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let written = dotenvy::from_path_iter(path)
        .and_then(Iterator::collect::<Result<BTreeMap<_, _>, _>>)
        .map_err(|source| OutputError::Verify {
            path: path.to_path_buf(),
            source,
        })?;

    for (key, value) in output {
        if written.get(key).map(String::as_str) != Some(value) {
            warn!("Output file {} does not contain the expected {key}", path.display());
            return Err(OutputError::Mismatch { key: key.into() });
        }
    }

    debug!("Wrote output file to {}", path.display());
    Ok(())
}

fn marshal(values: &BTreeMap<&str, &str>) -> String {
    values
        .iter()
        .map(|(key, value)| {
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                format!("{key}={value}\n")
            } else {
                format!("{key}=\"{}\"\n", escape(value))
            }
        })
        .collect()
}

/// Escapes a value for a double quoted dotenv string.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\\' | '"' | '$' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
