//! Output naming derived from input file names.
//!
//! Every input image maps deterministically onto three names:
//!
//! - **dataset name**: the file stem, used as the manifest `Name`
//!   (`SPHEREx_LinesRB_equirectangular.tif` → `SPHEREx_LinesRB_equirectangular`)
//! - **directory name**: the stem with the projection suffix stripped and the
//!   output suffix appended (`Test_equirectangular.tif` → `Test_toast`)
//! - **base URL**: where the published directory is served from
//!   (`Test_toast` → `/Test_toast/`)
//!
//! Two inputs that would land in the same directory are rejected up front by
//! [`check_unique`], before any pixels are touched.

use crate::config::NamingConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NamingError {
    #[error("Cannot derive an output name from {0}")]
    NoStem(PathBuf),
    #[error("{first} and {second} both map to output directory {dir}")]
    Collision {
        first: PathBuf,
        second: PathBuf,
        dir: String,
    },
}

/// Names derived for one input image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    /// Manifest dataset name (file stem).
    pub dataset: String,
    /// Output and published directory name.
    pub dir: String,
}

impl OutputNames {
    /// Absolute base URL for the published directory, always ending in `/`.
    pub fn base_url(&self, url_prefix: &str) -> String {
        format!("{}{}/", url_prefix, self.dir)
    }
}

/// Derive output names for an input image path.
///
/// - `Test_equirectangular.tif` → dataset `Test_equirectangular`, dir `Test_toast`
/// - `milkyway.tiff` → dataset `milkyway`, dir `milkyway_toast`
/// - `_equirectangular.tif` → the strip would leave nothing, so the stem is kept
pub fn output_names(input: &Path, naming: &NamingConfig) -> Result<OutputNames, NamingError> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NamingError::NoStem(input.to_path_buf()))?;

    let base = match stem.strip_suffix(naming.strip_suffix.as_str()) {
        Some(stripped) if !naming.strip_suffix.is_empty() && !stripped.is_empty() => stripped,
        _ => stem,
    };

    Ok(OutputNames {
        dataset: stem.to_string(),
        dir: format!("{}{}", base, naming.suffix),
    })
}

/// Reject input lists in which two images share an output directory.
pub fn check_unique<'a>(
    names: impl IntoIterator<Item = (&'a Path, &'a OutputNames)>,
) -> Result<(), NamingError> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for (input, names) in names {
        if let Some(first) = seen.insert(names.dir.as_str(), input) {
            return Err(NamingError::Collision {
                first: first.to_path_buf(),
                second: input.to_path_buf(),
                dir: names.dir.clone(),
            });
        }
    }
    Ok(())
}
