//! Manifest URL rewriting.
//!
//! Turning `index_rel.wtml` into `index.wtml` is a capability with two
//! implementations:
//!
//! - [`BuiltinRewriter`]: in-process rewrite via [`crate::wtml::rewrite_urls`]
//! - [`CommandRewriter`]: shells out to an external tool invoked as
//!   `<program> wtml rewrite-urls <in> <base> <out>`
//!
//! The external tool's exit status is checked. A non-zero status, a failure
//! to spawn, or a missing output file is an error carrying the tool's stderr.

use crate::wtml;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("Rewriter produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("{path} still has relative URLs: {urls:?}")]
    RelativeUrls { path: PathBuf, urls: Vec<String> },
    #[error("{path} has URLs outside {base_url}: {urls:?}")]
    OutsideBase {
        path: PathBuf,
        base_url: String,
        urls: Vec<String>,
    },
}

/// Rewrites the relative URLs of a manifest against a base URL.
pub trait ManifestRewriter: Sync {
    fn rewrite(&self, input: &Path, base_url: &str, output: &Path) -> Result<(), RewriteError>;

    /// Short description for progress output.
    fn describe(&self) -> String;
}

/// In-process rewriter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRewriter;

impl ManifestRewriter for BuiltinRewriter {
    fn rewrite(&self, input: &Path, base_url: &str, output: &Path) -> Result<(), RewriteError> {
        wtml::rewrite_file(input, base_url, output)?;
        Ok(())
    }

    fn describe(&self) -> String {
        "builtin".to_string()
    }
}

/// External rewriter, e.g. `wwtdatatool`.
#[derive(Debug, Clone)]
pub struct CommandRewriter {
    program: String,
}

impl CommandRewriter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ManifestRewriter for CommandRewriter {
    fn rewrite(&self, input: &Path, base_url: &str, output: &Path) -> Result<(), RewriteError> {
        tracing::debug!(program = %self.program, input = %input.display(), base_url, "running rewriter");
        let result = Command::new(&self.program)
            .args(["wtml", "rewrite-urls"])
            .arg(input)
            .arg(base_url)
            .arg(output)
            .output()
            .map_err(|source| RewriteError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(RewriteError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        if !output.exists() {
            return Err(RewriteError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.program.clone()
    }
}

/// Pick the rewriter configured by `[rewrite].command`.
pub fn from_config(config: &crate::config::RewriteConfig) -> Box<dyn ManifestRewriter> {
    match config.command.as_deref() {
        Some(program) => Box::new(CommandRewriter::new(program)),
        None => Box::new(BuiltinRewriter),
    }
}

/// Check that every non-empty URL of a rewritten manifest starts with
/// `base_url`.
pub fn verify_absolute(path: &Path, base_url: &str) -> Result<(), RewriteError> {
    let xml = std::fs::read_to_string(path)?;
    let relative = wtml::relative_urls(&xml);
    if !relative.is_empty() {
        return Err(RewriteError::RelativeUrls {
            path: path.to_path_buf(),
            urls: relative,
        });
    }
    let outside: Vec<String> = wtml::manifest_urls(&xml)
        .into_iter()
        .filter(|u| !u.is_empty() && !u.starts_with(base_url))
        .collect();
    if outside.is_empty() {
        Ok(())
    } else {
        Err(RewriteError::OutsideBase {
            path: path.to_path_buf(),
            base_url: base_url.to_string(),
            urls: outside,
        })
    }
}
