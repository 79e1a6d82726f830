//! Search-path resolution of upstream files
//!
//! The upstream MCP server package can be unpacked either directly into a
//! search root or into a subdirectory named after the package. Resolution
//! checks both locations per root, in order, so earlier roots override
//! later ones.

use std::path::PathBuf;

use thiserror::Error;

/// Fixed fallback subdirectory checked under each search root.
pub const FALLBACK_SUBDIR: &str = "mcp-server";

/// Resolution failure - fatal at startup for the MCP server file.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not find '{filename}' in any search root ({roots}); is the upstream package installed?")]
    NotFound { filename: String, roots: String },
}

impl ResolveError {
    fn not_found(filename: &str, roots: &[PathBuf]) -> Self {
        let roots = roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::NotFound {
            filename: filename.to_string(),
            roots,
        }
    }
}

/// Find `filename` under the ordered list of search roots.
///
/// Each root is checked twice: `root/filename`, then
/// `root/mcp-server/filename`. The first existing regular file wins.
/// No caching; a single deterministic linear scan.
pub fn resolve_upstream_file(filename: &str, roots: &[PathBuf]) -> Result<PathBuf, ResolveError> {
    for root in roots {
        let candidate = root.join(filename);
        if candidate.is_file() {
            return Ok(candidate);
        }
        let fallback = root.join(FALLBACK_SUBDIR).join(filename);
        if fallback.is_file() {
            return Ok(fallback);
        }
    }
    Err(ResolveError::not_found(filename, roots))
}
