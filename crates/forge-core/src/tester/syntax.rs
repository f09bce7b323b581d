//! Level 1: the module parses as a Rust source file.

use crate::domain::Candidate;

/// Parse the candidate source, reporting the error position on failure.
pub fn check(candidate: &Candidate) -> Result<(), String> {
    if candidate.source.trim().is_empty() {
        return Err("candidate source is empty".to_string());
    }
    match syn::parse_file(&candidate.source) {
        Ok(_) => Ok(()),
        Err(e) => {
            let start = e.span().start();
            Err(format!(
                "syntax error at line {}, column {}: {}",
                start.line,
                start.column + 1,
                e
            ))
        }
    }
}
