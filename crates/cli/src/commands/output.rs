//! Rendering of workflow answers.
//!
//! Answers go to stdout; everything diagnostic goes through tracing to stderr.

use ragent_core::{AppError, AppResult};
use ragent_workflow::{source_refs, Degradation, Passage, Step};

pub fn print_answer(answer: &str, documents: &[Passage]) {
    println!("{}", answer);

    let refs = source_refs(documents);
    if refs.is_empty() {
        return;
    }

    println!();
    println!("Sources:");
    for source_ref in refs {
        match source_ref.location {
            Some(location) => println!("- {} ({})", source_ref.source, location),
            None => println!("- {}", source_ref.source),
        }
    }
}

pub fn print_json(
    question: &str,
    answer: &str,
    documents: &[Passage],
    path: &[Step],
    degradations: &[Degradation],
) -> AppResult<()> {
    let output = serde_json::json!({
        "question": question,
        "answer": answer,
        "sources": source_refs(documents),
        "documents": documents,
        "path": path,
        "degradations": degradations,
    });

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Log what the run had to absorb so degraded answers are visible.
pub fn log_run(path: &[Step], degradations: &[Degradation]) {
    let steps = path.iter().map(Step::to_string).collect::<Vec<_>>().join(" -> ");
    tracing::debug!("Path: {}", steps);

    for degradation in degradations {
        tracing::warn!("Degraded: {:?}", degradation);
    }
}
