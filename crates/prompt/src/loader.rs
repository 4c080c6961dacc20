//! Prompt loader for built-in and workspace prompt definitions.

use crate::types::PromptDefinition;
use ragent_core::{AppError, AppResult};
use std::collections::BTreeSet;
use std::path::Path;

/// Prompts compiled into the binary, keyed by id.
const BUILTIN_PROMPTS: [(&str, &str); 4] = [
    (
        "grade.document",
        include_str!("../prompts/grade.document.yml"),
    ),
    ("rewrite.query", include_str!("../prompts/rewrite.query.yml")),
    (
        "answer.context",
        include_str!("../prompts/answer.context.yml"),
    ),
    (
        "condense.question",
        include_str!("../prompts/condense.question.yml"),
    ),
];

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in `.ragent/prompts/` takes precedence over the
/// built-in definition with the same id.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.ragent/`
/// * `prompt_id` - Prompt identifier (e.g., "grade.document")
///
/// # Example
/// ```no_run
/// use ragent_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer.context")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".ragent/prompts")
        .join(format!("{}.yml", prompt_id));

    let definition = if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        parse_prompt(&contents, &prompt_file.display().to_string())?
    } else {
        let contents = builtin_prompt(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;
        parse_prompt(contents, prompt_id)?
    };

    validate_prompt(&definition)?;

    tracing::debug!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List all available prompt IDs: built-ins plus workspace files.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: BTreeSet<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    let prompts_dir = workspace_path.join(".ragent/prompts");

    if prompts_dir.exists() {
        for entry in walkdir::WalkDir::new(&prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.insert(stem.to_string());
                }
            }
        }
    }

    Ok(prompt_ids.into_iter().collect())
}

fn builtin_prompt(prompt_id: &str) -> Option<&'static str> {
    BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(_, contents)| *contents)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_prompt(dir: &Path, id: &str, valid: bool) -> PathBuf {
        let prompts_dir = dir.join(".ragent/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();

        let content = if valid {
            format!(
                r#"
id: {}
title: "Test Prompt"
apiVersion: "1.0"
createdBy: test
template: "Override: {{{{question}}}}"
"#,
                id
            )
        } else {
            "invalid: yaml: content:".to_string()
        };

        let file_path = prompts_dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_builtins_load_and_validate() {
        let temp_dir = TempDir::new().unwrap();
        for (id, _) in BUILTIN_PROMPTS {
            let prompt = load_prompt(temp_dir.path(), id).unwrap();
            assert_eq!(prompt.id, id);
        }
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "rewrite.query", true);

        let prompt = load_prompt(temp_dir.path(), "rewrite.query").unwrap();
        assert_eq!(prompt.title, "Test Prompt");
        assert!(prompt.template.starts_with("Override"));
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_prompt(temp_dir.path(), "nonexistent");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "invalid", false);

        let result = load_prompt(temp_dir.path(), "invalid");
        assert!(result.is_err());
    }

    #[test]
    fn test_list_prompts_merges_sources() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "custom.one", true);
        create_test_prompt(temp_dir.path(), "grade.document", true);

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), 5);
        assert!(prompts.contains(&"custom.one".to_string()));
        assert!(prompts.contains(&"condense.question".to_string()));
    }
}
