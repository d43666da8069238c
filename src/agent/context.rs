//! Static project context and the system instruction block.

use std::path::Path;

use serde_json::Value;

use super::prompt_modules::{classify, ModuleId};
use crate::tools::walk::project_files;

const STRUCTURE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectContext {
    pub structure: String,
    pub conventions: String,
    pub tech_stack: String,
}

impl ProjectContext {
    /// Inspect the working tree at `root`.
    pub async fn build(root: &Path) -> anyhow::Result<Self> {
        let walk_root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || project_files(&walk_root)).await?;
        let structure = files
            .into_iter()
            .take(STRUCTURE_LIMIT)
            .collect::<Vec<_>>()
            .join("\n");

        let conventions = detect_conventions(root);
        let tech_stack = detect_tech_stack(root).await;

        tracing::debug!(tech_stack = %tech_stack, conventions = %conventions, "Built project context");
        Ok(Self {
            structure,
            conventions,
            tech_stack,
        })
    }
}

fn detect_conventions(root: &Path) -> String {
    let checks: [(&[&str], &str); 4] = [
        (&["tsconfig.json"], "TypeScript project"),
        (
            &["eslint.config.js", ".eslintrc.json", ".eslintrc.js"],
            "ESLint configured",
        ),
        (&[".prettierrc"], "Prettier configured"),
        (&["rustfmt.toml"], "rustfmt configured"),
    ];

    let found: Vec<&str> = checks
        .iter()
        .filter(|(files, _)| files.iter().any(|f| root.join(f).is_file()))
        .map(|(_, label)| *label)
        .collect();

    if found.is_empty() {
        return "No specific conventions detected".to_string();
    }
    found.join(", ")
}

const FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("svelte", "Svelte"),
    ("next", "Next.js"),
    ("nuxt", "Nuxt"),
    ("express", "Express"),
    ("hono", "Hono"),
    ("fastify", "Fastify"),
    ("typescript", "TypeScript"),
];

async fn detect_tech_stack(root: &Path) -> String {
    if let Ok(raw) = tokio::fs::read_to_string(root.join("package.json")).await {
        return tech_stack_from_package_json(&raw);
    }
    if root.join("Cargo.toml").is_file() {
        return "Rust".to_string();
    }
    "Unknown".to_string()
}

fn tech_stack_from_package_json(raw: &str) -> String {
    let Ok(pkg) = serde_json::from_str::<Value>(raw) else {
        return "Unknown".to_string();
    };
    let has_dep = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| pkg.get(section).and_then(|d| d.get(name)).is_some())
    };

    let found: Vec<&str> = FRAMEWORKS
        .iter()
        .filter(|(dep, _)| has_dep(dep))
        .map(|(_, label)| *label)
        .collect();

    if found.is_empty() {
        return "Node.js".to_string();
    }
    found.join(", ")
}

/// Assemble the instruction block sent as the system message on every turn.
pub fn build_system_prompt(context: &ProjectContext, modules: &[ModuleId]) -> String {
    let mut lines = vec![
        "You are a code agent that modifies a project based on user requests.".to_string(),
        "You have tools for reading, writing and editing files, running commands and searching code.".to_string(),
        String::new(),
        "## Project Info".to_string(),
        format!("Tech stack: {}", context.tech_stack),
        format!("Conventions: {}", context.conventions),
        String::new(),
        "## Project Structure".to_string(),
        context.structure.clone(),
        String::new(),
        "## Rules".to_string(),
        "- Read files before modifying them".to_string(),
        "- Make minimal, focused changes".to_string(),
        "- Run build/lint after changes to validate correctness".to_string(),
        "- Use report_progress to send status updates".to_string(),
        "- Use git_commit when changes are ready".to_string(),
    ];

    for id in modules {
        lines.push(String::new());
        lines.push(id.module().prompt.to_string());
    }

    lines.join("\n")
}

/// Context, modules and prompt for one request.
pub async fn system_prompt_for(root: &Path, user_message: &str) -> anyhow::Result<String> {
    let context = ProjectContext::build(root).await?;
    let modules = classify(user_message);
    tracing::info!(
        modules = ?modules.iter().map(ModuleId::as_str).collect::<Vec<_>>(),
        "Classified task modules"
    );
    Ok(build_system_prompt(&context, &modules))
}
