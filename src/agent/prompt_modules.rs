//! Advisory prompt modules selected by keyword.
//!
//! The mapping from module to trigger keywords is declarative; [`classify`]
//! returns the modules (in declaration order) whose keywords occur in the
//! lowercased request, or the default module when nothing matches.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleId {
    FrontendExpert,
    ApiExpert,
    ConfigExpert,
    CopyEditor,
    DatabaseExpert,
    TestingExpert,
}

pub struct PromptModule {
    pub id: ModuleId,
    pub keywords: &'static [&'static str],
    pub prompt: &'static str,
}

pub const DEFAULT_MODULE: ModuleId = ModuleId::FrontendExpert;

impl ModuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontendExpert => "frontend-expert",
            Self::ApiExpert => "api-expert",
            Self::ConfigExpert => "config-expert",
            Self::CopyEditor => "copy-editor",
            Self::DatabaseExpert => "database-expert",
            Self::TestingExpert => "testing-expert",
        }
    }

    pub fn module(&self) -> &'static PromptModule {
        MODULES
            .iter()
            .find(|m| m.id == *self)
            .unwrap_or(&MODULES[0])
    }
}

pub static MODULES: [PromptModule; 6] = [
    PromptModule {
        id: ModuleId::FrontendExpert,
        keywords: &[
            "css", "html", "style", "layout", "responsive", "component", "ui", "button", "form",
            "modal", "header", "footer", "sidebar", "navbar", "animation", "transition", "color",
            "font", "design", "page", "view", "react", "vue", "svelte", "tailwind", "flex",
            "grid", "margin", "padding", "border", "hover", "dark mode", "theme", "icon",
        ],
        prompt: "## Frontend guidelines\n\
            - Use semantic, accessible markup (landmark elements, alt text, labels)\n\
            - Follow the styling approach the project already uses\n\
            - Prefer responsive layouts built on flexbox/grid and relative units\n\
            - Keep components small; cover loading, error and empty states",
    },
    PromptModule {
        id: ModuleId::ApiExpert,
        keywords: &[
            "api", "endpoint", "route", "request", "response", "rest", "graphql", "middleware",
            "auth", "token", "cors", "rate limit", "webhook", "server", "http", "post", "get",
            "put", "delete", "patch", "status code", "json", "payload", "backend",
        ],
        prompt: "## API guidelines\n\
            - Validate request data at the boundary and return consistent error bodies\n\
            - Use correct HTTP methods and status codes\n\
            - Keep handlers thin and put logic in services\n\
            - Read configuration and secrets from the environment",
    },
    PromptModule {
        id: ModuleId::ConfigExpert,
        keywords: &[
            "config", "tsconfig", "package.json", "webpack", "vite", "eslint", "prettier",
            "build", "deploy", "ci", "cd", "docker", "env", "environment", "script",
            "dependency", "install", "npm", "yarn", "pnpm", "bun", "next.config", "babel",
        ],
        prompt: "## Build and config guidelines\n\
            - Learn the build system before touching its config\n\
            - Use the package manager the lockfile belongs to\n\
            - Never loosen type checking or lint rules to get a build through\n\
            - Run the build after every config change",
    },
    PromptModule {
        id: ModuleId::CopyEditor,
        keywords: &[
            "text", "copy", "content", "wording", "typo", "spelling", "grammar", "translation",
            "i18n", "localization", "string", "message", "label", "title", "description",
            "placeholder", "tooltip", "readme", "documentation", "docs",
        ],
        prompt: "## Copy guidelines\n\
            - Change only the text that was asked for and keep the existing voice\n\
            - Fix spelling, grammar and punctuation consistently\n\
            - Keep markup and template placeholders intact",
    },
    PromptModule {
        id: ModuleId::DatabaseExpert,
        keywords: &[
            "database", "db", "sql", "sqlite", "postgres", "mysql", "migration", "schema",
            "table", "column", "index", "query", "join", "insert", "update", "delete",
            "foreign key", "constraint", "orm", "prisma", "drizzle", "knex",
        ],
        prompt: "## Database guidelines\n\
            - Change schemas only through migrations that can be rolled back\n\
            - Use parameterized queries\n\
            - Index columns that are filtered or joined on\n\
            - Keep naming consistent with the existing schema",
    },
    PromptModule {
        id: ModuleId::TestingExpert,
        keywords: &[
            "test", "spec", "jest", "vitest", "mocha", "assert", "expect", "mock", "stub",
            "spy", "coverage", "e2e", "integration test", "unit test", "fixture", "snapshot",
        ],
        prompt: "## Testing guidelines\n\
            - Cover new behaviour and regressions with tests in the existing framework\n\
            - Test behaviour rather than implementation details\n\
            - Keep tests independent and mock external services\n\
            - Run the existing suite after changes",
    },
];

/// Modules whose keywords occur in `text`, in declaration order.
pub fn classify(text: &str) -> Vec<ModuleId> {
    let lower = text.to_lowercase();
    let matched: Vec<ModuleId> = MODULES
        .iter()
        .filter(|m| m.keywords.iter().any(|k| lower.contains(k)))
        .map(|m| m.id)
        .collect();

    if matched.is_empty() {
        return vec![DEFAULT_MODULE];
    }
    matched
}
