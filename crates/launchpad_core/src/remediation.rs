//! Remediation hints for failed launches.
//!
//! Rules are tried in order against the failure message and the error lines
//! captured from the failing command. The first match wins.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Kind of problem a hint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationCategory {
    MissingRuntime,
    DatabaseAuth,
    PortInUse,
    MissingEnv,
    VersionMismatch,
    BuildTool,
}

/// A recipe shown to the user after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    pub category: RemediationCategory,
    pub title: String,
    pub steps: Vec<String>,
}

struct Rule {
    category: RemediationCategory,
    pattern: &'static str,
    title: &'static str,
    steps: &'static [&'static str],
}

const RULES: &[Rule] = &[
    Rule {
        category: RemediationCategory::MissingRuntime,
        pattern: r"is not available|not recognized as an internal or external command|command not found|no such file or directory.*(node|java|mvn|git|mysql)|ENOENT",
        title: "A required program could not be found",
        steps: &[
            "Install the missing tool named above.",
            "Restart Launchpad so the updated PATH is picked up.",
        ],
    },
    Rule {
        category: RemediationCategory::DatabaseAuth,
        pattern: r"access denied for user|ER_ACCESS_DENIED_ERROR|authentication plugin|ER_NOT_SUPPORTED_AUTH_MODE",
        title: "The database rejected the credentials",
        steps: &[
            "Check DB_USER and DB_PASSWORD in the root .env or the launch settings.",
            "Make sure the MySQL user exists and may connect from 127.0.0.1.",
        ],
    },
    Rule {
        category: RemediationCategory::PortInUse,
        pattern: r"EADDRINUSE|address already in use|port \d+ is (already )?in use|bind.*failed",
        title: "A port is already in use",
        steps: &[
            "Stop the other program using the port, or a previous launch that is still running.",
            "Alternatively change SERVER_PORT or the dev server port.",
        ],
    },
    Rule {
        category: RemediationCategory::MissingEnv,
        pattern: r"environment variable .* (is )?(not set|missing|required)|missing required (env|environment)|Could not resolve placeholder|is not defined in \.env",
        title: "A configuration value is missing",
        steps: &[
            "Add the missing key to the root .env file.",
            "Start the launch again so the env files are rewritten.",
        ],
    },
    Rule {
        category: RemediationCategory::VersionMismatch,
        pattern: r"unsupported engine|EBADENGINE|UnsupportedClassVersionError|invalid target release|requires node|release version \d+ not supported",
        title: "A tool version is not compatible with the project",
        steps: &[
            "Install the Node.js or Java version the project asks for.",
            "Check the engines field in package.json or the Java version in pom.xml.",
        ],
    },
    Rule {
        category: RemediationCategory::BuildTool,
        pattern: r"BUILD FAILURE|Failed to execute goal|ERESOLVE|npm ERR!|error Command failed|Compilation failure",
        title: "The build tool reported an error",
        steps: &[
            "Read the error lines above for the failing module.",
            "Delete node_modules or the target directory and start again.",
        ],
    },
];

/// Find the first rule matching the failure text.
pub fn classify(message: &str, error_lines: &[String]) -> Option<Remediation> {
    let mut text = message.to_string();
    for line in error_lines {
        text.push('\n');
        text.push_str(line);
    }

    RULES.iter().find_map(|rule| {
        let re = RegexBuilder::new(rule.pattern)
            .case_insensitive(true)
            .build()
            .ok()?;
        re.is_match(&text).then(|| Remediation {
            category: rule.category,
            title: rule.title.to_string(),
            steps: rule.steps.iter().map(|s| s.to_string()).collect(),
        })
    })
}

impl Remediation {
    /// Log lines for this recipe.
    pub fn hint_lines(&self) -> Vec<String> {
        std::iter::once(format!("[hint] {}", self.title))
            .chain(self.steps.iter().map(|step| format!("[hint] - {}", step)))
            .collect()
    }
}
