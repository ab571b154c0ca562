//! Agent definition file.
//!
//! The worker agent is described by a markdown file with YAML frontmatter.
//! The frontmatter selects the model and tools; the body is appended to the
//! worker's system prompt.
//!
//! ```text
//! ---
//! name: rad-worker
//! model: claude-sonnet-4
//! tools: read, bash, edit, write
//! ---
//! You are a worker executing one task of a Radicle plan...
//! ```

use crate::error::{RadorchError, Result};
use serde::Deserialize;
use std::path::Path;

/// A loaded worker agent definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfig {
    pub name: String,
    pub model: Option<String>,
    /// Tool allowlist; empty means the worker's default tool set.
    pub tools: Vec<String>,
    pub system_prompt: String,
}

/// `tools` may be a comma-separated string or a YAML list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolList {
    Csv(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tools: Option<ToolList>,
}

impl AgentConfig {
    /// Load an agent definition file.
    ///
    /// A missing file or a definition without a `name` is a user error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RadorchError::UserError(format!(
                "failed to read agent definition '{}': {}\n\n\
                 Create the file or point `agent_file` in .radorch.yaml (or --agent) at one.",
                path.display(),
                e
            ))
        })?;

        Self::parse(&content).map_err(|e| match e {
            RadorchError::UserError(msg) => {
                RadorchError::UserError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse an agent definition from its content.
    pub fn parse(content: &str) -> Result<Self> {
        let normalized = content.replace("\r\n", "\n");
        let (yaml, body) = split_frontmatter(&normalized).ok_or_else(|| {
            RadorchError::UserError(
                "agent definition must start with a '---' frontmatter block".to_string(),
            )
        })?;

        let frontmatter: Frontmatter = serde_yaml::from_str(yaml).map_err(|e| {
            RadorchError::UserError(format!("failed to parse agent frontmatter: {}", e))
        })?;

        let name = frontmatter
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                RadorchError::UserError("agent definition has no `name`".to_string())
            })?;

        let tools = match frontmatter.tools {
            Some(ToolList::Csv(csv)) => csv.split(',').map(str::to_string).collect(),
            Some(ToolList::List(list)) => list,
            None => Vec::new(),
        }
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

        Ok(Self {
            name,
            model: frontmatter
                .model
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            tools,
            system_prompt: body.to_string(),
        })
    }

    /// Arguments selecting model and tools, in worker CLI form.
    pub fn selection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if !self.tools.is_empty() {
            args.push("--tools".to_string());
            args.push(self.tools.join(","));
        }
        args
    }
}

/// Split `---\n<yaml>\n---\n<body>` into its parts.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---\n")?;
    // Empty frontmatter: the closing delimiter follows immediately.
    let (yaml, after) = if let Some(after) = rest.strip_prefix("---") {
        ("", after)
    } else {
        let close = rest.find("\n---")?;
        (&rest[..close], &rest[close + 4..])
    };
    let body = after.strip_prefix('\n').unwrap_or(after);
    Some((yaml, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_definition() {
        let content = "---\nname: rad-worker\nmodel: sonnet\ntools: read, bash , edit\n---\nYou are a worker.\nBe brief.\n";
        let agent = AgentConfig::parse(content).unwrap();

        assert_eq!(agent.name, "rad-worker");
        assert_eq!(agent.model.as_deref(), Some("sonnet"));
        assert_eq!(agent.tools, ["read", "bash", "edit"]);
        assert_eq!(agent.system_prompt, "You are a worker.\nBe brief.\n");
        assert_eq!(
            agent.selection_args(),
            ["--model", "sonnet", "--tools", "read,bash,edit"]
        );
    }

    #[test]
    fn test_tools_as_yaml_list() {
        let content = "---\nname: w\ntools:\n  - read\n  - write\n---\n";
        let agent = AgentConfig::parse(content).unwrap();
        assert_eq!(agent.tools, ["read", "write"]);
        assert!(agent.system_prompt.is_empty());
    }

    #[test]
    fn test_minimal_definition_has_no_selection_args() {
        let agent = AgentConfig::parse("---\nname: w\n---\nbody").unwrap();
        assert!(agent.model.is_none());
        assert!(agent.tools.is_empty());
        assert!(agent.selection_args().is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let agent = AgentConfig::parse("---\r\nname: w\r\n---\r\nline one\r\n").unwrap();
        assert_eq!(agent.name, "w");
        assert_eq!(agent.system_prompt, "line one\n");
    }

    #[test]
    fn test_missing_name_is_user_error() {
        let err = AgentConfig::parse("---\nmodel: x\n---\nbody").unwrap_err();
        assert!(matches!(err, RadorchError::UserError(_)));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_missing_frontmatter_is_user_error() {
        assert!(AgentConfig::parse("just a prompt").is_err());
        assert!(AgentConfig::parse("---\nname: w\nno closing").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AgentConfig::load(dir.path().join("nope.md")).unwrap_err();
        assert!(err.to_string().contains("agent definition"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rad-worker.md");
        std::fs::write(&path, "---\nname: rad-worker\n---\nprompt\n").unwrap();
        assert_eq!(AgentConfig::load(&path).unwrap().name, "rad-worker");
    }
}
