//! Fact-extraction instruction selection.
//!
//! Priority: inline custom text, then a prompt file, then a named built-in,
//! then the `default` built-in. The `{current_date}` token is substituted each
//! time the prompt is resolved, not when it is loaded.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};

use crate::config::PromptConfig;
use crate::error::{MemoryError, Result};

/// Placeholder replaced with today's date (`YYYY-MM-DD`).
pub const DATE_PLACEHOLDER: &str = "{current_date}";

const DEFAULT_PROMPT: &str = r#"You organise knowledge into long-term memory. Read the conversation below and pull out every distinct piece of information worth remembering later: personal preferences and details, plans, professional background, and also project knowledge such as libraries, architecture decisions, configuration, conventions and business rules.

Examples:

Input: Hi.
Output: {"facts": []}

Input: Hi, my name is Ada and I work as a data engineer.
Output: {"facts": ["Name is Ada", "Works as a data engineer"]}

Input: The service stores embeddings in SQLite and exposes them over MCP.
Output: {"facts": ["Service stores embeddings in SQLite", "Service exposes memories over MCP"]}

Input: Our convention is that every public function has a doc comment.
Output: {"facts": ["Convention: every public function has a doc comment"]}

Rules:
- Today's date is {current_date}.
- Never repeat the examples above.
- Each fact must be a short, self-contained statement that makes sense without the conversation.
- Record facts in the language the user wrote in.
- If nothing is worth keeping, return an empty list.
- Answer with JSON only, shaped as {"facts": ["..."]}.
"#;

const PERSONAL_PROMPT: &str = r#"You keep track of personal information about the user. Read the conversation below and pull out the user's preferences, personal details, relationships, plans, health and wellness habits, and professional details. Ignore general knowledge and project documentation.

Examples:

Input: Hi.
Output: {"facts": []}

Input: Trees have branches.
Output: {"facts": []}

Input: I'm vegetarian and I'm flying to Lisbon next week.
Output: {"facts": ["Is vegetarian", "Flying to Lisbon next week"]}

Rules:
- Today's date is {current_date}.
- Never repeat the examples above.
- Use the user's messages only.
- Record facts in the language the user wrote in.
- If nothing is worth keeping, return an empty list.
- Answer with JSON only, shaped as {"facts": ["..."]}.
"#;

/// Named built-in instruction sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptType {
    /// Personal preferences plus project and technical facts.
    #[default]
    Default,
    /// Personal preferences only.
    Personal,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Personal => "personal",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            Self::Default => DEFAULT_PROMPT,
            Self::Personal => PERSONAL_PROMPT,
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "personal" => Ok(Self::Personal),
            other => Err(MemoryError::Config(format!(
                "unknown prompt type '{other}' (expected 'default' or 'personal')"
            ))),
        }
    }
}

/// Where the active template came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Inline,
    File(String),
    Builtin(PromptType),
}

/// The resolved extraction template, chosen once at startup.
#[derive(Debug, Clone)]
pub struct PromptSelector {
    source: PromptSource,
    template: String,
}

impl PromptSelector {
    /// Pick the template from configuration.
    ///
    /// A configured prompt file that is missing or empty is a configuration
    /// error; it never silently falls back to a built-in.
    pub fn from_config(config: &PromptConfig) -> Result<Self> {
        if let Some(custom) = config.custom.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(Self {
                source: PromptSource::Inline,
                template: custom.to_string(),
            });
        }

        if let Some(path) = config.file.as_deref().filter(|s| !s.trim().is_empty()) {
            let resolved = crate::config::expand_tilde(path);
            let template = std::fs::read_to_string(&resolved).map_err(|e| {
                MemoryError::Config(format!(
                    "cannot read prompt file {}: {e}",
                    resolved.display()
                ))
            })?;
            if template.trim().is_empty() {
                return Err(MemoryError::Config(format!(
                    "prompt file {} is empty",
                    resolved.display()
                )));
            }
            return Ok(Self {
                source: PromptSource::File(path.to_string()),
                template,
            });
        }

        let prompt_type: PromptType = config.prompt_type.as_deref().unwrap_or("default").parse()?;
        Ok(Self::builtin(prompt_type))
    }

    pub fn builtin(prompt_type: PromptType) -> Self {
        Self {
            source: PromptSource::Builtin(prompt_type),
            template: prompt_type.template().to_string(),
        }
    }

    pub fn source(&self) -> &PromptSource {
        &self.source
    }

    /// Instruction text with today's local date substituted.
    pub fn resolve(&self) -> String {
        self.resolve_on(Local::now().date_naive())
    }

    pub fn resolve_on(&self, date: NaiveDate) -> String {
        self.template
            .replace(DATE_PLACEHOLDER, &date.format("%Y-%m-%d").to_string())
    }
}

impl Default for PromptSelector {
    fn default() -> Self {
        Self::builtin(PromptType::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(custom: Option<&str>, file: Option<&str>, ty: Option<&str>) -> PromptConfig {
        PromptConfig {
            custom: custom.map(String::from),
            file: file.map(String::from),
            prompt_type: ty.map(String::from),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn inline_wins_over_everything() {
        let sel = PromptSelector::from_config(&config(
            Some("extract on {current_date}"),
            Some("/does/not/exist"),
            Some("personal"),
        ))
        .unwrap();
        assert_eq!(sel.source(), &PromptSource::Inline);
        assert_eq!(sel.resolve_on(date()), "extract on 2024-03-09");
    }

    #[test]
    fn blank_inline_is_ignored() {
        let sel = PromptSelector::from_config(&config(Some("   "), None, Some("personal"))).unwrap();
        assert_eq!(sel.source(), &PromptSource::Builtin(PromptType::Personal));
    }

    #[test]
    fn file_wins_over_type() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file {{current_date}}").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let sel = PromptSelector::from_config(&config(None, Some(&path), Some("personal"))).unwrap();
        assert_eq!(sel.source(), &PromptSource::File(path));
        assert_eq!(sel.resolve_on(date()), "from file 2024-03-09");
    }

    #[test]
    fn missing_file_fails_fast() {
        let err = PromptSelector::from_config(&config(None, Some("/no/such/prompt.txt"), None))
            .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(PromptSelector::from_config(&config(None, Some(&path), None)).is_err());
    }

    #[test]
    fn falls_back_to_default_builtin() {
        let sel = PromptSelector::from_config(&config(None, None, None)).unwrap();
        assert_eq!(sel.source(), &PromptSource::Builtin(PromptType::Default));
        let text = sel.resolve_on(date());
        assert!(text.contains("Today's date is 2024-03-09."));
        assert!(!text.contains(DATE_PLACEHOLDER));
    }

    #[test]
    fn unknown_type_is_config_error() {
        assert!(PromptSelector::from_config(&config(None, None, Some("legal"))).is_err());
    }

    #[test]
    fn builtins_differ_in_scope() {
        let default = PromptSelector::builtin(PromptType::Default).resolve_on(date());
        let personal = PromptSelector::builtin(PromptType::Personal).resolve_on(date());
        assert!(default.contains("project knowledge"));
        assert!(personal.contains("Ignore general knowledge"));
    }
}
