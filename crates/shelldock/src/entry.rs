//! Stored commands
//!
//! An [`Entry`] is one reusable shell command plus its metadata. The editable
//! part lives in [`EntryFields`] so revisions can snapshot exactly what a user
//! changed, without the bookkeeping (timestamps, usage counter).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{Result, ShellDockError};
use crate::template::{is_placeholder_name, Template};

/// Declared argument for a `{{name}}` placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default = "default_required")]
    pub required: bool,

    /// Question asked on the terminal when no value is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

fn default_required() -> bool {
    true
}

impl ArgumentDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: None,
            required: true,
            prompt: None,
        }
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    /// Question shown when asking for a value, with the default or
    /// "(optional)" hint
    pub fn question(&self) -> String {
        let base = match &self.prompt {
            Some(prompt) => prompt.trim().to_string(),
            None => format!("Enter {}", self.name),
        };
        let question = match (&self.default, self.required) {
            (Some(default), _) => format!("{} [default: {}]", base, default),
            (None, false) => format!("{} (optional)", base),
            (None, true) => base,
        };
        if question.ends_with(':') || question.ends_with('?') {
            format!("{} ", question)
        } else {
            format!("{}: ", question)
        }
    }

    /// Parse the CLI form `name`, `name=default` or `name?` (optional)
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, default) = match spec.split_once('=') {
            Some((name, default)) => (name.trim(), Some(default.to_string())),
            None => (spec.trim(), None),
        };
        let (name, required) = match name.strip_suffix('?') {
            Some(name) => (name, false),
            None => (name, true),
        };
        if !is_placeholder_name(name) {
            return Err(ShellDockError::InvalidInput(format!(
                "invalid argument name '{}'",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            default,
            required,
            prompt: None,
        })
    }
}

/// User-editable fields of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntryFields {
    /// Raw shell command, may contain placeholders
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Platform name -> command used instead of `command` on that platform
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platforms: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgumentDef>,
}

impl EntryFields {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Default::default()
        }
    }

    /// Command text for a platform, falling back to the generic command
    pub fn command_for(&self, platform: &str) -> &str {
        self.platforms
            .get(platform)
            .map(String::as_str)
            .unwrap_or(&self.command)
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDef> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Attach a prompt to an argument, declaring it if needed
    pub fn set_prompt(&mut self, name: &str, prompt: &str) {
        match self.args.iter_mut().find(|a| a.name == name) {
            Some(arg) => arg.prompt = Some(prompt.to_string()),
            None => self.args.push(ArgumentDef::new(name).with_prompt(prompt)),
        }
    }

    /// Lowercase, trim and drop empty tags
    pub fn normalize(&mut self) {
        self.tags = std::mem::take(&mut self.tags)
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.platforms = std::mem::take(&mut self.platforms)
            .into_iter()
            .map(|(p, c)| (p.trim().to_lowercase(), c))
            .collect();
        if let Some(desc) = &self.description {
            if desc.trim().is_empty() {
                self.description = None;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(ShellDockError::InvalidInput(
                "command text cannot be empty".to_string(),
            ));
        }
        for (platform, command) in &self.platforms {
            if platform.is_empty() {
                return Err(ShellDockError::InvalidInput(
                    "platform name cannot be empty".to_string(),
                ));
            }
            if command.trim().is_empty() {
                return Err(ShellDockError::InvalidInput(format!(
                    "command for platform '{}' cannot be empty",
                    platform
                )));
            }
        }
        let templates = std::iter::once(("", &self.command)).chain(
            self.platforms
                .iter()
                .map(|(platform, command)| (platform.as_str(), command)),
        );
        for (platform, command) in templates {
            if let Some(name) = Template::parse(command).unquotable() {
                let variant = if platform.is_empty() {
                    String::new()
                } else {
                    format!(" (platform '{}')", platform)
                };
                return Err(ShellDockError::InvalidInput(format!(
                    "placeholder '{}'{} cannot be quoted safely where it appears; use {{{{{}:raw}}}} to insert it verbatim",
                    name, variant, name
                )));
            }
        }
        let mut seen = HashSet::new();
        for arg in &self.args {
            if !is_placeholder_name(&arg.name) {
                return Err(ShellDockError::InvalidInput(format!(
                    "invalid argument name '{}'",
                    arg.name
                )));
            }
            if !seen.insert(arg.name.as_str()) {
                return Err(ShellDockError::InvalidInput(format!(
                    "argument '{}' declared twice",
                    arg.name
                )));
            }
        }
        Ok(())
    }
}

/// A stored command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,

    #[serde(flatten)]
    pub fields: EntryFields,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,

    #[serde(default)]
    pub usage_count: u64,

    /// Set when the entry was removed; revisions outlive it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(id: &str, command: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            fields: EntryFields::new(command),
            created_at: now,
            modified_at: now,
            usage_count: 0,
            deleted_at: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.fields.description = Some(description.to_string());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_platform(mut self, platform: &str, command: &str) -> Self {
        self.fields
            .platforms
            .insert(platform.to_string(), command.to_string());
        self
    }

    pub fn with_arg(mut self, arg: ArgumentDef) -> Self {
        self.fields.args.push(arg);
        self
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn command(&self) -> &str {
        &self.fields.command
    }

    pub fn validate(&self) -> Result<()> {
        validate_id(&self.id)?;
        self.fields.validate()
    }
}

/// Identifiers are non-empty and free of whitespace, `@` and `/`
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ShellDockError::InvalidInput(
            "identifier cannot be empty".to_string(),
        ));
    }
    if let Some(c) = id
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == '@' || *c == '/')
    {
        return Err(ShellDockError::InvalidInput(format!(
            "identifier '{}' contains invalid character {:?}",
            id, c
        )));
    }
    Ok(())
}
