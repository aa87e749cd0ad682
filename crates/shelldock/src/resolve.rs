//! Command execution adapter
//!
//! Turns a stored entry into the exact text that will be handed to a shell.
//! Launching that text is left to the caller (see [`crate::launch`]).

use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::entry::{Entry, EntryFields};
use crate::error::{Result, ShellDockError};
use crate::entry::ArgumentDef;
use crate::template::{RenderError, Template};

/// Argument values supplied by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse repeated `KEY=VALUE` arguments
    pub fn add_pairs<S: AsRef<str>>(&mut self, pairs: &[S]) -> Result<()> {
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ShellDockError::InvalidInput(format!("expected KEY=VALUE, got '{}'", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ShellDockError::InvalidInput(format!(
                    "missing key in '{}'",
                    pair
                )));
            }
            self.set(key, value);
        }
        Ok(())
    }

    /// Parse the comma separated form `k1=v1,k2=v2`
    pub fn add_list(&mut self, list: &str) -> Result<()> {
        let pairs: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        self.add_pairs(&pairs)
    }
}

/// Fully substituted command ready for a shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub id: String,
    /// Platform whose variant was used, if any
    pub platform: Option<String>,
    pub command: String,
}

fn bound<'a>(fields: &'a EntryFields, bindings: &'a Bindings, name: &str) -> Option<Cow<'a, str>> {
    if let Some(value) = bindings.get(name) {
        return Some(Cow::Borrowed(value));
    }
    match fields.argument(name) {
        Some(arg) => match &arg.default {
            Some(default) => Some(Cow::Borrowed(default.as_str())),
            None if !arg.required => Some(Cow::Borrowed("")),
            None => None,
        },
        None => None,
    }
}

/// Resolve the fields of an entry for a platform
pub fn resolve_fields(
    id: &str,
    fields: &EntryFields,
    platform: &str,
    bindings: &Bindings,
) -> Result<Resolved> {
    let variant = fields.platforms.contains_key(platform);
    let template = Template::parse(fields.command_for(platform));

    let command = template
        .render(|name| bound(fields, bindings, name))
        .map_err(|err| match err {
            RenderError::Missing(name) => ShellDockError::PlaceholderMissing {
                entry: id.to_string(),
                name,
            },
            RenderError::Unquotable(name) => ShellDockError::InvalidInput(format!(
                "placeholder '{}' in entry '{}' cannot be quoted safely where it appears; use {{{{{}:raw}}}}",
                name, id, name
            )),
        })?;

    Ok(Resolved {
        id: id.to_string(),
        platform: variant.then(|| platform.to_string()),
        command,
    })
}

/// Resolve an entry for a platform
pub fn resolve(entry: &Entry, platform: &str, bindings: &Bindings) -> Result<Resolved> {
    resolve_fields(&entry.id, &entry.fields, platform, bindings)
}

/// Render what would run, keeping unbound placeholders visible
pub fn preview(fields: &EntryFields, platform: &str, bindings: &Bindings) -> String {
    Template::parse(fields.command_for(platform)).preview(|name| bound(fields, bindings, name))
}

/// Placeholders that still need a value
pub fn missing(fields: &EntryFields, platform: &str, bindings: &Bindings) -> Vec<String> {
    Template::parse(fields.command_for(platform))
        .placeholders()
        .into_iter()
        .filter(|name| bound(fields, bindings, name).is_none())
        .map(str::to_string)
        .collect()
}

/// Arguments to ask the user for before resolving.
///
/// An argument is asked for when it has no supplied value and either declares
/// a prompt or has no default to fall back on. Placeholders without a
/// declaration are asked for by name.
pub fn to_prompt(fields: &EntryFields, platform: &str, bindings: &Bindings) -> Vec<ArgumentDef> {
    Template::parse(fields.command_for(platform))
        .placeholders()
        .into_iter()
        .filter(|name| bindings.get(name).is_none())
        .filter_map(|name| match fields.argument(name) {
            Some(arg) if arg.prompt.is_some() => Some(arg.clone()),
            Some(_) if bound(fields, bindings, name).is_some() => None,
            Some(arg) => Some(arg.clone()),
            None => Some(ArgumentDef::new(name)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deploy() -> Entry {
        Entry::new("deploy", "kubectl apply -f {{file}}")
    }

    #[test]
    fn test_resolve_binds_argument() -> Result<()> {
        let mut args = Bindings::new();
        args.set("file", "a.yaml");
        let resolved = resolve(&deploy(), "ubuntu", &args)?;
        assert_eq!(resolved.command, "kubectl apply -f a.yaml");
        assert_eq!(resolved.platform, None);
        Ok(())
    }

    #[test]
    fn test_resolve_missing_placeholder() {
        let err = resolve(&deploy(), "ubuntu", &Bindings::new()).unwrap_err();
        match err {
            ShellDockError::PlaceholderMissing { entry, name } => {
                assert_eq!(entry, "deploy");
                assert_eq!(name, "file");
            }
            other => panic!("expected PlaceholderMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_and_optional_arguments() -> Result<()> {
        let entry = Entry::new("logs", "kubectl logs -n {{ns}} {{pod}} {{extra:raw}}")
            .with_arg(ArgumentDef::new("ns").with_default("default"))
            .with_arg(ArgumentDef::new("extra").optional());

        let mut args = Bindings::new();
        args.set("pod", "web-1");
        let resolved = resolve(&entry, "ubuntu", &args)?;
        assert_eq!(resolved.command, "kubectl logs -n default web-1 ");

        args.set("ns", "prod");
        let resolved = resolve(&entry, "ubuntu", &args)?;
        assert_eq!(resolved.command, "kubectl logs -n prod web-1 ");
        Ok(())
    }

    #[test]
    fn test_injection_is_quoted() -> Result<()> {
        let entry = Entry::new("greet", "echo hello {{name}}");
        let mut args = Bindings::new();
        args.set("name", "x; rm -rf ~");
        let resolved = resolve(&entry, "ubuntu", &args)?;
        assert_eq!(resolved.command, "echo hello 'x; rm -rf ~'");
        Ok(())
    }

    #[test]
    fn test_quoted_placeholders_cannot_break_out() -> Result<()> {
        let mut args = Bindings::new();
        args.set("name", "x\"; touch /tmp/pwned; echo \"");
        let double = resolve(&Entry::new("greet", "echo \"hello {{name}}\""), "ubuntu", &args)?;
        assert_eq!(
            shell_words::split(&double.command).unwrap(),
            vec!["echo", "hello x\"; touch /tmp/pwned; echo \""]
        );

        args.set("name", ";touch /tmp/pwned;'");
        let single = resolve(&Entry::new("greet", "echo '{{name}}'"), "ubuntu", &args)?;
        assert_eq!(
            shell_words::split(&single.command).unwrap(),
            vec!["echo", ";touch /tmp/pwned;'"]
        );
        Ok(())
    }

    #[test]
    fn test_raw_placeholder_is_opt_in() -> Result<()> {
        let entry = Entry::new("find", "find {{dir}} -name {{pattern}} {{filter:raw}}");
        let mut args = Bindings::new();
        args.set("dir", "my docs");
        args.set("pattern", "*.md");
        args.set("filter", "| wc -l");
        let resolved = resolve(&entry, "ubuntu", &args)?;
        assert_eq!(resolved.command, "find 'my docs' -name '*.md' | wc -l");
        Ok(())
    }

    #[test]
    fn test_unquotable_placeholder_is_invalid_input() {
        let entry = Entry::new("sub", "echo `cat {{file}}`");
        let mut args = Bindings::new();
        args.set("file", "a");
        assert!(matches!(
            resolve(&entry, "ubuntu", &args),
            Err(ShellDockError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_platform_variant() -> Result<()> {
        let entry = Entry::new("install", "apt-get install -y {{pkg}}")
            .with_platform("darwin", "brew install {{pkg}}");
        let mut args = Bindings::new();
        args.set("pkg", "jq");

        let mac = resolve(&entry, "darwin", &args)?;
        assert_eq!(mac.command, "brew install jq");
        assert_eq!(mac.platform.as_deref(), Some("darwin"));

        let linux = resolve(&entry, "ubuntu", &args)?;
        assert_eq!(linux.command, "apt-get install -y jq");
        Ok(())
    }

    #[test]
    fn test_preview_and_missing() {
        let entry = Entry::new("scp", "scp {{src}} {{host}}:{{dst}}")
            .with_arg(ArgumentDef::new("host").with_default("backup"));
        let mut args = Bindings::new();
        args.set("src", "db.sql");

        assert_eq!(
            preview(&entry.fields, "ubuntu", &args),
            "scp db.sql backup:{{dst}}"
        );
        assert_eq!(missing(&entry.fields, "ubuntu", &args), vec!["dst"]);
    }

    #[test]
    fn test_to_prompt() {
        let entry = Entry::new("greet", "echo {{greeting}} {{name}} {{suffix}} {{extra}}")
            .with_arg(ArgumentDef::new("greeting").with_default("hello"))
            .with_arg(ArgumentDef::new("name").with_prompt("Who?"))
            .with_arg(ArgumentDef::new("suffix").optional());

        let names = |args: &Bindings| -> Vec<String> {
            to_prompt(&entry.fields, "ubuntu", args)
                .into_iter()
                .map(|a| a.name)
                .collect()
        };
        assert_eq!(names(&Bindings::new()), vec!["name", "extra"]);

        let mut args = Bindings::new();
        args.set("name", "ann");
        args.set("extra", "!");
        assert!(names(&args).is_empty());
    }

    #[test]
    fn test_bindings_parsing() -> Result<()> {
        let mut args = Bindings::new();
        args.add_pairs(&["a=1", "b = two=2"])?;
        args.add_list("c=3, d=4,,")?;
        assert_eq!(args.get("a"), Some("1"));
        assert_eq!(args.get("b"), Some(" two=2"));
        assert_eq!(args.get("c"), Some("3"));
        assert_eq!(args.get("d"), Some("4"));

        assert!(args.add_pairs(&["novalue"]).is_err());
        assert!(args.add_pairs(&["=x"]).is_err());
        Ok(())
    }
}
