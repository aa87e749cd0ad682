//! shelldock - A fast, cross-platform shell command repository manager
//!
//! Save the commands you keep retyping, find them again, and run them with
//! arguments bound safely.
//!
//! Commands:
//! - add <ID> <COMMAND>: Save a command
//! - get <ID[@REV]>: Show an entry (alias: show)
//! - list: List entries
//! - search <QUERY>: Find entries by tag, name or text
//! - edit <ID>: Change an entry
//! - remove <ID>: Remove an entry (history is kept)
//! - run <ID[@REV]>: Run a command
//! - echo <ID[@REV]>: Print a command without running it
//! - history <ID>: Show revisions
//! - rollback <ID> <REV>: Restore an earlier revision
//! - compact: Rewrite the entry log
//! - config: Show or change settings

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use shelldock::resolve;
use shelldock::{
    ArgumentDef, Bindings, CancelToken, Entry, Launcher, Repository, RepositoryOptions, Revision,
    ShellDockError,
};
use shelldock_core::format::{relative_time, timestamp, truncate};
use shelldock_core::{Config, Paths};

#[derive(Parser)]
#[command(name = "shelldock")]
#[command(about = "A fast, cross-platform shell command repository manager")]
#[command(version)]
#[command(after_help = r#"PLACEHOLDERS:
    {{name}}        Replaced by the value of --arg name=VALUE, shell-quoted
    {{name:raw}}    Replaced verbatim (the value may contain shell syntax)

REVISIONS:
    Every add, edit, remove and rollback is recorded. Refer to an older
    version of an entry with ID@REVISION, e.g. `shelldock echo deploy@3`.

EXIT CODES:
    0 success, 1 not found, 2 duplicate, 3 invalid input or usage,
    4 corrupt data, 5 I/O failure, 130 cancelled; `run` passes on the
    command's own exit code

ENVIRONMENT:
    SHELLDOCK_HOME      Data and config directory (default: platform dirs)
    SHELLDOCK_PLATFORM  Platform used to pick command variants
    RUST_LOG            Log filter (e.g. shelldock=debug)

EXAMPLES:
    shelldock add deploy 'kubectl apply -f {{file}}' -t k8s
    shelldock run deploy --arg file=app.yaml
    shelldock search docker
    shelldock add pkgs 'apt list --upgradable' --platform-command darwin='brew outdated'
    shelldock history deploy
    shelldock rollback deploy 1
"#)]
struct Cli {
    /// Data directory (overrides SHELLDOCK_HOME)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    /// Platform used to pick command variants
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a new command
    Add {
        /// Entry identifier
        id: String,

        /// Command text, may contain {{placeholders}}
        command: String,

        /// Short description
        #[arg(short, long)]
        description: Option<String>,

        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Platform variant (PLATFORM=COMMAND, repeatable)
        #[arg(long = "platform-command", value_name = "PLATFORM=COMMAND")]
        platforms: Vec<String>,

        /// Declare an argument: NAME, NAME=DEFAULT or NAME? (optional)
        #[arg(short, long = "param", value_name = "SPEC")]
        params: Vec<String>,

        /// Question asked for an argument when running (NAME=TEXT, repeatable)
        #[arg(long = "prompt", value_name = "NAME=TEXT")]
        prompts: Vec<String>,
    },

    /// Show an entry
    #[command(alias = "show")]
    Get {
        /// Entry identifier, optionally ID@REVISION
        reference: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List entries
    List {
        /// Only entries with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search entries by tag, name, command text or description
    Search {
        /// Search query
        query: Vec<String>,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change an entry
    Edit {
        /// Entry identifier
        id: String,

        /// New command text
        #[arg(short, long)]
        command: Option<String>,

        /// New description (empty string clears it)
        #[arg(short, long)]
        description: Option<String>,

        /// Add a tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Remove a tag (repeatable)
        #[arg(long = "untag")]
        untags: Vec<String>,

        /// Set a platform variant (PLATFORM=COMMAND, repeatable)
        #[arg(long = "platform-command", value_name = "PLATFORM=COMMAND")]
        platforms: Vec<String>,

        /// Drop a platform variant (repeatable)
        #[arg(long = "no-platform-command", value_name = "PLATFORM")]
        no_platforms: Vec<String>,

        /// Declare or replace an argument (repeatable)
        #[arg(short, long = "param", value_name = "SPEC")]
        params: Vec<String>,

        /// Drop an argument declaration (repeatable)
        #[arg(long = "no-param", value_name = "NAME")]
        no_params: Vec<String>,

        /// Question asked for an argument when running (NAME=TEXT, repeatable)
        #[arg(long = "prompt", value_name = "NAME=TEXT")]
        prompts: Vec<String>,
    },

    /// Remove an entry (its history is kept)
    #[command(alias = "rm")]
    Remove {
        /// Entry identifier
        id: String,
    },

    /// Run a command
    Run {
        /// Entry identifier, optionally ID@REVISION
        reference: String,

        /// Bind a placeholder (KEY=VALUE, repeatable)
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Bind several placeholders (k1=v1,k2=v2)
        #[arg(long = "args", value_name = "LIST")]
        arg_list: Option<String>,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Print a command with arguments bound, without running it
    Echo {
        /// Entry identifier, optionally ID@REVISION
        reference: String,

        /// Bind a placeholder (KEY=VALUE, repeatable)
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Bind several placeholders (k1=v1,k2=v2)
        #[arg(long = "args", value_name = "LIST")]
        arg_list: Option<String>,
    },

    /// Show the revisions of an entry
    History {
        /// Entry identifier
        id: String,

        /// Keep only the newest N revisions
        #[arg(long, value_name = "N")]
        prune: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restore an entry to an earlier revision
    Rollback {
        /// Entry identifier
        id: String,

        /// Revision number (see `history`)
        revision: u64,
    },

    /// Rewrite the entry log to one record per entry
    Compact,

    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,

    /// Change a setting (platform, shell, confirm, index_rebuild)
    Set { key: String, value: String },
}

/// Exit code for usage errors reported by the argument parser
const USAGE_EXIT: i32 = 3;

/// Exit code for failures that carry no repository error
const UNKNOWN_EXIT: i32 = 5;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(usage_exit_code(&err));
        }
    };

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("\x1b[31merror:\x1b[0m {:#}", err);
            std::process::exit(exit_code(&err));
        }
    }
}

/// Exit code for an error, taken from the repository error in its chain
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<ShellDockError>())
        .map(ShellDockError::exit_code)
        .unwrap_or(UNKNOWN_EXIT)
}

/// `--help` and `--version` succeed; anything else is a usage error
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        USAGE_EXIT
    } else {
        0
    }
}

fn invalid_input(err: anyhow::Error) -> anyhow::Error {
    ShellDockError::InvalidInput(format!("{:#}", err)).into()
}

fn run(cli: Cli) -> Result<i32> {
    let paths = match &cli.home {
        Some(home) => Paths::with_home(home),
        None => Paths::new(),
    };
    let config = Config::load(&paths.config_file()).map_err(invalid_input)?;

    let command = match cli.command {
        Some(Commands::Config { action }) => {
            return cmd_config(&paths, config, action).map(|_| 0);
        }
        Some(command) => command,
        None => Commands::List {
            tag: None,
            json: false,
        },
    };

    let platform = cli
        .platform
        .map(|p| p.trim().to_lowercase())
        .unwrap_or_else(|| config.active_platform());
    let repo = Repository::open(
        &paths.store_dir(),
        RepositoryOptions {
            platform,
            index_rebuild: config.index_rebuild,
            index_cache: true,
        },
    )
    .with_context(|| format!("Failed to open repository: {}", paths.store_dir().display()))?;

    let result = match command {
        Commands::Add {
            id,
            command,
            description,
            tags,
            platforms,
            params,
            prompts,
        } => cmd_add(
            &repo,
            &id,
            &command,
            AddArgs {
                description,
                tags,
                platforms,
                params,
                prompts,
            },
        ),

        Commands::Get { reference, json } => cmd_get(&repo, &reference, json),

        Commands::List { tag, json } => cmd_list(&repo, tag.as_deref(), json),

        Commands::Search { query, limit, json } => cmd_search(&repo, &query.join(" "), limit, json),

        Commands::Edit {
            id,
            command,
            description,
            tags,
            untags,
            platforms,
            no_platforms,
            params,
            no_params,
            prompts,
        } => cmd_edit(
            &repo,
            &id,
            EditArgs {
                command,
                description,
                tags,
                untags,
                platforms,
                no_platforms,
                params,
                no_params,
                prompts,
            },
        ),

        Commands::Remove { id } => cmd_remove(&repo, &id),

        Commands::Run {
            reference,
            args,
            arg_list,
            yes,
        } => {
            let bindings = bindings(&args, arg_list.as_deref())?;
            return cmd_run(&repo, &config, &reference, &bindings, yes);
        }

        Commands::Echo {
            reference,
            args,
            arg_list,
        } => {
            let bindings = bindings(&args, arg_list.as_deref())?;
            cmd_echo(&repo, &reference, &bindings)
        }

        Commands::History { id, prune, json } => cmd_history(&repo, &id, prune, json),

        Commands::Rollback { id, revision } => cmd_rollback(&repo, &id, revision),

        Commands::Compact => cmd_compact(&repo),

        Commands::Config { .. } => Ok(()),
    };
    result.map(|_| 0)
}

/// Split `ID@REVISION` into its parts
fn parse_reference(reference: &str) -> Result<(&str, Option<u64>)> {
    match reference.rsplit_once('@') {
        Some((id, rev)) => {
            let rev = rev.parse::<u64>().map_err(|_| {
                ShellDockError::InvalidInput(format!("invalid revision in '{}'", reference))
            })?;
            Ok((id, Some(rev)))
        }
        None => Ok((reference, None)),
    }
}

fn lookup(repo: &Repository, reference: &str) -> Result<Entry> {
    let (id, revision) = parse_reference(reference)?;
    let entry = match revision {
        Some(rev) => repo.get_at(id, rev)?,
        None => repo.get(id)?,
    };
    Ok(entry)
}

fn bindings(pairs: &[String], list: Option<&str>) -> Result<Bindings> {
    let mut bindings = Bindings::new();
    if let Some(list) = list {
        bindings.add_list(list)?;
    }
    bindings.add_pairs(pairs)?;
    Ok(bindings)
}

/// Split `NAME=VALUE` specs whose value is free text
fn parse_assignments(specs: &[String], form: &str) -> Result<Vec<(String, String)>> {
    specs
        .iter()
        .map(|spec| match spec.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(
                ShellDockError::InvalidInput(format!("expected {}, got '{}'", form, spec)).into(),
            ),
        })
        .collect()
}

fn parse_platforms(specs: &[String]) -> Result<Vec<(String, String)>> {
    Ok(parse_assignments(specs, "PLATFORM=COMMAND")?
        .into_iter()
        .map(|(platform, command)| (platform.to_lowercase(), command))
        .collect())
}

fn parse_prompts(specs: &[String]) -> Result<Vec<(String, String)>> {
    parse_assignments(specs, "NAME=TEXT")
}

struct AddArgs {
    description: Option<String>,
    tags: Vec<String>,
    platforms: Vec<String>,
    params: Vec<String>,
    prompts: Vec<String>,
}

/// Save a new entry
fn cmd_add(repo: &Repository, id: &str, command: &str, args: AddArgs) -> Result<()> {
    let mut entry = Entry::new(id, command).with_tags(args.tags);
    entry.fields.description = args.description;
    for (platform, command) in parse_platforms(&args.platforms)? {
        entry = entry.with_platform(&platform, &command);
    }
    for spec in &args.params {
        entry = entry.with_arg(ArgumentDef::parse(spec)?);
    }
    for (name, prompt) in parse_prompts(&args.prompts)? {
        entry.fields.set_prompt(&name, &prompt);
    }

    let entry = repo.add(entry)?;
    println!("\x1b[32m✓\x1b[0m Added \x1b[1m{}\x1b[0m", entry.id);
    Ok(())
}

/// Show one entry
fn cmd_get(repo: &Repository, reference: &str, json: bool) -> Result<()> {
    let entry = lookup(repo, reference)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("\x1b[1m{}\x1b[0m", reference);
    if let Some(desc) = &entry.fields.description {
        println!("  \x1b[2m{}\x1b[0m", desc);
    }
    println!();
    println!("\x1b[36mCommand:\x1b[0m  {}", entry.command());
    let variant = entry.fields.command_for(repo.platform());
    if variant != entry.command() {
        println!("\x1b[36mOn {}:\x1b[0m {}", repo.platform(), variant);
    }
    for (platform, command) in &entry.fields.platforms {
        if platform != repo.platform() {
            println!("  \x1b[2m{}: {}\x1b[0m", platform, command);
        }
    }
    let preview = repo.preview(&entry, &Bindings::new());
    if preview != variant {
        println!("\x1b[36mPreview:\x1b[0m  {}", preview);
    }
    if !entry.fields.tags.is_empty() {
        let tags: Vec<&str> = entry.fields.tags.iter().map(String::as_str).collect();
        println!("\x1b[36mTags:\x1b[0m     {}", tags.join(", "));
    }
    if !entry.fields.args.is_empty() {
        println!("\x1b[36mArgs:\x1b[0m");
        for arg in &entry.fields.args {
            let hint = match (&arg.default, arg.required) {
                (Some(default), _) => format!("default: {}", default),
                (None, true) => "required".to_string(),
                (None, false) => "optional".to_string(),
            };
            match &arg.prompt {
                Some(prompt) => println!("  {} ({}) \x1b[2m{}\x1b[0m", arg.name, hint, prompt),
                None => println!("  {} ({})", arg.name, hint),
            }
        }
    }
    println!(
        "\x1b[36mUsed:\x1b[0m     {} time{}",
        entry.usage_count,
        if entry.usage_count == 1 { "" } else { "s" }
    );
    println!(
        "\x1b[36mCreated:\x1b[0m  {} ({})",
        timestamp(entry.created_at),
        relative_time(entry.created_at)
    );
    println!(
        "\x1b[36mModified:\x1b[0m {} ({})",
        timestamp(entry.modified_at),
        relative_time(entry.modified_at)
    );
    Ok(())
}

fn print_entry_line(entry: &Entry) {
    let tags = if entry.fields.tags.is_empty() {
        String::new()
    } else {
        let tags: Vec<&str> = entry.fields.tags.iter().map(String::as_str).collect();
        format!(" \x1b[33m[{}]\x1b[0m", tags.join(", "))
    };
    println!("  \x1b[32m{}\x1b[0m{}", entry.id, tags);
    println!("    \x1b[2m{}\x1b[0m", truncate(entry.command(), 72));
}

/// List entries, optionally filtered by tag
fn cmd_list(repo: &Repository, tag: Option<&str>, json: bool) -> Result<()> {
    let tag = tag.map(|t| t.trim().to_lowercase());
    let entries: Vec<Entry> = repo
        .list()
        .into_iter()
        .filter(|e| tag.as_ref().map_or(true, |t| e.fields.tags.contains(t)))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("\x1b[2mNo commands saved.\x1b[0m");
        println!("Add one with: shelldock add <ID> '<COMMAND>'");
        return Ok(());
    }

    println!("\x1b[1mCommands\x1b[0m ({})", entries.len());
    println!();
    for entry in &entries {
        print_entry_line(entry);
    }
    Ok(())
}

/// Ranked search
fn cmd_search(repo: &Repository, query: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let ids = repo.search(query).collect_ids(limit)?;

    let entries: Vec<Entry> = ids.iter().filter_map(|id| repo.get(id).ok()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("\x1b[2mNo matches for '{}'\x1b[0m", query);
        return Ok(());
    }
    for entry in &entries {
        print_entry_line(entry);
    }
    Ok(())
}

struct EditArgs {
    command: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    untags: Vec<String>,
    platforms: Vec<String>,
    no_platforms: Vec<String>,
    params: Vec<String>,
    no_params: Vec<String>,
    prompts: Vec<String>,
}

/// Apply field changes to an entry
fn cmd_edit(repo: &Repository, id: &str, args: EditArgs) -> Result<()> {
    let platforms = parse_platforms(&args.platforms)?;
    let params = args
        .params
        .iter()
        .map(|spec| ArgumentDef::parse(spec))
        .collect::<shelldock::Result<Vec<_>>>()?;
    let prompts = parse_prompts(&args.prompts)?;

    let before = repo.get(id)?;
    let after = repo.edit(id, |fields| {
        if let Some(command) = args.command {
            fields.command = command;
        }
        if let Some(description) = args.description {
            fields.description = Some(description);
        }
        for tag in args.tags {
            fields.tags.insert(tag.to_lowercase());
        }
        for tag in &args.untags {
            fields.tags.remove(&tag.trim().to_lowercase());
        }
        for (platform, command) in platforms {
            fields.platforms.insert(platform, command);
        }
        for platform in &args.no_platforms {
            fields.platforms.remove(&platform.trim().to_lowercase());
        }
        for param in params {
            fields.args.retain(|a| a.name != param.name);
            fields.args.push(param);
        }
        fields.args.retain(|a| !args.no_params.contains(&a.name));
        for (name, prompt) in &prompts {
            fields.set_prompt(name, prompt);
        }
    })?;

    if after.modified_at == before.modified_at {
        println!("\x1b[2mNo changes to {}\x1b[0m", id);
    } else {
        println!("\x1b[32m✓\x1b[0m Updated \x1b[1m{}\x1b[0m", id);
    }
    Ok(())
}

fn cmd_remove(repo: &Repository, id: &str) -> Result<()> {
    repo.remove(id)?;
    println!("\x1b[32m✓\x1b[0m Removed \x1b[1m{}\x1b[0m", id);
    println!("\x1b[2mHistory kept; restore with: shelldock history {}\x1b[0m", id);
    Ok(())
}

/// Ask on the terminal; anything but yes declines
fn confirm(command: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Err(ShellDockError::InvalidInput(
            "refusing to prompt without a terminal; pass --yes to run".to_string(),
        )
        .into());
    }

    eprintln!("\x1b[36m$\x1b[0m {}", command);
    eprint!("Run this command? [y/N] ");
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Ask on the terminal for arguments that have no value yet.
///
/// Without a terminal nothing is asked and unbound placeholders are left for
/// the resolver to report.
fn ask_for_arguments(repo: &Repository, entry: &Entry, bindings: &Bindings) -> Result<Bindings> {
    let wanted = resolve::to_prompt(&entry.fields, repo.platform(), bindings);
    let mut bindings = bindings.clone();
    if wanted.is_empty() || !std::io::stdin().is_terminal() {
        return Ok(bindings);
    }

    let stdin = std::io::stdin();
    for arg in wanted {
        eprint!("{}", arg.question());
        std::io::stderr().flush()?;

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Err(ShellDockError::Cancelled.into());
        }
        let answer = answer.trim();
        if !answer.is_empty() {
            bindings.set(&arg.name, answer);
        } else if arg.required && arg.default.is_none() {
            return Err(ShellDockError::PlaceholderMissing {
                entry: entry.id.clone(),
                name: arg.name,
            }
            .into());
        }
    }
    Ok(bindings)
}

/// Resolve, confirm and launch a command; returns its exit code
fn cmd_run(
    repo: &Repository,
    config: &Config,
    reference: &str,
    bindings: &Bindings,
    yes: bool,
) -> Result<i32> {
    let (id, _) = parse_reference(reference)?;
    let entry = lookup(repo, reference)?;
    let bindings = ask_for_arguments(repo, &entry, bindings)?;
    let resolved = resolve::resolve(&entry, repo.platform(), &bindings)?;

    let cancel = CancelToken::new();
    if config.confirm && !yes && !confirm(&resolved.command)? {
        cancel.cancel();
    }

    let launcher = Launcher::new(&config.shell).with_cancel(cancel);
    let status = launcher.launch(&resolved)?;

    if let Err(e) = repo.record_use(id) {
        tracing::warn!(id = %id, error = %e, "could not record usage");
    }

    Ok(status.code().unwrap_or(1))
}

/// Print the resolved command
fn cmd_echo(repo: &Repository, reference: &str, bindings: &Bindings) -> Result<()> {
    let (id, revision) = parse_reference(reference)?;
    let resolved = match revision {
        Some(rev) => repo.resolve_at(id, rev, bindings)?,
        None => repo.resolve(id, bindings)?,
    };
    println!("{}", resolved.command);
    Ok(())
}

fn print_revision(revision: &Revision) {
    println!(
        "  \x1b[33m#{}\x1b[0m  {}  \x1b[36m{}\x1b[0m  \x1b[2m({})\x1b[0m",
        revision.id,
        timestamp(revision.recorded_at),
        revision.action,
        relative_time(revision.recorded_at)
    );
    println!("      {}", truncate(&revision.fields.command, 72));
    if let Some(before) = &revision.before {
        if before.command != revision.fields.command {
            println!("      \x1b[2mwas: {}\x1b[0m", truncate(&before.command, 66));
        }
    }
}

/// List revisions, or prune them
fn cmd_history(repo: &Repository, id: &str, prune: Option<usize>, json: bool) -> Result<()> {
    if let Some(keep) = prune {
        let dropped = repo.prune_history(id, keep)?;
        println!(
            "\x1b[32m✓\x1b[0m Pruned {} revision{} of {}",
            dropped,
            if dropped == 1 { "" } else { "s" },
            id
        );
        return Ok(());
    }

    let revisions = repo.history(id)?;

    if json {
        let revisions: Vec<Revision> = revisions.collect();
        println!("{}", serde_json::to_string_pretty(&revisions)?);
        return Ok(());
    }

    println!("\x1b[1mHistory of {}\x1b[0m", id);
    println!();
    for revision in revisions {
        print_revision(&revision);
    }
    Ok(())
}

fn cmd_rollback(repo: &Repository, id: &str, revision: u64) -> Result<()> {
    let entry = repo.rollback(id, revision)?;
    println!(
        "\x1b[32m✓\x1b[0m Restored \x1b[1m{}\x1b[0m to revision #{}",
        entry.id, revision
    );
    println!("    \x1b[2m{}\x1b[0m", truncate(entry.command(), 72));
    Ok(())
}

fn cmd_compact(repo: &Repository) -> Result<()> {
    let records = repo.compact()?;
    println!("\x1b[32m✓\x1b[0m Compacted entry log to {} records", records);
    Ok(())
}

fn cmd_config(paths: &Paths, mut config: Config, action: Option<ConfigAction>) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            println!("\x1b[1mConfiguration\x1b[0m");
            println!("\x1b[2m{}\x1b[0m", paths.config_file().display());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!();
            println!("Active platform: {}", config.active_platform());
            println!("Data directory:  {}", paths.store_dir().display());
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value).map_err(invalid_input)?;
            config.save(&paths.config_file())?;
            println!("\x1b[32m✓\x1b[0m Set {} = {}", key, value);
        }
    }
    Ok(())
}
