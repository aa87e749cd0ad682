//! Command templates
//!
//! A command is parsed into an ordered list of literal and placeholder
//! tokens before anything is substituted:
//!
//! - `{{name}}` is replaced by the bound value, escaped for the quoting
//!   context the placeholder sits in
//! - `{{name:raw}}` is replaced by the bound value verbatim
//!
//! Anything else, including unterminated braces, is literal text.
//!
//! A placeholder outside quotes gets the value single-quoted. Inside `'...'`
//! or `"..."` the value is escaped for that quote instead, so the template's
//! own quotes stay balanced. Positions where no escaping is reliable
//! (backticks, `${...}`, `$'...'`, here-documents, right after a backslash or
//! `$`) are [`Quoting::Unsupported`]; only a raw placeholder may appear there.

use regex::Regex;
use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

/// Shell quoting context of a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// Outside any quotes
    Bare,
    /// Inside `'...'`
    Single,
    /// Inside `"..."`
    Double,
    /// Inside a `#` comment
    Comment,
    /// No escaping keeps the value inert here
    Unsupported,
}

impl Quoting {
    /// Escape `value` for this context; `None` when it cannot be done
    pub fn escape(self, value: &str) -> Option<String> {
        match self {
            Self::Bare => Some(shell_words::quote(value).into_owned()),
            Self::Single => Some(value.replace('\'', r"'\''")),
            Self::Double => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    if matches!(c, '"' | '$' | '`' | '\\') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                Some(out)
            }
            Self::Comment => Some(value.replace(['\n', '\r'], " ")),
            Self::Unsupported => None,
        }
    }
}

/// One piece of a parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Placeholder {
        name: String,
        raw: bool,
        quoting: Quoting,
    },
}

/// Why a template could not be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// No value for this placeholder
    Missing(String),
    /// The placeholder sits where its value cannot be escaped
    Unquotable(String),
}

/// Parsed command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    tokens: Vec<Token>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_-]*)\s*(:\s*raw\s*)?\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Whether `name` can be used inside `{{...}}`
pub fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    /// `$(...)`, with the depth of nested parentheses
    Subst(usize),
    Single,
    Double,
    AnsiC,
    Backtick,
    Brace,
    Comment,
    Heredoc,
}

/// Tracks shell quoting across the literal parts of a template
#[derive(Debug, Default)]
struct Scanner {
    stack: Vec<Context>,
    escaped: bool,
    dollar: bool,
    word_start: bool,
}

impl Scanner {
    fn new() -> Self {
        Self {
            word_start: true,
            ..Default::default()
        }
    }

    fn feed(&mut self, text: &str) {
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            self.dollar = false;
            if self.escaped {
                self.escaped = false;
                self.word_start = false;
                continue;
            }
            match self.stack.last().copied() {
                Some(Context::Single) => {
                    if c == '\'' {
                        self.stack.pop();
                    }
                }
                Some(Context::Comment) => {
                    if c == '\n' {
                        self.stack.pop();
                    }
                }
                Some(Context::Heredoc) => {}
                Some(Context::AnsiC) => match c {
                    '\\' => self.escaped = true,
                    '\'' => {
                        self.stack.pop();
                    }
                    _ => {}
                },
                Some(Context::Backtick) => match c {
                    '\\' => self.escaped = true,
                    '`' => {
                        self.stack.pop();
                    }
                    _ => {}
                },
                Some(Context::Double) => match c {
                    '\\' => self.escaped = true,
                    '"' => {
                        self.stack.pop();
                    }
                    '`' => self.stack.push(Context::Backtick),
                    '$' => self.dollar_in(&mut chars, false),
                    _ => {}
                },
                None | Some(Context::Subst(_)) | Some(Context::Brace) => {
                    self.bare(c, &mut chars)
                }
            }
            self.word_start = c.is_whitespace() || ";&|()<>".contains(c);
        }
    }

    fn bare(&mut self, c: char, chars: &mut Peekable<Chars<'_>>) {
        match c {
            '\\' => self.escaped = true,
            '\'' => self.stack.push(Context::Single),
            '"' => self.stack.push(Context::Double),
            '`' => self.stack.push(Context::Backtick),
            '#' if self.word_start => self.stack.push(Context::Comment),
            '$' => self.dollar_in(chars, true),
            '(' => {
                if let Some(Context::Subst(depth)) = self.stack.last_mut() {
                    *depth += 1;
                }
            }
            ')' => match self.stack.last_mut() {
                Some(Context::Subst(0)) => {
                    self.stack.pop();
                }
                Some(Context::Subst(depth)) => *depth -= 1,
                _ => {}
            },
            '}' => {
                if self.stack.last() == Some(&Context::Brace) {
                    self.stack.pop();
                }
            }
            '<' if chars.peek() == Some(&'<') => {
                chars.next();
                if chars.peek() == Some(&'<') {
                    // here-string
                    chars.next();
                } else if !matches!(self.stack.last(), Some(Context::Subst(depth)) if *depth > 0) {
                    self.stack.push(Context::Heredoc);
                }
            }
            _ => {}
        }
    }

    fn dollar_in(&mut self, chars: &mut Peekable<Chars<'_>>, bare: bool) {
        match chars.peek() {
            Some('(') => {
                chars.next();
                self.stack.push(Context::Subst(0));
            }
            Some('{') => {
                chars.next();
                self.stack.push(Context::Brace);
            }
            Some('\'') if bare => {
                chars.next();
                self.stack.push(Context::AnsiC);
            }
            None => self.dollar = true,
            _ => {}
        }
    }

    /// Quoting at the current position; the placeholder's value follows
    fn placeholder(&mut self) -> Quoting {
        let unsafe_context = self.stack.iter().any(|c| {
            matches!(
                c,
                Context::AnsiC | Context::Backtick | Context::Brace | Context::Heredoc
            )
        });
        let quoting = if unsafe_context || self.escaped || self.dollar {
            Quoting::Unsupported
        } else {
            match self.stack.last() {
                None | Some(Context::Subst(_)) => Quoting::Bare,
                Some(Context::Single) => Quoting::Single,
                Some(Context::Double) => Quoting::Double,
                Some(Context::Comment) => Quoting::Comment,
                Some(_) => Quoting::Unsupported,
            }
        };
        self.escaped = false;
        self.dollar = false;
        self.word_start = false;
        quoting
    }
}

impl Template {
    pub fn parse(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut scanner = Scanner::new();
        let mut last = 0;

        for caps in placeholder_re().captures_iter(text) {
            let whole = caps.get(0).map(|m| (m.start(), m.end()));
            let Some((start, end)) = whole else { continue };
            if start > last {
                let literal = &text[last..start];
                scanner.feed(literal);
                tokens.push(Token::Literal(literal.to_string()));
            }
            tokens.push(Token::Placeholder {
                name: caps[1].to_string(),
                raw: caps.get(2).is_some(),
                quoting: scanner.placeholder(),
            });
            last = end;
        }
        if last < text.len() {
            tokens.push(Token::Literal(text[last..].to_string()));
        }

        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for token in &self.tokens {
            if let Token::Placeholder { name, .. } = token {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// First quoted placeholder whose position allows no safe escaping
    pub fn unquotable(&self) -> Option<&str> {
        self.tokens.iter().find_map(|token| match token {
            Token::Placeholder {
                name,
                raw: false,
                quoting: Quoting::Unsupported,
            } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Substitute every placeholder; fails on the first one it cannot fill
    pub fn render<'a, F>(&self, mut lookup: F) -> Result<String, RenderError>
    where
        F: FnMut(&str) -> Option<Cow<'a, str>>,
    {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder { name, raw, quoting } => {
                    let value = lookup(name).ok_or_else(|| RenderError::Missing(name.clone()))?;
                    if *raw {
                        out.push_str(&value);
                    } else {
                        let escaped = quoting
                            .escape(&value)
                            .ok_or_else(|| RenderError::Unquotable(name.clone()))?;
                        out.push_str(&escaped);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Substitute bound placeholders and leave the rest as `{{name}}`
    pub fn preview<'a, F>(&self, mut lookup: F) -> String
    where
        F: FnMut(&str) -> Option<Cow<'a, str>>,
    {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder { name, raw, quoting } => {
                    let value = lookup(name);
                    match value {
                        Some(value) if *raw => out.push_str(&value),
                        Some(value) => match quoting.escape(&value) {
                            Some(escaped) => out.push_str(&escaped),
                            None => out.push_str(&format!("{{{{{}}}}}", name)),
                        },
                        None if *raw => out.push_str(&format!("{{{{{}:raw}}}}", name)),
                        None => out.push_str(&format!("{{{{{}}}}}", name)),
                    }
                }
            }
        }
        out
    }
}
