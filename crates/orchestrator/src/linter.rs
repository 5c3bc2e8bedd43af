use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};

/// Outcome of one lint pass over a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintReport {
    pub passed: bool,
    /// Diagnostics fed back into the regeneration prompt
    pub output: String,
}

impl LintReport {
    pub fn passed() -> Self {
        Self {
            passed: true,
            output: String::new(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
        }
    }
}

/// Validates generated files in place.
///
/// `Err` means the linter itself could not run. A failing check is an
/// `Ok(LintReport { passed: false, .. })`.
#[async_trait]
pub trait Linter: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, workspace: &Path) -> Result<LintReport>;
}

#[derive(Debug, Clone)]
pub struct LinterConfig {
    /// External program and arguments, split on whitespace. `None` selects [`StaticLinter`].
    pub command: Option<String>,
    pub timeout: Duration,
}

impl Default for LinterConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LinterConfig {
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        let command = command.into();
        self.command = (!command.trim().is_empty()).then_some(command);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(&self) -> Arc<dyn Linter> {
        let mut parts = self
            .command
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string);

        match parts.next() {
            Some(program) => Arc::new(
                CommandLinter::new(program, parts.collect()).with_timeout(self.timeout),
            ),
            None => Arc::new(StaticLinter),
        }
    }
}

/// Runs an external linter with the workspace as its working directory.
#[derive(Debug, Clone)]
pub struct CommandLinter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLinter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: LinterConfig::default().timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Linter for CommandLinter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn check(&self, workspace: &Path) -> Result<LintReport> {
        debug!(command = %self.display(), cwd = %workspace.display(), "Running linter");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(workspace)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                OrchestratorError::LinterUnavailable(format!("{}: {}", self.display(), e))
            })?,
            Err(_) => {
                warn!(command = %self.display(), "Linter timed out");
                return Ok(LintReport::failed(format!(
                    "{} timed out after {}s",
                    self.display(),
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            return Ok(LintReport::passed());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = [stdout.trim(), stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(LintReport::failed(if diagnostics.is_empty() {
            format!("{} exited with {}", self.display(), output.status)
        } else {
            diagnostics
        }))
    }
}

/// Structural checks on the generated page when no external linter is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticLinter;

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>\s*(\S.*?)</title>").expect("valid regex"))
}

fn asset_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:href|src)\s*=\s*["']([^"'#?]+\.(?:css|js))["']"#).expect("valid regex")
    })
}

fn is_local_reference(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    !(lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("//")
        || lower.starts_with("data:"))
}

impl StaticLinter {
    /// Problems found in an HTML document and the local assets it references.
    pub fn check_html(html: &str, asset_exists: impl Fn(&str) -> Option<bool>) -> Vec<String> {
        let mut issues = Vec::new();
        let lower = html.to_ascii_lowercase();

        if !lower.trim_start().starts_with("<!doctype html") {
            issues.push("index.html: missing <!DOCTYPE html> declaration".to_string());
        }
        for tag in ["<html", "<head", "<body"] {
            if !lower.contains(tag) {
                issues.push(format!("index.html: missing {}> element", tag));
            }
        }
        if title_re().captures(html).is_none() {
            issues.push("index.html: missing or empty <title>".to_string());
        }

        for capture in asset_ref_re().captures_iter(html) {
            let target = capture[1].trim_start_matches("./");
            if !is_local_reference(target) {
                continue;
            }
            match asset_exists(target) {
                Some(true) => {}
                Some(false) => issues.push(format!("index.html: referenced {} is empty", target)),
                None => issues.push(format!("index.html: referenced {} does not exist", target)),
            }
        }

        issues
    }

    pub fn check_css(name: &str, css: &str) -> Option<String> {
        let mut depth: i64 = 0;
        for c in strip_comments(css).chars() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Some(format!("{}: unexpected '}}'", name));
                    }
                }
                _ => {}
            }
        }
        (depth != 0).then(|| format!("{}: {} unclosed '{{'", name, depth))
    }

    pub fn check_js(name: &str, js: &str) -> Option<String> {
        let mut stack = Vec::new();
        let mut chars = js.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' | '\'' | '`' => {
                    let quote = c;
                    while let Some(inner) = chars.next() {
                        if inner == '\\' {
                            chars.next();
                        } else if inner == quote {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'/') => {
                    for inner in chars.by_ref() {
                        if inner == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut prev = '\0';
                    for inner in chars.by_ref() {
                        if prev == '*' && inner == '/' {
                            break;
                        }
                        prev = inner;
                    }
                }
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Some(format!("{}: unbalanced '{}'", name, c));
                    }
                }
                _ => {}
            }
        }

        stack
            .last()
            .map(|open| format!("{}: unclosed '{}'", name, open))
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl Linter for StaticLinter {
    fn name(&self) -> &str {
        "static"
    }

    async fn check(&self, workspace: &Path) -> Result<LintReport> {
        let index = workspace.join("index.html");
        let html = match tokio::fs::read_to_string(&index).await {
            Ok(html) if !html.trim().is_empty() => html,
            Ok(_) => return Ok(LintReport::failed("index.html is empty")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LintReport::failed("index.html does not exist"))
            }
            Err(e) => return Err(e.into()),
        };

        let mut issues = Self::check_html(&html, |target| {
            if target.split('/').any(|part| part == "..") {
                return None;
            }
            std::fs::metadata(workspace.join(target))
                .ok()
                .filter(|m| m.is_file())
                .map(|m| m.len() > 0)
        });

        let mut entries = tokio::fs::read_dir(workspace).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let issue = if name.ends_with(".css") {
                Self::check_css(&name, &tokio::fs::read_to_string(entry.path()).await?)
            } else if name.ends_with(".js") {
                Self::check_js(&name, &tokio::fs::read_to_string(entry.path()).await?)
            } else {
                None
            };
            issues.extend(issue);
        }

        if issues.is_empty() {
            Ok(LintReport::passed())
        } else {
            Ok(LintReport::failed(issues.join("\n")))
        }
    }
}
