use std::collections::BTreeMap;

use github::SiteFile;
use sitesmith_core::Task;

use crate::services::message_parser::{BuildPlan, SiteAnalysis};

pub const ANALYST_SYSTEM: &str = "You are an expert web developer analyzing project requirements. \
Answer with a single JSON object and nothing else.";

pub const ARCHITECT_SYSTEM: &str = "You are a senior software architect writing development plans \
that a developer can follow step by step. Answer with a single JSON object and nothing else.";

pub const DEVELOPER_SYSTEM: &str = "You are an expert frontend developer. You write complete, \
semantic, accessible HTML5, modern responsive CSS and ES6+ JavaScript for static sites that \
run without a build step.";

/// Attachment as presented to the model.
#[derive(Debug, Clone)]
pub struct AttachmentContext {
    pub name: String,
    /// Leading text of small UTF-8 attachments
    pub preview: Option<String>,
}

const PREVIEW_LIMIT: usize = 200;
const PREVIEWABLE_SIZE: usize = 4096;

impl AttachmentContext {
    pub fn new(name: impl Into<String>, content: &[u8]) -> Self {
        let preview = (content.len() <= PREVIEWABLE_SIZE)
            .then(|| std::str::from_utf8(content).ok())
            .flatten()
            .map(|text| text.chars().take(PREVIEW_LIMIT).collect());
        Self {
            name: name.into(),
            preview,
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn attachment_section(attachments: &[AttachmentContext]) -> String {
    if attachments.is_empty() {
        return "None".to_string();
    }
    attachments
        .iter()
        .map(|a| match &a.preview {
            Some(preview) => format!("- `{}` (starts with: {:?})", a.name, preview),
            None => format!("- `{}`", a.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn file_blocks<'a>(files: impl IntoIterator<Item = (&'a str, String)>) -> String {
    files
        .into_iter()
        .map(|(path, content)| format!("```{}\n{}\n```", path, content.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

const OUTPUT_FORMAT: &str = r#"## Output format
Reply with one fenced code block per file and put the file name in the info string:

```index.html
<!DOCTYPE html>
...
```

```style.css
...
```

```script.js
...
```

`index.html` is required. It must link `style.css` and `script.js`, declare a non-empty
<title>, and contain every id and class the requirements mention. Do not add explanations."#;

pub struct PhasePrompts;

impl PhasePrompts {
    pub fn think(task: &Task) -> String {
        format!(
            r#"Analyze this web development task.

## Brief
{brief}

## Requirements
{checks}

## Round
{round}

Reply with JSON in this shape:
{{
  "technologies": ["..."],
  "complexity": "low|medium|high",
  "key_components": ["..."],
  "challenges": ["..."],
  "success_criteria": ["..."]
}}"#,
            brief = task.brief,
            checks = bullet_list(&task.checks),
            round = task.round,
        )
    }

    pub fn plan(task: &Task, analysis: &SiteAnalysis) -> String {
        let analysis_json =
            serde_json::to_string_pretty(analysis).unwrap_or_else(|_| format!("{:?}", analysis));
        format!(
            r#"Create a development plan for this static web application.

## Brief
{brief}

## Analysis
{analysis_json}

## Requirements
{checks}

Reply with JSON in this shape:
{{
  "steps": [{{"step": 1, "action": "...", "details": "..."}}],
  "file_structure": {{"index.html": "...", "style.css": "...", "script.js": "..."}}
}}"#,
            brief = task.brief,
            checks = bullet_list(&task.checks),
        )
    }

    /// First Act attempt. `existing` holds the files of the previous round, if any.
    pub fn site(
        task: &Task,
        plan: &BuildPlan,
        attachments: &[AttachmentContext],
        existing: &[SiteFile],
    ) -> String {
        let steps = plan
            .steps
            .iter()
            .map(|s| {
                if s.details.is_empty() {
                    format!("{}. {}", s.step, s.action)
                } else {
                    format!("{}. {}: {}", s.step, s.action, s.details)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        let current = if existing.is_empty() {
            String::new()
        } else {
            format!(
                "\n\n## Current version\nThis is an update to a deployed site. Keep what still \
                 applies and change what the brief asks for.\n\n{}",
                file_blocks(existing.iter().map(|f| (f.path.as_str(), f.text())))
            )
        };

        format!(
            r#"Build the complete static web application described below.

## Brief
{brief}

## Requirements
{checks}

## Plan
{steps}

## Attachments
Saved next to index.html and can be referenced by relative path:
{attachments}

Use "{task_name}" as the page title unless the brief says otherwise.{current}

{output_format}"#,
            brief = task.brief,
            checks = bullet_list(&task.checks),
            attachments = attachment_section(attachments),
            task_name = task.task,
            output_format = OUTPUT_FORMAT,
        )
    }

    /// README prose describing how the generated code works.
    pub fn explain(task: &Task, files: &BTreeMap<String, String>) -> String {
        format!(
            r#"Explain in two or three short paragraphs of plain markdown how this site works,
for the README of its repository. Mention the main files and what each does. Do not
include code blocks or headings.

## Brief
{brief}

## Files
{files}"#,
            brief = task.brief,
            files = file_blocks(files.iter().map(|(path, content)| (path.as_str(), content.clone()))),
        )
    }

    /// Regeneration after a failed lint, carrying the previous output and diagnostics.
    pub fn fix(task: &Task, files: &BTreeMap<String, String>, lint_output: &str) -> String {
        let previous = if files.is_empty() {
            "(no files could be extracted from the previous response)".to_string()
        } else {
            file_blocks(files.iter().map(|(path, content)| (path.as_str(), content.clone())))
        };

        format!(
            r#"The site you generated failed validation. Fix every reported problem and return
the corrected files.

## Brief
{brief}

## Requirements
{checks}

## Linter output
```
{lint_output}
```

## Previous files
{previous}

{output_format}"#,
            brief = task.brief,
            checks = bullet_list(&task.checks),
            lint_output = lint_output.trim(),
            output_format = OUTPUT_FORMAT,
        )
    }
}
