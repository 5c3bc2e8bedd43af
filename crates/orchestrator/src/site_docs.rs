use chrono::Datelike;
use sitesmith_core::Task;

use crate::checks::{CheckVerdict, ChecksReport};
use crate::services::message_parser::{BuildPlan, SiteAnalysis};

pub const LICENSE_PATH: &str = "LICENSE";
pub const README_PATH: &str = "README.md";

pub fn mit_license(year: i32, holder: &str) -> String {
    format!(
        r#"MIT License

Copyright (c) {year} {holder}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
"#
    )
}

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Inputs for the generated `README.md`.
pub struct ReadmeContext<'a> {
    pub task: &'a Task,
    pub analysis: &'a SiteAnalysis,
    pub plan: &'a BuildPlan,
    pub files: &'a [String],
    pub repo_url: &'a str,
    pub pages_url: &'a str,
    pub checks: &'a ChecksReport,
    /// Model-written description of the code, when one could be generated
    pub explanation: Option<&'a str>,
}

pub fn readme(ctx: &ReadmeContext<'_>) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", ctx.task.task));
    out.push_str(&format!("{}\n\n", ctx.task.brief.trim()));
    out.push_str(&format!("**Live site:** {}\n\n", ctx.pages_url));

    out.push_str("## Summary\n\n");
    if !ctx.analysis.technologies.is_empty() {
        out.push_str(&format!(
            "Built with {}. Complexity: {}.\n\n",
            ctx.analysis.technologies.join(", "),
            ctx.analysis.complexity
        ));
    }
    for component in &ctx.analysis.key_components {
        out.push_str(&format!("- {}\n", component));
    }
    if !ctx.analysis.key_components.is_empty() {
        out.push('\n');
    }

    if let Some(explanation) = ctx.explanation.filter(|e| !e.trim().is_empty()) {
        out.push_str("## How it works\n\n");
        out.push_str(explanation.trim());
        out.push_str("\n\n");
    }

    if !ctx.plan.steps.is_empty() {
        out.push_str("## How it was built\n\n");
        for step in &ctx.plan.steps {
            out.push_str(&format!("{}. {}\n", step.step, step.action));
        }
        out.push('\n');
    }

    out.push_str("## Files\n\n");
    for file in ctx.files {
        out.push_str(&format!("- `{}`\n", file));
    }
    out.push('\n');

    if !ctx.checks.results.is_empty() {
        out.push_str("## Requirements\n\n");
        for result in &ctx.checks.results {
            let mark = match result.verdict {
                CheckVerdict::Passed => "[x]",
                CheckVerdict::Failed | CheckVerdict::Unverified => "[ ]",
            };
            out.push_str(&format!("- {} {}\n", mark, result.check));
        }
        out.push('\n');
    }

    out.push_str("## Usage\n\n");
    out.push_str(&format!(
        "Open {} in a browser, or clone {} and open `index.html` locally. No build step is needed.\n\n",
        ctx.pages_url, ctx.repo_url
    ));

    out.push_str("## License\n\nMIT. See [LICENSE](LICENSE).\n");
    out
}
