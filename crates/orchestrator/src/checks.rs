//! Static evaluation of a brief's acceptance checks against the files about to ship.
//!
//! The report is informational. It never gates a deployment.

use std::sync::OnceLock;

use github::SiteFile;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckVerdict {
    Passed,
    Failed,
    /// Needs a browser or a human to judge
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub verdict: CheckVerdict,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecksReport {
    pub results: Vec<CheckResult>,
}

fn selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([A-Za-z][\w-]*)").expect("valid selector regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>\s*\S").expect("valid title regex"))
}

struct SiteView<'a> {
    files: &'a [SiteFile],
    html: String,
}

impl SiteView<'_> {
    fn has_file(&self, path: &str) -> bool {
        self.files
            .iter()
            .any(|f| f.path.eq_ignore_ascii_case(path) && !f.content.is_empty())
    }

    fn has_id(&self, id: &str) -> bool {
        self.html.contains(&format!("id=\"{}\"", id)) || self.html.contains(&format!("id='{}'", id))
    }
}

impl ChecksReport {
    pub fn evaluate(checks: &[String], files: &[SiteFile]) -> Self {
        let view = SiteView {
            files,
            html: files
                .iter()
                .find(|f| f.path == "index.html")
                .map(SiteFile::text)
                .unwrap_or_default(),
        };

        let results = checks
            .iter()
            .map(|check| {
                let (verdict, detail) = Self::judge(check, &view);
                CheckResult {
                    check: check.clone(),
                    verdict,
                    detail,
                }
            })
            .collect();

        Self { results }
    }

    fn judge(check: &str, site: &SiteView<'_>) -> (CheckVerdict, Option<String>) {
        let lower = check.to_ascii_lowercase();

        let ids: Vec<&str> = selector_re()
            .captures_iter(check)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if !ids.is_empty() {
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !site.has_id(id))
                .map(|id| format!("#{}", id))
                .collect();
            return if missing.is_empty() {
                (CheckVerdict::Passed, None)
            } else {
                (
                    CheckVerdict::Failed,
                    Some(format!("index.html has no element {}", missing.join(", "))),
                )
            };
        }

        let expect = |ok: bool, what: &str| {
            if ok {
                (CheckVerdict::Passed, None)
            } else {
                (CheckVerdict::Failed, Some(format!("{} not found", what)))
            }
        };

        if lower.contains("license") {
            expect(site.has_file("LICENSE"), "LICENSE")
        } else if lower.contains("readme") {
            expect(site.has_file("README.md"), "README.md")
        } else if lower.contains("bootstrap") {
            expect(
                site.html.to_ascii_lowercase().contains("bootstrap"),
                "Bootstrap reference",
            )
        } else if lower.contains("title") {
            expect(title_re().is_match(&site.html), "non-empty <title>")
        } else {
            (CheckVerdict::Unverified, None)
        }
    }

    fn count(&self, verdict: CheckVerdict) -> usize {
        self.results.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn passed(&self) -> usize {
        self.count(CheckVerdict::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(CheckVerdict::Failed)
    }

    pub fn unverified(&self) -> usize {
        self.count(CheckVerdict::Unverified)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} unverified",
            self.passed(),
            self.failed(),
            self.unverified()
        )
    }
}
