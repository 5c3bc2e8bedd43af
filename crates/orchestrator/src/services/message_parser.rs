use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::workspace::is_safe_relative_path;

/// Think-phase output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAnalysis {
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default = "default_complexity")]
    pub complexity: String,
    #[serde(default)]
    pub key_components: Vec<String>,
    #[serde(default, alias = "potential_challenges")]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

fn default_complexity() -> String {
    "medium".to_string()
}

impl SiteAnalysis {
    pub fn fallback(checks: &[String]) -> Self {
        Self {
            technologies: vec!["HTML".into(), "CSS".into(), "JavaScript".into()],
            complexity: default_complexity(),
            key_components: vec!["User interface".into(), "Functionality".into()],
            challenges: vec!["Cross-browser compatibility".into()],
            success_criteria: checks.iter().take(2).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub step: u32,
    #[serde(default, alias = "description")]
    pub action: String,
    #[serde(default)]
    pub details: String,
}

/// Plan-phase output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Either a list of paths or a map of path to purpose
    #[serde(default)]
    pub file_structure: serde_json::Value,
}

impl BuildPlan {
    pub fn fallback() -> Self {
        let step = |n: u32, action: &str| PlanStep {
            step: n,
            action: action.to_string(),
            details: String::new(),
        };
        Self {
            steps: vec![
                step(1, "Create HTML structure"),
                step(2, "Add CSS styling"),
                step(3, "Implement JavaScript functionality"),
            ],
            file_structure: serde_json::json!({
                "index.html": "Main application file",
                "style.css": "Application styles",
                "script.js": "Application logic"
            }),
        }
    }

    /// Paths named by `file_structure`.
    pub fn files(&self) -> Vec<String> {
        match &self.file_structure {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([^\n`]*)\n(.*?)```").expect("valid fence regex"))
}

pub struct MessageParser;

impl MessageParser {
    /// Deserialize the first JSON object in an LLM response.
    ///
    /// Tolerates surrounding prose and markdown fences.
    pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
        if let Ok(value) = serde_json::from_str(text.trim()) {
            return Some(value);
        }

        for capture in fence_re().captures_iter(text) {
            if let Ok(value) = serde_json::from_str(capture[2].trim()) {
                return Some(value);
            }
        }

        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&text[start..=end]).ok()
    }

    pub fn parse_analysis(text: &str, checks: &[String]) -> SiteAnalysis {
        Self::extract_json(text).unwrap_or_else(|| {
            warn!(response_length = text.len(), "Analysis was not valid JSON, using fallback");
            SiteAnalysis::fallback(checks)
        })
    }

    pub fn parse_plan(text: &str) -> BuildPlan {
        match Self::extract_json::<BuildPlan>(text) {
            Some(plan) if !plan.steps.is_empty() => plan,
            _ => {
                warn!(response_length = text.len(), "Plan was not valid JSON, using fallback");
                BuildPlan::fallback()
            }
        }
    }

    /// Files from fenced code blocks, keyed by workspace path.
    ///
    /// The info string decides the path: a file name wins, otherwise the
    /// language maps to `index.html`, `style.css` or `script.js`. The first
    /// block for a path is kept. A bare HTML response becomes `index.html`.
    pub fn extract_site_files(text: &str) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();

        for capture in fence_re().captures_iter(text) {
            let info = capture[1].trim();
            let body = capture[2].trim();
            if body.is_empty() {
                continue;
            }
            match Self::path_for_block(info) {
                Some(path) => {
                    files.entry(path).or_insert_with(|| body.to_string());
                }
                None => debug!(info, "Skipping code block without a file mapping"),
            }
        }

        if files.is_empty() && text.to_ascii_lowercase().contains("<html") {
            files.insert("index.html".to_string(), text.trim().to_string());
        }

        if let Some(html) = files.get_mut("index.html") {
            Self::ensure_doctype(html);
        }

        files
    }

    fn path_for_block(info: &str) -> Option<String> {
        let tokens: Vec<&str> = info
            .split(|c: char| c.is_whitespace() || c == ':' || c == '=')
            .map(|t| t.trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '*'))
            .filter(|t| !t.is_empty())
            .collect();

        let named = tokens.iter().find(|t| {
            let lower = t.to_ascii_lowercase();
            (lower.ends_with(".html") || lower.ends_with(".css") || lower.ends_with(".js"))
                && is_safe_relative_path(t)
        });
        if let Some(name) = named {
            return Some(name.to_string());
        }

        let language = tokens.first()?.to_ascii_lowercase();
        match language.as_str() {
            "html" | "htm" => Some("index.html".to_string()),
            "css" => Some("style.css".to_string()),
            "js" | "javascript" => Some("script.js".to_string()),
            _ => None,
        }
    }

    pub fn ensure_doctype(html: &mut String) {
        if !html
            .trim_start()
            .to_ascii_lowercase()
            .starts_with("<!doctype html")
        {
            html.insert_str(0, "<!DOCTYPE html>\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_variants() {
        let direct: SiteAnalysis =
            MessageParser::extract_json(r#"{"technologies":["HTML"],"complexity":"low"}"#).unwrap();
        assert_eq!(direct.complexity, "low");

        let fenced: SiteAnalysis = MessageParser::extract_json(
            "Here you go:\n```json\n{\"key_components\": [\"form\"]}\n```\nDone.",
        )
        .unwrap();
        assert_eq!(fenced.key_components, vec!["form"]);
        assert_eq!(fenced.complexity, "medium");

        let embedded: SiteAnalysis = MessageParser::extract_json(
            "Sure! {\"potential_challenges\": [\"CORS\"]} hope this helps",
        )
        .unwrap();
        assert_eq!(embedded.challenges, vec!["CORS"]);

        assert!(MessageParser::extract_json::<SiteAnalysis>("no json here").is_none());
    }

    #[test]
    fn test_analysis_fallback_uses_checks() {
        let checks = vec!["has #title".to_string(), "uses bootstrap".into(), "x".into()];
        let analysis = MessageParser::parse_analysis("I cannot answer in JSON", &checks);
        assert_eq!(analysis.success_criteria, checks[..2].to_vec());
        assert_eq!(analysis.technologies.len(), 3);
    }

    #[test]
    fn test_plan_parsing_and_fallback() {
        let plan = MessageParser::parse_plan(
            r#"{"steps":[{"step":1,"description":"Build form"}],"file_structure":["index.html"]}"#,
        );
        assert_eq!(plan.steps[0].action, "Build form");
        assert_eq!(plan.files(), vec!["index.html"]);

        let empty = MessageParser::parse_plan(r#"{"steps": []}"#);
        assert_eq!(empty, BuildPlan::fallback());
        let mut fallback_files = BuildPlan::fallback().files();
        fallback_files.sort();
        assert_eq!(fallback_files, vec!["index.html", "script.js", "style.css"]);
    }

    #[test]
    fn test_extract_site_files_by_name_and_language() {
        let response = "\
Here is the site.

```html index.html
<html><head><title>x</title></head><body></body></html>
```

```css
body { margin: 0; }
```

```javascript:js/app.js
console.log('hi');
```

```js
alert(1);
```

```bash
npm install
```
";
        let files = MessageParser::extract_site_files(response);
        assert_eq!(
            files.keys().collect::<Vec<_>>(),
            vec!["index.html", "js/app.js", "script.js", "style.css"]
        );
        assert!(files["index.html"].starts_with("<!DOCTYPE html>\n<html>"));
        assert_eq!(files["style.css"], "body { margin: 0; }");
    }

    #[test]
    fn test_first_block_per_path_wins() {
        let files =
            MessageParser::extract_site_files("```css\na{}\n```\n```style.css\nb{}\n```");
        assert_eq!(files["style.css"], "a{}");
    }

    #[test]
    fn test_unsafe_names_fall_back_to_language() {
        let files = MessageParser::extract_site_files("```html ../../index.html\n<p>x</p>\n```");
        assert!(files.contains_key("index.html"));
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_bare_html_response() {
        let files = MessageParser::extract_site_files("<!doctype html><html><body>hi</body></html>");
        assert_eq!(files["index.html"], "<!doctype html><html><body>hi</body></html>");
    }

    #[test]
    fn test_no_index_html() {
        let files = MessageParser::extract_site_files("Sorry, I can't help with that.");
        assert!(files.is_empty());
    }
}
