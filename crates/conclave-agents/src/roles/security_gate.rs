//! Security Gate: scans candidate artifacts against a fixed rule set
//! and reports findings with severities. Runs locally against the
//! `artifacts` shared-context input; no LLM turn, no tool dispatch.

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::plan::AgentRole;
use conclave_core::AgentOutput;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::handler::AgentHandler;
use crate::types::{HandlerEvent, HandlerStream, StageInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize)]
struct Finding {
    relative_path: String,
    rule: &'static str,
    severity: Severity,
    line: usize,
}

struct Rule {
    name: &'static str,
    severity: Severity,
    pattern: &'static str,
}

const RULES: &[Rule] = &[
    Rule { name: "hardcoded_secret", severity: Severity::High, pattern: r#"(?i)(api_key|secret|password)\s*=\s*["'][^"']+["']"# },
    Rule { name: "shell_injection", severity: Severity::High, pattern: r"subprocess\.(call|run|Popen)\([^)]*shell\s*=\s*True" },
    Rule { name: "eval_usage", severity: Severity::Medium, pattern: r"\beval\(" },
    Rule { name: "insecure_deserialization", severity: Severity::Medium, pattern: r"\bpickle\.loads?\(" },
    Rule { name: "debug_flag_enabled", severity: Severity::Low, pattern: r"(?i)debug\s*=\s*True" },
];

fn scan(relative_path: &str, content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for rule in RULES {
        let Ok(re) = Regex::new(rule.pattern) else { continue };
        for (idx, line) in content.lines().enumerate() {
            if re.is_match(line) {
                findings.push(Finding {
                        relative_path: relative_path.to_owned(),
                        rule: rule.name,
                        severity: rule.severity,
                        line: idx + 1,
                });
            }
        }
    }
    findings
}

#[derive(Deserialize)]
struct ArtifactRef {
    relative_path: String,
    #[serde(default)]
    content: String,
}

/// Security Gate handler: regex rule sweep over candidate artifact contents.
pub struct SecurityGateHandler;

impl SecurityGateHandler {
    /// Construct the handler. Stateless.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SecurityGateHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentHandler for SecurityGateHandler {
    fn role(&self) -> AgentRole {
        AgentRole::SecurityGate
    }

    async fn execute(&self, input: StageInput, _cancel: CancellationToken) -> HandlerStream {
        let artifacts: Vec<ArtifactRef> = input
        .input("artifacts")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

        Box::pin(stream! {
                let mut findings = Vec::new();
                for artifact in &artifacts {
                    findings.extend(scan(&artifact.relative_path, &artifact.content));
                }

                let needs_refine = findings.iter().any(|f| f.severity != Severity::Low);
                let issues: Vec<String> = findings
                .iter()
                .map(|f| format!("{}:{} [{:?}] {}", f.relative_path, f.line, f.severity, f.rule))
                .collect();

                let mut output = AgentOutput::new(
                    AgentRole::SecurityGate,
                    if findings.is_empty() { "no findings".to_owned() } else { format!("{} finding(s)", findings.len()) },
                );
                output.needs_refine = needs_refine;
                output.issues = issues;
                yield HandlerEvent::Done(Ok(output));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_hardcoded_secret() {
        let findings = scan("app.py", "api_key = \"sk-1234567890\"\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn clean_file_has_no_findings() {
        let findings = scan("app.py", "def add(a, b):\n return a + b\n");
        assert!(findings.is_empty());
    }
}

