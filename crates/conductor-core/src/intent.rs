//! Intent classification.
//!
//! An `IntentMatcher` turns a prompt into ranked candidates: tool names for the
//! agent handler, agent ids for the routing strategies. The keyword matcher is
//! the default; an embedding or LLM classifier can replace it behind the same
//! trait.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub target: String,
    pub score: f64,
    /// Arguments the matcher could extract for the target.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[async_trait]
pub trait IntentMatcher: Send + Sync {
    /// Candidates ordered best first. Empty when nothing matches.
    async fn match_intent(&self, prompt: &str) -> Vec<IntentMatch>;
}

struct KeywordRule {
    target: String,
    pattern: Regex,
}

/// Scores each target by how many of its keywords occur as whole words in the
/// lower-cased prompt. Ties keep rule order.
#[derive(Default)]
pub struct KeywordIntentMatcher {
    rules: Vec<KeywordRule>,
}

impl KeywordIntentMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, target: &str, keywords: &[&str]) -> Self {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| regex::escape(&k.to_lowercase()))
            .collect();
        match Regex::new(&format!(r"\b(?:{})\b", alternatives.join("|"))) {
            Ok(pattern) => self.rules.push(KeywordRule {
                target: target.to_string(),
                pattern,
            }),
            Err(e) => tracing::warn!("[IntentMatcher] Skipping rule for {}: {}", target, e),
        }
        self
    }

    /// Keyword rules for the built-in tools.
    pub fn tools() -> Self {
        Self::new()
            .with_rule("summarizeDoc", &["summarize", "summarise", "summary", "tldr", "tl;dr"])
            .with_rule("extractTables", &["table", "tables", "extract", "tabular"])
            .with_rule("searchDocuments", &["search", "find", "look up", "lookup", "where"])
            .with_rule(
                "analyzeData",
                &["analyze", "analyse", "analysis", "statistics", "stats", "trend", "trends"],
            )
            .with_rule(
                "calculateFinancials",
                &["npv", "roi", "payback", "cash flow", "cash flows", "financials", "investment"],
            )
            .with_rule("prioritizeFeatures", &["prioritize", "prioritise", "rice", "backlog", "features"])
            .with_rule("draftEmail", &["email", "e-mail", "draft"])
            .with_rule("reviewContract", &["contract", "clause", "clauses", "nda", "agreement"])
            .with_rule(
                "generateJobDescription",
                &["job description", "job posting", "hiring", "hire"],
            )
            .with_rule("createCampaignBrief", &["campaign", "brief", "launch"])
    }

    /// Domain keyword rules mapping prompts to specialist agents.
    pub fn domains() -> Self {
        Self::new()
            .with_rule(
                "financial-analyst",
                &["financial", "finance", "investment", "budget", "revenue", "roi", "npv", "cash flow"],
            )
            .with_rule(
                "hr-specialist",
                &["hr", "hiring", "recruit", "recruiting", "employee", "employees", "job description", "onboarding"],
            )
            .with_rule(
                "legal-advisor",
                &["legal", "contract", "compliance", "nda", "clause", "liability"],
            )
            .with_rule(
                "marketing-strategist",
                &["marketing", "campaign", "brand", "audience", "seo"],
            )
            .with_rule(
                "product-manager",
                &["product", "feature", "features", "roadmap", "prioritize", "backlog"],
            )
            .with_rule(
                "data-analyst",
                &["data", "dataset", "statistics", "metrics", "chart", "trend"],
            )
    }
}

#[async_trait]
impl IntentMatcher for KeywordIntentMatcher {
    async fn match_intent(&self, prompt: &str) -> Vec<IntentMatch> {
        let prompt = prompt.to_lowercase();
        let mut matches: Vec<IntentMatch> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let hits = rule.pattern.find_iter(&prompt).count();
                (hits > 0).then(|| IntentMatch {
                    target: rule.target.clone(),
                    score: hits as f64,
                    arguments: Map::new(),
                })
            })
            .collect();
        // Stable sort keeps rule order among equal scores.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(matches: &[IntentMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.target.as_str()).collect()
    }

    #[tokio::test]
    async fn matches_whole_words_case_insensitively() {
        let matcher = KeywordIntentMatcher::tools();
        let matches = matcher.match_intent("Please SUMMARIZE the Q3 report").await;
        assert_eq!(targets(&matches), vec!["summarizeDoc"]);

        // "extractor" must not trigger the "extract" keyword.
        assert!(matcher.match_intent("the extractor fan is loud").await.is_empty());
    }

    #[tokio::test]
    async fn ranks_by_hit_count_then_rule_order() {
        let matcher = KeywordIntentMatcher::tools();
        let matches = matcher
            .match_intent("extract the table and the other tables, then summarize")
            .await;
        assert_eq!(targets(&matches), vec!["extractTables", "summarizeDoc"]);
        assert_eq!(matches[0].score, 3.0);
    }

    #[tokio::test]
    async fn domain_rules_find_financial_prompts() {
        let matcher = KeywordIntentMatcher::domains();
        let matches = matcher.match_intent("Analyze our financial investment").await;
        assert_eq!(targets(&matches), vec!["financial-analyst"]);
        assert!(matcher.match_intent("hello there").await.is_empty());
    }
}
