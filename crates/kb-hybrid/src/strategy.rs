//! Per-query strategy selection as an ordered rule table; first match wins.

use serde::Serialize;

use kb_core::config::RetrievalSettings;
use kb_core::language::is_cjk;
use kb_core::types::{Language, Strategy};

/// Observable properties of a query that the rules look at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFeatures {
    /// Whitespace-delimited tokens.
    pub token_count: usize,
    /// Share of tokens that look like codes, numbers, acronyms or identifiers.
    pub precise_ratio: f32,
    /// Contains an e-mail address or URL marker.
    pub has_contact_or_url: bool,
    pub language: Language,
    /// False when the query contains CJK text, where token counts mean little.
    pub whitespace_delimited: bool,
    /// Analyzed terms left after boilerplate and stop words are removed.
    pub content_tokens: usize,
    pub vector_available: bool,
}

impl QueryFeatures {
    pub fn extract(query: &str, language: Language, content_tokens: usize, vector_available: bool) -> Self {
        let tokens: Vec<&str> = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty())
            .collect();
        let precise = tokens.iter().filter(|t| is_precise_token(t)).count();
        let precise_ratio = if tokens.is_empty() { 0.0 } else { precise as f32 / tokens.len() as f32 };
        let lower = query.to_ascii_lowercase();
        Self {
            token_count: tokens.len(),
            precise_ratio,
            has_contact_or_url: query.contains('@') || lower.contains("http"),
            language,
            whitespace_delimited: !language.is_cjk() && !query.chars().any(is_cjk),
            content_tokens,
            vector_available,
        }
    }
}

/// Codes, numbers, acronyms, and identifier-shaped tokens.
fn is_precise_token(token: &str) -> bool {
    if token.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    if token.contains(['-', '_', '/', '.', '@', ':']) {
        return true;
    }
    let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase()) {
        return true;
    }
    // camelCase / PascalCase with an inner capital
    token.chars().skip(1).any(char::is_uppercase)
}

/// Which row of the rule table produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    Override,
    ShortQuery,
    PreciseQuery,
    VectorUnavailable,
    Default,
}

impl SelectionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionRule::Override => "override",
            SelectionRule::ShortQuery => "short_query",
            SelectionRule::PreciseQuery => "precise_query",
            SelectionRule::VectorUnavailable => "vector_unavailable",
            SelectionRule::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyDecision {
    pub strategy: Strategy,
    pub rule: SelectionRule,
    /// The query carries too little content to answer without asking back.
    pub clarify: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPolicy {
    pub short_query_tokens: usize,
    pub precise_token_ratio: f32,
    pub clarify_min_content_tokens: usize,
}

impl From<&RetrievalSettings> for StrategyPolicy {
    fn from(s: &RetrievalSettings) -> Self {
        Self {
            short_query_tokens: s.short_query_tokens,
            precise_token_ratio: s.precise_token_ratio,
            clarify_min_content_tokens: s.clarify_min_content_tokens,
        }
    }
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

struct Rule {
    name: SelectionRule,
    strategy: Strategy,
    applies: fn(&QueryFeatures, &StrategyPolicy) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        name: SelectionRule::ShortQuery,
        strategy: Strategy::LexicalOnly,
        applies: |f, p| f.whitespace_delimited && f.token_count < p.short_query_tokens,
    },
    Rule {
        name: SelectionRule::PreciseQuery,
        strategy: Strategy::LexicalOnly,
        applies: |f, p| f.has_contact_or_url || (f.token_count > 0 && f.precise_ratio >= p.precise_token_ratio),
    },
    Rule {
        name: SelectionRule::VectorUnavailable,
        strategy: Strategy::LexicalOnly,
        applies: |f, _| !f.vector_available,
    },
];

#[derive(Debug, Clone, Default)]
pub struct StrategySelector {
    policy: StrategyPolicy,
}

impl StrategySelector {
    pub fn new(policy: StrategyPolicy) -> Self {
        Self { policy }
    }

    pub fn select(&self, features: &QueryFeatures, requested: Option<Strategy>) -> StrategyDecision {
        let clarify = features.content_tokens < self.policy.clarify_min_content_tokens;
        if let Some(strategy) = requested {
            return StrategyDecision { strategy, rule: SelectionRule::Override, clarify };
        }
        RULES
            .iter()
            .find(|r| (r.applies)(features, &self.policy))
            .map(|r| StrategyDecision { strategy: r.strategy, rule: r.name, clarify })
            .unwrap_or(StrategyDecision { strategy: Strategy::Hybrid, rule: SelectionRule::Default, clarify })
    }
}
