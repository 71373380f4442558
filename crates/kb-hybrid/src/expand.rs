//! Query expansion: the original query plus normalized, translated and
//! synonym-substituted variants, deduplicated and capped.
//!
//! All vocabulary lives in the rule tables below; `QueryExpander::expand` is
//! the only place they are evaluated.

use std::collections::HashSet;
use std::sync::Arc;

use kb_core::traits::LanguageDetector;
use kb_core::types::Language;

/// `term` may be rewritten as any of `replacements`.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionRule {
    pub term: &'static str,
    pub replacements: &'static [&'static str],
}

const fn rule(term: &'static str, replacements: &'static [&'static str]) -> ExpansionRule {
    ExpansionRule { term, replacements }
}

/// Leading phrases that carry no retrievable content. Longer phrases first.
pub const BOILERPLATE_PREFIXES: &[&str] = &[
    "can you tell me", "could you tell me", "please tell me", "i want to know", "i would like to know",
    "where can i find", "tell me about", "how do i", "how can i", "how to", "what is", "what are",
    "where is", "is there", "please",
    "请告诉我", "我想知道", "请问", "什么是", "怎么样", "如何", "怎么", "怎样",
];

/// Sentence-final particles dropped after trailing punctuation.
pub const TRAILING_PARTICLES: &[&str] = &["吗", "呢", "呀"];

const TRAILING_PUNCTUATION: &[char] = &['?', '？', '!', '！', '.', '。', ',', '，', ';', '；', ':', '：', '~', '～'];

/// Multilingual synonym table.
pub const SYNONYMS: &[ExpansionRule] = &[
    rule("投诉", &["抱怨", "不满", "申诉", "反馈问题"]),
    rule("邮箱", &["邮件", "电子邮件", "email", "联系地址"]),
    rule("客户", &["顾客", "用户"]),
    rule("申请", &["请求", "寻求", "联系"]),
    rule("流程", &["步骤", "程序", "操作"]),
    rule("请假", &["休假", "休年假", "调休", "事假"]),
    rule("政策", &["规定", "制度", "条例"]),
    rule("编码", &["代码", "编程", "开发"]),
    rule("规范", &["标准", "准则", "规则"]),
    rule("公司", &["企业", "组织", "单位"]),
    rule("员工", &["职员", "工作者", "同事"]),
    rule("招聘", &["录用", "入职"]),
    rule("complaint", &["issue", "problem", "grievance", "feedback"]),
    rule("email", &["mail", "contact", "address"]),
    rule("customer", &["client", "user"]),
    rule("process", &["procedure", "workflow", "steps"]),
    rule("leave", &["vacation", "time off", "holiday"]),
    rule("policy", &["rule", "guideline", "standard"]),
];

/// Chinese → English glossary; read right-to-left for English → Chinese.
pub const GLOSSARY: &[ExpansionRule] = &[
    rule("远程办公", &["remote work"]),
    rule("年假", &["annual leave"]),
    rule("病假", &["sick leave"]),
    rule("请假", &["leave"]),
    rule("休假", &["vacation"]),
    rule("投诉", &["complaint"]),
    rule("邮箱", &["email"]),
    rule("客户", &["customer"]),
    rule("申请", &["request"]),
    rule("流程", &["process"]),
    rule("政策", &["policy"]),
    rule("规定", &["rule"]),
    rule("员工", &["employee"]),
    rule("公司", &["company"]),
    rule("招聘", &["recruitment"]),
    rule("报销", &["reimbursement"]),
    rule("工资", &["salary"]),
    rule("加班", &["overtime"]),
    rule("密码", &["password"]),
    rule("通知", &["notice"]),
    rule("审批", &["approval"]),
    rule("合同", &["contract"]),
    rule("培训", &["training"]),
    rule("考勤", &["attendance"]),
    rule("福利", &["benefits"]),
    rule("入职", &["onboarding"]),
    rule("离职", &["resignation"]),
    rule("停车", &["parking"]),
    rule("许可", &["permit"]),
];

/// Result of expanding one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub language: Language,
    /// Original query first, then the generated variants.
    pub variants: Vec<String>,
}

#[derive(Clone)]
pub struct QueryExpander {
    max_variants: usize,
    detector: Arc<dyn LanguageDetector>,
}

impl QueryExpander {
    pub fn new(max_variants: usize, detector: Arc<dyn LanguageDetector>) -> Self {
        Self { max_variants: max_variants.max(1), detector }
    }

    /// Expand `query` for a corpus whose dominant language is `corpus_language`.
    pub fn expand(&self, query: &str, corpus_language: Language) -> Expansion {
        let language = self.detector.detect(query);
        let normalized = normalize(query);

        let mut candidates = vec![query.to_string(), normalized.clone()];
        if let Some(translated) = translate(&normalized, language, corpus_language) {
            candidates.push(translated);
        }
        candidates.extend(synonym_variants(&normalized));

        let mut seen = HashSet::new();
        let mut variants = Vec::with_capacity(self.max_variants);
        for (i, candidate) in candidates.into_iter().enumerate() {
            // The original is kept verbatim even when blank.
            let key = candidate.trim().to_string();
            if i > 0 && key.is_empty() {
                continue;
            }
            if seen.insert(key) {
                variants.push(candidate);
            }
            if variants.len() == self.max_variants {
                break;
            }
        }
        Expansion { language, variants }
    }
}

/// Strip interrogative boilerplate and trailing punctuation.
pub fn normalize(query: &str) -> String {
    let mut s = query.trim();
    loop {
        let before = s.len();
        s = s.trim_end_matches(|c: char| c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c));
        for particle in TRAILING_PARTICLES {
            if let Some(rest) = s.strip_suffix(particle) {
                s = rest;
            }
        }
        for prefix in BOILERPLATE_PREFIXES {
            if let Some(rest) = strip_prefix_phrase(s, prefix) {
                s = rest.trim_start_matches(|c: char| c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c));
                break;
            }
        }
        if s.len() == before {
            return s.to_string();
        }
    }
}

fn strip_prefix_phrase<'a>(s: &'a str, phrase: &str) -> Option<&'a str> {
    let head = s.get(..phrase.len())?;
    if !head.eq_ignore_ascii_case(phrase) {
        return None;
    }
    let rest = &s[phrase.len()..];
    let ascii_phrase = phrase.is_ascii();
    if ascii_phrase && rest.chars().next().is_some_and(|c| c.is_alphanumeric()) {
        return None;
    }
    Some(rest)
}

/// Byte offset of the first occurrence of `term`. ASCII terms match
/// case-insensitively on word boundaries; other scripts match anywhere.
fn find_term(haystack: &str, term: &str) -> Option<usize> {
    if !term.is_ascii() {
        return haystack.find(term);
    }
    let lower = haystack.to_ascii_lowercase();
    let term = term.to_ascii_lowercase();
    let mut from = 0;
    while let Some(off) = lower[from..].find(&term) {
        let start = from + off;
        let end = start + term.len();
        let before_ok = lower[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = lower[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(start);
        }
        from = start + lower[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn synonym_variants(base: &str) -> Vec<String> {
    let mut out = Vec::new();
    for rule in SYNONYMS {
        let Some(pos) = find_term(base, rule.term) else { continue };
        for syn in rule.replacements {
            if find_term(base, syn).is_some() {
                continue;
            }
            let mut variant = String::with_capacity(base.len() + syn.len());
            variant.push_str(&base[..pos]);
            variant.push_str(syn);
            variant.push_str(&base[pos + rule.term.len()..]);
            out.push(variant);
        }
    }
    out
}

/// Keyword-level translation between Chinese and English through the
/// glossary, only when the query and corpus languages differ.
fn translate(query: &str, from: Language, to: Language) -> Option<String> {
    let zh_to_en = match (from, to) {
        (Language::Chinese, Language::English) => true,
        (Language::English, Language::Chinese) => false,
        _ => return None,
    };
    let mut pairs: Vec<(&str, &str)> = GLOSSARY
        .iter()
        .filter_map(|r| r.replacements.first().map(|en| if zh_to_en { (r.term, *en) } else { (*en, r.term) }))
        .collect();
    pairs.sort_by_key(|(src, _)| std::cmp::Reverse(src.chars().count()));

    let mut rest = query.to_string();
    let mut found: Vec<(usize, &str)> = Vec::new();
    for (src, dst) in pairs {
        while let Some(pos) = find_term(&rest, src) {
            found.push((pos, dst));
            rest.replace_range(pos..pos + src.len(), &" ".repeat(src.len()));
        }
    }
    if found.is_empty() {
        return None;
    }
    found.sort_by_key(|(pos, _)| *pos);
    let mut words: Vec<&str> = Vec::with_capacity(found.len());
    for (_, w) in found {
        if !words.contains(&w) {
            words.push(w);
        }
    }
    Some(words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::language::ScriptLanguageDetector;

    fn expander(max: usize) -> QueryExpander {
        QueryExpander::new(max, Arc::new(ScriptLanguageDetector::default()))
    }

    #[test]
    fn normalize_strips_boilerplate_and_punctuation() {
        assert_eq!(normalize("How do I request leave?"), "request leave");
        assert_eq!(normalize("请问如何申请年假？"), "申请年假");
        assert_eq!(normalize("可以远程办公吗？"), "可以远程办公");
        assert_eq!(normalize("Howard's policy"), "Howard's policy");
        assert_eq!(normalize("how do I?"), "");
    }

    #[test]
    fn original_query_always_first() {
        let e = expander(5).expand("How do I request leave?", Language::English);
        assert_eq!(e.language, Language::English);
        assert_eq!(e.variants[0], "How do I request leave?");
        assert_eq!(e.variants[1], "request leave");
        assert!(e.variants.contains(&"request vacation".to_string()));
        assert!(e.variants.len() <= 5);
    }

    #[test]
    fn cross_language_variant_for_chinese_corpus() {
        let e = expander(5).expand("How do I request annual leave?", Language::Chinese);
        assert_eq!(e.variants[2], "申请 年假");
    }

    #[test]
    fn cross_language_variant_for_english_corpus() {
        let e = expander(5).expand("如何申请病假", Language::English);
        assert_eq!(e.language, Language::Chinese);
        assert_eq!(e.variants[1], "申请病假");
        assert_eq!(e.variants[2], "request sick leave");
    }

    #[test]
    fn same_language_skips_translation() {
        let e = expander(5).expand("parking permit", Language::English);
        assert_eq!(e.variants, vec!["parking permit".to_string()]);
    }

    #[test]
    fn variants_are_deduplicated_and_capped() {
        let e = expander(2).expand("请假流程", Language::Chinese);
        assert_eq!(e.variants.len(), 2);
        assert_eq!(e.variants[0], "请假流程");
        let unique: HashSet<_> = e.variants.iter().collect();
        assert_eq!(unique.len(), e.variants.len());
    }

    #[test]
    fn ascii_terms_respect_word_boundaries() {
        assert_eq!(find_term("leaves policy", "leave"), None);
        assert_eq!(find_term("Sick Leave", "leave"), Some(5));
        assert!(synonym_variants("Customer email").contains(&"client email".to_string()));
    }
}
