//! Character-class language detection.
//!
//! Good enough to tell CJK queries from Latin-script ones and to spot the
//! accented letters of Spanish and French. Anything finer belongs to a real
//! language-identification model behind the `LanguageDetector` trait.

use tracing::debug;

use crate::traits::LanguageDetector;
use crate::types::Language;

const SPANISH_MARKERS: &[char] = &['ñ', 'á', 'é', 'í', 'ó', 'ú', 'ü', '¿', '¡'];
const FRENCH_MARKERS: &[char] = &['à', 'â', 'ä', 'é', 'è', 'ê', 'ë', 'ï', 'î', 'ô', 'ù', 'û', 'ü', 'ÿ', 'ç'];

/// CJK Unified Ideographs plus extensions A–E and compatibility ideographs.
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0xF900..=0xFAFF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
    )
}

#[derive(Debug, Clone)]
pub struct ScriptLanguageDetector {
    /// Minimum share of CJK characters for a text to count as Chinese.
    threshold: f32,
}

impl Default for ScriptLanguageDetector {
    fn default() -> Self {
        Self { threshold: 0.3 }
    }
}

impl ScriptLanguageDetector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Majority language over a set of tags, ignoring `Unknown`/`Mixed`.
    /// Ties go to the language that sorts first, so the answer is stable.
    pub fn dominant<I>(languages: I) -> Language
    where
        I: IntoIterator<Item = Language>,
    {
        let mut counts: std::collections::BTreeMap<Language, usize> = std::collections::BTreeMap::new();
        for lang in languages.into_iter().filter(|l| l.is_definite()) {
            *counts.entry(lang).or_default() += 1;
        }
        counts
            .into_iter()
            .fold(None::<(Language, usize)>, |best, (lang, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((lang, n)),
            })
            .map(|(lang, _)| lang)
            .unwrap_or(Language::Unknown)
    }
}

impl LanguageDetector for ScriptLanguageDetector {
    fn detect(&self, text: &str) -> Language {
        let text = text.trim();
        if text.is_empty() {
            return Language::Unknown;
        }

        let total = text.chars().count() as f32;
        let mut cjk = 0usize;
        let mut spanish = 0usize;
        let mut french = 0usize;
        let mut alphabetic = 0usize;
        for c in text.chars() {
            if is_cjk(c) {
                cjk += 1;
                continue;
            }
            let lower = c.to_lowercase().next().unwrap_or(c);
            if SPANISH_MARKERS.contains(&lower) {
                spanish += 1;
            }
            if FRENCH_MARKERS.contains(&lower) {
                french += 1;
            }
            if c.is_alphabetic() {
                alphabetic += 1;
            }
        }

        let cjk_ratio = cjk as f32 / total;
        if cjk_ratio >= self.threshold {
            debug!(ratio = cjk_ratio, "detected Chinese");
            return Language::Chinese;
        }
        if cjk_ratio > 0.05 && (spanish > 0 || french > 0) {
            return Language::Mixed;
        }
        if spanish > 0 && spanish >= french {
            return Language::Spanish;
        }
        if french > 0 {
            return Language::French;
        }
        if alphabetic > 0 || cjk > 0 {
            return Language::English;
        }
        Language::Unknown
    }
}
