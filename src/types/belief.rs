//! Belief system records
//!
//! A belief system is the static worldview of one NPC: three weighted
//! categories plus free-text interaction hints. Loaded once, never mutated.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Strength used when a YAML entry omits it
pub const DEFAULT_STRENGTH: f64 = 0.5;

/// Placeholder for unknown summary fields
pub const UNKNOWN: &str = "未知";

/// Maximum characters kept per summary line
const SUMMARY_MAX_CHARS: usize = 50;

/// One weighted belief
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefEntry {
    #[serde(default)]
    pub description: String,
    /// 0.0-1.0, higher means held more firmly
    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_strength() -> f64 {
    DEFAULT_STRENGTH
}

impl BeliefEntry {
    pub fn new(description: impl Into<String>, strength: f64) -> Self {
        Self {
            description: description.into(),
            strength,
        }
    }
}

/// The three belief categories, in prompt order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeliefCategory {
    Worldview,
    Selfview,
    Values,
}

impl BeliefCategory {
    /// Rendering order used by the compiler
    pub const ALL: [BeliefCategory; 3] = [
        BeliefCategory::Worldview,
        BeliefCategory::Selfview,
        BeliefCategory::Values,
    ];

    /// Section heading inside the compiled prompt
    pub fn heading(&self) -> &'static str {
        match self {
            BeliefCategory::Worldview => "## 世界观信念",
            BeliefCategory::Selfview => "## 自我认知信念",
            BeliefCategory::Values => "## 价值观信念",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            BeliefCategory::Worldview => "worldview",
            BeliefCategory::Selfview => "selfview",
            BeliefCategory::Values => "values",
        }
    }
}

/// Free-text style hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionPatterns {
    pub greeting_style: Option<String>,
    pub conflict_resolution: Option<String>,
    pub information_sharing: Option<String>,
    pub personal_boundaries: Option<String>,
}

impl InteractionPatterns {
    /// (label, value) lines with defaults filled in
    pub fn lines(&self) -> [(&'static str, &str); 4] {
        [
            ("问候风格", self.greeting_style.as_deref().unwrap_or("自然友善")),
            ("冲突解决", self.conflict_resolution.as_deref().unwrap_or("寻求和谐")),
            ("信息分享", self.information_sharing.as_deref().unwrap_or("开放透明")),
            ("个人边界", self.personal_boundaries.as_deref().unwrap_or("适度保护")),
        ]
    }
}

/// Why a belief record cannot be compiled
#[derive(Debug, Clone, PartialEq)]
pub enum BeliefDefect {
    EmptyName,
    NoBeliefs,
    StrengthOutOfRange { category: BeliefCategory, name: String, strength: f64 },
}

impl std::fmt::Display for BeliefDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeliefDefect::EmptyName => write!(f, "character name is empty"),
            BeliefDefect::NoBeliefs => write!(f, "no beliefs in any category"),
            BeliefDefect::StrengthOutOfRange { category, name, strength } => write!(
                f,
                "{}.{} has strength {} outside [0, 1]",
                category.key(),
                name,
                strength
            ),
        }
    }
}

/// Complete belief record for one NPC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefSystem {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub core_motivation: Option<String>,
    #[serde(default)]
    pub worldview: IndexMap<String, BeliefEntry>,
    #[serde(default)]
    pub selfview: IndexMap<String, BeliefEntry>,
    #[serde(default)]
    pub values: IndexMap<String, BeliefEntry>,
    #[serde(default)]
    pub interaction_patterns: InteractionPatterns,
}

/// Strongest belief per category, for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefSummary {
    pub worldview: String,
    pub selfview: String,
    pub values: String,
}

impl BeliefSummary {
    pub fn unknown() -> Self {
        Self {
            worldview: UNKNOWN.to_string(),
            selfview: UNKNOWN.to_string(),
            values: UNKNOWN.to_string(),
        }
    }
}

impl BeliefSystem {
    /// Empty record with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            core_motivation: None,
            worldview: IndexMap::new(),
            selfview: IndexMap::new(),
            values: IndexMap::new(),
            interaction_patterns: InteractionPatterns::default(),
        }
    }

    /// Add one belief, replacing any with the same name
    pub fn with_belief(
        mut self,
        category: BeliefCategory,
        name: impl Into<String>,
        description: impl Into<String>,
        strength: f64,
    ) -> Self {
        self.category_mut(category)
            .insert(name.into(), BeliefEntry::new(description, strength));
        self
    }

    pub fn category(&self, category: BeliefCategory) -> &IndexMap<String, BeliefEntry> {
        match category {
            BeliefCategory::Worldview => &self.worldview,
            BeliefCategory::Selfview => &self.selfview,
            BeliefCategory::Values => &self.values,
        }
    }

    fn category_mut(&mut self, category: BeliefCategory) -> &mut IndexMap<String, BeliefEntry> {
        match category {
            BeliefCategory::Worldview => &mut self.worldview,
            BeliefCategory::Selfview => &mut self.selfview,
            BeliefCategory::Values => &mut self.values,
        }
    }

    /// Total number of beliefs across categories
    pub fn belief_count(&self) -> usize {
        self.worldview.len() + self.selfview.len() + self.values.len()
    }

    /// Check the record can be compiled
    pub fn validate(&self) -> Result<(), BeliefDefect> {
        if self.name.trim().is_empty() {
            return Err(BeliefDefect::EmptyName);
        }
        if self.belief_count() == 0 {
            return Err(BeliefDefect::NoBeliefs);
        }
        for category in BeliefCategory::ALL {
            for (name, entry) in self.category(category) {
                // NaN fails the range check too
                if !(0.0..=1.0).contains(&entry.strength) {
                    return Err(BeliefDefect::StrengthOutOfRange {
                        category,
                        name: name.clone(),
                        strength: entry.strength,
                    });
                }
            }
        }
        Ok(())
    }

    /// Strongest belief description per category, truncated
    pub fn summary(&self) -> BeliefSummary {
        BeliefSummary {
            worldview: strongest(&self.worldview),
            selfview: strongest(&self.selfview),
            values: strongest(&self.values),
        }
    }
}

fn strongest(beliefs: &IndexMap<String, BeliefEntry>) -> String {
    // First entry wins ties, matching declaration order
    let best = beliefs.values().fold(None::<&BeliefEntry>, |best, entry| match best {
        Some(b) if b.strength >= entry.strength => Some(b),
        _ => Some(entry),
    });

    match best {
        Some(entry) if !entry.description.is_empty() => truncate_chars(&entry.description, SUMMARY_MAX_CHARS),
        _ => UNKNOWN.to_string(),
    }
}

/// Char-safe truncation with a trailing ellipsis
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> BeliefSystem {
        BeliefSystem::named("艾尔文")
            .with_belief(BeliefCategory::Worldview, "秩序至上", "没有秩序，港口就会陷入混乱", 0.9)
            .with_belief(BeliefCategory::Worldview, "外来者可疑", "陌生人往往带来麻烦", 0.6)
            .with_belief(BeliefCategory::Selfview, "守护者", "我是这座港口的守护者", 0.8)
            .with_belief(BeliefCategory::Values, "忠诚", "对领主的忠诚高于一切", 0.95)
    }

    #[test]
    fn test_valid_record() {
        assert_eq!(guard().validate(), Ok(()));
        assert_eq!(guard().belief_count(), 4);
    }

    #[test]
    fn test_empty_name_is_defect() {
        let mut belief = guard();
        belief.name = "  ".to_string();
        assert_eq!(belief.validate(), Err(BeliefDefect::EmptyName));
    }

    #[test]
    fn test_no_beliefs_is_defect() {
        assert_eq!(BeliefSystem::named("空").validate(), Err(BeliefDefect::NoBeliefs));
    }

    #[test]
    fn test_strength_out_of_range() {
        let belief = guard().with_belief(BeliefCategory::Values, "贪婪", "金币最重要", 1.4);
        assert!(matches!(
            belief.validate(),
            Err(BeliefDefect::StrengthOutOfRange { category: BeliefCategory::Values, .. })
        ));

        let nan = guard().with_belief(BeliefCategory::Selfview, "迷失", "不知道自己是谁", f64::NAN);
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_summary_picks_strongest() {
        let summary = guard().summary();
        assert_eq!(summary.worldview, "没有秩序，港口就会陷入混乱");
        assert_eq!(summary.values, "对领主的忠诚高于一切");
    }

    #[test]
    fn test_summary_unknown_for_empty_category() {
        let belief = BeliefSystem::named("旅人")
            .with_belief(BeliefCategory::Worldview, "自由", "世界很大", 0.7);
        let summary = belief.summary();
        assert_eq!(summary.selfview, UNKNOWN);
        assert_eq!(summary.values, UNKNOWN);
    }

    #[test]
    fn test_summary_truncates_long_descriptions() {
        let long = "长".repeat(80);
        let belief = BeliefSystem::named("话痨")
            .with_belief(BeliefCategory::Worldview, "啰嗦", long.as_str(), 0.5);
        let summary = belief.summary();
        assert_eq!(summary.worldview.chars().count(), SUMMARY_MAX_CHARS + 3);
        assert!(summary.worldview.ends_with("..."));
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
name: 卡琳
worldview:
  漂泊:
    description: 没有永远的家
selfview: {}
"#;
        let belief: BeliefSystem = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(belief.worldview["漂泊"].strength, DEFAULT_STRENGTH);
        assert!(belief.values.is_empty());
        assert_eq!(belief.interaction_patterns.lines()[0].1, "自然友善");
    }
}
