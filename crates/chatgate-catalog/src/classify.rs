use once_cell::sync::Lazy;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel category for identifiers no rule matches.
pub const OTHER_CATEGORY: &str = "Other";

/// One classification rule: a display category and a `|`-separated list of
/// substrings matched case-insensitively against model identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub name: String,
    pub pattern: String,
}

impl CategoryRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    fn matches(&self, lowered_id: &str) -> bool {
        self.pattern
            .split('|')
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .any(|needle| lowered_id.contains(&needle.to_lowercase()))
    }
}

/// Ordered rule list. First matching rule wins; classification is a pure
/// function of the identifier and the rules, with no fallback state.
///
/// Serialized as a JSON object (category -> pattern) to stay compatible with
/// the persisted browser format; insertion order is the iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
}

impl CategoryRules {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, model_id: &str) -> &str {
        let lowered = model_id.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.name.as_str())
            .unwrap_or(OTHER_CATEGORY)
    }

    /// Update an existing category's pattern, or append a new rule.
    pub fn set(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        let name = name.into();
        let pattern = pattern.into();
        match self.rules.iter_mut().find(|rule| rule.name == name) {
            Some(rule) => rule.pattern = pattern,
            None => self.rules.push(CategoryRule::new(name, pattern)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Serialize for CategoryRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for rule in &self.rules {
            map.serialize_entry(&rule.name, &rule.pattern)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = CategoryRules;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of category name to pattern")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut rules = Vec::new();
                while let Some((name, pattern)) = access.next_entry::<String, String>()? {
                    rules.push(CategoryRule::new(name, pattern));
                }
                Ok(CategoryRules::new(rules))
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

static DEFAULT_RULES: Lazy<CategoryRules> = Lazy::new(|| {
    CategoryRules::new(vec![
        CategoryRule::new("ChatGPT", "gpt|o1|o3|o4|chatgpt|davinci"),
        CategoryRule::new("Claude", "claude"),
        CategoryRule::new("Gemini", "gemini|gemma|palm"),
        CategoryRule::new("DeepSeek", "deepseek"),
        CategoryRule::new("Grok", "grok"),
        CategoryRule::new("Qwen", "qwen|qwq"),
        CategoryRule::new("Llama", "llama"),
        CategoryRule::new("Mistral", "mistral|mixtral|codestral"),
    ])
});

/// Built-in system category patterns, used until the user overrides them.
pub fn default_rules() -> CategoryRules {
    DEFAULT_RULES.clone()
}
