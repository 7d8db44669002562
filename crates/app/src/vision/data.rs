use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

/// A detector label and the name its count is reported under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub label: String,
    pub display: String,
}

impl FromStr for Category {
    type Err = anyhow::Error;

    /// Parse `label=Display`, e.g. `bird=Birds`.
    fn from_str(value: &str) -> Result<Self> {
        let (label, display) = value
            .split_once('=')
            .ok_or_else(|| anyhow!("category {value:?} must look like label=Display"))?;
        let (label, display) = (label.trim(), display.trim());
        if label.is_empty() || display.is_empty() {
            bail!("category {value:?} must look like label=Display");
        }
        Ok(Self {
            label: label.to_string(),
            display: display.to_string(),
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.label, self.display)
    }
}

/// The fixed set of categories counted per analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategorySet {
    categories: Vec<Category>,
}

impl CategorySet {
    pub fn new(categories: Vec<Category>) -> Result<Self> {
        if categories.is_empty() {
            bail!("at least one category is required");
        }
        for (index, category) in categories.iter().enumerate() {
            let duplicate = categories[..index]
                .iter()
                .any(|c| c.label == category.label || c.display == category.display);
            if duplicate {
                bail!("category {category} is listed twice");
            }
        }
        Ok(Self { categories })
    }

    /// Display name for a detector label, matched exactly.
    pub fn display_for(&self, label: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.display.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            categories: vec![
                Category {
                    label: "bird".into(),
                    display: "Birds".into(),
                },
                Category {
                    label: "person".into(),
                    display: "Persons".into(),
                },
            ],
        }
    }
}

/// Per-category counts from one analysis run.
///
/// Always carries every category of the set it was built from, so viewers see
/// zeros rather than missing keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DetectionCounts(BTreeMap<String, u32>);

impl DetectionCounts {
    pub fn zeroed(categories: &CategorySet) -> Self {
        Self(
            categories
                .iter()
                .map(|c| (c.display.clone(), 0))
                .collect(),
        )
    }

    pub(crate) fn increment(&mut self, display: &str) {
        if let Some(count) = self.0.get_mut(display) {
            *count = count.saturating_add(1);
        }
    }

    #[cfg(test)]
    pub fn get(&self, display: &str) -> Option<u32> {
        self.0.get(display).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Single-line summary such as `Birds: 1 Persons: 0`.
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a published frame shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Upstream frame forwarded without analysis.
    Live,
    /// Upstream frame with detections and counts drawn on it.
    Annotated,
    /// Synthetic frame explaining why no upstream frame is available.
    Placeholder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing() {
        let category: Category = "bird=Birds".parse().unwrap();
        assert_eq!(category.label, "bird");
        assert_eq!(category.display, "Birds");
        assert!("bird".parse::<Category>().is_err());
        assert!("=Birds".parse::<Category>().is_err());
    }

    #[test]
    fn duplicate_categories_are_rejected() {
        let bird: Category = "bird=Birds".parse().unwrap();
        assert!(CategorySet::new(vec![bird.clone(), bird]).is_err());
        assert!(CategorySet::new(Vec::new()).is_err());
    }

    #[test]
    fn default_counts_serialize_as_flat_map() {
        let counts = DetectionCounts::zeroed(&CategorySet::default());
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json, serde_json::json!({"Birds": 0, "Persons": 0}));
        assert_eq!(counts.summary(), "Birds: 0 Persons: 0");
    }

    #[test]
    fn increment_ignores_unknown_names() {
        let mut counts = DetectionCounts::zeroed(&CategorySet::default());
        counts.increment("Birds");
        counts.increment("Dogs");
        assert_eq!(counts.get("Birds"), Some(1));
        assert_eq!(counts.get("Dogs"), None);
    }
}
