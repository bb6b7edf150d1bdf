//! Job presets - named commands declared in the config file

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

/// A named command the user can start without typing it out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Job name the preset runs under
    pub name: String,
    /// Short alias (e.g., "tb" for tensorboard)
    pub shortcut: Option<String>,
    /// Shell command
    pub command: String,
    /// Working directory (supports ~ expansion)
    #[serde(default)]
    pub cwd: Option<String>,
    /// Start when `lpjobs run` starts
    #[serde(default)]
    pub autostart: bool,
}

impl Preset {
    pub(crate) fn expand_paths(&mut self) {
        self.cwd = self.cwd.as_deref().map(expand_tilde);
    }
}

/// Lookup over the configured presets
pub struct PresetManager {
    presets: Vec<Preset>,
    matcher: SkimMatcherV2,
}

impl PresetManager {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self {
            presets,
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Get all presets
    pub fn all(&self) -> &[Preset] {
        &self.presets
    }

    /// Presets marked `autostart`
    pub fn autostart(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter().filter(|p| p.autostart)
    }

    /// Find preset by exact name
    pub fn find_by_name(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// Find preset by shortcut
    pub fn find_by_shortcut(&self, shortcut: &str) -> Option<&Preset> {
        self.presets
            .iter()
            .find(|p| p.shortcut.as_deref() == Some(shortcut))
    }

    /// Exact name, then exact shortcut, then best fuzzy match
    pub fn resolve(&self, query: &str) -> Option<&Preset> {
        self.find_by_name(query)
            .or_else(|| self.find_by_shortcut(query))
            .or_else(|| self.fuzzy_search(query).first().map(|(p, _)| *p))
    }

    /// Fuzzy search presets by query (matches name and shortcut)
    pub fn fuzzy_search(&self, query: &str) -> Vec<(&Preset, i64)> {
        if query.is_empty() {
            return self.presets.iter().map(|p| (p, 0i64)).collect();
        }

        let mut results: Vec<(&Preset, i64)> = self
            .presets
            .iter()
            .filter_map(|preset| {
                let name_score = self.matcher.fuzzy_match(&preset.name, query);
                let shortcut_score = preset
                    .shortcut
                    .as_ref()
                    .and_then(|s| self.matcher.fuzzy_match(s, query));

                name_score.max(shortcut_score).map(|score| (preset, score))
            })
            .collect();

        // Sort by score descending
        results.sort_by(|a, b| b.1.cmp(&a.1));
        results
    }
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(name: &str, shortcut: Option<&str>) -> Preset {
        Preset {
            name: name.to_string(),
            shortcut: shortcut.map(str::to_string),
            command: format!("echo {name}"),
            cwd: None,
            autostart: false,
        }
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_tilde("~/outputs"),
            home.join("outputs").to_string_lossy()
        );
        assert_eq!(expand_tilde("~"), home.to_string_lossy());
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
        assert_eq!(expand_tilde("rel/~/path"), "rel/~/path");
    }

    #[test]
    fn test_resolve_prefers_exact_matches() {
        let manager = PresetManager::new(vec![
            preset("tensorboard", Some("tb")),
            preset("train", Some("t")),
            preset("predict", None),
        ]);

        assert_eq!(manager.resolve("train").unwrap().name, "train");
        assert_eq!(manager.resolve("tb").unwrap().name, "tensorboard");
        assert_eq!(manager.resolve("prd").unwrap().name, "predict");
        assert!(manager.resolve("zzz").is_none());
    }

    #[test]
    fn test_fuzzy_search_sorted_by_score() {
        let manager = PresetManager::new(vec![preset("predict", None), preset("tensorboard", None)]);

        let results = manager.fuzzy_search("tens");
        assert_eq!(results[0].0.name, "tensorboard");
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }

        assert_eq!(manager.fuzzy_search("").len(), 2);
    }
}
