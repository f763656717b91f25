//! Layer entity (§3): the current map/game-mode variant, plus a bounded
//! history of recent layers.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub name: String,
    pub level: String,
    pub game_mode: String,
    pub version: Option<String>,
}

/// Default retained history length (§3: "a bounded history of recent
/// layers is retained (default 10)").
pub const DEFAULT_LAYER_HISTORY: usize = 10;

/// Current/next singletons plus a duplicate-suppressing bounded history.
#[derive(Debug, Default)]
pub struct LayerHistory {
    capacity: usize,
    entries: VecDeque<Layer>,
}

impl LayerHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Pushes a layer onto the history, skipping consecutive duplicates
    /// (§4.11: "Layer service ... duplicate suppression") and evicting the
    /// oldest entry once over capacity.
    pub fn push(&mut self, layer: Layer) {
        if self.entries.back() == Some(&layer) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(layer);
    }

    pub fn recent(&self) -> impl Iterator<Item = &Layer> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            name: String::new(),
            level: String::new(),
            game_mode: String::new(),
            version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str) -> Layer {
        Layer {
            name: name.to_string(),
            level: name.to_string(),
            game_mode: "RAAS".to_string(),
            version: Some("v1".to_string()),
        }
    }

    #[test]
    fn suppresses_consecutive_duplicates() {
        let mut history = LayerHistory::new(3);
        history.push(layer("Narva"));
        history.push(layer("Narva"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn evicts_oldest_over_capacity() {
        let mut history = LayerHistory::new(2);
        history.push(layer("A"));
        history.push(layer("B"));
        history.push(layer("C"));
        let names: Vec<_> = history.recent().map(|l| l.name.clone()).collect();
        assert_eq!(names, vec!["C".to_string(), "B".to_string()]);
    }
}
