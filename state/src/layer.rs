//! Layer service (§4.11): current/next layer singletons backed by the
//! duplicate-suppressing bounded history in [`domain::layer`].

use domain::layer::{Layer, LayerHistory, DEFAULT_LAYER_HISTORY};

pub struct LayerService {
    current: Option<Layer>,
    next: Option<Layer>,
    history: LayerHistory,
}

impl Default for LayerService {
    fn default() -> Self {
        Self::new(DEFAULT_LAYER_HISTORY)
    }
}

impl LayerService {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            current: None,
            next: None,
            history: LayerHistory::new(history_capacity),
        }
    }

    pub fn current(&self) -> Option<&Layer> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&Layer> {
        self.next.as_ref()
    }

    pub fn set_current(&mut self, layer: Layer) {
        self.history.push(layer.clone());
        self.current = Some(layer);
    }

    pub fn set_next(&mut self, layer: Layer) {
        self.next = Some(layer);
    }

    pub fn recent(&self) -> impl Iterator<Item = &Layer> {
        self.history.recent()
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
            version: None,
        }
    }

    #[test]
    fn tracks_current_and_next_and_records_history() {
        let mut service = LayerService::default();
        service.set_next(layer("Narva"));
        service.set_current(layer("Mutaha"));
        assert_eq!(service.next().unwrap().name, "Narva");
        assert_eq!(service.current().unwrap().name, "Mutaha");
        assert_eq!(service.recent().count(), 1);
    }
}
