use crate::error::{PipelineError, Result};

/// Queue capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 10;

/// Startup options the orchestrator reads once when wiring a pipeline.
///
/// Covers the queue capacity shared by both hand-off queues, an optional cap
/// on how many items the source and transform stages handle, and a free-form
/// identifier for the data source used in logs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    capacity: usize,
    max_items: Option<u64>,
    source: String,
}

impl PipelineConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_items: None,
            source: source.into(),
        }
    }

    /// Set the capacity of both hand-off queues
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Cap how many items the source produces and the transform processes.
    /// Unset means unbounded.
    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_items(&self) -> Option<u64> {
        self.max_items
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fail fast on invalid options
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PipelineError::InvalidCapacity);
        }
        if self.max_items == Some(0) {
            return Err(PipelineError::InvalidMaxItems);
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new("source")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.capacity(), DEFAULT_CAPACITY);
        assert_eq!(config.max_items(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PipelineConfig::new("clip.mp4").with_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_zero_max_items_rejected() {
        let config = PipelineConfig::new("clip.mp4").with_max_items(0);
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidMaxItems)
        ));
    }

    #[test]
    fn test_builder_round_trip() {
        let config = PipelineConfig::new("clip.mp4")
            .with_capacity(2)
            .with_max_items(72);
        assert_eq!(config.capacity(), 2);
        assert_eq!(config.max_items(), Some(72));
        assert_eq!(config.source(), "clip.mp4");
        assert!(config.validate().is_ok());
    }
}
