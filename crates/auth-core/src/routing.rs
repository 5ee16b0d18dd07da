//! Navigation side effects

/// Performs navigation on behalf of the orchestration layer
pub trait Router: Send + Sync {
    fn execute_redirect(&self, path: &str);
}
