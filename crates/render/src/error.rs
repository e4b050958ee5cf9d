//! Render error taxonomy
//!
//! Most of these are recoverable: the engine converts them into a degraded
//! render (flat paper, no blend passes) instead of surfacing them. Only a
//! failure to obtain any drawing surface reaches the caller.

use std::time::Duration;

/// Errors produced while preparing or compositing a page
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A surface or texture buffer could not be created
    #[error("failed to allocate {width}x{height} surface: {reason}")]
    AllocationFailure {
        width: u32,
        height: u32,
        reason: String,
    },

    /// A paper texture could not be decoded
    #[error("paper texture '{template_id}' failed to load: {reason}")]
    TextureLoad { template_id: String, reason: String },

    /// A paper texture did not load within the allotted time
    #[error("paper texture load timed out after {0:?}")]
    RenderTimeout(Duration),

    /// The engine is shedding load because memory is critically low
    #[error("memory pressure is critical")]
    MemoryCritical,

    /// Compositing failed part way through a page
    #[error("composite failed: {0}")]
    Composite(String),
}

impl RenderError {
    /// Returns true if the engine can fall back to a simplified render
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RenderError::AllocationFailure { .. })
    }
}

/// Result alias for render operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_failure_is_not_recoverable() {
        let err = RenderError::AllocationFailure {
            width: 0,
            height: 0,
            reason: "empty".into(),
        };
        assert!(!err.is_recoverable());
        assert!(RenderError::Composite("bad glyph".into()).is_recoverable());
        assert!(RenderError::RenderTimeout(Duration::from_secs(3)).is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = RenderError::TextureLoad {
            template_id: "kraft".into(),
            reason: "missing file".into(),
        };
        assert_eq!(
            err.to_string(),
            "paper texture 'kraft' failed to load: missing file"
        );
    }
}
