/// Errors returned by the runtime itself (not by renderers).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Runtime is already running")]
    AlreadyRunning,

    #[error("Message channel closed")]
    ChannelClosed,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Module loader error: {0}")]
    Loader(#[from] LoaderError),
}

/// Errors a renderer returns from `render_output_item`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// The renderer declines this representation; the registry tries the next mime type.
    #[error("renderer requested fallback")]
    Fallback,

    #[error("rendering cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl RenderError {
    pub fn failed(msg: impl Into<String>) -> Self {
        RenderError::Failed(msg.into())
    }
}

/// Activation failures. Cloneable so activation results can be memoized and shared
/// between every task that waits on the same renderer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActivationError {
    #[error("No renderer registered with id '{0}'")]
    UnknownRenderer(String),

    #[error("Error loading renderer '{renderer_id}': {message}")]
    Import { renderer_id: String, message: String },

    #[error("Error activating renderer '{renderer_id}': {message}")]
    Activate { renderer_id: String, message: String },
}

/// A failed kernel preload. Captured as a value and never thrown across the preload barrier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreloadError {
    #[error("Preload not ready: {0}")]
    NotRequested(String),

    #[error("Error loading preload '{uri}': {message}")]
    Failed { uri: String, message: String },
}

/// Errors from a [`ModuleLoader`](crate::renderer::ModuleLoader).
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Invalid module uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Module not found: {0}")]
    NotFound(String),
}

/// Validation errors for [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("channel_capacity must be at least 1")]
    ZeroChannelCapacity,

    #[error("content_epsilon {0} is out of range (expected 0.0..=16.0)")]
    InvalidEpsilon(f32),

    #[error("line_height must be positive, got {0}")]
    InvalidLineHeight(f32),

    #[error("padding must not be negative")]
    NegativePadding,

    #[error("frame_interval must be non-zero")]
    ZeroFrameInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_error_names_renderer() {
        let e = ActivationError::Import {
            renderer_id: "r1".into(),
            message: "boom".into(),
        };
        assert_eq!(e.to_string(), "Error loading renderer 'r1': boom");
    }

    #[test]
    fn preload_error_is_value_comparable() {
        let a = PreloadError::NotRequested("x".into());
        assert_eq!(a.clone(), a);
        assert_eq!(a.to_string(), "Preload not ready: x");
    }

    #[test]
    fn config_error_converts_into_runtime_error() {
        let e: RuntimeError = ConfigError::ZeroChannelCapacity.into();
        assert!(matches!(e, RuntimeError::Config(ConfigError::ZeroChannelCapacity)));
    }
}
