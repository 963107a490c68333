use serde::{Deserialize, Serialize};

/// Static description of a renderer, as announced by the host in `update-renderers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererDescriptor {
    pub id: String,
    /// Module uri handed to the [`ModuleLoader`](super::ModuleLoader).
    pub entrypoint: String,
    #[serde(default)]
    pub mime_types: Vec<String>,
    /// Whether the renderer gets a messaging channel to the host.
    #[serde(default)]
    pub messaging: bool,
    /// Id of the renderer this one extends. Extending renderers are never picked by mime type.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub is_builtin: bool,
}

impl RendererDescriptor {
    pub fn new(id: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entrypoint: entrypoint.into(),
            mime_types: vec![],
            messaging: false,
            extends: None,
            is_builtin: false,
        }
    }

    pub fn with_mime_types<I, S>(mut self, mimes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = mimes.into_iter().map(Into::into).collect();
        self
    }

    pub fn extending(mut self, id: impl Into<String>) -> Self {
        self.extends = Some(id.into());
        self
    }

    pub fn with_messaging(mut self, on: bool) -> Self {
        self.messaging = on;
        self
    }

    pub fn builtin(mut self) -> Self {
        self.is_builtin = true;
        self
    }

    pub fn supports_mime(&self, mime: &str) -> bool {
        self.mime_types.iter().any(|m| m == mime)
    }

    /// Two descriptors are equivalent when replacing one by the other would not change how
    /// the renderer is loaded or picked. `is_builtin` does not take part.
    pub fn is_equivalent(&self, other: &RendererDescriptor) -> bool {
        self.id == other.id
            && self.entrypoint == other.entrypoint
            && self.extends == other.extends
            && self.messaging == other.messaging
            && self.mime_types == other.mime_types
    }
}
