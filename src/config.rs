//! Runtime configuration.
//!
//! `RuntimeConfig` controls layout constants, timing and platform capabilities of an
//! [`OutputRuntime`](crate::OutputRuntime). It provides sensible defaults via
//! [`Default`], a fluent [`RuntimeConfig::builder()`] with validation, and JSON
//! deserialization for hosts that ship their settings as a document.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use output_runtime::config::RuntimeConfig;
//! let cfg = RuntimeConfig::default();
//! assert_eq!(cfg.output_node_padding, 8.0);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use output_runtime::config::RuntimeConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = RuntimeConfig::builder()
//!     .native_highlights(false)
//!     .workspace_trusted(true)
//!     .resize_debounce_ms(100)
//!     .build()?;
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `channel_capacity`: capacity of the host command queue and event bus (default: 256).
//! - `output_node_padding` / `output_node_left_padding`: padding applied to outputs with content.
//! - `content_epsilon`: content heights at or below this count as empty (default: 2.1, one border pixel each side).
//! - `resize_debounce_ms`: debounce for `outputResized` notifications (default: 250).
//! - `frame_interval_ms`: animation frame period (default: 16).
//! - `idle_timeout_ms`: upper bound before idle-deferred output work runs anyway (default: 100).
//! - `line_height`: layout line height for text nodes (default: 18).
//! - `capabilities`: what the host platform supports (native highlight layers).
//! - `workspace_trusted`: exposed to renderers and preloads.
//! - `renderer_debug_logging`: forward renderer debug logs to the host.
//! - `renderer_settings`: initial settings handed to renderers.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Log verbosity, mapped onto the `log` crate's level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Capabilities of the platform hosting the surface. Probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformCapabilities {
    /// The platform can paint highlight ranges without mutating the node tree.
    pub native_highlights: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            native_highlights: true,
        }
    }
}

/// Read-only settings renderers see through their context. Updated by `notebook-options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererSettings {
    /// Maximum number of text lines a text output shows before truncation.
    pub line_limit: usize,
    /// Scroll long outputs instead of truncating them.
    pub output_scrolling: bool,
    /// Soft-wrap long output lines.
    pub output_word_wrap: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            line_limit: 30,
            output_scrolling: false,
            output_word_wrap: false,
        }
    }
}

/// Notebook-wide presentation options sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotebookOptions {
    pub drag_and_drop_enabled: bool,
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            drag_and_drop_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub channel_capacity: usize,
    pub output_node_padding: f32,
    pub output_node_left_padding: f32,
    pub content_epsilon: f32,
    pub resize_debounce_ms: u64,
    pub frame_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub line_height: f32,
    pub capabilities: PlatformCapabilities,
    pub workspace_trusted: bool,
    pub renderer_debug_logging: bool,
    pub log_level: LogLevel,
    pub renderer_settings: RendererSettings,
    pub notebook_options: NotebookOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
            output_node_padding: 8.0,
            output_node_left_padding: 8.0,
            content_epsilon: 2.1,
            resize_debounce_ms: 250,
            frame_interval_ms: 16,
            idle_timeout_ms: 100,
            line_height: 18.0,
            capabilities: PlatformCapabilities::default(),
            workspace_trusted: false,
            renderer_debug_logging: false,
            log_level: LogLevel::default(),
            renderer_settings: RendererSettings::default(),
            notebook_options: NotebookOptions::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, crate::errors::RuntimeError> {
        let cfg: RuntimeConfig = serde_json::from_str(json)?;
        validate(&cfg)?;
        Ok(cfg)
    }

    #[inline]
    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    #[inline]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    inner: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut RuntimeConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn channel_capacity(self, n: usize) -> Self { self.map(|c| c.channel_capacity = n) }
    pub fn output_node_padding(self, px: f32) -> Self { self.map(|c| c.output_node_padding = px) }
    pub fn output_node_left_padding(self, px: f32) -> Self { self.map(|c| c.output_node_left_padding = px) }
    pub fn content_epsilon(self, px: f32) -> Self { self.map(|c| c.content_epsilon = px) }
    pub fn resize_debounce_ms(self, ms: u64) -> Self { self.map(|c| c.resize_debounce_ms = ms) }
    pub fn frame_interval_ms(self, ms: u64) -> Self { self.map(|c| c.frame_interval_ms = ms) }
    pub fn idle_timeout_ms(self, ms: u64) -> Self { self.map(|c| c.idle_timeout_ms = ms) }
    pub fn line_height(self, px: f32) -> Self { self.map(|c| c.line_height = px) }
    pub fn native_highlights(self, on: bool) -> Self { self.map(|c| c.capabilities.native_highlights = on) }
    pub fn workspace_trusted(self, on: bool) -> Self { self.map(|c| c.workspace_trusted = on) }
    pub fn renderer_debug_logging(self, on: bool) -> Self { self.map(|c| c.renderer_debug_logging = on) }
    pub fn log_level(self, level: LogLevel) -> Self { self.map(|c| c.log_level = level) }
    pub fn renderer_settings(self, s: RendererSettings) -> Self { self.map(|c| c.renderer_settings = s) }
    pub fn notebook_options(self, o: NotebookOptions) -> Self { self.map(|c| c.notebook_options = o) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut RuntimeConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

pub(crate) fn validate(c: &RuntimeConfig) -> Result<(), ConfigError> {
    if c.channel_capacity == 0 {
        return Err(ConfigError::ZeroChannelCapacity);
    }
    if !(0.0..=16.0).contains(&c.content_epsilon) {
        return Err(ConfigError::InvalidEpsilon(c.content_epsilon));
    }
    if c.line_height <= 0.0 {
        return Err(ConfigError::InvalidLineHeight(c.line_height));
    }
    if c.output_node_padding < 0.0 || c.output_node_left_padding < 0.0 {
        return Err(ConfigError::NegativePadding);
    }
    if c.frame_interval_ms == 0 {
        return Err(ConfigError::ZeroFrameInterval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RuntimeConfig::builder().build().unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert_eq!(cfg.resize_debounce(), Duration::from_millis(250));
        assert!(cfg.capabilities.native_highlights);
    }

    #[test]
    fn builder_rejects_invalid_values() {
        assert_eq!(
            RuntimeConfig::builder().channel_capacity(0).build(),
            Err(ConfigError::ZeroChannelCapacity)
        );
        assert_eq!(
            RuntimeConfig::builder().content_epsilon(-1.0).build(),
            Err(ConfigError::InvalidEpsilon(-1.0))
        );
        assert_eq!(
            RuntimeConfig::builder().output_node_padding(-2.0).build(),
            Err(ConfigError::NegativePadding)
        );
        assert_eq!(
            RuntimeConfig::builder().frame_interval_ms(0).build(),
            Err(ConfigError::ZeroFrameInterval)
        );
    }

    #[test]
    fn from_json_fills_missing_fields_with_defaults() {
        let cfg = RuntimeConfig::from_json(
            r#"{ "workspace_trusted": true, "capabilities": { "nativeHighlights": false },
                 "renderer_settings": { "lineLimit": 5 } }"#,
        )
        .unwrap();
        assert!(cfg.workspace_trusted);
        assert!(!cfg.capabilities.native_highlights);
        assert_eq!(cfg.renderer_settings.line_limit, 5);
        assert!(!cfg.renderer_settings.output_scrolling);
        assert_eq!(cfg.channel_capacity, 256);
    }

    #[test]
    fn from_json_validates() {
        let res = RuntimeConfig::from_json(r#"{ "line_height": 0 }"#);
        assert!(res.is_err());
    }

    #[test]
    fn log_level_maps_to_filter() {
        assert_eq!(log::LevelFilter::from(LogLevel::Debug), log::LevelFilter::Debug);
        assert_eq!(log::LevelFilter::from(LogLevel::Off), log::LevelFilter::Off);
    }
}
