//! Runtime options
//!
//! Engine switches set per window or per process, plus a serde-loadable
//! [`RuntimeOptions`] bundle so hosts can keep them in a JSON file.

use std::ffi::CString;
use std::path::Path;

use bitflags::bitflags;
use serde::Deserialize;

use crate::api;
use crate::error::{DomResult, Error, Result};
use crate::types::{Rect, WindowFlags, WindowHandle};
use crate::window::Window;

/// `SCITER_RT_OPTIONS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RuntimeOption {
    SmoothScroll = 1,
    /// Milliseconds
    ConnectionTimeout = 2,
    /// 0 drops the connection, 1 uses the data anyway
    HttpsError = 3,
    FontSmoothing = 4,
    TransparentWindow = 6,
    /// JSON list of blacklisted GPU drivers
    GpuBlacklist = 7,
    /// [`ScriptFeatures`] bits
    ScriptRuntimeFeatures = 8,
    /// [`GfxLayer`], process-wide only
    GfxLayer = 9,
    DebugMode = 10,
    UxTheming = 11,
    AlphaWindow = 12,
    InitScript = 13,
    MainWindow = 14,
    MaxHttpDataLength = 15,
}

/// Graphics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum GfxLayer {
    /// GDI, CoreGraphics or Cairo depending on the platform
    Native = 1,
    Warp = 2,
    D2d = 3,
    Skia = 4,
    SkiaOpengl = 5,
    Auto = 0xFFFF,
}

bitflags! {
    /// Script capabilities allowed by the host
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ScriptFeatures: u32 {
        const FILE_IO = 0x01;
        const SOCKET_IO = 0x02;
        const EVAL = 0x04;
        const SYSINFO = 0x08;
    }
}

/// Options bundle; unset fields keep the engine default
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeOptions {
    pub smooth_scroll: Option<bool>,
    pub connection_timeout_ms: Option<u32>,
    pub https_error: Option<u32>,
    pub font_smoothing: Option<u32>,
    pub transparent_window: Option<bool>,
    pub debug_mode: Option<bool>,
    pub ux_theming: Option<bool>,
    pub alpha_window: Option<bool>,
    pub main_window: Option<bool>,
    pub max_http_data_length: Option<u32>,
    /// Names from `file-io`, `socket-io`, `eval`, `sysinfo`
    pub script_features: Option<Vec<String>>,
    pub gfx_layer: Option<GfxLayer>,
    /// Script run before every document
    pub init_script: Option<String>,
}

impl RuntimeOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loaded runtime options from {}", path.as_ref().display());
        Self::from_json(&text)
    }

    /// Script features named in the bundle; unknown names are skipped
    pub fn script_features(&self) -> Option<ScriptFeatures> {
        let names = self.script_features.as_ref()?;
        let mut features = ScriptFeatures::empty();
        for name in names {
            match name.as_str() {
                "file-io" => features |= ScriptFeatures::FILE_IO,
                "socket-io" => features |= ScriptFeatures::SOCKET_IO,
                "eval" => features |= ScriptFeatures::EVAL,
                "sysinfo" => features |= ScriptFeatures::SYSINFO,
                other => tracing::warn!("Unknown script feature '{}'", other),
            }
        }
        Some(features)
    }

    /// Per-window options as (option, value) pairs
    fn window_pairs(&self) -> Vec<(RuntimeOption, usize)> {
        let flag = |b: bool| usize::from(b);
        let mut pairs = Vec::new();
        if let Some(v) = self.smooth_scroll {
            pairs.push((RuntimeOption::SmoothScroll, flag(v)));
        }
        if let Some(v) = self.connection_timeout_ms {
            pairs.push((RuntimeOption::ConnectionTimeout, v as usize));
        }
        if let Some(v) = self.https_error {
            pairs.push((RuntimeOption::HttpsError, v as usize));
        }
        if let Some(v) = self.font_smoothing {
            pairs.push((RuntimeOption::FontSmoothing, v as usize));
        }
        if let Some(v) = self.transparent_window {
            pairs.push((RuntimeOption::TransparentWindow, flag(v)));
        }
        if let Some(v) = self.debug_mode {
            pairs.push((RuntimeOption::DebugMode, flag(v)));
        }
        if let Some(v) = self.alpha_window {
            pairs.push((RuntimeOption::AlphaWindow, flag(v)));
        }
        if let Some(v) = self.main_window {
            pairs.push((RuntimeOption::MainWindow, flag(v)));
        }
        if let Some(features) = self.script_features() {
            pairs.push((RuntimeOption::ScriptRuntimeFeatures, features.bits() as usize));
        }
        pairs
    }

    /// Process-wide options
    fn global_pairs(&self) -> Vec<(RuntimeOption, usize)> {
        let mut pairs = Vec::new();
        if let Some(layer) = self.gfx_layer {
            pairs.push((RuntimeOption::GfxLayer, layer as usize));
        }
        if let Some(v) = self.ux_theming {
            pairs.push((RuntimeOption::UxTheming, usize::from(v)));
        }
        if let Some(v) = self.max_http_data_length {
            pairs.push((RuntimeOption::MaxHttpDataLength, v as usize));
        }
        pairs
    }

    pub fn apply(&self, window: &Window) -> Result<()> {
        for (option, value) in self.window_pairs() {
            window.set_option(option, value)?;
        }
        if let Some(script) = &self.init_script {
            // The engine copies the string before returning
            let script = CString::new(script.as_str())
                .map_err(|_| Error::Dom { result: DomResult::InvalidParameter, op: "SciterSetOption" })?;
            window.set_option(RuntimeOption::InitScript, script.as_ptr() as usize)?;
        }
        Ok(())
    }

    /// Apply the process-wide options; call before any window exists
    pub fn apply_global(&self) -> Result<()> {
        for (option, value) in self.global_pairs() {
            set_global_option(option, value)?;
        }
        Ok(())
    }
}

/// Set an option for the whole process
pub fn set_global_option(option: RuntimeOption, value: usize) -> Result<()> {
    if api::api()?.set_option(WindowHandle::NULL, option, value) {
        Ok(())
    } else {
        Err(Error::Dom { result: DomResult::OperationFailed, op: "SciterSetOption" })
    }
}

/// Window creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub flags: WindowFlags,
    pub rect: Rect,
    pub parent: WindowHandle,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { flags: WindowFlags::default(), rect: Rect::new(0, 0, 300, 400), parent: WindowHandle::NULL }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingEngine;
    use std::io::Write;

    #[test]
    fn test_parse_options() {
        let options = RuntimeOptions::from_json(
            r#"{"debug_mode": true, "gfx_layer": "skia", "script_features": ["eval", "file-io"]}"#,
        )
        .unwrap();
        assert_eq!(options.debug_mode, Some(true));
        assert_eq!(options.gfx_layer, Some(GfxLayer::Skia));
        assert_eq!(options.script_features(), Some(ScriptFeatures::EVAL | ScriptFeatures::FILE_IO));
        assert!(options.smooth_scroll.is_none());
    }

    #[test]
    fn test_unknown_field_is_error() {
        assert!(matches!(RuntimeOptions::from_json(r#"{"warp_speed": 9}"#), Err(Error::Json(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"connection_timeout_ms": 1500}}"#).unwrap();
        let options = RuntimeOptions::from_path(file.path()).unwrap();
        assert_eq!(options.connection_timeout_ms, Some(1500));
        assert!(matches!(RuntimeOptions::from_path("/nonexistent/options.json"), Err(Error::Io(_))));
    }

    #[test]
    fn test_apply_splits_window_and_global() {
        let engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        let options = RuntimeOptions {
            debug_mode: Some(true),
            gfx_layer: Some(GfxLayer::Auto),
            init_script: Some("document.ready = true;".to_string()),
            ..Default::default()
        };
        options.apply(&window).unwrap();
        options.apply_global().unwrap();

        assert_eq!(engine.option(window.handle(), RuntimeOption::DebugMode), Some(1));
        assert_eq!(engine.option(WindowHandle::NULL, RuntimeOption::GfxLayer), Some(0xFFFF));
        assert_eq!(engine.option(window.handle(), RuntimeOption::GfxLayer), None);
        assert!(engine.option(window.handle(), RuntimeOption::InitScript).is_some());
    }

    #[test]
    fn test_default_window_config() {
        let config = WindowConfig::default();
        assert_eq!(config.rect.width(), 300);
        assert_eq!(config.rect.height(), 400);
        assert!(config.flags.contains(WindowFlags::MAIN));
    }
}
