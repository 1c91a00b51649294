//! Screen/workspace resolution over the active backend.
//!
//! Maps display names to the backend's focused output and scales. Every
//! lookup has a neutral fallback: the first enumerated screen, the
//! screen's own device pixel ratio, `1.0`, `""` or `-1`.

use crate::compositor::{CompositorBackend, Screen, Workspace};

pub const DEFAULT_SCALE: f64 = 1.0;

/// Borrowed view over a backend and the enumerated screens.
#[derive(Clone, Copy)]
pub struct ScreenResolver<'a> {
    backend: &'a dyn CompositorBackend,
    screens: &'a [Screen],
}

impl<'a> ScreenResolver<'a> {
    pub fn new(backend: &'a dyn CompositorBackend, screens: &'a [Screen]) -> Self {
        Self { backend, screens }
    }

    /// The screen the compositor reports as focused.
    ///
    /// Falls back to the first screen when the backend has no answer or
    /// names a screen that is not enumerated.
    pub fn focused_screen(&self) -> Option<&'a Screen> {
        let matched = self
            .backend
            .focused_output()
            .and_then(|name| self.screens.iter().find(|s| s.name == name));
        matched.or_else(|| self.screens.first())
    }

    pub fn is_screen_focused(&self, screen: &Screen) -> bool {
        if self.screens.len() == 1 {
            return true;
        }
        self.focused_screen()
            .is_some_and(|focused| focused.name == screen.name)
    }

    pub fn screen_scale(&self, screen: &Screen) -> f64 {
        self.backend
            .output_scale(&screen.name)
            .or(screen.device_pixel_ratio)
            .unwrap_or(DEFAULT_SCALE)
    }

    pub fn workspace(&self) -> Workspace {
        self.backend.current_workspace()
    }

    pub fn current_workspace(&self) -> String {
        self.workspace().name
    }

    pub fn current_workspace_id(&self) -> i64 {
        self.workspace().id
    }

    pub fn current_monitor(&self) -> String {
        self.workspace().monitor
    }
}
