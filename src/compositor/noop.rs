//! Fallback backend when no supported compositor is detected.

use super::{CompositorBackend, CompositorKind, Screen, Workspace};

/// Returns neutral values for every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl CompositorBackend for NoopBackend {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Unknown
    }

    fn focused_output(&self) -> Option<&str> {
        None
    }

    fn output_scale(&self, _name: &str) -> Option<f64> {
        None
    }

    fn current_workspace(&self) -> Workspace {
        Workspace::none()
    }

    fn window_app_ids(&self) -> Vec<&str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<Screen> {
        Vec::new()
    }
}
