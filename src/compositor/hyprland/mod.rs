//! Hyprland backend: cached monitor/workspace/window tree.
//!
//! The tree is rebuilt from `j/monitors`, `j/workspaces` and `j/clients`
//! by the feed in [`ipc`]. Windows are grouped under the workspace that
//! owns them, so app discovery walks workspaces then windows.

pub mod ipc;

use serde::Deserialize;

use super::{CompositorBackend, CompositorKind, Screen, Workspace};

/// Entry of `j/monitors`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Monitor {
    pub name: String,
    #[serde(default = "unit_scale")]
    pub scale: f64,
    #[serde(default)]
    pub focused: bool,
    #[serde(rename = "activeWorkspace", default)]
    pub active_workspace: Option<WorkspaceRef>,
}

fn unit_scale() -> f64 {
    1.0
}

/// `{id, name}` reference embedded in monitors and clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Entry of `j/workspaces`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub monitor: String,
}

/// Entry of `j/clients`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Client {
    #[serde(default)]
    pub class: String,
    pub workspace: WorkspaceRef,
}

/// A workspace together with the windows it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceNode {
    pub info: WorkspaceInfo,
    pub windows: Vec<Client>,
}

#[derive(Debug, Clone, Default)]
pub struct HyprlandBackend {
    monitors: Vec<Monitor>,
    workspaces: Vec<WorkspaceNode>,
}

impl HyprlandBackend {
    /// Backend with no state, used until the first fetch completes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the tree from the three flat IPC replies.
    ///
    /// Clients whose workspace is not listed are dropped.
    pub fn from_parts(
        monitors: Vec<Monitor>,
        workspaces: Vec<WorkspaceInfo>,
        clients: Vec<Client>,
    ) -> Self {
        let mut nodes: Vec<WorkspaceNode> = workspaces
            .into_iter()
            .map(|info| WorkspaceNode {
                info,
                windows: Vec::new(),
            })
            .collect();

        for client in clients {
            match nodes
                .iter_mut()
                .find(|node| node.info.id == client.workspace.id)
            {
                Some(node) => node.windows.push(client),
                None => tracing::trace!(
                    workspace = client.workspace.id,
                    class = %client.class,
                    "client on unlisted workspace"
                ),
            }
        }

        Self {
            monitors,
            workspaces: nodes,
        }
    }

    #[cfg(test)]
    pub fn workspaces(&self) -> &[WorkspaceNode] {
        &self.workspaces
    }

    fn focused_monitor(&self) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.focused)
    }
}

impl CompositorBackend for HyprlandBackend {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Hyprland
    }

    fn focused_output(&self) -> Option<&str> {
        self.focused_monitor().map(|m| m.name.as_str())
    }

    fn output_scale(&self, name: &str) -> Option<f64> {
        self.monitors
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.scale)
    }

    fn current_workspace(&self) -> Workspace {
        let Some(monitor) = self.focused_monitor() else {
            return Workspace::none();
        };
        match &monitor.active_workspace {
            Some(active) => Workspace {
                id: active.id,
                name: active.name.clone(),
                monitor: monitor.name.clone(),
            },
            None => Workspace {
                monitor: monitor.name.clone(),
                ..Workspace::none()
            },
        }
    }

    fn window_app_ids(&self) -> Vec<&str> {
        self.workspaces
            .iter()
            .flat_map(|node| node.windows.iter())
            .map(|client| client.class.as_str())
            .collect()
    }

    fn outputs(&self) -> Vec<Screen> {
        self.monitors.iter().map(|m| Screen::new(&m.name)).collect()
    }
}
