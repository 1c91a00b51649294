//! Niri backend: flat window list, workspace list and output scales.
//!
//! Niri reports workspace indices as numbers, but the index is parsed
//! leniently: numeric strings are accepted and anything else becomes `-1`.

pub mod ipc;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{CompositorBackend, CompositorKind, Screen, Workspace};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NiriWindow {
    pub id: u64,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NiriWorkspace {
    pub id: u64,
    #[serde(default = "no_index", deserialize_with = "lenient_index")]
    pub idx: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_focused: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NiriOutput {
    pub name: String,
    /// Absent for disabled outputs.
    #[serde(default)]
    pub logical: Option<LogicalOutput>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogicalOutput {
    pub scale: f64,
}

fn no_index() -> i64 {
    -1
}

/// Parse a workspace index from a JSON number or numeric string.
pub fn parse_index(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(-1),
        Value::String(s) => s.trim().parse().unwrap_or(-1),
        _ => -1,
    }
}

fn lenient_index<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_index(&value))
}

#[derive(Debug, Clone, Default)]
pub struct NiriBackend {
    windows: Vec<NiriWindow>,
    workspaces: Vec<NiriWorkspace>,
    /// Enabled output names, sorted.
    output_names: Vec<String>,
    scales: HashMap<String, f64>,
    focused_output: Option<String>,
}

impl NiriBackend {
    /// Backend with no state, used until the first fetch completes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parts(
        outputs: HashMap<String, NiriOutput>,
        workspaces: Vec<NiriWorkspace>,
        windows: Vec<NiriWindow>,
        focused_output: Option<NiriOutput>,
    ) -> Self {
        let scales: HashMap<String, f64> = outputs
            .into_values()
            .filter_map(|output| output.logical.map(|l| (output.name, l.scale)))
            .collect();
        let mut output_names: Vec<String> = scales.keys().cloned().collect();
        output_names.sort();

        Self {
            windows,
            workspaces,
            output_names,
            scales,
            focused_output: focused_output.map(|o| o.name),
        }
    }
}

impl CompositorBackend for NiriBackend {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Niri
    }

    fn focused_output(&self) -> Option<&str> {
        self.focused_output.as_deref()
    }

    fn output_scale(&self, name: &str) -> Option<f64> {
        self.scales.get(name).copied()
    }

    fn current_workspace(&self) -> Workspace {
        let Some(ws) = self.workspaces.iter().find(|ws| ws.is_focused) else {
            return Workspace {
                monitor: self.focused_output.clone().unwrap_or_default(),
                ..Workspace::none()
            };
        };

        let name = match (&ws.name, ws.idx) {
            (Some(name), _) => name.clone(),
            (None, idx) if idx >= 0 => idx.to_string(),
            (None, _) => String::new(),
        };
        let monitor = ws
            .output
            .clone()
            .or_else(|| self.focused_output.clone())
            .unwrap_or_default();

        Workspace {
            id: ws.idx,
            name,
            monitor,
        }
    }

    fn window_app_ids(&self) -> Vec<&str> {
        self.windows
            .iter()
            .filter_map(|w| w.app_id.as_deref())
            .collect()
    }

    fn outputs(&self) -> Vec<Screen> {
        self.output_names.iter().map(Screen::new).collect()
    }
}
