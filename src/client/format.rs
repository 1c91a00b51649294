//! Output formatting for CLI client commands.
//!
//! Human-readable key/value blocks by default; `--json` prints the
//! response payload as pretty JSON for scripting.

use std::io::{self, Write};

use serde::Serialize;

use crate::context::ContextSnapshot;
use crate::ipc::protocol::CompositorStatus;

use super::ClientError;

const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub fn print_context(context: &ContextSnapshot, json: bool) -> Result<(), ClientError> {
    let text = if json {
        to_json(context)?
    } else {
        format_context(context)
    };
    write_stdout(&text)
}

pub fn print_status(status: &CompositorStatus, json: bool) -> Result<(), ClientError> {
    let text = if json {
        to_json(status)?
    } else {
        format_status(status)
    };
    write_stdout(&text)
}

pub fn print_event(name: &str, data: &str) {
    println!("{name}>>{data}");
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ClientError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

fn write_stdout(text: &str) -> Result<(), ClientError> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    Ok(())
}

fn format_context(ctx: &ContextSnapshot) -> String {
    let day = DAYS.get(ctx.day as usize).copied().unwrap_or("?");
    let mut out = String::new();
    out.push_str(&format!("Time:       {day} {:02}h\n", ctx.hour));
    out.push_str(&format!(
        "Workspace:  {} ({})\n",
        or_dash(&ctx.workspace),
        ctx.workspace_id
    ));
    out.push_str(&format!("Monitor:    {}\n", or_dash(&ctx.monitor)));
    out.push_str(&format!("Last app:   {}\n", or_dash(&ctx.last_app)));
    out.push_str(&format!("Flags:      {}\n", format_flags(ctx)));
    out.push_str(&format!("Running:    {}\n", format_list(ctx.running_apps.iter())));
    out
}

fn format_status(status: &CompositorStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("Compositor: {}\n", status.label));
    out.push_str(&format!(
        "Workspace:  {} ({}) on {}\n",
        or_dash(&status.workspace),
        status.workspace_id,
        or_dash(&status.monitor)
    ));
    out.push_str(&format!("Running:    {}\n", format_list(status.running_apps.iter())));

    if status.screens.is_empty() {
        out.push_str("No screens reported\n");
        return out;
    }
    out.push_str(&format!("\n{:<20} {:>6} FOCUSED\n", "SCREEN", "SCALE"));
    out.push_str(&format!("{}\n", "-".repeat(36)));
    for screen in &status.screens {
        out.push_str(&format!(
            "{:<20} {:>6.2} {}\n",
            screen.name,
            screen.scale,
            if screen.focused { "yes" } else { "no" }
        ));
    }
    out
}

fn format_flags(ctx: &ContextSnapshot) -> String {
    let mut flags = Vec::new();
    if ctx.is_session_start {
        flags.push("session-start");
    }
    if ctx.is_resume_from_idle {
        flags.push("resume-from-idle");
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}

fn format_list<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
    or_dash(&joined).to_string()
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
