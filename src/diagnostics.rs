//! Script error reports. Every report goes to `tracing` under the `script` target and into a
//! bounded in-memory capture that harnesses and tests read back.

use std::collections::VecDeque;

use crate::env::CallContext;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<String>,
    capacity: usize,
    dropped: usize,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DiagnosticLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity: capacity.max(1), dropped: 0 }
    }

    /// Renders and records one report.
    pub fn report(&mut self, ctx: &CallContext, function: Option<&str>, message: &str) {
        let rendered = render(ctx, function, message);
        tracing::error!(target: "script", "{rendered}");
        self.push(rendered);
    }

    pub fn push(&mut self, entry: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reports evicted because the capture was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.entries.drain(..).collect()
    }
}

/// Multi-line report: interface, callback label, entry-point label, event description, then the
/// failing function and message. Lines with nothing to say are left out.
pub fn render(ctx: &CallContext, function: Option<&str>, message: &str) -> String {
    let mut lines = Vec::new();
    if let Some(host) = ctx.host_name() {
        lines.push(format!("Script error: [{host}]"));
    } else {
        lines.push("Script error:".to_string());
    }
    if let Some(callback) = ctx.callback_id().and_then(|id| ctx.label(id)) {
        lines.push(format!("in callback: {callback}"));
    }
    if let Some(label) = ctx.label(ctx.script_id()) {
        lines.push(label);
    }
    if !ctx.event_desc().is_empty() {
        lines.push(ctx.event_desc().to_string());
    }
    match function {
        Some(name) => lines.push(format!("{name}(). {message}")),
        None => lines.push(message.to_string()),
    }
    lines.join("\n")
}
