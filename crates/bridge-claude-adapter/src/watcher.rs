// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Recursive, depth-bounded filesystem watch over the projects root.
//! Depth bound 2 matches the `projects/<encoded-cwd>/<id>.jsonl` layout
//! without paying for a deep recursive watch over every project's own
//! working tree.

use std::path::Path;
use std::sync::{Arc, Mutex};

use bridge_adapter::{AdapterError, DiscoveryEvent, WatchHandle};
use notify::{Event as NotifyEvent, EventKind as NotifyEventKind, RecursiveMode, Watcher};

fn within_depth(root: &Path, path: &Path, max_depth: usize) -> bool {
    path.strip_prefix(root).map(|rel| rel.components().count() <= max_depth).unwrap_or(false)
}

fn session_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

/// Start watching `projects_root`. The watcher itself is kept alive
/// inside the returned handle; cancelling drops it, which stops delivery
/// (notify has no explicit "unwatch one path and stop" primitive beyond
/// dropping the `Watcher`).
pub fn watch_sessions(
    projects_root: &Path,
    on_event: Box<dyn Fn(DiscoveryEvent) + Send + Sync>,
) -> Result<WatchHandle, AdapterError> {
    let root = projects_root.to_path_buf();
    let root_for_handler = root.clone();

    let handler = move |res: notify::Result<NotifyEvent>| {
        let Ok(event) = res else { return };
        for path in &event.paths {
            if !within_depth(&root_for_handler, path, 2) {
                continue;
            }
            let Some(id) = session_id(path) else { continue };
            match event.kind {
                NotifyEventKind::Create(_) => on_event(DiscoveryEvent::SessionCreated(id)),
                NotifyEventKind::Modify(_) => on_event(DiscoveryEvent::SessionUpdated(id)),
                NotifyEventKind::Remove(_) => on_event(DiscoveryEvent::SessionRemoved(id)),
                _ => {}
            }
        }
    };

    let mut watcher = notify::recommended_watcher(handler)
        .map_err(|e| AdapterError::Watch(e.to_string()))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| AdapterError::Watch(e.to_string()))?;

    let held = Arc::new(Mutex::new(Some(watcher)));
    Ok(WatchHandle::new(move || {
        held.lock().unwrap().take();
    }))
}
