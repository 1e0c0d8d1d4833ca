// Shader hot reload - watch the compiled .spv files and report changes

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc;

pub struct ShaderWatcher {
    /// Kept alive for as long as events should arrive
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Event>,
}

impl ShaderWatcher {
    /// Watch `dir` non-recursively. Returns `None` if the directory is
    /// missing or the platform watcher can't be created.
    pub fn new(dir: &Path) -> Option<Self> {
        if !dir.is_dir() {
            log::warn!("Shader directory {:?} not found, hot reload disabled", dir);
            return None;
        }

        let (tx, rx) = mpsc::channel::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| log::warn!("Failed to create shader watcher: {e}"))
        .ok()?;

        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            log::warn!("Failed to watch {:?}: {e}", dir);
            return None;
        }
        log::info!("Watching {:?} for shader changes", dir);

        Some(Self {
            _watcher: watcher,
            event_rx: rx,
        })
    }

    /// Drain pending events; true if any shader binary was written since the last poll
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.event_rx.try_recv() {
            if is_shader_write(&event.kind) && event.paths.iter().any(|p| is_shader_binary(p)) {
                changed = true;
            }
        }
        changed
    }
}

fn is_shader_write(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

pub fn is_shader_binary(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "spv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn only_spirv_files_count() {
        assert!(is_shader_binary(Path::new("shaders/shader.vert.spv")));
        assert!(is_shader_binary(Path::new("/abs/x.spv")));
        assert!(!is_shader_binary(Path::new("shaders/shader.vert")));
        assert!(!is_shader_binary(Path::new("shaders/spv")));
        assert!(!is_shader_binary(Path::new("shaders/shader.spv.swp")));
    }

    #[test]
    fn only_writes_count() {
        assert!(is_shader_write(&EventKind::Create(CreateKind::File)));
        assert!(is_shader_write(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_shader_write(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_shader_write(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn missing_directory_disables_watching() {
        assert!(ShaderWatcher::new(Path::new("no/such/shader/dir")).is_none());
    }
}
