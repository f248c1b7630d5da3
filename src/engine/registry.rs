//! Process-wide table of open engines
//!
//! With `multithreading` enabled, opening a location that is already open
//! in this process hands out another handle on the same engine. The engine
//! shuts down when its last handle closes. Without it, a second open fails
//! with `Locked`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::EngineInner;
use crate::config::Config;
use crate::error::{Result, StrataError};

struct Entry {
    engine: Arc<EngineInner>,
    handles: usize,
    shared: bool,
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Entry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Key under which a location is registered
pub(crate) fn registry_key(location: &Path) -> PathBuf {
    if let Ok(path) = location.canonicalize() {
        return path;
    }
    // Not created yet: resolve the parent so the key matches after creation
    let parent = location
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    match (parent.canonicalize(), location.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => std::path::absolute(location).unwrap_or_else(|_| location.to_path_buf()),
    }
}

/// Open `config.location`, or join the engine already open there
pub(crate) fn acquire(config: Config) -> Result<Arc<EngineInner>> {
    let key = registry_key(&config.location);
    let mut engines = registry().lock();

    if let Some(entry) = engines.get_mut(&key) {
        if config.multithreading && entry.shared {
            entry.handles += 1;
            tracing::debug!(location = %key.display(), handles = entry.handles, "Sharing open engine");
            return Ok(Arc::clone(&entry.engine));
        }
        return Err(StrataError::Locked(format!(
            "{} is already open in this process",
            key.display()
        )));
    }

    let shared = config.multithreading;
    let engine = EngineInner::open(config, key.clone())?;
    engines.insert(
        key,
        Entry {
            engine: Arc::clone(&engine),
            handles: 1,
            shared,
        },
    );
    Ok(engine)
}

/// Drop one handle; the last one shuts the engine down
pub(crate) fn release(engine: &Arc<EngineInner>) -> Result<()> {
    let mut engines = registry().lock();
    let key = engine.registry_key();

    let last = match engines.get_mut(key) {
        Some(entry) if Arc::ptr_eq(&entry.engine, engine) => {
            entry.handles -= 1;
            entry.handles == 0
        }
        _ => true,
    };

    if last {
        if engines
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.engine, engine))
        {
            engines.remove(key);
        }
        // The registry stays locked until the lock file is released
        return engine.shutdown();
    }
    Ok(())
}

/// Whether a location is currently open in this process
pub(crate) fn is_open(location: &Path) -> bool {
    registry().lock().contains_key(&registry_key(location))
}
