use futures::stream::{self, BoxStream, StreamExt};
use std::path::Path;

/// Streams a notification whenever the file at `path` may have changed.
///
/// The stream never ends when changes cannot be observed; callers are
/// expected to poll on an interval as well.
#[cfg(target_os = "linux")]
pub(crate) fn changes(path: &Path) -> BoxStream<'static, ()> {
    match inotify::watch(path) {
        Ok(changes) => changes,
        Err(error) => {
            tracing::warn!(%error, ?path, "Failed to watch policy file, relying on refresh interval");
            stream::pending().boxed()
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn changes(_: &Path) -> BoxStream<'static, ()> {
    stream::pending().boxed()
}

#[cfg(target_os = "linux")]
mod inotify {
    use futures::{
        future,
        stream::{BoxStream, StreamExt},
    };
    use inotify::{Inotify, WatchMask};
    use std::{ffi::OsString, io, path::Path};

    /// Mounted ConfigMaps replace files by swapping a `..data` symlink in the
    /// parent directory, so the directory is watched rather than the file.
    pub(super) fn watch(path: &Path) -> io::Result<BoxStream<'static, ()>> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let file: Option<OsString> = path.file_name().map(Into::into);

        let inotify = Inotify::init()?;
        let mask = WatchMask::CREATE
            | WatchMask::MODIFY
            | WatchMask::CLOSE_WRITE
            | WatchMask::DELETE
            | WatchMask::MOVE;
        inotify.watches().add(dir, mask)?;
        tracing::debug!(?dir, "Watching policy directory");

        let events = inotify.into_event_stream([0u8; 4096])?;
        let changes = events.filter_map(move |event| {
            let changed = match event {
                Ok(event) => {
                    tracing::trace!(mask = ?event.mask, name = ?event.name);
                    event.name.as_deref().is_some_and(|name| {
                        file.as_deref() == Some(name) || name == "..data"
                    })
                }
                Err(error) => {
                    tracing::warn!(%error, "Failed to read inotify event");
                    false
                }
            };
            future::ready(changed.then_some(()))
        });
        Ok(changes.boxed())
    }
}
