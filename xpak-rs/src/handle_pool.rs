use crate::error::XpakError;
use parking_lot::{Condvar, Mutex};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::trace;

/// A bounded pool of read handles, one set per archive file.
///
/// A handle is owned exclusively while acquired, so a seek followed by a read
/// on it can never interleave with another caller. Each archive has its own
/// lock; callers reading different archives never wait on each other.
#[derive(Debug)]
pub struct HandlePool {
    slots: Vec<Slot>,
    capacity: usize,
}

#[derive(Debug)]
struct Slot {
    path: Option<PathBuf>,
    state: Mutex<SlotState>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct SlotState {
    idle: Vec<File>,
    open: usize,
}

impl HandlePool {
    /// Creates a pool over `paths`, indexed by position. `None` marks an
    /// archive number that has no file.
    pub fn new(paths: Vec<Option<PathBuf>>, capacity: usize) -> Self {
        Self {
            slots: paths
                .into_iter()
                .map(|path| Slot {
                    path,
                    state: Mutex::new(SlotState::default()),
                    available: Condvar::new(),
                })
                .collect(),
            capacity: capacity.max(1),
        }
    }

    /// Number of archive slots, present or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn path(&self, index: u32) -> Option<&Path> {
        self.slots.get(index as usize)?.path.as_deref()
    }

    /// Takes a handle to archive `index`, opening one if fewer than the pool
    /// capacity are open and waiting for a release otherwise.
    pub fn acquire(&self, index: u32) -> Result<PooledHandle<'_>, XpakError> {
        let slot = self
            .slots
            .get(index as usize)
            .ok_or_else(|| XpakError::FileNotFound(format!("Archive index {index} is out of range")))?;
        let path = slot
            .path
            .as_ref()
            .ok_or_else(|| XpakError::FileNotFound(format!("Archive {index} is not present")))?;

        let mut state = slot.state.lock();
        loop {
            if let Some(file) = state.idle.pop() {
                return Ok(PooledHandle {
                    slot,
                    file: Some(file),
                });
            }
            if state.open < self.capacity {
                state.open += 1;
                drop(state);
                trace!(index, path = %path.display(), "opening archive handle");
                return match File::open(path) {
                    Ok(file) => Ok(PooledHandle {
                        slot,
                        file: Some(file),
                    }),
                    Err(err) => {
                        slot.state.lock().open -= 1;
                        slot.available.notify_one();
                        Err(err.into())
                    }
                };
            }
            slot.available.wait(&mut state);
        }
    }

    /// Reads exactly `buf.len()` bytes of archive `index` at `offset`.
    pub fn read_exact_at(&self, index: u32, offset: u64, buf: &mut [u8]) -> Result<(), XpakError> {
        let mut handle = self.acquire(index)?;
        handle.seek(SeekFrom::Start(offset))?;
        handle.read_exact(buf)?;
        Ok(())
    }
}

/// An exclusively held archive handle, returned to its pool on drop.
#[derive(Debug)]
pub struct PooledHandle<'a> {
    slot: &'a Slot,
    file: Option<File>,
}

impl PooledHandle<'_> {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("Handle already released"))
    }
}

impl Read for PooledHandle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Seek for PooledHandle<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl Drop for PooledHandle<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            self.slot.state.lock().idle.push(file);
            self.slot.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn pool_with_file(contents: &[u8], capacity: usize) -> (tempfile::TempDir, HandlePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.000");
        File::create(&path).unwrap().write_all(contents).unwrap();
        let pool = HandlePool::new(vec![Some(path), None], capacity);
        (dir, pool)
    }

    #[test]
    fn reads_at_offsets_and_reuses_handles() {
        let (_dir, pool) = pool_with_file(b"0123456789", 1);
        let mut buf = [0u8; 3];
        pool.read_exact_at(0, 4, &mut buf).unwrap();
        assert_eq!(&buf, b"456");
        pool.read_exact_at(0, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"012");
        assert_eq!(pool.slots[0].state.lock().open, 1);
    }

    #[test]
    fn missing_archives_are_reported() {
        let (_dir, pool) = pool_with_file(b"x", 2);
        assert!(matches!(pool.acquire(1), Err(XpakError::FileNotFound(_))));
        assert!(matches!(pool.acquire(7), Err(XpakError::FileNotFound(_))));
    }

    #[test]
    fn concurrent_readers_share_a_bounded_pool() {
        let contents: Vec<u8> = (0..=255u8).collect();
        let (_dir, pool) = pool_with_file(&contents, 2);
        let pool = Arc::new(pool);

        let workers: Vec<_> = (0..8u64)
            .map(|worker| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for round in 0..50u64 {
                        let offset = (worker * 31 + round) % 250;
                        let mut buf = [0u8; 4];
                        pool.read_exact_at(0, offset, &mut buf).unwrap();
                        assert_eq!(buf[0] as u64, offset);
                        assert_eq!(buf[3] as u64, offset + 3);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(pool.slots[0].state.lock().open <= 2);
    }
}
