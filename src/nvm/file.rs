//! File-backed NVM
//!
//! Opens the storage file with `O_DIRECT` (Linux) and takes an exclusive,
//! non-blocking `flock` so that only one open handle owns a file at a time.
//! Split views share the same descriptor; the file is closed and the lock
//! released when the last view is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, SeekFrom};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{check_buffer_len, check_split_position, resolve_seek, NonVolatileMemory, StorageHeader};
use crate::block::BlockSize;
use crate::error::{LumpstoreError, Result};

/// Extension every storage file must carry
pub const LUSF_EXTENSION: &str = "lusf";

/// NVM over a file (or block device) opened for direct I/O
#[derive(Debug)]
pub struct FileNvm {
    file: Arc<File>,
    path: Arc<PathBuf>,
    view_start: u64,
    view_end: u64,
    position: u64,
    block_size: BlockSize,
}

impl FileNvm {
    /// Creates and preallocates a new storage file of `capacity` bytes
    ///
    /// Fails if the path lacks the `.lusf` extension, if the file already
    /// exists, or if the space cannot be preallocated.
    pub fn create(
        path: impl AsRef<Path>,
        capacity: u64,
        block_size: BlockSize,
        direct_io: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        check_extension(path)?;
        if !block_size.is_aligned(capacity) {
            return Err(LumpstoreError::invalid_input(format!(
                "capacity {} is not aligned to {}-byte blocks",
                capacity, block_size
            )));
        }

        let mut options = open_options(direct_io);
        options.create_new(true);
        let file = options.open(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => LumpstoreError::invalid_input(format!(
                "storage file {} already exists",
                path.display()
            )),
            _ => e.into(),
        })?;

        lock_exclusive(&file, path)?;
        if let Err(e) = preallocate(&file, capacity) {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(e);
        }

        tracing::debug!("Created storage file {} ({} bytes)", path.display(), capacity);
        Ok(FileNvm::from_parts(file, path, capacity, block_size))
    }

    /// Opens an existing storage file and sizes the view from its header
    pub fn open(path: impl AsRef<Path>, direct_io: bool) -> Result<Self> {
        let path = path.as_ref();
        check_extension(path)?;
        let file = open_options(direct_io).open(path)?;
        lock_exclusive(&file, path)?;

        let file_len = file.metadata()?.len();
        let block_size = BlockSize::min();
        let mut nvm = FileNvm::from_parts(file, path, block_size.floor_align(file_len), block_size);
        let header = StorageHeader::read_from_nvm(&mut nvm)?;
        if header.storage_size() > nvm.view_end {
            return Err(LumpstoreError::corrupted(format!(
                "{} is truncated: header describes {} bytes, file has {}",
                path.display(),
                header.storage_size(),
                file_len
            )));
        }
        nvm.view_end = header.storage_size();
        nvm.block_size = header.block_size;
        nvm.seek(SeekFrom::Start(0))?;
        Ok(nvm)
    }

    fn from_parts(file: File, path: &Path, capacity: u64, block_size: BlockSize) -> Self {
        FileNvm {
            file: Arc::new(file),
            path: Arc::new(path.to_path_buf()),
            view_start: 0,
            view_end: capacity,
            position: 0,
            block_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn absolute(&self) -> u64 {
        self.view_start + self.position
    }
}

impl NonVolatileMemory for FileNvm {
    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn capacity(&self) -> u64 {
        self.view_end - self.view_start
    }

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn split(self, position: u64) -> Result<(Self, Self)> {
        check_split_position(position, self.capacity(), self.block_size)?;
        let boundary = self.view_start + position;
        let left = FileNvm {
            file: Arc::clone(&self.file),
            path: Arc::clone(&self.path),
            view_start: self.view_start,
            view_end: boundary,
            position: 0,
            block_size: self.block_size,
        };
        let right = FileNvm {
            file: self.file,
            path: self.path,
            view_start: boundary,
            view_end: self.view_end,
            position: 0,
            block_size: self.block_size,
        };
        Ok((left, right))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, self.capacity(), self.block_size)?;
        Ok(self.position)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_buffer_len(buf.len(), self.block_size)?;
        let len = buf.len().min((self.capacity() - self.position) as usize);
        let offset = self.absolute();

        let mut filled = 0;
        while filled < len {
            match self.file.read_at(&mut buf[filled..len], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        // Past the end of a sparse file: behave as if the file were already grown
        buf[filled..len].fill(0);

        self.position += len as u64;
        Ok(len)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        check_buffer_len(buf.len(), self.block_size)?;
        if self.position + buf.len() as u64 > self.capacity() {
            return Err(LumpstoreError::invalid_input(format!(
                "write of {} bytes at {} overruns the {}-byte view",
                buf.len(),
                self.position,
                self.capacity()
            )));
        }
        self.file.write_all_at(buf, self.absolute())?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }
}

// =============================================================================
// Platform helpers
// =============================================================================

fn check_extension(path: &Path) -> Result<()> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(LUSF_EXTENSION) {
        return Err(LumpstoreError::invalid_input(format!(
            "storage path {} must end with .{}",
            path.display(),
            LUSF_EXTENSION
        )));
    }
    Ok(())
}

fn open_options(direct_io: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    #[cfg(target_os = "linux")]
    {
        if direct_io {
            options.custom_flags(libc::O_DIRECT);
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = direct_io;
    options
}

fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        return Err(LumpstoreError::DeviceBusy(format!(
            "{} is locked by another handle",
            path.display()
        )));
    }
    Err(err.into())
}

#[cfg(target_os = "linux")]
fn preallocate(file: &File, len: u64) -> Result<()> {
    let len = libc::off_t::try_from(len)
        .map_err(|_| LumpstoreError::invalid_input(format!("capacity {} is too large", len)))?;
    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let rc = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len) };
    match rc {
        0 => Ok(()),
        // Filesystems without fallocate support get a sparse file instead
        libc::EOPNOTSUPP | libc::ENOSYS => {
            file.set_len(len as u64)?;
            Ok(())
        }
        _ => Err(io::Error::from_raw_os_error(rc).into()),
    }
}

#[cfg(not(target_os = "linux"))]
fn preallocate(file: &File, len: u64) -> Result<()> {
    file.set_len(len)?;
    Ok(())
}
