//! Disk Manager - low-level file I/O for database blocks.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing blocks
//! - Checksumming pages on their way to and from disk
//! - Copying the data file to and from its checkpoint backup

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::config::BLOCK_SIZE;
use crate::common::{BlockNum, Error, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database is stored as a single file with blocks laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Block N is located at file offset `N × BLOCK_SIZE`. Block numbers are
/// handed out by the block allocator, so a write may land past the current
/// end of the file; the file grows to fit and the gap reads as zeros.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `PageCache` is responsible
/// for serializing access to the disk manager.
///
/// # Durability
/// Writes are not individually synced. Durability comes from the
/// transaction log; [`DiskManager::sync`] is called by checkpoints.
pub struct DiskManager {
    file: File,
    path: PathBuf,
    /// Number of blocks in the file.
    block_count: u32,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            block_count: 0,
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let block_count = Self::count_blocks(&file)?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            block_count,
        })
    }

    fn count_blocks(file: &File) -> Result<u32> {
        let file_size = file.metadata()?.len();
        Ok((file_size / BLOCK_SIZE as u64) as u32)
    }

    /// Read a block from disk into `page`.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the block lies past the end of the file
    /// - `Error::Corrupted` if the stored checksum does not match
    pub fn read_page(&mut self, block: BlockNum, page: &mut Page) -> Result<()> {
        if block.0 >= self.block_count {
            return Err(Error::PageNotFound(block));
        }

        self.file.seek(SeekFrom::Start(block.offset(BLOCK_SIZE)))?;
        self.file.read_exact(page.as_mut_slice())?;

        if !page.verify_checksum() {
            return Err(Error::corrupted(block, "checksum mismatch"));
        }
        Ok(())
    }

    /// Write a block to disk, extending the file if needed.
    ///
    /// The checksum is computed on a copy, so `page` itself is untouched.
    pub fn write_page(&mut self, block: BlockNum, page: &Page) -> Result<()> {
        let mut out = page.boxed_copy();
        out.update_checksum();

        self.file.seek(SeekFrom::Start(block.offset(BLOCK_SIZE)))?;
        self.file.write_all(out.as_slice())?;

        if block.0 >= self.block_count {
            self.block_count = block.0 + 1;
        }
        Ok(())
    }

    /// Flush file contents to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Copy the (synced) data file to `dest`, atomically replacing it.
    pub fn backup_to<P: AsRef<Path>>(&mut self, dest: P) -> Result<()> {
        self.sync()?;

        let dest = dest.as_ref();
        let tmp = dest.with_extension("tmp");
        fs::copy(&self.path, &tmp)?;
        File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, dest)?;

        debug!(blocks = self.block_count, dest = %dest.display(), "data file backed up");
        Ok(())
    }

    /// Replace the data file's contents with the backup at `src`.
    ///
    /// A missing backup restores an empty file.
    pub fn restore_from<P: AsRef<Path>>(&mut self, src: P) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;

        match File::open(src.as_ref()) {
            Ok(mut backup) => {
                io::copy(&mut backup, &mut self.file)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.file.sync_all()?;
        self.block_count = Self::count_blocks(&self.file)?;
        Ok(())
    }

    /// Get the number of blocks in the database file.
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Get the total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.block_count as u64) * (BLOCK_SIZE as u64)
    }
}
