//! In-memory storage implementation for testing and ephemeral deployments.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{
    Storage, StorageConfig, StorageError, StorageInput, StorageOutput, validate_name,
};

type FileMap = Arc<Mutex<HashMap<String, Box<[u8]>>>>;

/// An in-memory storage implementation.
///
/// Finalized files are kept as `Box<[u8]>`. A [`MemoryOutput`] buffers
/// privately and publishes its bytes only on [`StorageOutput::close`], so an
/// abandoned write never becomes visible.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
    #[allow(dead_code)]
    config: StorageConfig,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: StorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(StorageConfig::default())
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.files.lock().values().map(|data| data.len() as u64).sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(MemoryInput::new(data.to_vec())))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        validate_name(name)?;
        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut file_names: Vec<String> = self.files.lock().keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(data.len() as u64)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let mut files = self.files.lock();
        let data = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;

        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)> {
        let temp_name = format!("{prefix}.{}.tmp", uuid::Uuid::new_v4().simple());
        let output = self.create_output(&temp_name)?;
        Ok((temp_name, output))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// A memory-based input implementation.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Vec<u8>>,
    size: u64,
}

impl MemoryInput {
    fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        MemoryInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// A memory-based output implementation.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileMap) -> Self {
        MemoryOutput {
            name,
            buffer: Vec::new(),
            files,
            closed: false,
        }
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.buffer.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let data = std::mem::take(&mut self.buffer).into_boxed_slice();
            self.files.lock().insert(self.name.clone(), data);
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("3/4.pxdx").unwrap();
        output.write_all(b"Hello").unwrap();
        assert_eq!(output.position().unwrap(), 5);
        output.close().unwrap();

        let mut input = storage.open_input("3/4.pxdx").unwrap();
        let mut buffer = String::new();
        input.read_to_string(&mut buffer).unwrap();
        assert_eq!(buffer, "Hello");
        assert_eq!(storage.file_count(), 1);
        assert_eq!(storage.total_size(), 5);
    }

    #[test]
    fn test_unclosed_output_is_invisible() {
        let storage = MemoryStorage::new_default();

        {
            let mut output = storage.create_output("1/1.pxdx").unwrap();
            output.write_all(b"partial").unwrap();
        }

        assert!(!storage.file_exists("1/1.pxdx"));
        assert!(storage.open_input("1/1.pxdx").is_err());
    }

    #[test]
    fn test_rename_and_delete() {
        let storage = MemoryStorage::new_default();

        let (temp, mut output) = storage.create_temp_output("1/1.pxdx").unwrap();
        output.write_all(b"abc").unwrap();
        output.close().unwrap();

        storage.rename_file(&temp, "1/1.pxdx").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["1/1.pxdx"]);
        assert_eq!(storage.file_size("1/1.pxdx").unwrap(), 3);

        storage.delete_file("1/1.pxdx").unwrap();
        assert!(!storage.file_exists("1/1.pxdx"));
        assert!(storage.rename_file("1/1.pxdx", "1/2.pxdx").is_err());
    }
}
