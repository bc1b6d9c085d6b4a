use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// 分段文件写入器
///
/// 数据先进入固定大小的缓冲区，缓冲区写满或显式 `flush` 时才落盘。
/// `write`/`flush` 返回本次真正写入磁盘的字节数，调用方据此推进进度计数。
#[derive(Debug)]
pub struct SegmentWriter {
    buffer: Vec<u8>,
    buffer_size: usize,
    file: File,
    total_written: u64,
}

impl SegmentWriter {
    /// 新建（或截断）分段文件
    pub fn create(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let buffer_size = buffer_size.max(1);

        Ok(Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            file,
            total_written: 0,
        })
    }

    pub fn write(&mut self, mut data: &[u8]) -> io::Result<u64> {
        let mut flushed = 0;
        while !data.is_empty() {
            let space_left = self.buffer_size - self.buffer.len();
            let to_copy = space_left.min(data.len());
            self.buffer.extend_from_slice(&data[..to_copy]);
            data = &data[to_copy..];

            if self.buffer.len() == self.buffer_size {
                flushed += self.flush()?;
            }
        }
        Ok(flushed)
    }

    pub fn flush(&mut self) -> io::Result<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        self.file.write_all(&self.buffer)?;
        let written = self.buffer.len() as u64;
        self.total_written += written;
        self.buffer.clear();
        Ok(written)
    }

    /// 刷新剩余数据并同步到磁盘
    pub fn finish(&mut self) -> io::Result<u64> {
        let flushed = self.flush()?;
        self.file.sync_all()?;
        Ok(flushed)
    }

    /// 已落盘字节数
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// 已接收字节数（落盘 + 缓冲中）
    pub fn accepted(&self) -> u64 {
        self.total_written + self.buffer.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_buffered_until_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_0");
        let mut writer = SegmentWriter::create(&path, 8).unwrap();

        assert_eq!(writer.write(b"abc").unwrap(), 0);
        assert_eq!(writer.accepted(), 3);
        assert_eq!(writer.total_written(), 0);

        // 跨越两次缓冲区边界
        assert_eq!(writer.write(b"defghijklmnopq").unwrap(), 16);
        assert_eq!(writer.total_written(), 16);
        assert_eq!(writer.accepted(), 17);

        assert_eq!(writer.finish().unwrap(), 1);
        assert_eq!(writer.flush().unwrap(), 0);
        drop(writer);

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghijklmnopq");
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_1");
        std::fs::write(&path, b"stale data from an old run").unwrap();

        let mut writer = SegmentWriter::create(&path, 4).unwrap();
        writer.write(b"new").unwrap();
        writer.finish().unwrap();
        drop(writer);

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("chunk_0");
        assert!(SegmentWriter::create(&path, 4).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_flush_keeps_buffered_data() {
        let mut writer = SegmentWriter::create(Path::new("/dev/full"), 64).unwrap();
        assert_eq!(writer.write(b"abc").unwrap(), 0);

        assert!(writer.flush().is_err());
        assert_eq!(writer.total_written(), 0);
        assert_eq!(writer.accepted(), 3);
    }
}
