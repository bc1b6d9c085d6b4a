use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 分段临时目录：`<output>.tmp/chunk_<index>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempWorkspace {
    dir: PathBuf,
}

impl TempWorkspace {
    pub fn dir_for(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// 创建临时目录；上一次中断留下的同名目录会被清掉
    pub fn prepare(output: &Path) -> io::Result<Self> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let dir = Self::dir_for(output);
        if dir.exists() {
            log::warn!("清理残留的临时目录: {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("chunk_{}", index))
    }

    pub fn segment_paths(&self, count: usize) -> Vec<PathBuf> {
        (0..count).map(|index| self.segment_path(index)).collect()
    }

    /// 删除整个临时目录，目录已不存在也算成功
    pub fn remove(self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
