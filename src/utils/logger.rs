use chrono::Local; // 用于获取本地时间
use env_logger::{Builder, Target};
use log::{Level, LevelFilter};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// 日志文件默认的轮转大小
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// 单行日志格式：`2024-01-01 12:00:00 [INFO] - message`
pub fn format_line(level: Level, message: &std::fmt::Arguments<'_>) -> String {
    format!("{} [{}] - {}", Local::now().format("%Y-%m-%d %H:%M:%S"), level, message)
}

/// 超过大小上限时把当前文件改名为 `.backup` 并重新开始写
pub struct RotatingFile {
    writer: BufWriter<File>,
    file_path: PathBuf,
    max_size: u64,
    current_size: u64,
}

impl RotatingFile {
    pub fn open(file_path: &Path, max_size: u64) -> io::Result<Self> {
        // 确保日志目录存在
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            writer: BufWriter::new(file),
            file_path: file_path.to_path_buf(),
            max_size,
            current_size,
        })
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.file_path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    fn check_rotation(&mut self) -> io::Result<()> {
        if self.current_size <= self.max_size {
            return Ok(());
        }
        self.writer.flush()?;

        let backup_path = self.backup_path();
        if backup_path.exists() {
            std::fs::remove_file(&backup_path)?;
        }
        std::fs::rename(&self.file_path, &backup_path)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        self.writer = BufWriter::new(file);
        self.current_size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_rotation()?;
        let written = self.writer.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 初始化全局日志；`RUST_LOG` 可以覆盖命令行给出的级别
///
/// 指定了日志文件时写入文件，否则写到 stderr。重复初始化会被忽略。
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) -> io::Result<()> {
    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "{}", format_line(record.level(), record.args())));

    if let Some(path) = log_file {
        let file = RotatingFile::open(Path::new(path), DEFAULT_MAX_LOG_SIZE)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    if builder.try_init().is_err() {
        log::debug!("日志已初始化，忽略重复初始化");
    }
    Ok(())
}
