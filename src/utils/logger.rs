use chrono::Local; // 用于获取本地时间
use log::LevelFilter; // 用于设置日志级别
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// 日志文件超过 `max_size` 时轮转为 `<file>.backup`
pub fn rotate_if_needed(file_path: &str, max_size: u64) -> Result<bool, std::io::Error> {
    let size = match fs::metadata(file_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= max_size {
        return Ok(false);
    }
    let backup_path = format!("{}.backup", file_path);
    if Path::new(&backup_path).exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)?;
    Ok(true)
}

/// 解析日志级别，无法识别时回退到 info
pub fn parse_level(level: &str) -> LevelFilter {
    LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Info)
}

/// 初始化全局日志
///
/// `file_path` 为空时写到 stderr；`RUST_LOG` 会覆盖配置的级别。
pub fn init_logger(level: &str, file_path: &str, max_size: u64) -> Result<(), std::io::Error> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(level))
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });

    if !file_path.is_empty() {
        // 确保日志目录存在
        if let Some(parent) = Path::new(file_path).parent() {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(file_path, max_size)?;
        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    // 重复初始化（例如测试中）不视为错误
    if builder.try_init().is_err() {
        eprintln!("日志已初始化，忽略重复初始化");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }

    #[test]
    fn test_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let path = path.to_str().unwrap();

        assert!(!rotate_if_needed(path, 16).unwrap());

        fs::write(path, "x".repeat(32)).unwrap();
        assert!(rotate_if_needed(path, 16).unwrap());
        assert!(!Path::new(path).exists());
        assert_eq!(fs::read_to_string(format!("{}.backup", path)).unwrap().len(), 32);

        fs::write(path, "short").unwrap();
        assert!(!rotate_if_needed(path, 16).unwrap());
    }
}
