use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Rewrites every line break in `text` to this convention.
    pub fn normalize(&self, text: &str) -> String {
        let unix = text.replace("\r\n", "\n");
        match self {
            LineEnding::Lf => unix,
            LineEnding::CrLf => unix.replace('\n', "\r\n"),
        }
    }
}

/// In-memory script buffer. Scripts are rendered completely before anything
/// touches the disk.
#[derive(Debug)]
pub struct ScriptWriter {
    line_ending: LineEnding,
    buf: String,
}

impl ScriptWriter {
    pub fn new(line_ending: LineEnding) -> Self {
        Self {
            line_ending,
            buf: String::new(),
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.buf.push_str(text.as_ref());
        self.buf.push_str(self.line_ending.as_str());
    }

    pub fn blank(&mut self) {
        self.buf.push_str(self.line_ending.as_str());
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("creating directory {}", path.display()))
}

/// Create-or-truncate write. A crash mid-write leaves a partial file.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_uses_configured_line_ending() {
        let mut w = ScriptWriter::new(LineEnding::CrLf);
        w.line("@echo off");
        w.blank();
        w.line("exit /b 0");
        assert_eq!(w.finish(), "@echo off\r\n\r\nexit /b 0\r\n");
    }

    #[test]
    fn normalize_handles_mixed_input() {
        let mixed = "a\r\nb\nc\r\n";
        assert_eq!(LineEnding::Lf.normalize(mixed), "a\nb\nc\n");
        assert_eq!(LineEnding::CrLf.normalize(mixed), "a\r\nb\r\nc\r\n");
    }

    #[test]
    fn write_artifact_truncates_existing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("stress.sh");
        write_artifact(&path, b"a much longer first version\n").expect("first write");
        write_artifact(&path, b"short\n").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "short\n");
    }
}
