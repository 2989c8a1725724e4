use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Timestamped append-only log of every raw line received, decode errors
/// included — malformed telemetry is visible here and nowhere else.
pub struct RawLineLog {
    file: File,
}

impl RawLineLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening raw log: {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn append(&mut self, line: &str) -> Result<()> {
        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        writeln!(self.file, "{stamp}\t{line}")?;
        Ok(())
    }
}
