//! Log output for the bot process: the console by default, or one file per
//! UTC day under `<runtime>/logs` when running as a service.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::EnvFilter;

const FILE_STEM: &str = "chatsweep";
const FILE_EXT: &str = "log";
const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_KEEP_DAYS: u64 = 30;

fn env_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

pub fn init_console_logging() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Service logging. Expired files are dropped at startup and again on every
/// day rollover.
pub fn init_logging(runtime_data_dir: &str) -> Result<()> {
    let archive = LogArchive::new(Path::new(runtime_data_dir).join("logs"), DEFAULT_KEEP_DAYS);
    archive.ensure_dir()?;
    archive.prune(Utc::now().date_naive())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(DailyLogFile::new(archive))
        .init();
    Ok(())
}

/// Directory of dated log files, `chatsweep.YYYY-MM-DD.log`.
#[derive(Clone, Debug)]
pub struct LogArchive {
    dir: PathBuf,
    keep_days: u64,
}

impl LogArchive {
    pub fn new(dir: impl Into<PathBuf>, keep_days: u64) -> Self {
        LogArchive {
            dir: dir.into(),
            keep_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory: {}", self.dir.display()))
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{FILE_STEM}.{}.{FILE_EXT}", day.format(DATE_FORMAT)))
    }

    /// Day encoded in a log file name; `None` for anything else.
    pub fn day_of(file_name: &str) -> Option<NaiveDate> {
        let day = file_name
            .strip_prefix(FILE_STEM)?
            .strip_prefix('.')?
            .strip_suffix(FILE_EXT)?
            .strip_suffix('.')?;
        NaiveDate::parse_from_str(day, DATE_FORMAT).ok()
    }

    /// Log files with their day, oldest first. A missing directory is empty.
    pub fn files(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.dir.display()))
            }
        };
        let mut files: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter_map(|path| {
                let day = path.file_name()?.to_str().and_then(Self::day_of)?;
                Some((day, path))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Removes files dated more than `keep_days` before `today`.
    pub fn prune(&self, today: NaiveDate) -> Result<usize> {
        let Some(oldest_kept) = today.checked_sub_days(Days::new(self.keep_days)) else {
            return Ok(0);
        };
        let mut removed = 0;
        for (day, path) in self.files()? {
            if day < oldest_kept && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn open(&self, day: NaiveDate) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(day))
    }
}

/// Writer handed to `tracing_subscriber`. The file for the current day is
/// opened on first write.
#[derive(Debug)]
pub struct DailyLogFile {
    archive: LogArchive,
    current: Mutex<Option<(NaiveDate, File)>>,
}

impl DailyLogFile {
    pub fn new(archive: LogArchive) -> Self {
        DailyLogFile {
            archive,
            current: Mutex::new(None),
        }
    }

    fn write_on(&self, today: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        let stale = current.as_ref().map_or(true, |(day, _)| *day != today);
        if stale {
            if let Some((_, mut old)) = current.take() {
                old.flush()?;
                let _ = self.archive.prune(today);
            }
            *current = Some((today, self.archive.open(today)?));
        }
        match current.as_mut() {
            Some((_, file)) => file.write(buf),
            None => Err(io::Error::other("log file unavailable")),
        }
    }
}

impl Write for &DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_on(Utc::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        match current.as_mut() {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DailyLogFile {
    type Writer = &'a DailyLogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}
