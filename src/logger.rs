use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Mutex;

struct Line {
    level: Level,
    colored: ColoredString,
    /// Timestamped, uncolored form for the log file
    plain: String,
}

pub struct ChrootLogger {
    level: Mutex<LevelFilter>,
    output: Mutex<Box<dyn Write + Send>>,
    file: Mutex<Option<File>>,
    deferred: Mutex<Vec<Line>>,
    defer_output: Mutex<bool>,
}

impl ChrootLogger {
    pub fn new(level: LevelFilter) -> &'static Self {
        Box::leak(Box::new(Self {
            level: Mutex::new(level),
            output: Mutex::new(Box::new(io::stderr())),
            file: Mutex::new(None),
            deferred: Mutex::new(Vec::new()),
            defer_output: Mutex::new(true),
        }))
    }

    pub fn init(&'static self) -> Result<&'static Self, log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Trace);
        Ok(self)
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self.level.lock().expect("Failed to lock level") = level;
    }

    /// Also append every record that passes the level filter to `path`.
    pub fn attach_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o640)
            .open(path)
            .context(format!("Failed to open log file {}", path.display()))?;
        *self.file.lock().expect("Failed to lock file") = Some(file);
        Ok(())
    }

    pub fn print_deferred(&self) {
        {
            let deferred =
                self.deferred.lock().expect("Failed to lock deferred");
            let level_filter =
                *self.level.lock().expect("Failed to lock level");
            for line in deferred.iter() {
                if line.level <= level_filter {
                    self.emit(line);
                }
            }
        }
        self.deferred
            .lock()
            .expect("Failed to lock deferred")
            .clear();
        *self
            .defer_output
            .lock()
            .expect("Failed to lock defer_output") = false;
    }

    fn emit(&self, line: &Line) {
        let _ = writeln!(
            self.output.lock().expect("Failed to lock output"),
            "{}",
            line.colored
        );
        if let Some(file) = self.file.lock().expect("Failed to lock file").as_mut()
        {
            let _ = writeln!(file, "{}", line.plain);
        }
    }
}

impl Log for ChrootLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= *self.level.lock().expect("Failed to lock level")
    }

    fn log(&self, record: &Record) {
        let (level_str, color) = match record.level() {
            log::Level::Error => {
                (record.level().to_string(), colored::Color::Red)
            }
            log::Level::Warn => {
                (format!("{} ", record.level()), colored::Color::Yellow)
            }
            log::Level::Info => {
                (format!("{} ", record.level()), colored::Color::White)
            }
            log::Level::Debug => {
                (record.level().to_string(), colored::Color::Blue)
            }
            log::Level::Trace => {
                (record.level().to_string(), colored::Color::BrightBlack)
            }
        };
        let line = Line {
            level: record.level(),
            colored: format!(
                "[{}] {}: {}",
                level_str.color(color),
                record.target(),
                record.args()
            )
            .color(color),
            plain: format!(
                "{} [{}] [{}] {}: {}",
                chrono::Local::now().to_rfc3339(),
                std::process::id(),
                level_str.trim_end(),
                record.target(),
                record.args()
            ),
        };

        if *self
            .defer_output
            .lock()
            .expect("Failed to lock defer_output")
        {
            self.deferred
                .lock()
                .expect("Failed to lock deferred")
                .push(line);
        } else if self.enabled(record.metadata()) {
            self.emit(&line);
        }
    }

    fn flush(&self) {
        let _ = self.output.lock().expect("Failed to lock output").flush();
        if let Some(file) = self.file.lock().expect("Failed to lock file").as_mut()
        {
            let _ = file.flush();
        }
    }
}
