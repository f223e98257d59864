use chrono::Local;
use log::{Level, Log, SetLoggerError, set_boxed_logger, set_max_level};
use std::io::{BufWriter, Write, stderr};
use std::sync::mpsc;
use std::thread;

// Bounded so a stalled writer thread applies backpressure-by-drop instead of
// growing without limit.
const CHANNEL_CAPACITY: usize = 512;

pub enum LogCommand {
    Record(String),
    Flush,
}

/// `log` facade backend that hands formatted records to a background writer
/// thread over a bounded channel. Records go to stderr, keeping stdout free
/// for the transfer tooling itself.
pub struct CitrineLogger {
    max_level: Level,
    sender: mpsc::SyncSender<LogCommand>,
}

impl CitrineLogger {
    pub fn new(max_level: Level) -> (Self, mpsc::Receiver<LogCommand>) {
        let (sender, receiver) = mpsc::sync_channel(CHANNEL_CAPACITY);
        (CitrineLogger { max_level, sender }, receiver)
    }

    /// Installs the logger as the global `log` backend and spawns the writer
    /// thread. Call once, before any log macro fires.
    pub fn init(max_level: Level) -> Result<(), SetLoggerError> {
        let (logger, receiver) = CitrineLogger::new(max_level);

        let _handle = thread::Builder::new()
            .name("citrine-log-writer".into())
            .spawn(move || {
                let mut writer = BufWriter::new(stderr());
                while let Ok(command) = receiver.recv() {
                    match command {
                        LogCommand::Record(message) => {
                            if writer.write_all(message.as_bytes()).is_err() {
                                break;
                            }
                        }
                        LogCommand::Flush => {
                            let _ = writer.flush();
                        }
                    }
                }
                // Channel closed: drain whatever is buffered before the
                // thread goes away.
                let _ = writer.flush();
            })
            .expect("failed to spawn log writer thread");

        set_boxed_logger(Box::new(logger))?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }
}

impl Log for CitrineLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            let message = format!(
                "{} {:<5} [{}] {}\n",
                now.format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
            // A full channel drops the record rather than blocking the
            // transfer loop.
            let _ = self.sender.try_send(LogCommand::Record(message));
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(LogCommand::Flush);
    }
}
