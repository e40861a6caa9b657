//! Boot logging
//!
//! A `log` backend that formats each record into a stack buffer and writes
//! it to the registered [`ConsoleSink`]. Nothing is allocated; a line
//! longer than [`LOG_LINE_LEN`] is cut short.

use core::fmt::Write;

use arrayvec::ArrayString;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::{Mutex, Once};

/// Longest formatted line, including the level prefix
pub const LOG_LINE_LEN: usize = 256;

/// Byte-oriented console the loader prints to
pub trait ConsoleSink: Sync {
    fn write_str(&self, s: &str);
}

/// Stack buffer that truncates at a character boundary instead of failing
struct MessageBuffer {
    line: ArrayString<LOG_LINE_LEN>,
}

impl MessageBuffer {
    const fn new() -> Self {
        Self {
            line: ArrayString::new_const(),
        }
    }

    fn as_str(&self) -> &str {
        &self.line
    }
}

impl Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let room = self.line.remaining_capacity();
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.line.push_str(&s[..take]);
        Ok(())
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => " WARN",
        Level::Info => " INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn format_record(record: &Record<'_>) -> MessageBuffer {
    let mut buf = MessageBuffer::new();
    let _ = match record.level() {
        // Plain loader output reads like the shell prints it.
        Level::Info => write!(buf, "{}", record.args()),
        level => write!(buf, "[{}] {}: {}", level_tag(level), record.target(), record.args()),
    };
    buf
}

/// Bootloader logger implementation
struct BootLogger;

static SINK: Once<&'static dyn ConsoleSink> = Once::new();
static LOGGER: BootLogger = BootLogger;

impl Log for BootLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else {
            return;
        };
        let line = format_record(record);
        sink.write_str(line.as_str());
        sink.write_str("\n");
    }

    fn flush(&self) {}
}

/// Install the logger writing to `sink`.
///
/// Returns `false` if a logger was already installed; the level is
/// applied either way.
pub fn init(sink: &'static dyn ConsoleSink, level: LevelFilter) -> bool {
    SINK.call_once(|| sink);
    let installed = log::set_logger(&LOGGER).is_ok();
    log::set_max_level(level);
    installed
}

/// Console that keeps the most recent output in memory.
///
/// Used to capture the boot log for later replay; once full, the oldest
/// half is discarded.
pub struct MemorySink<const N: usize> {
    text: Mutex<ArrayString<N>>,
}

impl<const N: usize> MemorySink<N> {
    pub const fn new() -> Self {
        Self {
            text: Mutex::new(ArrayString::new_const()),
        }
    }

    /// Copy of the captured text
    pub fn contents(&self) -> ArrayString<N> {
        *self.text.lock()
    }

    pub fn clear(&self) {
        self.text.lock().clear();
    }

    /// Write everything captured so far to `sink`
    pub fn replay(&self, sink: &dyn ConsoleSink) {
        sink.write_str(&self.text.lock());
    }
}

impl<const N: usize> Default for MemorySink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ConsoleSink for MemorySink<N> {
    fn write_str(&self, s: &str) {
        let mut text = self.text.lock();
        if s.len() > text.remaining_capacity() {
            let mut keep = text.len() / 2;
            while !text.is_char_boundary(keep) {
                keep += 1;
            }
            let tail: ArrayString<N> = ArrayString::from(&text[keep..]).unwrap_or_default();
            *text = tail;
        }
        let mut take = s.len().min(text.remaining_capacity());
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        text.push_str(&s[..take]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CAPTURE: MemorySink<{ 1 << 16 }> = MemorySink::new();

    #[test]
    fn test_message_buffer_truncates_on_char_boundary() {
        let mut buf = MessageBuffer::new();
        let long = "é".repeat(LOG_LINE_LEN);
        let _ = buf.write_str(&long);
        assert!(buf.as_str().len() <= LOG_LINE_LEN);
        assert!(buf.as_str().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_format_levels() {
        let info = format_record(
            &Record::builder()
                .args(format_args!("## Checking Image at 0x02000000 ..."))
                .level(Level::Info)
                .target("ppc_bootloader::kernel_if::uimage")
                .build(),
        );
        assert_eq!(info.as_str(), "## Checking Image at 0x02000000 ...");

        let warn = format_record(
            &Record::builder()
                .args(format_args!("no build tag"))
                .level(Level::Warn)
                .target("elf")
                .build(),
        );
        assert_eq!(warn.as_str(), "[ WARN] elf: no build tag");
    }

    #[test]
    fn test_memory_sink_discards_oldest() {
        let sink: MemorySink<16> = MemorySink::new();
        sink.write_str("0123456789");
        sink.write_str("abcdefghij");
        let text = sink.contents();
        assert!(text.ends_with("abcdefghij"));
        assert!(text.len() <= 16);
        sink.clear();
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn test_logger_writes_to_sink() {
        init(&CAPTURE, LevelFilter::Debug);
        log::info!("logger smoke line");
        log::trace!("filtered out");
        let text = CAPTURE.contents();
        assert!(text.contains("logger smoke line\n"));
        assert!(!text.contains("filtered out"));
    }
}
