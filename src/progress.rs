//! Progress and logging helpers
//!
//! Indexing runs draw a progress bar while tracing output keeps flowing;
//! routing log lines through the shared MultiProgress keeps the bar pinned
//! below them.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// A styled per-file progress bar registered with the shared MultiProgress.
pub fn file_progress_bar(len: u64) -> ProgressBar {
    let pb = multi_progress().add(ProgressBar::new(len));
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style);
    }
    pb
}

/// MakeWriter that funnels tracing output through the MultiProgress.
#[derive(Default, Clone)]
pub struct LogWriterFactory;

pub struct LogWriter {
    buffer: String,
}

impl LogWriter {
    fn emit(&mut self, upto: usize) {
        let line = self.buffer[..upto].trim_end_matches(['\r', '\n']).to_string();
        let _ = multi_progress().println(line);
        self.buffer.drain(..upto);
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));
        while let Some(idx) = self.buffer.find('\n') {
            self.emit(idx + 1);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let upto = self.buffer.len();
            self.emit(upto);
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            buffer: String::new(),
        }
    }
}
