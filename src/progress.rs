use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub const MAX_WIDTH: usize = 80;

/// Carriage return, then erase the whole line.
const CLEAR_LINE: &[u8] = b"\r\x1b[2K";

/// Observer for probe completion.
///
/// Reporters only look; nothing they do feeds back into the run, so any
/// rendering failure is swallowed.
pub trait Progress: Send + Sync {
    fn start(&self, _total: usize) {}
    fn inc(&self);
    fn finish(&self) {}
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn inc(&self) {}
}

#[derive(Default)]
struct Counts {
    done: usize,
    total: usize,
}

/// Log output on stderr that shares the row with a progress bar.
///
/// While a bar is left on screen without a newline, the next log line first
/// erases it; the bar comes back on its next update.
#[derive(Clone, Default)]
pub struct LogWriter {
    bar_drawn: Arc<AtomicBool>,
}

impl LogWriter {
    fn clear_bar<W: Write>(&self, out: &mut W) -> bool {
        if !self.bar_drawn.swap(false, Ordering::SeqCst) {
            return false;
        }
        let _ = out.write_all(CLEAR_LINE);
        true
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = io::Stderr;

    fn make_writer(&'a self) -> Self::Writer {
        let stderr = io::stderr();
        self.clear_bar(&mut stderr.lock());
        stderr
    }
}

/// Single-line bar redrawn on stderr.
#[derive(Default)]
pub struct TermProgress {
    // counted and drawn under one lock so the bar never goes backwards
    counts: Mutex<Counts>,
    bar_drawn: Arc<AtomicBool>,
}

impl TermProgress {
    pub fn new(log: &LogWriter) -> Self {
        Self {
            counts: Mutex::default(),
            bar_drawn: log.bar_drawn.clone(),
        }
    }

    fn draw(&self, counts: &Counts, end: &str) {
        let mut stderr = io::stderr().lock();
        let _ = write!(
            stderr,
            "\r{}{}",
            render_bar(counts.done, counts.total, MAX_WIDTH),
            end
        );
        let _ = stderr.flush();
        self.bar_drawn.store(end.is_empty(), Ordering::SeqCst);
    }
}

impl Progress for TermProgress {
    fn start(&self, total: usize) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts = Counts { done: 0, total };
            self.draw(&counts, "");
        }
    }

    fn inc(&self) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.done = (counts.done + 1).min(counts.total);
            self.draw(&counts, "");
        }
    }

    fn finish(&self) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.done = counts.total;
            self.draw(&counts, "\n");
        }
    }
}

/// `done / total [=====>    ] 50%`, at most `width` characters wide.
pub fn render_bar(done: usize, total: usize, width: usize) -> String {
    let percent = if total == 0 { 100 } else { done * 100 / total };
    let prefix = format!("{} / {} ", done, total);
    let suffix = format!(" {}%", percent);
    let inner = width.saturating_sub(prefix.len() + suffix.len() + 2);
    let filled = if total == 0 { inner } else { inner * done / total };

    let mut bar = String::with_capacity(width);
    bar.push_str(&prefix);
    bar.push('[');
    for i in 0..inner {
        bar.push(match i {
            i if i < filled => '=',
            i if i == filled => '>',
            _ => ' ',
        });
    }
    bar.push(']');
    bar.push_str(&suffix);
    bar
}
