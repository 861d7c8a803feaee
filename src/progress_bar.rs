use std::fmt::Write;
use std::io::{self, stdout};
use std::time::Instant;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use crossterm::cursor::MoveToColumn;

/// Single-line text progress bar for one download
pub struct ProgressBar {
    label: String,
    bar_buf: String,
    start_instant: Instant,
    bar_width: usize
}

impl ProgressBar {
    pub fn new(label: impl Into<String>, max_width: usize) -> Self {
        Self {
            label: label.into(),
            bar_buf: String::new(),
            start_instant: Instant::now(),
            bar_width: crossterm::terminal::size().ok()
                .map(|(cols, _rows)| usize::from(cols))
                .unwrap_or(80)
                .min(max_width),
        }
    }

    fn update(&mut self, downloaded_len: u64, total_len: Option<u64>) -> Result<&str, std::fmt::Error> {
        let (downloaded_size, downloaded_unit) = byte_unit(downloaded_len);
        let elapsed = self.start_instant.elapsed();

        self.bar_buf.clear();
        write!(self.bar_buf, "{} ", self.label)?;

        match total_len.filter(|total| *total > 0) {
            Some(total_len) => {
                let progress = (downloaded_len.min(total_len) * 100 / total_len) as usize;
                let (total_size, total_unit) = byte_unit(total_len);
                let info = format!(
                    " {progress:>3} % {downloaded_size:.2} {downloaded_unit} / {total_size:.2} {total_unit} {elapsed:.1?}"
                );

                let bar_p_width = self.bar_width
                    .saturating_sub(self.bar_buf.chars().count() + info.chars().count() + 2);
                let progress_width = progress * bar_p_width / 100;
                self.bar_buf.push('[');
                for _ in 0..progress_width {
                    self.bar_buf.push('█');
                }
                for _ in progress_width..bar_p_width {
                    self.bar_buf.push(' ');
                }
                self.bar_buf.push(']');
                self.bar_buf.push_str(&info);
            }
            None => {
                write!(self.bar_buf, "{downloaded_size:.2} {downloaded_unit} {elapsed:.1?}")?;
            }
        }

        Ok(&self.bar_buf)
    }

    pub fn print(&mut self, downloaded_len: u64, total_len: Option<u64>) -> io::Result<()> {
        let line = self.update(downloaded_len, total_len)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
            .to_string();

        execute!(
            stdout(),
            Clear(ClearType::CurrentLine),
            MoveToColumn(0),
            crossterm::style::Print(line),
        )
    }

    pub fn finish(&mut self, message: &str) -> io::Result<()> {
        let line = format!("{} {}\n", self.label, message);
        execute!(
            stdout(),
            Clear(ClearType::CurrentLine),
            MoveToColumn(0),
            crossterm::style::Print(line),
        )
    }
}

pub fn byte_unit(bytes_count: u64) -> (f32, &'static str) {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    let mut i = 0;
    let mut bytes_count = bytes_count as f32;
    while bytes_count >= 1024.0 && i < UNITS.len() - 1 {
        i += 1;
        bytes_count /= 1024.0;
    }
    (bytes_count, UNITS[i])
}
