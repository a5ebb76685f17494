use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest diagnostic line kept; the rest of the line is discarded
const MAX_LINE_BYTES: usize = 1024;

/// Ring of the most recent diagnostic lines of a transcoder
#[derive(Debug)]
pub struct StderrTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }

    /// Read `reader` to the end, logging every line and keeping the last
    /// `capacity` of them.
    ///
    /// ffmpeg redraws its progress line with `\r`, so both `\r` and `\n`
    /// end a line.
    pub async fn collect<R>(mut reader: R, capacity: usize, label: &str) -> Vec<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut tail = Self::new(capacity);
        let mut buf = [0u8; 4096];
        let mut line = Vec::with_capacity(256);

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(transcoder = %label, "Reading transcoder stderr: {}", e);
                    break;
                }
            };

            for &byte in &buf[..n] {
                if byte == b'\n' || byte == b'\r' {
                    tail.flush_line(&mut line, label);
                } else if line.len() < MAX_LINE_BYTES {
                    line.push(byte);
                }
            }
        }
        tail.flush_line(&mut line, label);

        tail.into_lines()
    }

    fn flush_line(&mut self, line: &mut Vec<u8>, label: &str) {
        let text = String::from_utf8_lossy(line).trim_end().to_string();
        line.clear();
        if text.is_empty() {
            return;
        }

        tracing::debug!(transcoder = %label, "ffmpeg: {}", text);
        self.push(text);
    }
}
