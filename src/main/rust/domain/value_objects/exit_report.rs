use std::fmt;

/// How a transcoder process ended, produced once per process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// Last lines of the diagnostic stream
    pub stderr_tail: Vec<String>,
}

impl ExitReport {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn with_signal(signal: i32) -> Self {
        Self {
            signal: Some(signal),
            ..Self::default()
        }
    }

    pub fn with_stderr_tail(mut self, tail: Vec<String>) -> Self {
        self.stderr_tail = tail;
        self
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Short summary followed by the diagnostic tail
    pub fn detail(&self) -> String {
        if self.stderr_tail.is_empty() {
            self.to_string()
        } else {
            format!("{}\n{}", self, self.stderr_tail.join("\n"))
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exited with code {}", code),
            (None, Some(signal)) => write!(f, "terminated by signal {}", signal),
            (None, None) => write!(f, "exited with unknown status"),
        }
    }
}
