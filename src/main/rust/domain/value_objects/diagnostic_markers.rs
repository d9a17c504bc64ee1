/// Classification of a single diagnostic (stderr) line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Publisher confirmed an established outbound stream
    Steady,
    /// The stage cannot recover; the run must fail
    Fatal,
    /// Worth surfacing, but not a failure
    Warning,
    /// Anything else
    Info,
}

/// Case-insensitive substrings used to classify stage diagnostic output
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticMarkers {
    steady: Vec<String>,
    fatal: Vec<String>,
    warning: Vec<String>,
}

impl DiagnosticMarkers {
    pub fn new(steady: Vec<String>, fatal: Vec<String>, warning: Vec<String>) -> Self {
        Self {
            steady: lowercase(steady),
            fatal: lowercase(fatal),
            warning: lowercase(warning),
        }
    }

    pub fn with_steady(mut self, steady: Vec<String>) -> Self {
        self.steady = lowercase(steady);
        self
    }

    pub fn with_fatal(mut self, fatal: Vec<String>) -> Self {
        self.fatal = lowercase(fatal);
        self
    }

    pub fn with_warning(mut self, warning: Vec<String>) -> Self {
        self.warning = lowercase(warning);
        self
    }

    /// Fatal markers win over steady ones, steady over warnings
    pub fn classify(&self, line: &str) -> LineClass {
        let line = line.to_ascii_lowercase();
        let matches = |markers: &[String]| markers.iter().any(|m| line.contains(m.as_str()));

        if matches(&self.fatal) {
            LineClass::Fatal
        } else if matches(&self.steady) {
            LineClass::Steady
        } else if matches(&self.warning) {
            LineClass::Warning
        } else {
            LineClass::Info
        }
    }
}

impl Default for DiagnosticMarkers {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self::new(
            // `-progress pipe:2` reports once the output is open and packets flow
            list(&["progress=continue"]),
            list(&[
                "device or resource busy",
                "permission denied",
                "no such file or directory",
                "connection refused",
                "connection timed out",
                "network is unreachable",
                "error opening output",
                "could not write header",
                "broken pipe",
                "no cameras available",
                "failed to start camera",
            ]),
            list(&["dropped", "corrupt", "buffer overflow", "buffer full", "non-monotonic"]),
        )
    }
}

fn lowercase(markers: Vec<String>) -> Vec<String> {
    markers
        .into_iter()
        .map(|m| m.to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}
