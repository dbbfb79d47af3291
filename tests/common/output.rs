use std::sync::Mutex;

use rho_casper::interpreter::system_processes::OutputSink;

/// An [`OutputSink`] that keeps every line printed to it.
#[derive(Default)]
pub(crate) struct CapturedOutput {
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
}

impl CapturedOutput {
    pub(crate) fn stdout_lines(&self) -> Vec<String> {
        self.stdout.lock().unwrap().clone()
    }

    pub(crate) fn stderr_lines(&self) -> Vec<String> {
        self.stderr.lock().unwrap().clone()
    }
}

impl OutputSink for CapturedOutput {
    fn stdout(&self, line: &str) {
        self.stdout.lock().unwrap().push(line.to_string())
    }

    fn stderr(&self, line: &str) {
        self.stderr.lock().unwrap().push(line.to_string())
    }
}
