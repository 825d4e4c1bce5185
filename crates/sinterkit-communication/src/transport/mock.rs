//! In-memory transport for tests and dry runs.

use crate::transport::Transport;
use parking_lot::Mutex;
use sinterkit_core::error::{Result, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A scriptable stand-in for a serial port.
///
/// Replies come from two sources: lines queued with [`push_reply`], and
/// an optional responder closure consulted on every write. Reads block
/// (politely, in small sleeps) until a reply is available or the
/// deadline passes, which mirrors how the real port behaves.
///
/// [`push_reply`]: MockTransport::push_reply
pub struct MockTransport {
    label: String,
    written: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<String>>,
    responder: Mutex<Option<Responder>>,
    open: AtomicBool,
}

impl MockTransport {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            written: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
            open: AtomicBool::new(true),
        })
    }

    /// Queue a reply line for a future read.
    pub fn push_reply(&self, line: impl Into<String>) {
        self.replies.lock().push_back(line.into());
    }

    /// Install a closure that may answer each written line.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// Every line written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// Written lines with the stop-confirmation chatter (`WST` barriers
    /// and `STA?` polls) filtered out.
    pub fn commands(&self) -> Vec<String> {
        self.written
            .lock()
            .iter()
            .filter(|line| !line.ends_with("WST") && !line.ends_with("STA?"))
            .cloned()
            .collect()
    }
}

impl Transport for MockTransport {
    fn write_line(&self, line: &str) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected {
                reason: format!("{} is closed", self.label),
            }
            .into());
        }
        self.written.lock().push(line.to_string());
        let reply = self.responder.lock().as_ref().and_then(|r| r(line));
        if let Some(reply) = reply {
            self.replies.lock().push_back(reply);
        }
        Ok(())
    }

    fn read_line(&self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.open.load(Ordering::SeqCst) {
                return Err(TransportError::Disconnected {
                    reason: format!("{} is closed", self.label),
                }
                .into());
            }
            if let Some(line) = self.replies.lock().pop_front() {
                return Ok(line);
            }
            if Instant::now() >= deadline {
                return Err(TransportError::ReadTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn name(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_writes_and_serves_replies() {
        let mock = MockTransport::new("bench");
        mock.push_reply("#1.5");
        mock.write_line("1POS?").unwrap();
        assert_eq!(mock.read_line(Duration::from_millis(10)).unwrap(), "#1.5");
        assert_eq!(mock.writes(), vec!["1POS?"]);
    }

    #[test]
    fn responder_answers_writes() {
        let mock = MockTransport::new("bench");
        mock.set_responder(|line| line.ends_with("STA?").then(|| "8".to_string()));
        mock.write_line("1MVA5").unwrap();
        mock.write_line("1STA?").unwrap();
        assert_eq!(mock.read_line(Duration::from_millis(10)).unwrap(), "8");
    }

    #[test]
    fn command_filter_drops_stop_chatter() {
        let mock = MockTransport::new("bench");
        for line in ["1MVA5", "1WST", "1STA?", "0STP"] {
            mock.write_line(line).unwrap();
        }
        assert_eq!(mock.commands(), vec!["1MVA5", "0STP"]);
    }

    #[test]
    fn read_times_out_when_nothing_arrives() {
        let mock = MockTransport::new("bench");
        let err = mock.read_line(Duration::from_millis(5)).unwrap_err();
        assert!(err.is_timeout());
    }
}
