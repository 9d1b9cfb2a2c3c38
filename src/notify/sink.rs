use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;

use super::mail::Mailer;
use super::message::{Message, Severity, format_line};

/// Subject prefix for every outgoing notification.
pub const SUBJECT_PREFIX: &str = "[webwatchd] ";

/// Everything the sink needs to know about where output goes.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub log_file: Option<PathBuf>,
    /// Echo every recorded message to stdout (foreground mode).
    pub console: bool,
    pub log_threshold: Severity,
    pub email_threshold: Severity,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            log_file: None,
            console: false,
            log_threshold: Severity::Notice,
            email_threshold: Severity::Critical,
        }
    }
}

/// Cycle-scoped message buffer with incremental file logging and a single
/// mail decision at [`NotificationSink::flush`].
pub struct NotificationSink {
    settings: SinkSettings,
    mailer: Box<dyn Mailer>,
    buffer: Vec<Message>,
}

impl NotificationSink {
    pub fn new(settings: SinkSettings, mailer: Box<dyn Mailer>) -> Self {
        Self {
            settings,
            mailer,
            buffer: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }

    /// Messages recorded since the last flush, oldest first.
    pub fn buffered(&self) -> &[Message] {
        &self.buffer
    }

    pub fn record(&mut self, severity: Severity, summary: impl Into<String>) {
        self.push(Message::new(severity, summary, None));
    }

    pub fn record_detail(
        &mut self,
        severity: Severity,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.push(Message::new(severity, summary, Some(detail.into())));
    }

    fn push(&mut self, msg: Message) {
        let line = msg.log_line();
        if self.settings.console {
            echo(&line);
        }
        if msg.severity.clears(self.settings.log_threshold) {
            self.append_log(&line);
        }
        self.buffer.push(msg);
    }

    fn append_log(&self, line: &str) {
        let Some(path) = &self.settings.log_file else {
            return;
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = written {
            log::warn!("Failed to append to log file {}: {e}", path.display());
            if self.settings.console {
                echo(&format_line(
                    &Local::now(),
                    Severity::Critical,
                    "FAILED TO WRITE LOG FILE!",
                ));
            }
        }
    }

    /// End-of-cycle flush.
    ///
    /// Sends one mail for the most recently recorded message that clears the
    /// email threshold, records the send outcome, then empties the buffer
    /// whatever happened. Returns whether a mail was attempted.
    pub fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }

        let threshold = self.settings.email_threshold;
        let selected = self
            .buffer
            .iter()
            .rev()
            .find(|msg| msg.severity.clears(threshold))
            .map(|msg| {
                (
                    format!("{SUBJECT_PREFIX}{}", msg.summary),
                    msg.detail.clone().unwrap_or_else(|| msg.summary.clone()),
                )
            });

        let attempted = selected.is_some();
        if let Some((subject, body)) = selected {
            self.record(Severity::Notice, "Sending email notification");
            match self.mailer.send(&subject, &body) {
                Ok(()) => self.record(Severity::Message, "Email notification sent successfully."),
                Err(e) => {
                    log::warn!("Email notification '{subject}' failed: {e}");
                    self.record(Severity::Warning, "Email notification could not be sent.");
                }
            }
        }

        self.buffer.clear();
        attempted
    }
}

fn echo(line: &str) {
    let _ = writeln!(io::stdout().lock(), "{line}");
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::notify::mail::MailError;

    #[derive(Clone, Default)]
    struct RecordingMailer {
        sent: Rc<RefCell<Vec<(String, String)>>>,
        fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
            self.sent
                .borrow_mut()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                Err(MailError::NotConfigured("smtp.server"))
            } else {
                Ok(())
            }
        }
    }

    fn sink_with(
        email_threshold: Severity,
        log_file: Option<PathBuf>,
        mailer: RecordingMailer,
    ) -> NotificationSink {
        NotificationSink::new(
            SinkSettings {
                log_file,
                console: false,
                log_threshold: Severity::Notice,
                email_threshold,
            },
            Box::new(mailer),
        )
    }

    #[test]
    fn flush_on_empty_buffer_is_a_noop() {
        let mailer = RecordingMailer::default();
        let mut sink = sink_with(Severity::Debug, None, mailer.clone());
        assert!(!sink.flush());
        assert!(mailer.sent.borrow().is_empty());
        assert!(sink.buffered().is_empty());
    }

    #[test]
    fn flush_selects_last_threshold_clearing_message() {
        let mailer = RecordingMailer::default();
        let mut sink = sink_with(Severity::Message, None, mailer.clone());
        sink.record(Severity::Notice, "n");
        sink.record(Severity::Warning, "first warning");
        sink.record(Severity::Message, "message");
        sink.record(Severity::Warning, "second warning");

        assert!(sink.flush());
        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "[webwatchd] second warning");
    }

    #[test]
    fn flush_only_match_wins_even_if_earlier() {
        let mailer = RecordingMailer::default();
        let mut sink = sink_with(Severity::Warning, None, mailer.clone());
        sink.record(Severity::Error, "broken");
        sink.record(Severity::Notice, "chatter");
        sink.flush();
        assert_eq!(mailer.sent.borrow()[0].0, "[webwatchd] broken");
    }

    #[test]
    fn flush_prefers_last_match_over_first() {
        let mailer = RecordingMailer::default();
        let mut sink = sink_with(Severity::Warning, None, mailer.clone());
        sink.record(Severity::Warning, "transient");
        sink.record(Severity::Error, "outcome");
        sink.flush();
        assert_eq!(mailer.sent.borrow()[0].0, "[webwatchd] outcome");
    }

    #[test]
    fn body_is_detail_or_summary() {
        let mailer = RecordingMailer::default();
        let mut sink = sink_with(Severity::Error, None, mailer.clone());
        sink.record_detail(Severity::Error, "Web server is offline", "URL down");
        sink.flush();
        sink.record(Severity::Critical, "no detail");
        sink.flush();
        let sent = mailer.sent.borrow();
        assert_eq!(sent[0].1, "URL down");
        assert_eq!(sent[1].1, "no detail");
    }

    #[test]
    fn no_mail_below_threshold_but_buffer_still_cleared() {
        let mailer = RecordingMailer::default();
        let mut sink = sink_with(Severity::Critical, None, mailer.clone());
        sink.record(Severity::Error, "only an error");
        assert!(!sink.flush());
        assert!(mailer.sent.borrow().is_empty());
        assert!(sink.buffered().is_empty());
    }

    #[test]
    fn failed_send_is_swallowed_and_buffer_cleared() {
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("watch.log");
        let mut sink = sink_with(Severity::Error, Some(log.clone()), mailer.clone());
        sink.record(Severity::Error, "down");
        assert!(sink.flush());
        assert!(sink.buffered().is_empty());
        assert_eq!(mailer.sent.borrow().len(), 1);

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("[Warning] Email notification could not be sent."));
    }

    #[test]
    fn send_outcome_does_not_trigger_a_second_mail() {
        let mailer = RecordingMailer::default();
        // Message-level threshold: the "sent successfully" record would clear it.
        let mut sink = sink_with(Severity::Message, None, mailer.clone());
        sink.record(Severity::Error, "down");
        sink.flush();
        assert_eq!(mailer.sent.borrow().len(), 1);
        assert!(!sink.flush());
        assert_eq!(mailer.sent.borrow().len(), 1);
    }

    #[test]
    fn log_file_respects_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("watch.log");
        let mut sink = sink_with(Severity::Critical, Some(log.clone()), RecordingMailer::default());
        sink.record(Severity::Notice, "kept");
        sink.record(Severity::Debug, "dropped");
        sink.record(Severity::Error, "also kept");

        let contents = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[Notice] kept"));
        assert!(lines[1].ends_with("[Error] also kept"));
        // Debug is still buffered even though it was not logged.
        assert_eq!(sink.buffered().len(), 3);
    }

    #[test]
    fn unwritable_log_file_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for append.
        let mut sink = sink_with(
            Severity::Critical,
            Some(dir.path().to_path_buf()),
            RecordingMailer::default(),
        );
        sink.record(Severity::Error, "still buffered");
        assert_eq!(sink.buffered().len(), 1);
    }
}
