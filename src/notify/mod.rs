//! Operator notifications: severity-tagged messages buffered per watch cycle,
//! written to the log file as they arrive, and mailed at most once per cycle
//! when something severe enough happened.

mod mail;
mod message;
mod sink;

pub use mail::{MailError, Mailer, SmtpMailer};
pub use message::{Message, ParseSeverityError, Severity};
pub use sink::{NotificationSink, SUBJECT_PREFIX, SinkSettings};
