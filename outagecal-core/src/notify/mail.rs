//! Email notifications over SMTP or a local sendmail binary.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{
    AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{OutageError, OutageResult};
use crate::notify::{ChangeNotice, Notifier};

const MAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP relay settings. With `use_tls` the connection is upgraded with
/// STARTTLS before logging in.
#[derive(Debug, Clone)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Sendmail(AsyncSendmailTransport<Tokio1Executor>),
}

pub struct MailNotifier {
    transport: Transport,
    from: Mailbox,
    to: Mailbox,
}

impl MailNotifier {
    /// Send through an SMTP relay. The sender is `from`, else the SMTP
    /// user, else the recipient.
    pub fn smtp(options: &SmtpOptions, to: &str, from: Option<&str>) -> OutageResult<Self> {
        if options.host.trim().is_empty() {
            return Err(OutageError::Config(
                "notify.smtp_host is required for SMTP notifications".into(),
            ));
        }

        let builder = if options.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&options.host).map_err(|e| {
                OutageError::Config(format!("Invalid SMTP host '{}': {}", options.host, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&options.host)
        };
        let mut builder = builder.port(options.port).timeout(Some(MAIL_TIMEOUT));
        if let Some(user) = non_blank(options.user.as_deref()) {
            builder = builder.credentials(Credentials::new(
                user.to_string(),
                options.password.clone().unwrap_or_default(),
            ));
        }
        let transport: AsyncSmtpTransport<Tokio1Executor> = builder.build();

        let sender = non_blank(from).or(non_blank(options.user.as_deref()));
        Self::with_transport(Transport::Smtp(transport), to, sender)
    }

    /// Hand the message to a sendmail-compatible program. The sender is
    /// `from`, else the recipient.
    pub fn sendmail(program: &str, to: &str, from: Option<&str>) -> OutageResult<Self> {
        let transport = AsyncSendmailTransport::<Tokio1Executor>::new_with_command(program);
        Self::with_transport(Transport::Sendmail(transport), to, non_blank(from))
    }

    fn with_transport(transport: Transport, to: &str, from: Option<&str>) -> OutageResult<Self> {
        let to = non_blank(Some(to))
            .ok_or_else(|| OutageError::Config("notify.to is required for email notifications".into()))?;
        let to = mailbox("notify.to", to)?;
        let from = match from {
            Some(from) => mailbox("notify.from", from)?,
            None => to.clone(),
        };
        Ok(MailNotifier {
            transport,
            from,
            to,
        })
    }

    fn message(&self, notice: &ChangeNotice) -> OutageResult<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notice.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body())
            .map_err(|e| OutageError::Notify(format!("Failed to build email: {}", e)))
    }

    async fn send(&self, message: Message) -> OutageResult<()> {
        match &self.transport {
            Transport::Smtp(smtp) => {
                let response = smtp
                    .send(message)
                    .await
                    .map_err(|e| OutageError::Notify(format!("SMTP delivery failed: {}", e)))?;
                debug!(code = %response.code(), "SMTP relay accepted the message");
                Ok(())
            }
            Transport::Sendmail(sendmail) => sendmail
                .send(message)
                .await
                .map_err(|e| OutageError::Notify(format!("sendmail failed: {}", e))),
        }
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn notify(&self, notice: &ChangeNotice) -> OutageResult<()> {
        let message = self.message(notice)?;
        timeout(MAIL_TIMEOUT, self.send(message))
            .await
            .map_err(|_| OutageError::Notify("email delivery timed out".into()))?
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn mailbox(key: &str, value: &str) -> OutageResult<Mailbox> {
    value
        .parse()
        .map_err(|e| OutageError::Config(format!("Invalid {} address '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::QueueId;
    use chrono::NaiveDate;

    fn notice() -> ChangeNotice {
        ChangeNotice {
            date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            queue: QueueId::new("2").unwrap(),
            updated_at: None,
            ranges: vec!["09:00-13:00".parse().unwrap()],
        }
    }

    fn smtp_options(host: &str) -> SmtpOptions {
        SmtpOptions {
            host: host.into(),
            port: 587,
            user: Some("bot@example.com".into()),
            password: Some("secret".into()),
            use_tls: true,
        }
    }

    fn formatted(notifier: &MailNotifier) -> String {
        String::from_utf8(notifier.message(&notice()).unwrap().formatted()).unwrap()
    }

    #[test]
    fn test_requires_recipient() {
        assert!(matches!(
            MailNotifier::sendmail("sendmail", " ", None),
            Err(OutageError::Config(_))
        ));
        assert!(matches!(
            MailNotifier::smtp(&smtp_options("smtp.example.com"), "", None),
            Err(OutageError::Config(_))
        ));
    }

    #[test]
    fn test_smtp_requires_host() {
        assert!(matches!(
            MailNotifier::smtp(&smtp_options(" "), "me@example.com", None),
            Err(OutageError::Config(msg)) if msg.contains("smtp_host")
        ));
    }

    #[test]
    fn test_invalid_address_is_config_error() {
        assert!(matches!(
            MailNotifier::sendmail("sendmail", "not an address", None),
            Err(OutageError::Config(msg)) if msg.contains("notify.to")
        ));
    }

    #[test]
    fn test_smtp_sender_falls_back_to_user() {
        let notifier = MailNotifier::smtp(&smtp_options("smtp.example.com"), "me@example.com", None).unwrap();
        let mail = formatted(&notifier);
        assert!(mail.contains("From: bot@example.com\r\n"));
        assert!(mail.contains("To: me@example.com\r\n"));

        let notifier =
            MailNotifier::smtp(&smtp_options("smtp.example.com"), "me@example.com", Some("alerts@example.com"))
                .unwrap();
        assert!(formatted(&notifier).contains("From: alerts@example.com\r\n"));
    }

    #[test]
    fn test_message_headers_and_body() {
        let notifier = MailNotifier::sendmail("sendmail", "me@example.com", None).unwrap();
        let mail = formatted(&notifier);
        assert!(mail.contains("From: me@example.com\r\n"));
        assert!(mail.contains("Subject: Power outage schedule updated: 2026-10-18 (Queue 2)\r\n"));
        assert!(mail.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(mail.contains("Detected schedule update."));
        assert!(mail.contains("- 2026-10-18 09:00 -> 2026-10-18 13:00"));
    }

    #[tokio::test]
    async fn test_delivers_over_plain_smtp() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let relay = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut seen = Vec::new();
            let mut in_data = false;

            write.write_all(b"220 localhost ESMTP\r\n").await.unwrap();
            while let Ok(Some(line)) = lines.next_line().await {
                seen.push(line.clone());
                if in_data {
                    if line == "." {
                        in_data = false;
                        write.write_all(b"250 queued\r\n").await.unwrap();
                    }
                    continue;
                }
                let verb = line.get(..4).unwrap_or_default().to_ascii_uppercase();
                let reply: &[u8] = match verb.as_str() {
                    "EHLO" | "HELO" => b"250 localhost\r\n",
                    "DATA" => {
                        in_data = true;
                        b"354 go ahead\r\n"
                    }
                    "QUIT" => b"221 bye\r\n",
                    _ => b"250 ok\r\n",
                };
                if write.write_all(reply).await.is_err() || verb == "QUIT" {
                    break;
                }
            }
            seen
        });

        let options = SmtpOptions {
            host: "127.0.0.1".into(),
            port,
            user: None,
            password: None,
            use_tls: false,
        };
        let notifier = MailNotifier::smtp(&options, "me@example.com", Some("bot@example.com")).unwrap();
        notifier.notify(&notice()).await.unwrap();
        drop(notifier);

        let seen = relay.await.unwrap();
        assert!(seen.iter().any(|l| l.starts_with("MAIL FROM:<bot@example.com>")));
        assert!(seen.iter().any(|l| l.starts_with("RCPT TO:<me@example.com>")));
        assert!(seen.iter().any(|l| l.contains("(Queue 2)")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipes_message_to_sendmail_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mail.txt");
        let script = dir.path().join("sendmail.sh");
        std::fs::write(&script, format!("#!/bin/sh\ncat > '{}'\n", out.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let notifier = MailNotifier::sendmail(script.to_str().unwrap(), "me@example.com", None).unwrap();
        notifier.notify(&notice()).await.unwrap();

        let mail = std::fs::read_to_string(&out).unwrap();
        assert!(mail.contains("To: me@example.com"));
        assert!(mail.contains("- 2026-10-18 09:00 -> 2026-10-18 13:00"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_sendmail_is_notify_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sendmail.sh");
        std::fs::write(&script, "#!/bin/sh\ncat > /dev/null\necho 'relay refused' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let notifier = MailNotifier::sendmail(script.to_str().unwrap(), "me@example.com", None).unwrap();
        assert!(matches!(
            notifier.notify(&notice()).await,
            Err(OutageError::Notify(_))
        ));
    }
}
