//! Patron notifications: pickup notices for ready holds and overdue reminders

use std::str::FromStr;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::{loan::OverdueLoan, reservation::HoldNotice},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn reservation_ready(&self, notice: &HoldNotice) -> AppResult<()>;
    async fn loan_overdue(&self, notice: &OverdueLoan) -> AppResult<()>;
}

/// Send overdue reminders; failures are logged and skipped.
/// Returns the number of reminders sent.
pub async fn send_overdue_notices(notifier: &dyn Notifier, loans: &[OverdueLoan]) -> usize {
    let mut sent = 0;
    for loan in loans {
        match notifier.loan_overdue(loan).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::warn!(
                loan_id = loan.loan_id,
                user_id = loan.user_id,
                "Failed to send overdue notice: {}",
                e
            ),
        }
    }
    sent
}

/// Send a pickup notice; a failure is logged and never reported to the caller
pub async fn send_hold_notice(notifier: &dyn Notifier, notice: &HoldNotice) {
    if let Err(e) = notifier.reservation_ready(notice).await {
        tracing::warn!(
            reservation_id = notice.reservation_id,
            user_id = notice.user_id,
            "Failed to send pickup notice: {}",
            e
        );
    }
}

/// SMTP notifier. With `email.enabled = false` it only logs the messages.
#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        if !self.config.enabled {
            tracing::info!(to, subject, "Email disabled, notification not sent");
            return Ok(());
        }

        let email = self.build_message(to, subject, body)?;
        let mailer = self.mailer()?;

        // lettre's SMTP transport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::debug!(to, subject, "Email sent");
        Ok(())
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("University Library");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                "<html><body><p>{}</p></body></html>",
                                body.trim().replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn reservation_ready(&self, notice: &HoldNotice) -> AppResult<()> {
        let until = notice
            .expires_at
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "further notice".to_string());

        let body = format!(
            r#"
Dear {name},

"{title}" is ready for pickup at the circulation desk.
It will be held for you until {until}.
"#,
            name = notice.user_name,
            title = notice.material_title,
            until = until,
        );

        self.send_email(&notice.email, "Your reservation is ready for pickup", &body)
            .await
    }

    async fn loan_overdue(&self, notice: &OverdueLoan) -> AppResult<()> {
        let body = format!(
            r#"
Dear {name},

"{title}" was due on {due}. Please return it as soon as possible;
late returns are fined for each day overdue.
"#,
            name = notice.user_name,
            title = notice.material_title,
            due = notice.due_date.format("%Y-%m-%d"),
        );

        self.send_email(&notice.email, "Overdue library loan", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn overdue(loan_id: i32) -> OverdueLoan {
        OverdueLoan {
            loan_id,
            user_id: 3,
            email: "grace@university.edu".to_string(),
            user_name: "Grace Hopper".to_string(),
            material_title: "Compilers".to_string(),
            due_date: Utc::now(),
        }
    }

    #[test]
    fn test_failed_notices_are_skipped() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_loan_overdue()
            .times(3)
            .returning(|loan| {
                if loan.loan_id == 2 {
                    Err(AppError::Internal("smtp down".to_string()))
                } else {
                    Ok(())
                }
            });

        let loans = vec![overdue(1), overdue(2), overdue(3)];
        let sent = tokio_test::block_on(send_overdue_notices(&notifier, &loans));
        assert_eq!(sent, 2);
    }

    #[test]
    fn test_hold_notice_failure_is_swallowed() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_reservation_ready()
            .times(1)
            .returning(|_| Err(AppError::Internal("smtp down".to_string())));

        let notice = HoldNotice {
            reservation_id: 9,
            user_id: 3,
            email: "grace@university.edu".to_string(),
            user_name: "Grace Hopper".to_string(),
            material_title: "Compilers".to_string(),
            expires_at: None,
        };
        tokio_test::block_on(send_hold_notice(&notifier, &notice));
    }

    #[test]
    fn test_disabled_email_only_logs() {
        let notifier = EmailNotifier::new(EmailConfig::default());
        assert!(!EmailConfig::default().enabled);
        assert!(tokio_test::block_on(notifier.loan_overdue(&overdue(1))).is_ok());
    }

    #[test]
    fn test_message_builds() {
        let notifier = EmailNotifier::new(EmailConfig {
            smtp_from: "library@university.edu".to_string(),
            ..EmailConfig::default()
        });
        assert!(notifier
            .build_message("grace@university.edu", "Subject", "Body")
            .is_ok());
        assert!(notifier.build_message("not an address", "Subject", "Body").is_err());
    }
}
