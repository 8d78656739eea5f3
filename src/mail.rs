//! Outbound interface for handing a digest to a mail service
//!
//! Only composition lives here; transports (and their credentials) are supplied by the
//! caller through [`MailTransport`].

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Single-part plain text message
    pub fn to_rfc822(&self) -> String {
        format!(
            "Content-Type: text/plain; charset=\"utf-8\"\r\n\
             MIME-Version: 1.0\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             To: {}\r\n\
             From: {}\r\n\
             Subject: {}\r\n\
             \r\n\
             {}",
            header_value(&self.to),
            header_value(&self.from),
            header_value(&self.subject),
            self.body
        )
    }

    /// URL-safe base64 of the full message, the form mail APIs take as `raw`
    pub fn raw(&self) -> String {
        URL_SAFE.encode(self.to_rfc822().as_bytes())
    }
}

/// Header values cannot span lines
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Something that can deliver an [`OutgoingMail`]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the provider's message id
    async fn send(&self, mail: &OutgoingMail) -> Result<String>;
}

/// Send a digest through `transport`
pub async fn deliver_digest(
    transport: &dyn MailTransport,
    from: &str,
    to: &str,
    subject: &str,
    digest: &str,
) -> Result<String> {
    let mail = OutgoingMail::new(from, to, subject, digest);
    let id = transport.send(&mail).await?;
    info!("Digest sent to {} (message id {})", to, id);
    Ok(id)
}
