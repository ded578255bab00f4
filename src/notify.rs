//! Slack incoming-webhook notifications.

use serde::Serialize;
use thiserror::Error;

pub const SUCCESS_TITLE: &str = "Cluster Deployment Completed";
pub const SUCCESS_COLOR: &str = "good";

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing webhook")]
    MissingWebhook,

    #[error("failed to send Slack message: HTTP {0}")]
    Status(u16),

    #[error("failed to send Slack message: {0}")]
    Http(String),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Status(code),
            other => Self::Http(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
}

impl Field {
    fn new(title: &str, value: String) -> Self {
        Self {
            title: title.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub title: String,
    pub fields: Vec<Field>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub attachments: Vec<Attachment>,
}

/// Links to a finished deployment.
///
/// Production links to the bare domain; any other namespace gets its branch
/// URL and the commit-pinned URL.
pub fn deployment_fields(domain: &str, namespace: &str, commit: &str, production: bool) -> Vec<Field> {
    if production {
        vec![Field::new("Production", format!("https://{domain}"))]
    } else {
        vec![
            Field::new("Branch", format!("https://{namespace}.{domain}")),
            Field::new("Commit", format!("https://{commit}-{namespace}.{domain}")),
        ]
    }
}

/// A single-attachment message.
pub fn message(title: &str, fields: Vec<Field>, color: &str) -> Message {
    Message {
        attachments: vec![Attachment {
            title: title.to_string(),
            fields,
            color: color.to_string(),
        }],
    }
}

/// Post `message` to `webhook`.
pub fn send(webhook: &str, message: &Message) -> Result<()> {
    if webhook.is_empty() {
        return Err(Error::MissingWebhook);
    }

    let title = message.attachments.first().map_or("", |a| a.title.as_str());
    log::debug!("Posting Slack message: {title}");
    let agent = ureq::Agent::new_with_defaults();
    agent.post(webhook).send_json(message)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_production_fields() {
        let fields = deployment_fields("example.com", "master", "abc123", true);
        assert_eq!(fields, vec![Field::new("Production", "https://example.com".into())]);
    }

    #[test]
    fn test_branch_fields() {
        let fields = deployment_fields("example.com", "feature-x", "abc123", false);
        assert_eq!(
            fields,
            vec![
                Field::new("Branch", "https://feature-x.example.com".into()),
                Field::new("Commit", "https://abc123-feature-x.example.com".into()),
            ]
        );
    }

    #[test]
    fn test_message_shape() {
        let fields = deployment_fields("example.com", "master", "abc", true);
        let body = serde_json::to_value(message(SUCCESS_TITLE, fields, SUCCESS_COLOR)).unwrap();

        assert_eq!(
            body,
            json!({
                "attachments": [{
                    "title": "Cluster Deployment Completed",
                    "fields": [{"title": "Production", "value": "https://example.com"}],
                    "color": "good"
                }]
            })
        );
    }

    #[test]
    fn test_empty_webhook_rejected() {
        let msg = message(SUCCESS_TITLE, Vec::new(), SUCCESS_COLOR);
        assert!(matches!(send("", &msg), Err(Error::MissingWebhook)));
    }
}
