//! Outbound email

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::db::Database;
use crate::models::OutgoingMail;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Simulated delivery: mails are stored in the `outbox` collection.
pub struct OutboxMailer {
    db: Database,
}

impl OutboxMailer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!("Sending an email to {to}");
        let mail = OutgoingMail {
            id: Uuid::new_v4(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.db.insert(&mail).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::Filter;

    #[tokio::test]
    async fn mail_lands_in_outbox() {
        let db = Database::memory();
        let mailer = OutboxMailer::new(db.clone());

        mailer
            .send_mail("ada@example.com", "Hello", "Body")
            .await
            .unwrap();

        let outbox: Vec<OutgoingMail> = db
            .find(&Filter::eq("to", "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].subject, "Hello");
    }
}
