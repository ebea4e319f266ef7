//! Per-user notification channels.

use crate::client::Client;
use crate::db::read_write;
use crate::entity::{create, list, read_one, read_one_in, remove_by_key_in, Page};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use featuredb_engine::{
    CmpOp, CreateMapper, DeleteKeyMapper, Direction, Error, FromRow, ListMapper, Row, Select,
    SelectOneMapper, Statement, TableMapper, TimestampKeyCursor, ToRow, Value,
};
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "NotificationChannels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Webhook => "webhook",
        }
    }

    fn parse(raw: &str) -> featuredb_engine::Result<Self> {
        match raw {
            "email" => Ok(ChannelType::Email),
            "webhook" => Ok(ChannelType::Webhook),
            other => Err(Error::InvalidValue {
                column: "Type".into(),
                reason: format!("unknown channel type {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationChannel {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub channel_type: ChannelType,
    /// Type-specific settings, e.g. `{"address": "..."}` for email
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for NotificationChannel {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        let channel_type: String = row.try_get("Type")?;
        Ok(Self {
            id: row.try_get("ID")?,
            user_id: row.try_get("UserID")?,
            name: row.try_get("Name")?,
            channel_type: ChannelType::parse(&channel_type)?,
            config: row.try_get("Config")?,
            created_at: row.try_get("CreatedAt")?,
            updated_at: row.try_get("UpdatedAt")?,
        })
    }
}

impl ToRow for NotificationChannel {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ID", &self.id)
            .with("UserID", &self.user_id)
            .with("Name", &self.name)
            .with("Type", self.channel_type.as_str())
            .with("Config", self.config.clone())
            .with("CreatedAt", self.created_at)
            .with("UpdatedAt", self.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateNotificationChannelRequest {
    pub user_id: String,
    pub name: String,
    pub channel_type: ChannelType,
    pub config: serde_json::Value,
}

pub struct NotificationChannelMapper;

impl TableMapper for NotificationChannelMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for NotificationChannelMapper {
    type Key = String;

    fn select_one(id: &String) -> Statement {
        Select::from_table(TABLE).filter_eq("ID", id).limit(1).into()
    }
}

impl DeleteKeyMapper for NotificationChannelMapper {
    fn delete_key(id: &String) -> Row {
        Row::new().with("ID", id)
    }
}

impl CreateMapper for NotificationChannelMapper {
    type Input = CreateNotificationChannelRequest;
    type Stored = NotificationChannel;

    fn new_entity(
        id: &str,
        input: &CreateNotificationChannelRequest,
        now: DateTime<Utc>,
    ) -> NotificationChannel {
        NotificationChannel {
            id: id.to_string(),
            user_id: input.user_id.clone(),
            name: input.name.clone(),
            channel_type: input.channel_type,
            config: input.config.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Keyset pagination over a user's channels in creation order.
pub struct NotificationChannelListMapper;

impl TableMapper for NotificationChannelListMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl ListMapper for NotificationChannelListMapper {
    /// User id
    type Params = String;
    type Cursor = TimestampKeyCursor;
    type Item = NotificationChannel;

    fn select_page(user_id: &String, cursor: Option<&TimestampKeyCursor>, limit: i64) -> Statement {
        let mut select = Select::from_table(TABLE).filter_eq("UserID", user_id);
        if let Some(cursor) = cursor {
            select = select.filter_row(
                &["CreatedAt", "ID"],
                CmpOp::Gt,
                vec![
                    Value::from(cursor.last_timestamp),
                    Value::from(&cursor.last_key),
                ],
            );
        }
        select
            .order_by("CreatedAt", Direction::Asc)
            .order_by("ID", Direction::Asc)
            .limit(limit)
            .into()
    }

    fn next_cursor(
        _user_id: &String,
        _previous: Option<&TimestampKeyCursor>,
        page: &[NotificationChannel],
    ) -> Option<TimestampKeyCursor> {
        page.last().map(|channel| TimestampKeyCursor {
            last_timestamp: channel.created_at,
            last_key: channel.id.clone(),
        })
    }
}

/// Another user's channel reads as missing.
pub(crate) fn owned_by(
    channel: NotificationChannel,
    user_id: &str,
) -> StoreResult<NotificationChannel> {
    if channel.user_id == user_id {
        Ok(channel)
    } else {
        Err(StoreError::QueryReturnedNoResults)
    }
}

impl Client {
    pub async fn create_notification_channel(
        &self,
        request: &CreateNotificationChannelRequest,
    ) -> StoreResult<String> {
        create::<NotificationChannelMapper>(self.db(), request).await
    }

    pub async fn get_notification_channel(
        &self,
        id: &str,
        user_id: &str,
    ) -> StoreResult<NotificationChannel> {
        let channel = read_one(
            self.db(),
            &NotificationChannelMapper::select_one(&id.to_string()),
        )
        .await?;
        owned_by(channel, user_id)
    }

    pub async fn list_notification_channels(
        &self,
        user_id: &str,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<NotificationChannel>> {
        let user_id = user_id.to_string();
        list::<NotificationChannelListMapper>(self.db(), &user_id, page_size, page_token).await
    }

    /// Delete a channel and its subscriptions.
    pub async fn delete_notification_channel(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        read_write(self.db(), move |txn| {
            let id = id.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                let channel = read_one_in(txn, &NotificationChannelMapper::select_one(&id)).await?;
                owned_by(channel, &user_id)?;
                remove_by_key_in::<NotificationChannelMapper>(txn, &id).await
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tables::testing::memory_client;
    use serde_json::json;

    fn email(user: &str, name: &str) -> CreateNotificationChannelRequest {
        CreateNotificationChannelRequest {
            user_id: user.to_string(),
            name: name.to_string(),
            channel_type: ChannelType::Email,
            config: json!({ "address": format!("{user}@example.com") }),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let client = memory_client();
        let id = client
            .create_notification_channel(&email("alice", "work"))
            .await
            .unwrap();

        let channel = client.get_notification_channel(&id, "alice").await.unwrap();
        assert_eq!(channel.name, "work");
        assert_eq!(channel.config["address"], "alice@example.com");

        let err = client.get_notification_channel(&id, "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let client = memory_client();
        let mut ids = Vec::new();
        for name in ["one", "two", "three"] {
            ids.push(
                client
                    .create_notification_channel(&email("alice", name))
                    .await
                    .unwrap(),
            );
        }
        client.create_notification_channel(&email("bob", "other")).await.unwrap();

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = client
                .list_notification_channels("alice", 2, token.as_deref())
                .await
                .unwrap();
            seen.extend(page.items.iter().map(|c| c.name.clone()));
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|name| name != "other"));
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let client = memory_client();
        let id = client
            .create_notification_channel(&email("alice", "work"))
            .await
            .unwrap();

        let err = client.delete_notification_channel(&id, "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        client.delete_notification_channel(&id, "alice").await.unwrap();
        let err = client.get_notification_channel(&id, "alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
