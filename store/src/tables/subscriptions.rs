//! Subscriptions of a notification channel to a saved search.
//!
//! A subscription belongs to whoever owns its channel. Other users cannot
//! see it, and changing it without owning the channel fails with
//! [`StoreError::MissingRequiredRole`].

use super::notification_channels::{self, NotificationChannel, NotificationChannelMapper};
use super::saved_searches::{SavedSearch, SavedSearchMapper};
use crate::client::Client;
use crate::db::{read_write, Transaction};
use crate::entity::{create_in, list, read_all, read_one, read_one_in, remove_by_key_in, Page};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use featuredb_engine::{
    CmpOp, CreateMapper, DeleteKeyMapper, Direction, Error, FromRow, ListMapper, Mutation,
    OptionallySet, Row, Select, SelectOneMapper, Statement, TableMapper, TimestampKeyCursor,
    ToRow, Value,
};
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "SavedSearchSubscriptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Immediate,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    fn parse(raw: &str) -> featuredb_engine::Result<Self> {
        match raw {
            "immediate" => Ok(Frequency::Immediate),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(Error::InvalidValue {
                column: "Frequency".into(),
                reason: format!("unknown frequency {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSearchSubscription {
    pub id: String,
    pub channel_id: String,
    pub saved_search_id: String,
    /// Events that fire a notification, e.g. `feature_baseline_to_widely`
    pub triggers: Vec<String>,
    pub frequency: Frequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for SavedSearchSubscription {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        let triggers: serde_json::Value = row.try_get("Triggers")?;
        let frequency: String = row.try_get("Frequency")?;
        Ok(Self {
            id: row.try_get("ID")?,
            channel_id: row.try_get("ChannelID")?,
            saved_search_id: row.try_get("SavedSearchID")?,
            triggers: serde_json::from_value(triggers).map_err(|e| Error::InvalidValue {
                column: "Triggers".into(),
                reason: e.to_string(),
            })?,
            frequency: Frequency::parse(&frequency)?,
            created_at: row.try_get("CreatedAt")?,
            updated_at: row.try_get("UpdatedAt")?,
        })
    }
}

impl ToRow for SavedSearchSubscription {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ID", &self.id)
            .with("ChannelID", &self.channel_id)
            .with("SavedSearchID", &self.saved_search_id)
            .with("Triggers", serde_json::Value::from(self.triggers.clone()))
            .with("Frequency", self.frequency.as_str())
            .with("CreatedAt", self.created_at)
            .with("UpdatedAt", self.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSavedSearchSubscriptionRequest {
    pub user_id: String,
    pub channel_id: String,
    pub saved_search_id: String,
    pub triggers: Vec<String>,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSavedSearchSubscriptionRequest {
    pub id: String,
    pub user_id: String,
    pub triggers: OptionallySet<Vec<String>>,
    pub frequency: OptionallySet<Frequency>,
}

pub struct SubscriptionMapper;

impl TableMapper for SubscriptionMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for SubscriptionMapper {
    type Key = String;

    fn select_one(id: &String) -> Statement {
        Select::from_table(TABLE).filter_eq("ID", id).limit(1).into()
    }
}

impl DeleteKeyMapper for SubscriptionMapper {
    fn delete_key(id: &String) -> Row {
        Row::new().with("ID", id)
    }
}

impl CreateMapper for SubscriptionMapper {
    type Input = CreateSavedSearchSubscriptionRequest;
    type Stored = SavedSearchSubscription;

    fn new_entity(
        id: &str,
        input: &CreateSavedSearchSubscriptionRequest,
        now: DateTime<Utc>,
    ) -> SavedSearchSubscription {
        SavedSearchSubscription {
            id: id.to_string(),
            channel_id: input.channel_id.clone(),
            saved_search_id: input.saved_search_id.clone(),
            triggers: input.triggers.clone(),
            frequency: input.frequency,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Keyset pagination over the subscriptions of a set of channels.
pub struct SubscriptionListMapper;

impl TableMapper for SubscriptionListMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl ListMapper for SubscriptionListMapper {
    /// Channel ids
    type Params = Vec<String>;
    type Cursor = TimestampKeyCursor;
    type Item = SavedSearchSubscription;

    fn select_page(
        channel_ids: &Vec<String>,
        cursor: Option<&TimestampKeyCursor>,
        limit: i64,
    ) -> Statement {
        let mut select = Select::from_table(TABLE)
            .filter_in("ChannelID", channel_ids.iter().map(Value::from).collect());
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
        _channel_ids: &Vec<String>,
        _previous: Option<&TimestampKeyCursor>,
        page: &[SavedSearchSubscription],
    ) -> Option<TimestampKeyCursor> {
        page.last().map(|sub| TimestampKeyCursor {
            last_timestamp: sub.created_at,
            last_key: sub.id.clone(),
        })
    }
}

async fn require_channel_owner_in(
    txn: &mut dyn Transaction,
    channel_id: &str,
    user_id: &str,
) -> StoreResult<()> {
    let channel: NotificationChannel = read_one_in(
        txn,
        &NotificationChannelMapper::select_one(&channel_id.to_string()),
    )
    .await?;
    if channel.user_id != user_id {
        return Err(StoreError::MissingRequiredRole);
    }
    Ok(())
}

impl Client {
    /// Subscribe one of the user's channels to a saved search.
    pub async fn create_saved_search_subscription(
        &self,
        request: CreateSavedSearchSubscriptionRequest,
    ) -> StoreResult<String> {
        read_write(self.db(), move |txn| {
            let request = request.clone();
            Box::pin(async move {
                require_channel_owner_in(txn, &request.channel_id, &request.user_id).await?;
                let _: SavedSearch =
                    read_one_in(txn, &SavedSearchMapper::select_one(&request.saved_search_id))
                        .await?;
                create_in::<SubscriptionMapper>(txn, &request)
            })
        })
        .await
    }

    pub async fn get_saved_search_subscription(
        &self,
        id: &str,
        user_id: &str,
    ) -> StoreResult<SavedSearchSubscription> {
        let subscription: SavedSearchSubscription =
            read_one(self.db(), &SubscriptionMapper::select_one(&id.to_string())).await?;
        let channel = read_one(
            self.db(),
            &NotificationChannelMapper::select_one(&subscription.channel_id),
        )
        .await?;
        notification_channels::owned_by(channel, user_id)?;
        Ok(subscription)
    }

    pub async fn update_saved_search_subscription(
        &self,
        request: UpdateSavedSearchSubscriptionRequest,
    ) -> StoreResult<()> {
        let now = Utc::now();
        read_write(self.db(), move |txn| {
            let request = request.clone();
            Box::pin(async move {
                let mut subscription: SavedSearchSubscription =
                    read_one_in(txn, &SubscriptionMapper::select_one(&request.id)).await?;
                require_channel_owner_in(txn, &subscription.channel_id, &request.user_id).await?;

                let mut changed = request.triggers.apply_to(&mut subscription.triggers);
                changed |= request.frequency.apply_to(&mut subscription.frequency);
                if changed {
                    subscription.updated_at = now;
                    txn.buffer(Mutation::update(TABLE, &["ID"], subscription.to_row()));
                }
                Ok(())
            })
        })
        .await
    }

    pub async fn delete_saved_search_subscription(
        &self,
        id: &str,
        user_id: &str,
    ) -> StoreResult<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        read_write(self.db(), move |txn| {
            let id = id.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                let subscription: SavedSearchSubscription =
                    read_one_in(txn, &SubscriptionMapper::select_one(&id)).await?;
                require_channel_owner_in(txn, &subscription.channel_id, &user_id).await?;
                remove_by_key_in::<SubscriptionMapper>(txn, &id).await
            })
        })
        .await
    }

    /// Page through the subscriptions of every channel `user_id` owns.
    pub async fn list_saved_search_subscriptions(
        &self,
        user_id: &str,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<SavedSearchSubscription>> {
        let channels: Vec<Row> = read_all(
            self.db(),
            &Statement::from(
                Select::from_table(notification_channels::TABLE)
                    .columns(&["ID"])
                    .filter_eq("UserID", user_id),
            ),
        )
        .await?;
        let channel_ids = channels
            .iter()
            .map(|row| row.try_get::<String>("ID"))
            .collect::<featuredb_engine::Result<Vec<_>>>()?;
        list::<SubscriptionListMapper>(self.db(), &channel_ids, page_size, page_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tables::notification_channels::{ChannelType, CreateNotificationChannelRequest};
    use crate::tables::saved_searches::CreateSavedSearchRequest;
    use crate::tables::testing::memory_client;
    use serde_json::json;

    async fn setup(client: &Client) -> (String, String) {
        let channel = client
            .create_notification_channel(&CreateNotificationChannelRequest {
                user_id: "alice".into(),
                name: "inbox".into(),
                channel_type: ChannelType::Email,
                config: json!({ "address": "alice@example.com" }),
            })
            .await
            .unwrap();
        let search = client
            .create_new_user_saved_search(CreateSavedSearchRequest {
                name: "css".into(),
                description: None,
                query: "group:css".into(),
                owner_user_id: "alice".into(),
            })
            .await
            .unwrap();
        (channel, search)
    }

    fn subscribe(user: &str, channel: &str, search: &str) -> CreateSavedSearchSubscriptionRequest {
        CreateSavedSearchSubscriptionRequest {
            user_id: user.into(),
            channel_id: channel.into(),
            saved_search_id: search.into(),
            triggers: vec!["feature_baseline_to_widely".into()],
            frequency: Frequency::Weekly,
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let client = memory_client();
        let (channel, search) = setup(&client).await;

        let id = client
            .create_saved_search_subscription(subscribe("alice", &channel, &search))
            .await
            .unwrap();
        let stored = client.get_saved_search_subscription(&id, "alice").await.unwrap();
        assert_eq!(stored.frequency, Frequency::Weekly);
        assert_eq!(stored.triggers, ["feature_baseline_to_widely"]);

        client
            .update_saved_search_subscription(UpdateSavedSearchSubscriptionRequest {
                id: id.clone(),
                user_id: "alice".into(),
                triggers: OptionallySet::Unset,
                frequency: Frequency::Immediate.into(),
            })
            .await
            .unwrap();
        let stored = client.get_saved_search_subscription(&id, "alice").await.unwrap();
        assert_eq!(stored.frequency, Frequency::Immediate);
        assert_eq!(stored.triggers.len(), 1);

        client.delete_saved_search_subscription(&id, "alice").await.unwrap();
        let err = client
            .get_saved_search_subscription(&id, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_other_users_are_rejected() {
        let client = memory_client();
        let (channel, search) = setup(&client).await;

        let err = client
            .create_saved_search_subscription(subscribe("bob", &channel, &search))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredRole);

        let id = client
            .create_saved_search_subscription(subscribe("alice", &channel, &search))
            .await
            .unwrap();
        let err = client.get_saved_search_subscription(&id, "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = client
            .delete_saved_search_subscription(&id, "bob")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredRole);
    }

    #[tokio::test]
    async fn test_missing_saved_search() {
        let client = memory_client();
        let (channel, _) = setup(&client).await;
        let err = client
            .create_saved_search_subscription(subscribe("alice", &channel, "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_and_channel_cascade() {
        let client = memory_client();
        let (channel, search) = setup(&client).await;
        for _ in 0..3 {
            client
                .create_saved_search_subscription(subscribe("alice", &channel, &search))
                .await
                .unwrap();
        }

        let first = client
            .list_saved_search_subscriptions("alice", 2, None)
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        let second = client
            .list_saved_search_subscriptions("alice", 2, first.next_page_token.as_deref())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.is_last());

        let none = client
            .list_saved_search_subscriptions("bob", 10, None)
            .await
            .unwrap();
        assert!(none.items.is_empty());

        client.delete_notification_channel(&channel, "alice").await.unwrap();
        let after = client
            .list_saved_search_subscriptions("alice", 10, None)
            .await
            .unwrap();
        assert!(after.items.is_empty());
    }

    #[tokio::test]
    async fn test_deleting_saved_search_removes_subscriptions() {
        let client = memory_client();
        let (channel, search) = setup(&client).await;
        let id = client
            .create_saved_search_subscription(subscribe("alice", &channel, &search))
            .await
            .unwrap();

        client.delete_user_saved_search(&search, "alice").await.unwrap();
        let err = client
            .get_saved_search_subscription(&id, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let remaining = client
            .list_saved_search_subscriptions("alice", 10, None)
            .await
            .unwrap();
        assert!(remaining.items.is_empty());
    }
}
