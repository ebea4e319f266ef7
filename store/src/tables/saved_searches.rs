//! Saved searches with per-user roles and bookmarks.
//!
//! Creating a search makes its author the owner and bookmarks it for them.
//! Only owners may edit or delete a search, and an owner cannot drop their
//! own bookmark.

use crate::client::Client;
use crate::db::{read_write, Transaction};
use crate::entity::{
    create_in, list, read_all, read_one, read_one_in, read_optional, read_optional_in,
    remove_by_key_in, Page,
};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use featuredb_engine::{
    CreateMapper, DeleteKeyMapper, Direction, Error, FromRow, ListMapper, Mutation, OffsetCursor,
    OptionallySet, Row, Select, SelectOneMapper, Statement, TableMapper, ToRow, Value,
};
use std::collections::HashMap;

pub const TABLE: &str = "SavedSearches";
pub const ROLES_TABLE: &str = "SavedSearchUserRoles";
pub const BOOKMARKS_TABLE: &str = "UserSavedSearchBookmarks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedSearchScope {
    UserPublic,
}

impl SavedSearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavedSearchScope::UserPublic => "USER_PUBLIC",
        }
    }

    fn parse(column: &str, raw: &str) -> featuredb_engine::Result<Self> {
        match raw {
            "USER_PUBLIC" => Ok(SavedSearchScope::UserPublic),
            other => Err(unknown(column, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedSearchRole {
    Owner,
}

impl SavedSearchRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavedSearchRole::Owner => "OWNER",
        }
    }

    fn parse(column: &str, raw: &str) -> featuredb_engine::Result<Self> {
        match raw {
            "OWNER" => Ok(SavedSearchRole::Owner),
            other => Err(unknown(column, other)),
        }
    }
}

fn unknown(column: &str, raw: &str) -> Error {
    Error::InvalidValue {
        column: column.to_string(),
        reason: format!("unknown value {raw:?}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSearch {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub query: String,
    pub scope: SavedSearchScope,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for SavedSearch {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        let scope: String = row.try_get("Scope")?;
        Ok(Self {
            id: row.try_get("ID")?,
            name: row.try_get("Name")?,
            description: row.try_get("Description")?,
            query: row.try_get("Query")?,
            scope: SavedSearchScope::parse("Scope", &scope)?,
            author_id: row.try_get("AuthorID")?,
            created_at: row.try_get("CreatedAt")?,
            updated_at: row.try_get("UpdatedAt")?,
        })
    }
}

impl ToRow for SavedSearch {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ID", &self.id)
            .with("Name", &self.name)
            .with("Description", self.description.clone())
            .with("Query", &self.query)
            .with("Scope", self.scope.as_str())
            .with("AuthorID", &self.author_id)
            .with("CreatedAt", self.created_at)
            .with("UpdatedAt", self.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSavedSearchRequest {
    pub name: String,
    pub description: Option<String>,
    pub query: String,
    pub owner_user_id: String,
}

/// Partial update of a saved search, made on behalf of `requesting_user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSavedSearchRequest {
    pub id: String,
    pub requesting_user_id: String,
    pub name: OptionallySet<String>,
    pub description: OptionallySet<Option<String>>,
    pub query: OptionallySet<String>,
}

/// A saved search as seen by one user.
///
/// `role` and `is_bookmarked` are `None` for anonymous readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSavedSearch {
    pub saved_search: SavedSearch,
    pub role: Option<SavedSearchRole>,
    pub is_bookmarked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserSavedSearchKey {
    pub saved_search_id: String,
    pub user_id: String,
}

impl UserSavedSearchKey {
    fn new(saved_search_id: &str, user_id: &str) -> Self {
        Self {
            saved_search_id: saved_search_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("SavedSearchID", &self.saved_search_id)
            .with("UserID", &self.user_id)
    }

    fn select(&self, table: &str) -> Statement {
        Select::from_table(table)
            .filter_eq("SavedSearchID", &self.saved_search_id)
            .filter_eq("UserID", &self.user_id)
            .limit(1)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UserRole {
    saved_search_id: String,
    role: SavedSearchRole,
}

impl FromRow for UserRole {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        let role: String = row.try_get("UserRole")?;
        Ok(Self {
            saved_search_id: row.try_get("SavedSearchID")?,
            role: SavedSearchRole::parse("UserRole", &role)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub saved_search_id: String,
    pub user_id: String,
}

impl FromRow for Bookmark {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            saved_search_id: row.try_get("SavedSearchID")?,
            user_id: row.try_get("UserID")?,
        })
    }
}

pub struct SavedSearchMapper;

impl TableMapper for SavedSearchMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for SavedSearchMapper {
    type Key = String;

    fn select_one(id: &String) -> Statement {
        Select::from_table(TABLE).filter_eq("ID", id).limit(1).into()
    }
}

impl DeleteKeyMapper for SavedSearchMapper {
    fn delete_key(id: &String) -> Row {
        Row::new().with("ID", id)
    }
}

impl CreateMapper for SavedSearchMapper {
    type Input = CreateSavedSearchRequest;
    type Stored = SavedSearch;

    fn new_entity(id: &str, input: &CreateSavedSearchRequest, now: DateTime<Utc>) -> SavedSearch {
        SavedSearch {
            id: id.to_string(),
            name: input.name.clone(),
            description: input.description.clone(),
            query: input.query.clone(),
            scope: SavedSearchScope::UserPublic,
            author_id: input.owner_user_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct BookmarkMapper;

impl TableMapper for BookmarkMapper {
    fn table() -> &'static str {
        BOOKMARKS_TABLE
    }
}

impl SelectOneMapper for BookmarkMapper {
    type Key = UserSavedSearchKey;

    fn select_one(key: &UserSavedSearchKey) -> Statement {
        key.select(BOOKMARKS_TABLE)
    }
}

impl DeleteKeyMapper for BookmarkMapper {
    fn delete_key(key: &UserSavedSearchKey) -> Row {
        key.to_row()
    }
}

/// Lists a user's bookmarks by offset.
pub struct BookmarkListMapper;

impl TableMapper for BookmarkListMapper {
    fn table() -> &'static str {
        BOOKMARKS_TABLE
    }
}

impl ListMapper for BookmarkListMapper {
    /// User id
    type Params = String;
    type Cursor = OffsetCursor;
    type Item = Bookmark;

    fn select_page(user_id: &String, cursor: Option<&OffsetCursor>, limit: i64) -> Statement {
        Select::from_table(BOOKMARKS_TABLE)
            .filter_eq("UserID", user_id)
            .order_by("SavedSearchID", Direction::Asc)
            .offset(cursor.map_or(0, |c| c.offset))
            .limit(limit)
            .into()
    }

    fn next_cursor(
        _user_id: &String,
        previous: Option<&OffsetCursor>,
        page: &[Bookmark],
    ) -> Option<OffsetCursor> {
        Some(OffsetCursor {
            offset: previous.map_or(0, |c| c.offset) + page.len() as i64,
        })
    }
}

async fn role_in(
    txn: &mut dyn Transaction,
    key: &UserSavedSearchKey,
) -> StoreResult<Option<SavedSearchRole>> {
    let role: Option<UserRole> = read_optional_in(txn, &key.select(ROLES_TABLE)).await?;
    Ok(role.map(|r| r.role))
}

async fn require_owner_in(txn: &mut dyn Transaction, key: &UserSavedSearchKey) -> StoreResult<()> {
    match role_in(txn, key).await? {
        Some(SavedSearchRole::Owner) => Ok(()),
        None => Err(StoreError::MissingRequiredRole),
    }
}

impl Client {
    /// Create a saved search owned and bookmarked by its author.
    pub async fn create_new_user_saved_search(
        &self,
        request: CreateSavedSearchRequest,
    ) -> StoreResult<String> {
        read_write(self.db(), move |txn| {
            let request = request.clone();
            Box::pin(async move {
                let id = create_in::<SavedSearchMapper>(txn, &request)?;
                let key = UserSavedSearchKey::new(&id, &request.owner_user_id);
                txn.buffer(Mutation::insert(
                    ROLES_TABLE,
                    key.to_row()
                        .with("UserRole", SavedSearchRole::Owner.as_str()),
                ));
                txn.buffer(Mutation::insert(BOOKMARKS_TABLE, key.to_row()));
                Ok(id)
            })
        })
        .await
    }

    /// Read a saved search, with the caller's role and bookmark when known.
    pub async fn get_user_saved_search(
        &self,
        id: &str,
        user_id: Option<&str>,
    ) -> StoreResult<UserSavedSearch> {
        let saved_search: SavedSearch =
            read_one(self.db(), &SavedSearchMapper::select_one(&id.to_string())).await?;
        let Some(user_id) = user_id else {
            return Ok(UserSavedSearch {
                saved_search,
                role: None,
                is_bookmarked: None,
            });
        };

        let key = UserSavedSearchKey::new(id, user_id);
        let role: Option<UserRole> = read_optional(self.db(), &key.select(ROLES_TABLE)).await?;
        let bookmark: Option<Bookmark> =
            read_optional(self.db(), &BookmarkMapper::select_one(&key)).await?;
        Ok(UserSavedSearch {
            saved_search,
            role: role.map(|r| r.role),
            is_bookmarked: Some(bookmark.is_some()),
        })
    }

    /// Apply a partial update. Requires the owner role.
    pub async fn update_user_saved_search(
        &self,
        request: UpdateSavedSearchRequest,
    ) -> StoreResult<()> {
        let now = Utc::now();
        read_write(self.db(), move |txn| {
            let request = request.clone();
            Box::pin(async move {
                let mut search: SavedSearch =
                    read_one_in(txn, &SavedSearchMapper::select_one(&request.id)).await?;
                require_owner_in(
                    txn,
                    &UserSavedSearchKey::new(&request.id, &request.requesting_user_id),
                )
                .await?;

                let mut changed = request.name.apply_to(&mut search.name);
                changed |= request.description.apply_to(&mut search.description);
                changed |= request.query.apply_to(&mut search.query);
                if changed {
                    search.updated_at = now;
                    txn.buffer(Mutation::update(TABLE, &["ID"], search.to_row()));
                }
                Ok(())
            })
        })
        .await
    }

    /// Delete a saved search with its roles and bookmarks. Requires the owner
    /// role.
    pub async fn delete_user_saved_search(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let key = UserSavedSearchKey::new(id, user_id);
        read_write(self.db(), move |txn| {
            let key = key.clone();
            Box::pin(async move {
                let _: SavedSearch =
                    read_one_in(txn, &SavedSearchMapper::select_one(&key.saved_search_id)).await?;
                require_owner_in(txn, &key).await?;
                remove_by_key_in::<SavedSearchMapper>(txn, &key.saved_search_id).await
            })
        })
        .await
    }

    /// Page through the searches `user_id` has bookmarked.
    pub async fn list_user_saved_searches(
        &self,
        user_id: &str,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<UserSavedSearch>> {
        let bookmarks =
            list::<BookmarkListMapper>(self.db(), &user_id.to_string(), page_size, page_token)
                .await?;
        if bookmarks.items.is_empty() {
            return Ok(Page {
                items: Vec::new(),
                next_page_token: bookmarks.next_page_token,
            });
        }

        let ids: Vec<Value> = bookmarks
            .items
            .iter()
            .map(|b| Value::from(&b.saved_search_id))
            .collect();
        let searches: Vec<SavedSearch> = read_all(
            self.db(),
            &Statement::from(Select::from_table(TABLE).filter_in("ID", ids.clone())),
        )
        .await?;
        let roles: Vec<UserRole> = read_all(
            self.db(),
            &Statement::from(
                Select::from_table(ROLES_TABLE)
                    .filter_eq("UserID", user_id)
                    .filter_in("SavedSearchID", ids),
            ),
        )
        .await?;

        let roles: HashMap<String, SavedSearchRole> = roles
            .into_iter()
            .map(|r| (r.saved_search_id, r.role))
            .collect();
        let mut searches: HashMap<String, SavedSearch> =
            searches.into_iter().map(|s| (s.id.clone(), s)).collect();
        let items = bookmarks
            .items
            .iter()
            .filter_map(|b| {
                searches
                    .remove(&b.saved_search_id)
                    .map(|saved_search| UserSavedSearch {
                        role: roles.get(&saved_search.id).copied(),
                        saved_search,
                        is_bookmarked: Some(true),
                    })
            })
            .collect();
        Ok(Page {
            items,
            next_page_token: bookmarks.next_page_token,
        })
    }

    pub async fn add_user_saved_search_bookmark(
        &self,
        user_id: &str,
        saved_search_id: &str,
    ) -> StoreResult<()> {
        let key = UserSavedSearchKey::new(saved_search_id, user_id);
        read_write(self.db(), move |txn| {
            let key = key.clone();
            Box::pin(async move {
                let _: SavedSearch =
                    read_one_in(txn, &SavedSearchMapper::select_one(&key.saved_search_id)).await?;
                txn.buffer(Mutation::insert_or_update(
                    BOOKMARKS_TABLE,
                    &["SavedSearchID", "UserID"],
                    key.to_row(),
                ));
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_user_saved_search_bookmark(
        &self,
        user_id: &str,
        saved_search_id: &str,
    ) -> StoreResult<()> {
        let key = UserSavedSearchKey::new(saved_search_id, user_id);
        read_write(self.db(), move |txn| {
            let key = key.clone();
            Box::pin(async move {
                if role_in(txn, &key).await? == Some(SavedSearchRole::Owner) {
                    return Err(StoreError::OwnerCannotUnbookmark);
                }
                remove_by_key_in::<BookmarkMapper>(txn, &key).await
            })
        })
        .await
    }
}
