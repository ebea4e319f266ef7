//! Cursor-paginated listing.

use super::reader::decode_rows;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use featuredb_engine::{decode_optional_cursor, encode_cursor, ListMapper};

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the following page, absent on the last page
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

/// Fetch one page of `M`'s list query.
///
/// One extra row is read past `page_size` to learn whether another page
/// exists, so a page that exactly fills the remaining rows carries no
/// token.
pub async fn list<M: ListMapper>(
    db: &dyn Database,
    params: &M::Params,
    page_size: i64,
    page_token: Option<&str>,
) -> StoreResult<Page<M::Item>> {
    if page_size <= 0 {
        return Err(StoreError::InvalidInput(format!(
            "page size must be positive, got {page_size}"
        )));
    }
    let limit = page_size.checked_add(1).ok_or_else(|| {
        StoreError::InvalidInput(format!("page size {page_size} is too large"))
    })?;
    let cursor = decode_optional_cursor::<M::Cursor>(page_token)?;

    let statement = M::select_page(params, cursor.as_ref(), limit);
    let mut items: Vec<M::Item> = decode_rows(db.query(&statement).await?)?;

    let has_more = items.len() as i64 > page_size;
    items.truncate(page_size as usize);

    let next_page_token = if has_more {
        M::next_cursor(params, cursor.as_ref(), &items)
            .map(|next| encode_cursor(&next))
            .transpose()?
    } else {
        None
    };

    tracing::debug!(
        table = M::table(),
        items = items.len(),
        has_more,
        "Listed page"
    );
    Ok(Page {
        items,
        next_page_token,
    })
}
