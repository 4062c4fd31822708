//! Pagination module
//!
//! Supports: Cursor, Page Number, single-request endpoints
//!
//! # Overview
//!
//! `paginate` drives one endpoint to exhaustion through a caller-supplied
//! fetch function and yields pages lazily. The first fetch receives
//! `PageCursor::Start`; every later fetch receives the previous page's
//! `next_cursor` verbatim. A page without `next_cursor` is the only stop
//! signal. Fetch errors are yielded unchanged and end the stream.

mod types;

pub use types::{Page, PageCursor, PaginationStyle, START_CURSOR};

use crate::error::Result;
use crate::types::Record;
use futures::stream::{self, Stream, TryStreamExt};
use std::future::Future;

/// Lazily fetch pages until one arrives without a next cursor
pub fn paginate<F, Fut>(fetch: F) -> impl Stream<Item = Result<Page>>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    stream::try_unfold(
        (fetch, Some(PageCursor::Start)),
        |(mut fetch, cursor)| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };
            let page = fetch(cursor).await?;
            let next = page.next_cursor.clone().map(PageCursor::Token);
            Ok(Some((page, (fetch, next))))
        },
    )
}

/// Flatten `paginate` into a record stream
pub fn paginate_records<F, Fut>(fetch: F) -> impl Stream<Item = Result<Record>>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    paginate(fetch)
        .map_ok(|page| stream::iter(page.records.into_iter().map(Ok)))
        .try_flatten()
}

#[cfg(test)]
mod tests;
