//! Tests for pagination module

use super::*;
use crate::error::Error;
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// Fetch function replaying a fixed page list and recording cursors
fn scripted(
    pages: Vec<Result<Page>>,
    seen: &mut Vec<PageCursor>,
) -> impl FnMut(PageCursor) -> std::future::Ready<Result<Page>> + '_ {
    let mut pages = pages.into_iter();
    move |cursor| {
        seen.push(cursor);
        let next = pages
            .next()
            .unwrap_or_else(|| Err(Error::Other("fetched past the last page".into())));
        std::future::ready(next)
    }
}

fn records(ids: &[i64]) -> Vec<Value> {
    ids.iter().map(|id| json!({ "id": id })).collect()
}

// ============================================================================
// PageCursor Tests
// ============================================================================

#[test]
fn test_start_cursor_is_sentinel() {
    assert_eq!(PageCursor::Start.as_str(), "Start");
    assert!(PageCursor::Start.is_start());
    assert!(!PageCursor::Token("abc".into()).is_start());
    assert_eq!(PageCursor::Token("abc".into()).to_string(), "abc");
}

// ============================================================================
// Paginate Tests
// ============================================================================

#[tokio::test]
async fn test_paginate_concatenates_pages_in_order() {
    let mut seen = Vec::new();
    let pages = vec![
        Ok(Page::with_next(records(&[1, 2]), "c1")),
        Ok(Page::with_next(records(&[3]), "c2")),
        Ok(Page::last(records(&[4, 5]))),
    ];

    let all: Vec<Value> = paginate_records(scripted(pages, &mut seen))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(all, records(&[1, 2, 3, 4, 5]));
    assert_eq!(
        seen,
        vec![
            PageCursor::Start,
            PageCursor::Token("c1".into()),
            PageCursor::Token("c2".into()),
        ]
    );
}

#[tokio::test]
async fn test_paginate_single_page() {
    let mut seen = Vec::new();
    let pages = vec![Ok(Page::last(records(&[7])))];

    let collected: Vec<Page> = paginate(scripted(pages, &mut seen))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(collected.len(), 1);
    assert!(collected[0].is_last());
    assert_eq!(seen, vec![PageCursor::Start]);
}

#[tokio::test]
async fn test_paginate_empty_pages_do_not_terminate() {
    // Only a missing cursor ends pagination, not an empty page
    let mut seen = Vec::new();
    let pages = vec![
        Ok(Page::with_next(Vec::new(), "c1")),
        Ok(Page::with_next(records(&[1]), "c2")),
        Ok(Page::last(Vec::new())),
    ];

    let all: Vec<Value> = paginate_records(scripted(pages, &mut seen))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(all, records(&[1]));
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn test_paginate_is_lazy() {
    let mut seen = Vec::new();
    {
        let pages = vec![
            Ok(Page::with_next(records(&[1]), "c1")),
            Ok(Page::last(records(&[2]))),
        ];
        let stream = paginate(scripted(pages, &mut seen));
        let mut stream = std::pin::pin!(stream);
        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.records, records(&[1]));
    }
    assert_eq!(seen, vec![PageCursor::Start]);
}

#[tokio::test]
async fn test_paginate_propagates_errors_unchanged() {
    let mut seen = Vec::new();
    let pages = vec![
        Ok(Page::with_next(records(&[1]), "c1")),
        Err(Error::http_status(503, "unavailable")),
    ];

    let result: Result<Vec<Value>> = paginate_records(scripted(pages, &mut seen))
        .try_collect()
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    assert_eq!(seen.len(), 2);
}

// ============================================================================
// PaginationStyle Tests
// ============================================================================

#[test]
fn test_single_request_params() {
    let style = PaginationStyle::None;
    assert!(style.is_single());
    assert!(style.request_params(&PageCursor::Start).is_empty());
    assert_eq!(
        style.next_cursor(&PageCursor::Start, Some("ignored".into()), 10),
        None
    );
}

#[test]
fn test_cursor_params() {
    let style = PaginationStyle::cursor(5000);

    assert_eq!(
        style.request_params(&PageCursor::Start),
        vec![
            ("cursor".to_string(), "Start".to_string()),
            ("count".to_string(), "5000".to_string()),
        ]
    );
    assert_eq!(
        style.request_params(&PageCursor::Token("xyz".into()))[0],
        ("cursor".to_string(), "xyz".to_string())
    );
}

#[test]
fn test_cursor_next() {
    let style = PaginationStyle::cursor(100);

    assert_eq!(
        style.next_cursor(&PageCursor::Start, Some("n1".into()), 0),
        Some("n1".to_string())
    );
    assert_eq!(style.next_cursor(&PageCursor::Start, None, 100), None);
    assert_eq!(
        style.next_cursor(&PageCursor::Start, Some(String::new()), 100),
        None
    );
}

#[test]
fn test_page_number_params_and_next() {
    let style = PaginationStyle::page_number("page", 1, "pageSize", 2);

    assert_eq!(
        style.request_params(&PageCursor::Start),
        vec![
            ("page".to_string(), "1".to_string()),
            ("pageSize".to_string(), "2".to_string()),
        ]
    );

    // Full page continues
    assert_eq!(
        style.next_cursor(&PageCursor::Start, None, 2),
        Some("2".to_string())
    );
    assert_eq!(
        style.next_cursor(&PageCursor::Token("2".into()), None, 2),
        Some("3".to_string())
    );

    // Short page stops
    assert_eq!(style.next_cursor(&PageCursor::Token("3".into()), None, 1), None);
    assert_eq!(style.next_cursor(&PageCursor::Token("3".into()), None, 0), None);
}
