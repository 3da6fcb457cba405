//! Watermark-bounded feed walker

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{FeedClient, PageCursor};
use crate::error::SyncResult;
use crate::types::RemoteItem;

/// Pull-based walk over one account's feed, newest first
///
/// Pages are fetched only when the buffered page is used up. The walk ends at
/// the first item created before the watermark (that item is not yielded) or
/// when the feed has no further pages, whichever comes first.
pub struct FeedWalker<'a> {
    client: &'a dyn FeedClient,
    account_id: String,
    watermark: DateTime<Utc>,
    cursor: Option<PageCursor>,
    buffer: VecDeque<RemoteItem>,
    pages_fetched: usize,
    done: bool,
}

impl<'a> FeedWalker<'a> {
    pub fn new(client: &'a dyn FeedClient, account_id: &str, watermark: DateTime<Utc>) -> Self {
        Self {
            client,
            account_id: account_id.to_string(),
            watermark,
            cursor: Some(PageCursor::Start),
            buffer: VecDeque::new(),
            pages_fetched: 0,
            done: false,
        }
    }

    /// Next item at or above the watermark, `None` when the walk is over
    pub async fn next(&mut self) -> SyncResult<Option<RemoteItem>> {
        while !self.done {
            if let Some(item) = self.buffer.pop_front() {
                if item.taken_at < self.watermark {
                    debug!(
                        "Reached watermark {} at item {} ({})",
                        self.watermark, item.id, item.taken_at
                    );
                    self.finish();
                    return Ok(None);
                }
                return Ok(Some(item));
            }

            let Some(cursor) = self.cursor.take() else {
                self.finish();
                break;
            };

            let page = self.client.fetch_page(&self.account_id, &cursor).await?;
            self.pages_fetched += 1;
            debug!(
                "Fetched page {} for account {}: {} items, more={}",
                self.pages_fetched,
                self.account_id,
                page.items.len(),
                page.next.is_some()
            );

            // An empty page cannot advance the walk, even if a token came back
            if page.items.is_empty() {
                self.finish();
                break;
            }

            self.buffer.extend(page.items);
            self.cursor = page.next.map(PageCursor::After);
        }
        Ok(None)
    }

    /// Walk to the end and return every item, newest first
    pub async fn collect_all(mut self) -> SyncResult<Vec<RemoteItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Number of pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn finish(&mut self) {
        self.done = true;
        self.buffer.clear();
        self.cursor = None;
    }
}
