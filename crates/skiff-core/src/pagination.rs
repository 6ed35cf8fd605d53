//! Lazy, restartable template listing.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::model::{PageableInput, Template};
use futures::stream::{self, Stream, TryStreamExt};
use serde::Deserialize;

/// One page of the template listing as returned by the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct TemplateList {
    pub items: Vec<Template>,
    pub total: Option<u64>,
}

/// Lazy sequence of template pages.
///
/// Nothing is fetched until [`next_page`](Self::next_page) is called. The
/// sequence ends on an empty page, on a page shorter than the page size,
/// or once the server-reported total has been reached. A failed fetch
/// leaves the position unchanged, so calling again retries the same page.
pub struct TemplatePages {
    client: Client,
    start: PageableInput,
    next: Option<PageableInput>,
    seen: u64,
}

impl TemplatePages {
    pub(crate) fn new(client: Client, start: PageableInput) -> Self {
        Self {
            client,
            start,
            next: Some(start),
            seen: 0,
        }
    }

    /// Fetch the next page, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Template>>> {
        let Some(page) = self.next else {
            return Ok(None);
        };

        let list = self.client.fetch_template_page(&page).await?;
        let count = list.items.len() as u64;
        self.seen += count;
        tracing::debug!(
            page_number = page.page_number,
            count,
            seen = self.seen,
            total = ?list.total,
            "Fetched template page"
        );

        let exhausted = count == 0
            || count < u64::from(page.page_size)
            || list.total.is_some_and(|total| self.seen >= total);
        self.next = (!exhausted).then(|| PageableInput {
            page_number: page.page_number + 1,
            ..page
        });

        Ok((count > 0).then_some(list.items))
    }

    /// Rewind to the first page.
    pub fn restart(&mut self) {
        self.next = Some(self.start);
        self.seen = 0;
    }

    /// Whether the last fetched page was the final one.
    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }

    /// Fetch every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<Template>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    /// Flatten the remaining pages into a stream of templates.
    pub fn into_stream(self) -> impl Stream<Item = Result<Template>> {
        stream::try_unfold(self, |mut pages| async move {
            Ok::<_, Error>(pages.next_page().await?.map(|items| (items, pages)))
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
    }
}
