//! Notification Feed
//!
//! Deduplicated, time-sorted list of activity notifications with a growing
//! "visible window". Same reducer shape as the conversation registry:
//! [`NotificationFeed::process`] applies one signal and returns the server
//! calls to make.
//!
//! Also owns notification presentation: titles, subtitles, and where
//! selecting a notification takes the user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::FeedConfig;
use crate::model::{NotificationItem, NotificationKind};

#[derive(Debug, Clone)]
pub enum NotificationSignal {
    /// Server list. `as_of` is when the request was issued.
    Snapshot {
        items: Vec<NotificationItem>,
        as_of: DateTime<Utc>,
    },
    /// Materialized from a push event.
    Pushed(NotificationItem),
    MarkRead {
        id: String,
        at: DateTime<Utc>,
    },
    MarkAllRead {
        at: DateTime<Utc>,
    },
    MarkAllUnread {
        at: DateTime<Utc>,
    },
    LoadMore,
}

/// Server calls the feed asks for after an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEffect {
    MarkRead(String),
    MarkAllRead,
    MarkAllUnread,
}

#[derive(Debug, Clone)]
struct Entry {
    item: NotificationItem,
    /// Time of the last optimistic read-state change.
    local_stamp: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct NotificationFeed {
    entries: Vec<Entry>,
    visible_count: usize,
    page_size: usize,
}

impl NotificationFeed {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            entries: Vec::new(),
            visible_count: config.page_size,
            page_size: config.page_size.max(1),
        }
    }

    pub fn process(&mut self, signal: NotificationSignal) -> Vec<NotificationEffect> {
        let previously_visible: Vec<String> =
            self.visible().iter().map(|n| n.id.clone()).collect();
        let mut effects = Vec::new();

        match signal {
            NotificationSignal::Snapshot { items, as_of } => {
                debug!(count = items.len(), "merging notification snapshot");
                for incoming in items {
                    self.merge_snapshot_item(incoming, as_of);
                }
            }
            NotificationSignal::Pushed(item) => {
                if self.position(&item.id).is_none() {
                    self.entries.push(Entry {
                        item,
                        local_stamp: None,
                    });
                }
            }
            NotificationSignal::MarkRead { id, at } => {
                if let Some(idx) = self.position(&id) {
                    let entry = &mut self.entries[idx];
                    if !entry.item.is_read {
                        entry.item.is_read = true;
                        entry.local_stamp = Some(at);
                        effects.push(NotificationEffect::MarkRead(id));
                    }
                }
            }
            NotificationSignal::MarkAllRead { at } => {
                self.set_all(true, at);
                effects.push(NotificationEffect::MarkAllRead);
            }
            NotificationSignal::MarkAllUnread { at } => {
                self.set_all(false, at);
                effects.push(NotificationEffect::MarkAllUnread);
            }
            NotificationSignal::LoadMore => {
                self.visible_count += self.page_size;
            }
        }

        // Stable: equal timestamps keep insertion order
        self.entries
            .sort_by(|a, b| b.item.created_at.cmp(&a.item.created_at));
        self.keep_visible(&previously_visible);
        effects
    }

    /// The window the user sees, newest first.
    pub fn visible(&self) -> Vec<&NotificationItem> {
        self.iter().take(self.visible_count).collect()
    }

    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    pub fn has_more(&self) -> bool {
        self.entries.len() > self.visible_count
    }

    pub fn get(&self, id: &str) -> Option<&NotificationItem> {
        self.position(id).map(|idx| &self.entries[idx].item)
    }

    /// One page of the full list, 1-based, `page_size` items per page.
    /// Pages past the end are empty.
    pub fn page(&self, page: usize) -> Vec<&NotificationItem> {
        let start = page.saturating_sub(1).saturating_mul(self.page_size);
        self.iter().skip(start).take(self.page_size).collect()
    }

    pub fn page_count(&self) -> usize {
        self.entries.len().div_ceil(self.page_size)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationItem> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn to_vec(&self) -> Vec<NotificationItem> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.item.id == id)
    }

    /// Server-owned fields come from the snapshot, except a read flag we
    /// changed after the snapshot was requested.
    fn merge_snapshot_item(&mut self, incoming: NotificationItem, as_of: DateTime<Utc>) {
        match self.position(&incoming.id) {
            None => self.entries.push(Entry {
                item: incoming,
                local_stamp: None,
            }),
            Some(idx) => {
                let entry = &mut self.entries[idx];
                let local_is_newer = entry.local_stamp.is_some_and(|stamp| stamp > as_of);
                let is_read = if local_is_newer {
                    entry.item.is_read
                } else {
                    incoming.is_read
                };
                entry.item = incoming;
                entry.item.is_read = is_read;
            }
        }
    }

    fn set_all(&mut self, is_read: bool, at: DateTime<Utc>) {
        for entry in &mut self.entries {
            entry.item.is_read = is_read;
            entry.local_stamp = Some(at);
        }
    }

    /// Grow the window so nothing that was visible before a merge falls out
    /// of it.
    fn keep_visible(&mut self, previously_visible: &[String]) {
        let furthest = previously_visible
            .iter()
            .filter_map(|id| self.position(id))
            .max();
        if let Some(idx) = furthest {
            self.visible_count = self.visible_count.max(idx + 1);
        }
    }
}

// =============================================================================
// Presentation
// =============================================================================

pub fn title(item: &NotificationItem) -> &'static str {
    match item.kind {
        NotificationKind::NewArticle => "New article",
        NotificationKind::ArticleUpdated => "Article updated",
        NotificationKind::ArticleRejected => "Article rejected",
        NotificationKind::ArticleApproved => "Article approved",
        NotificationKind::Unknown => "Notification",
    }
}

pub fn subtitle(item: &NotificationItem) -> String {
    fn text(field: &Option<String>) -> Option<&str> {
        field.as_deref().filter(|s| !s.trim().is_empty())
    }
    let p = &item.payload;

    let chosen = match item.kind {
        NotificationKind::ArticleUpdated => text(&p.message)
            .or(text(&p.title))
            .unwrap_or("Article updated"),
        NotificationKind::ArticleRejected => text(&p.reason)
            .or(text(&p.message))
            .or(text(&p.title))
            .unwrap_or("Your article was rejected"),
        NotificationKind::ArticleApproved => {
            text(&p.message).unwrap_or("Your article was approved")
        }
        NotificationKind::NewArticle => text(&p.title)
            .or(text(&p.message))
            .unwrap_or("New article"),
        NotificationKind::Unknown => text(&p.title)
            .or(text(&p.message))
            .unwrap_or("New notification"),
    };
    chosen.to_string()
}

/// Where selecting a notification leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    /// The seller's own view of their article (moderation outcomes).
    ArticleOwner { article_id: String },
    ArticleDetail { article_id: String },
    ShopDetail { shop_id: String },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::ArticleOwner { article_id } => format!("/article/{article_id}"),
            Route::ArticleDetail { article_id } => format!("/article/detail/{article_id}"),
            Route::ShopDetail { shop_id } => format!("/shop/{shop_id}"),
        }
    }
}

pub fn route(item: &NotificationItem) -> Option<Route> {
    let article_id = item
        .article_id
        .clone()
        .or_else(|| item.payload.article_id.clone())
        .filter(|id| !id.is_empty());

    match (item.kind, article_id) {
        (NotificationKind::ArticleRejected | NotificationKind::ArticleApproved, Some(article_id)) => {
            Some(Route::ArticleOwner { article_id })
        }
        (_, Some(article_id)) => Some(Route::ArticleDetail { article_id }),
        (_, None) => item
            .payload
            .shop_id
            .clone()
            .filter(|id| !id.is_empty())
            .map(|shop_id| Route::ShopDetail { shop_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationPayload;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn item(id: &str, secs: i64, is_read: bool) -> NotificationItem {
        NotificationItem {
            id: id.to_string(),
            kind: NotificationKind::NewArticle,
            is_read,
            article_id: Some(format!("a-{id}")),
            created_at: t(secs),
            payload: NotificationPayload::default(),
        }
    }

    fn feed() -> NotificationFeed {
        NotificationFeed::new(&FeedConfig { page_size: 10 })
    }

    fn snapshot(items: Vec<NotificationItem>, as_of: i64) -> NotificationSignal {
        NotificationSignal::Snapshot {
            items,
            as_of: t(as_of),
        }
    }

    fn ids(items: &[&NotificationItem]) -> Vec<String> {
        items.iter().map(|n| n.id.clone()).collect()
    }

    // ── merge ───────────────────────────────────────────────────────────

    #[test]
    fn test_snapshot_sorted_newest_first() {
        let mut f = feed();
        f.process(snapshot(vec![item("a", 1, false), item("b", 3, true), item("c", 2, false)], 10));
        assert_eq!(ids(&f.visible()), vec!["b", "c", "a"]);
        assert!(!f.has_more());
    }

    #[test]
    fn test_snapshot_owns_read_flag_and_keeps_push_items() {
        let mut f = feed();
        f.process(snapshot(vec![item("a", 1, false)], 10));
        f.process(NotificationSignal::Pushed(item("p", 5, false)));

        f.process(snapshot(vec![item("a", 1, true)], 20));
        assert!(f.get("a").unwrap().is_read);
        assert!(f.get("p").is_some());
        assert_eq!(ids(&f.visible()), vec!["p", "a"]);
    }

    #[test]
    fn test_push_then_snapshot_adopts_item() {
        let mut f = feed();
        f.process(NotificationSignal::Pushed(item("p", 5, false)));
        f.process(snapshot(vec![item("p", 5, true)], 20));
        assert_eq!(f.len(), 1);
        assert!(f.get("p").unwrap().is_read);
    }

    #[test]
    fn test_duplicate_push_is_ignored() {
        let mut f = feed();
        f.process(NotificationSignal::Pushed(item("p", 5, false)));
        f.process(NotificationSignal::Pushed(item("p", 5, false)));
        assert_eq!(f.len(), 1);
    }

    // ── marks ───────────────────────────────────────────────────────────

    #[test]
    fn test_mark_read_is_optimistic() {
        let mut f = feed();
        f.process(snapshot(vec![item("a", 1, false)], 0));
        let effects = f.process(NotificationSignal::MarkRead {
            id: "a".into(),
            at: t(5),
        });
        assert_eq!(effects, vec![NotificationEffect::MarkRead("a".into())]);
        assert!(f.get("a").unwrap().is_read);

        // Already read: no second call
        let effects = f.process(NotificationSignal::MarkRead {
            id: "a".into(),
            at: t(6),
        });
        assert!(effects.is_empty());

        // Unknown id: nothing to do
        let effects = f.process(NotificationSignal::MarkRead {
            id: "zz".into(),
            at: t(6),
        });
        assert!(effects.is_empty());
    }

    #[test]
    fn test_stale_snapshot_does_not_undo_local_mark() {
        let mut f = feed();
        f.process(snapshot(vec![item("a", 1, false)], 0));
        f.process(NotificationSignal::MarkRead {
            id: "a".into(),
            at: t(5),
        });
        f.process(snapshot(vec![item("a", 1, false)], 3));
        assert!(f.get("a").unwrap().is_read);
    }

    #[test]
    fn test_mark_all_read_and_unread() {
        let mut f = feed();
        f.process(snapshot(vec![item("a", 1, false), item("b", 2, true)], 0));
        let effects = f.process(NotificationSignal::MarkAllRead { at: t(5) });
        assert_eq!(effects, vec![NotificationEffect::MarkAllRead]);
        assert!(f.iter().all(|n| n.is_read));

        let effects = f.process(NotificationSignal::MarkAllUnread { at: t(6) });
        assert_eq!(effects, vec![NotificationEffect::MarkAllUnread]);
        assert!(f.iter().all(|n| !n.is_read));
    }

    // ── visible window ──────────────────────────────────────────────────

    #[test]
    fn test_load_more_with_push_mid_wait() {
        let mut f = feed();
        let twelve: Vec<_> = (0..12).map(|i| item(&format!("n{i}"), i, false)).collect();
        f.process(snapshot(twelve, 100));
        assert_eq!(f.visible().len(), 10);
        assert!(f.has_more());

        f.process(NotificationSignal::LoadMore);
        assert_eq!(f.visible_count(), 20);
        f.process(NotificationSignal::Pushed(item("n12", 50, false)));

        let visible = ids(&f.visible());
        assert_eq!(visible.len(), 13);
        let mut unique = visible.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 13);
        assert_eq!(visible[0], "n12");
        assert!(!f.has_more());
    }

    #[test]
    fn test_window_grows_to_keep_visible_items() {
        let mut f = NotificationFeed::new(&FeedConfig { page_size: 2 });
        f.process(snapshot(vec![item("a", 1, false), item("b", 2, false)], 10));
        assert_eq!(ids(&f.visible()), vec!["b", "a"]);

        // Newer push lands above both; neither may fall out
        f.process(NotificationSignal::Pushed(item("c", 9, false)));
        assert_eq!(ids(&f.visible()), vec!["c", "b", "a"]);
        assert_eq!(f.visible_count(), 3);
    }

    // ── presentation ────────────────────────────────────────────────────

    fn with(kind: NotificationKind, payload: NotificationPayload) -> NotificationItem {
        NotificationItem {
            id: "n".into(),
            kind,
            is_read: false,
            article_id: payload.article_id.clone(),
            created_at: t(0),
            payload,
        }
    }

    #[test]
    fn test_pages_slice_the_sorted_list() {
        let mut f = feed();
        let items = (0..23).map(|i| item(&format!("n{i}"), i, false)).collect();
        f.process(snapshot(items, 100));
        assert_eq!(f.page_count(), 3);

        assert_eq!(ids(&f.page(1))[0], "n22");
        assert_eq!(f.page(1).len(), 10);
        assert_eq!(ids(&f.page(3)), vec!["n2", "n1", "n0"]);
        assert!(f.page(4).is_empty());
        // Page 0 reads as the first page
        assert_eq!(ids(&f.page(0)), ids(&f.page(1)));

        // Paging ignores the dropdown window
        assert_eq!(f.visible_count(), 10);
    }

    #[test]
    fn test_empty_feed_has_no_pages() {
        let f = NotificationFeed::new(&FeedConfig { page_size: 0 });
        assert_eq!(f.page_count(), 0);
        assert!(f.page(1).is_empty());
    }

    #[test]
    fn test_titles() {
        let p = NotificationPayload::default;
        assert_eq!(title(&with(NotificationKind::ArticleApproved, p())), "Article approved");
        assert_eq!(title(&with(NotificationKind::Unknown, p())), "Notification");
    }

    #[test]
    fn test_subtitle_fallbacks() {
        let rejected = with(
            NotificationKind::ArticleRejected,
            NotificationPayload {
                reason: Some("Blurry photos".into()),
                message: Some("ignored".into()),
                ..Default::default()
            },
        );
        assert_eq!(subtitle(&rejected), "Blurry photos");

        let rejected_bare = with(NotificationKind::ArticleRejected, NotificationPayload::default());
        assert_eq!(subtitle(&rejected_bare), "Your article was rejected");

        let updated = with(
            NotificationKind::ArticleUpdated,
            NotificationPayload {
                title: Some("Lamp".into()),
                ..Default::default()
            },
        );
        assert_eq!(subtitle(&updated), "Lamp");

        let approved = with(
            NotificationKind::ArticleApproved,
            NotificationPayload {
                title: Some("not used".into()),
                ..Default::default()
            },
        );
        assert_eq!(subtitle(&approved), "Your article was approved");

        let new = with(
            NotificationKind::NewArticle,
            NotificationPayload {
                title: Some("  ".into()),
                message: Some("Fresh listing".into()),
                ..Default::default()
            },
        );
        assert_eq!(subtitle(&new), "Fresh listing");

        let unknown = with(NotificationKind::Unknown, NotificationPayload::default());
        assert_eq!(subtitle(&unknown), "New notification");
    }

    #[test]
    fn test_routes() {
        let article = || NotificationPayload {
            article_id: Some("a1".into()),
            ..Default::default()
        };
        assert_eq!(
            route(&with(NotificationKind::ArticleRejected, article())).unwrap().path(),
            "/article/a1"
        );
        assert_eq!(
            route(&with(NotificationKind::ArticleApproved, article())),
            Some(Route::ArticleOwner {
                article_id: "a1".into()
            })
        );
        assert_eq!(
            route(&with(NotificationKind::NewArticle, article())).unwrap().path(),
            "/article/detail/a1"
        );

        let shop_only = NotificationPayload {
            shop_id: Some("s1".into()),
            ..Default::default()
        };
        assert_eq!(
            route(&with(NotificationKind::ArticleUpdated, shop_only)).unwrap().path(),
            "/shop/s1"
        );
        assert_eq!(route(&with(NotificationKind::Unknown, NotificationPayload::default())), None);
    }
}
