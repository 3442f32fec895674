use anyhow::{Context, Result};
use chrono::Utc;
use collector_inbox::registry::notifications::{self, NotificationFeed, NotificationSignal};
use collector_inbox::{
    CollectorConfig, HttpInboxApi, InboxApi, InboxSnapshot, Session, SessionCredentials,
    SyncConfig,
};
use tracing::{info, warn};

fn resolve(config: &CollectorConfig) -> Result<(SyncConfig, SessionCredentials)> {
    let file = config.file_config()?;
    let credentials = SessionCredentials::from_file(&file.session).with_context(|| {
        format!(
            "Set [session] token and user_id in {:?} or COLLECTOR_SESSION__TOKEN / COLLECTOR_SESSION__USER_ID",
            config.config_toml_path()
        )
    })?;
    Ok((SyncConfig::from_file(&file), credentials))
}

/// Stay connected and print unread counts as they change, until Ctrl-C.
pub async fn watch_command(config: &CollectorConfig) -> Result<()> {
    let (sync, credentials) = resolve(config)?;
    let user_id = credentials.user_id.clone();
    let session = Session::start(&sync, credentials)?;
    let handle = session.handle();
    let mut conversations = handle.conversation_unread();
    let mut notifications = handle.notification_unread();

    println!("Watching inbox (Ctrl-C to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = conversations.changed() => {
                if changed.is_err() {
                    warn!("engine stopped");
                    break;
                }
                println!("conversations: {} unread", *conversations.borrow_and_update());
                match handle.inbox().await {
                    Ok(inbox) => print_inbox(&inbox, &user_id),
                    Err(e) => warn!(error = %e, "could not read inbox"),
                }
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    warn!("engine stopped");
                    break;
                }
                println!("notifications: {} unread", *notifications.borrow_and_update());
            }
        }
    }

    let metrics = handle.metrics();
    info!(
        push_events = metrics.channel.push_events,
        reconnects = metrics.channel.reconnects,
        failed_requests = metrics.failed_requests,
        "shutting down"
    );
    session.shutdown().await;
    Ok(())
}

fn print_inbox(inbox: &InboxSnapshot, user_id: &str) {
    for c in &inbox.conversations {
        // Placeholder rows have no participants yet
        if inbox.pending_details.contains(&c.id) {
            continue;
        }
        let article = c.article_title.as_deref().unwrap_or(&c.article_id);
        println!(
            "  {} {:<24} {}  with {}",
            if c.has_unread { "*" } else { " " },
            c.id,
            article,
            c.counterpart_of(user_id)
        );
    }
}

pub async fn conversations_command(config: &CollectorConfig, json: bool) -> Result<()> {
    let (sync, credentials) = resolve(config)?;
    let api = HttpInboxApi::new(&sync.api, credentials.token)?;
    let mut conversations = api.list_conversations().await?;
    conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));

    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
    } else if conversations.is_empty() {
        println!("No conversations.");
    } else {
        println!(
            "{:<26} {:<6} {:<22} {}",
            "ID", "UNREAD", "LAST MESSAGE", "ARTICLE"
        );
        println!("{}", "-".repeat(90));
        for c in &conversations {
            let last = c
                .last_message_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into());
            let article = c.article_title.as_deref().unwrap_or(&c.article_id);
            println!(
                "{:<26} {:<6} {:<22} {}",
                c.id,
                if c.has_unread { "*" } else { "" },
                last,
                article
            );
        }
        let unread = conversations.iter().filter(|c| c.has_unread).count();
        println!("\n{} conversation(s), {} unread", conversations.len(), unread);
    }

    Ok(())
}

pub async fn notifications_command(
    config: &CollectorConfig,
    json: bool,
    mark_all_read: bool,
    page: Option<usize>,
) -> Result<()> {
    let (sync, credentials) = resolve(config)?;
    let api = HttpInboxApi::new(&sync.api, credentials.token)?;

    if mark_all_read {
        api.mark_all_notifications_read().await?;
    }
    let mut feed = NotificationFeed::new(&sync.feed);
    feed.process(NotificationSignal::Snapshot {
        items: api.list_notifications().await?,
        as_of: Utc::now(),
    });
    let items: Vec<_> = match page {
        Some(n) => feed.page(n),
        None => feed.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("No notifications.");
    } else {
        for &item in &items {
            let marker = if item.is_read { " " } else { "*" };
            let route = notifications::route(item)
                .map(|r| r.path())
                .unwrap_or_default();
            println!(
                "{} {}  {}\n    {}  {}",
                marker,
                item.created_at.format("%Y-%m-%d %H:%M"),
                notifications::title(item),
                notifications::subtitle(item),
                route
            );
        }
        let unread = feed.iter().filter(|n| !n.is_read).count();
        println!("\n{} notification(s), {} unread", feed.len(), unread);
        if let Some(n) = page {
            println!("page {} of {}", n.max(1), feed.page_count());
        }
    }

    Ok(())
}
