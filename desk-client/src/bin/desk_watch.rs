//! desk-watch: headless session watcher
//!
//! Signs in with a token from the environment, prints pending system
//! notifications and personal alerts, and optionally follows one ticket.
//!
//! | 环境变量 | 说明 |
//! |----------|------|
//! | DESK_TOKEN | bearer token (required) |
//! | DESK_USER_ID | user id (required) |
//! | DESK_TEAM_ID | team id for the team queue |
//! | DESK_WATCH_TICKET | ticket to follow |
//! | DESK_LIST_VIEW | my_assignments / team_queue / created_by_me |
//!
//! plus everything read by `ClientConfig::from_env`.

use anyhow::Context;
use desk_client::ticket::display::{priority_label, status_label};
use desk_client::{ClientConfig, DeskClient, ListView, SessionIdentity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境 (dotenv, 日志)
    let _ = dotenv::dotenv();
    let config = ClientConfig::from_env();
    desk_client::logger::init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    // 2. 身份
    let token = std::env::var("DESK_TOKEN").context("DESK_TOKEN is not set")?;
    let user_id: i64 = std::env::var("DESK_USER_ID")
        .context("DESK_USER_ID is not set")?
        .parse()
        .context("DESK_USER_ID must be a number")?;
    let mut identity = SessionIdentity::new(user_id, token);
    if let Some(team_id) = std::env::var("DESK_TEAM_ID").ok().and_then(|v| v.parse().ok()) {
        identity = identity.with_team(team_id);
    }

    tracing::info!(api = %config.base_url, channel = %config.channel_url(), "desk-watch starting");
    let client = DeskClient::new(config).context("Failed to build client")?;

    // 3. 登录: 推送通道 + 个人提醒 + 待读通知
    client.sign_in(identity).await;

    while let Some(notification) = client.notifications().current() {
        println!(
            "[{:?}] {}{}",
            notification.notification_type,
            notification.title,
            if notification.mandatory { " (obrigatória)" } else { "" }
        );
        if let Err(e) = client.notifications().acknowledge().await {
            tracing::warn!("Could not acknowledge notification {}: {e}", notification.id);
            break;
        }
    }

    // 4. 列表
    let view = std::env::var("DESK_LIST_VIEW")
        .ok()
        .map(|v| v.parse::<ListView>())
        .transpose()?
        .unwrap_or_default();
    if client.lists().set_view(view).await.is_ok() {
        for ticket in client.lists().tickets() {
            println!(
                "#{:<6} {:<12} {:<8} {}",
                ticket.id,
                status_label(ticket.status),
                priority_label(ticket.priority),
                ticket.title
            );
        }
    }

    // 5. 跟踪工单
    let watched = match std::env::var("DESK_WATCH_TICKET").ok().and_then(|v| v.parse().ok()) {
        Some(ticket_id) => Some(client.open_ticket(ticket_id).await),
        None => None,
    };

    let mut changes = watched.as_ref().map(|store| store.changes());
    let mut printed = std::collections::HashSet::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = async {
                match changes.as_mut() {
                    Some(rx) => rx.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                if changed.is_err() {
                    break;
                }
                if let Some(store) = &watched {
                    for entry in store.snapshot().timeline {
                        if printed.insert(entry.id) {
                            println!("{} [{:?}] {}", entry.created_at, entry.interaction_type, entry.content);
                        }
                    }
                }
            }
        }
    }

    // 6. 登出
    if let Some(store) = &watched {
        store.close();
    }
    client.sign_out().await;
    tracing::info!("desk-watch stopped");
    Ok(())
}
