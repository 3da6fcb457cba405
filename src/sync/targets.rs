//! Turning configured accounts into sync targets

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};

use super::engine::MirrorTarget;
use crate::channel::NotificationChannel;
use crate::config::AccountOptions;
use crate::error::SyncResult;
use crate::feed::FeedClient;

/// Resolve usernames to account ids and webhooks to channels
///
/// `connect` is called once per distinct webhook URL; an invalid webhook is an
/// error. Usernames that cannot be resolved are skipped for this run, as are
/// entries that resolve to a target already listed.
pub async fn resolve_targets<F>(
    accounts: &[AccountOptions],
    feed: &dyn FeedClient,
    mut connect: F,
) -> SyncResult<Vec<MirrorTarget>>
where
    F: FnMut(&str) -> SyncResult<Arc<dyn NotificationChannel>>,
{
    let mut channels: HashMap<&str, Arc<dyn NotificationChannel>> = HashMap::new();
    let mut resolved: HashMap<&str, String> = HashMap::new();
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for account in accounts {
        let channel = match channels.get(account.webhook.as_str()) {
            Some(channel) => channel.clone(),
            None => {
                let channel = connect(&account.webhook)?;
                channels.insert(&account.webhook, channel.clone());
                channel
            }
        };

        let account_id = match resolved.get(account.igaccount.as_str()) {
            Some(id) => id.clone(),
            None => match feed.resolve_username(&account.igaccount).await {
                Ok(profile) => {
                    resolved.insert(&account.igaccount, profile.id.clone());
                    profile.id
                }
                Err(e) => {
                    error!("Failed to resolve @{}: {}", account.igaccount, e);
                    continue;
                }
            },
        };

        if !seen.insert((account_id.clone(), channel.channel_id().to_string())) {
            warn!(
                "@{} resolves to account {} already mirrored to webhook {}, skipping",
                account.igaccount,
                account_id,
                channel.channel_id()
            );
            continue;
        }

        info!(
            "Mirroring @{} ({}) to webhook {}",
            account.igaccount,
            account_id,
            channel.channel_id()
        );
        targets.push(MirrorTarget::new(account_id, channel));
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::test_support::{FakeChannel, FakeFeed};

    fn account(igaccount: &str, webhook: &str) -> AccountOptions {
        AccountOptions {
            igaccount: igaccount.to_string(),
            webhook: webhook.to_string(),
        }
    }

    fn ids(targets: &[MirrorTarget]) -> Vec<(String, String)> {
        targets
            .iter()
            .map(|t| (t.remote_account_id.clone(), t.channel.channel_id().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_channel_and_username_reused() {
        let feed = FakeFeed::default();
        let mut connected = Vec::new();
        let accounts = vec![
            account("natgeo", "hook-a"),
            account("nasa", "hook-a"),
            account("natgeo", "hook-b"),
        ];

        let targets = resolve_targets(&accounts, &feed, |url| {
            connected.push(url.to_string());
            Ok(Arc::new(FakeChannel::new(url)) as Arc<dyn NotificationChannel>)
        })
        .await
        .unwrap();

        assert_eq!(
            ids(&targets),
            vec![
                ("id_natgeo".to_string(), "hook-a".to_string()),
                ("id_nasa".to_string(), "hook-a".to_string()),
                ("id_natgeo".to_string(), "hook-b".to_string()),
            ]
        );
        assert_eq!(connected, vec!["hook-a", "hook-b"]);
        assert_eq!(feed.resolve_requests(), vec!["natgeo", "nasa"]);
        assert!(Arc::ptr_eq(&targets[0].channel, &targets[1].channel));
    }

    #[tokio::test]
    async fn test_unresolved_username_skipped() {
        let feed = FakeFeed::default();
        feed.fail_resolve("gone");
        let accounts = vec![account("gone", "hook"), account("nasa", "hook")];

        let targets = resolve_targets(&accounts, &feed, |url| {
            Ok(Arc::new(FakeChannel::new(url)) as Arc<dyn NotificationChannel>)
        })
        .await
        .unwrap();

        assert_eq!(ids(&targets), vec![("id_nasa".to_string(), "hook".to_string())]);
    }

    #[tokio::test]
    async fn test_same_account_twice_on_one_channel_skipped() {
        let feed = FakeFeed::default();
        feed.set_resolved_id("renamed", "id_natgeo");
        let accounts = vec![account("natgeo", "hook"), account("renamed", "hook")];

        let targets = resolve_targets(&accounts, &feed, |url| {
            Ok(Arc::new(FakeChannel::new(url)) as Arc<dyn NotificationChannel>)
        })
        .await
        .unwrap();

        assert_eq!(ids(&targets), vec![("id_natgeo".to_string(), "hook".to_string())]);
    }

    #[tokio::test]
    async fn test_invalid_webhook_is_error() {
        let feed = FakeFeed::default();
        let accounts = vec![account("natgeo", "not a webhook")];

        let result = resolve_targets(&accounts, &feed, |url| {
            Err(SyncError::Api {
                status: 0,
                message: format!("not a Discord webhook URL: {}", url),
            })
        })
        .await;

        assert!(result.is_err());
        assert!(feed.resolve_requests().is_empty());
    }
}
