//! Operator commands for registered users.
//!
//! These are the only writers of `users` rows; the API reads them through
//! the token authenticator.

use anyhow::Context;
use chrono::Utc;

use cg_conversations::{hash_token, mint_user_token};
use cg_domain::config::Config;
use cg_domain::records::UserRecord;
use cg_storage::UserStore;

/// Create a user and return the record with its plaintext token.
///
/// Only the token's SHA-256 is stored, so this is the one chance to see it.
pub async fn add(
    users: &dyn UserStore,
    name: &str,
    subscribed: bool,
) -> anyhow::Result<(UserRecord, String)> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("user name must not be empty");
    }

    let token = mint_user_token();
    let mut user = users
        .create_user(name, &hash_token(&token), Utc::now())
        .await
        .context("creating user")?;
    if subscribed {
        user = users
            .set_subscription(user.id, true)
            .await
            .context("activating subscription")?;
    }
    Ok((user, token))
}

pub async fn subscribe(users: &dyn UserStore, id: i64, active: bool) -> anyhow::Result<UserRecord> {
    users
        .set_subscription(id, active)
        .await
        .with_context(|| format!("updating subscription for user {id}"))
}

/// Entry points used by `main`: open storage from config, run, print.
pub async fn run_add(config: &Config, name: &str, subscribed: bool) -> anyhow::Result<()> {
    let stores = cg_storage::open(&config.storage)
        .await
        .context("opening storage")?;
    let (user, token) = add(stores.users.as_ref(), name, subscribed).await?;
    println!("user {} ({}) created", user.id, user.name);
    println!("subscription active: {}", user.subscription_active);
    println!("bearer token (shown once): {token}");
    Ok(())
}

pub async fn run_subscribe(config: &Config, id: i64, active: bool) -> anyhow::Result<()> {
    let stores = cg_storage::open(&config.storage)
        .await
        .context("opening storage")?;
    let user = subscribe(stores.users.as_ref(), id, active).await?;
    println!(
        "user {} ({}) subscription active: {}",
        user.id, user.name, user.subscription_active
    );
    Ok(())
}
