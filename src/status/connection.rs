//! Redis client construction for the status channel

use crate::config::RedisSettings;
use crate::error::{Result, TransitError};
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Connection parameters for `settings`; an empty password means no AUTH
pub fn connection_info(settings: &RedisSettings) -> ConnectionInfo {
    let password = if settings.password.is_empty() {
        None
    } else {
        Some(settings.password.clone())
    };

    ConnectionInfo {
        addr: ConnectionAddr::Tcp(settings.host.clone(), settings.port),
        redis: RedisConnectionInfo {
            db: settings.database,
            password,
            ..Default::default()
        },
    }
}

/// Build a client; this does not connect yet
pub fn open_client(settings: &RedisSettings) -> Result<Client> {
    Client::open(connection_info(settings)).map_err(|e| {
        TransitError::StatusChannelFailed {
            message: format!(
                "Invalid redis settings for {}:{}: {}",
                settings.host, settings.port, e
            ),
        }
        .into()
    })
}
