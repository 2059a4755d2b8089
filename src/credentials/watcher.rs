//! Keeps [`SharedCredentials`] in sync with the admin Secret.
//!
//! The watch is restricted to a single Secret through a `metadata.name` field
//! selector. Every add/update carrying both [`ADMIN_ROLE_KEY`] and
//! [`ADMIN_PASSWORD_KEY`] swaps the shared credentials. Deleting the Secret
//! leaves the last known credentials in place.
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tracing::{event, instrument, Level};

use super::{Credentials, SharedCredentials, ADMIN_PASSWORD_KEY, ADMIN_ROLE_KEY};

/// Extracts the admin credentials from `secret`.
/// Returns None if either key is missing or isn't valid utf8.
pub fn credentials_from_secret(secret: &Secret) -> Option<Credentials> {
    let data = secret.data.as_ref()?;
    let user = String::from_utf8(data.get(ADMIN_ROLE_KEY)?.0.clone()).ok()?;
    let password = String::from_utf8(data.get(ADMIN_PASSWORD_KEY)?.0.clone()).ok()?;

    Some(Credentials::new(user, password))
}

/// Applies a single watch event to `credentials`. Returns true if the credentials changed.
pub fn apply_event(
    watch_event: watcher::Event<Secret>,
    name: &str,
    credentials: &SharedCredentials,
) -> crate::error::Result<bool> {
    let secret = match watch_event {
        watcher::Event::Applied(secret) => secret,
        watcher::Event::Restarted(secrets) => {
            match secrets.into_iter().find(|secret| secret.name_any() == name) {
                Some(secret) => secret,
                None => {
                    event!(Level::WARN, "admin secret {} not found", name);
                    return Ok(false);
                }
            }
        }
        watcher::Event::Deleted(secret) => {
            event!(
                Level::WARN,
                "admin secret {} deleted, keeping the last known credentials",
                secret.name_any()
            );
            return Ok(false);
        }
    };

    match credentials_from_secret(&secret) {
        Some(new_credentials) => credentials.swap(new_credentials),
        None => {
            event!(
                Level::WARN,
                "admin secret {} lacks {} or {}, ignoring it",
                secret.name_any(),
                ADMIN_ROLE_KEY,
                ADMIN_PASSWORD_KEY
            );
            Ok(false)
        }
    }
}

/// Watches the Secret `name` in `namespace` forever.
/// Watch errors are retried with kube's default backoff.
#[instrument(name = "credentials::watcher", level = "info", skip(client, credentials))]
pub async fn watch_admin_secret(
    client: Client,
    namespace: String,
    name: String,
    credentials: SharedCredentials,
) {
    let secrets: Api<Secret> = Api::namespaced(client, &namespace);
    let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
    let mut stream = watcher(secrets, config).default_backoff().boxed();

    event!(Level::INFO, "watching admin secret");
    while let Some(watch_event) = stream.next().await {
        match watch_event {
            Ok(watch_event) => {
                if let Err(err) = apply_event(watch_event, &name, &credentials) {
                    event!(Level::ERROR, "unable to update credentials: {}", err);
                }
            }
            Err(err) => {
                event!(Level::WARN, "admin secret watch failed: {}", err);
            }
        }
    }
    event!(Level::WARN, "admin secret watch stream ended");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use kube::runtime::watcher::Event;

    use super::{apply_event, credentials_from_secret};
    use crate::credentials::{Credentials, SharedCredentials};

    fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("cassandra".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Secret::default()
        }
    }

    #[test]
    fn reads_admin_keys() {
        let s = secret(
            "admin",
            &[("admin-role", "cassandra"), ("admin-password", "hunter2")],
        );
        assert_eq!(
            credentials_from_secret(&s),
            Some(Credentials::new("cassandra", "hunter2"))
        );
    }

    #[test]
    fn missing_key_is_ignored() {
        let shared = SharedCredentials::new(Credentials::new("cassandra", "old"));
        let s = secret("admin", &[("admin-role", "cassandra")]);

        assert_eq!(credentials_from_secret(&s), None);
        assert!(!apply_event(Event::Applied(s), "admin", &shared).unwrap());
        assert_eq!(
            shared.current().unwrap(),
            Credentials::new("cassandra", "old")
        );
    }

    #[test]
    fn rotation_swaps_credentials() {
        let shared = SharedCredentials::default();
        let first = secret(
            "admin",
            &[("admin-role", "cassandra"), ("admin-password", "v1")],
        );
        let rotated = secret(
            "admin",
            &[("admin-role", "cassandra"), ("admin-password", "v2")],
        );

        assert!(apply_event(Event::Restarted(vec![first.clone()]), "admin", &shared).unwrap());
        // unchanged data is a noop
        assert!(!apply_event(Event::Applied(first), "admin", &shared).unwrap());
        assert!(apply_event(Event::Applied(rotated), "admin", &shared).unwrap());
        assert_eq!(shared.current().unwrap(), Credentials::new("cassandra", "v2"));
    }

    #[test]
    fn deletion_keeps_last_credentials() {
        let shared = SharedCredentials::new(Credentials::new("cassandra", "v1"));
        let s = secret("admin", &[]);

        assert!(!apply_event(Event::Deleted(s), "admin", &shared).unwrap());
        assert!(shared.current().unwrap().is_loaded());
    }

    #[test]
    fn restart_without_the_secret() {
        let shared = SharedCredentials::default();
        assert!(!apply_event(Event::Restarted(vec![]), "admin", &shared).unwrap());
        assert!(!shared.current().unwrap().is_loaded());
    }
}
