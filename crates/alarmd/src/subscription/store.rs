//! Durable registry of the single subscription.

use std::sync::Arc;

use alarmd_crypto::CredentialCipher;
use tracing::{info, instrument};

use super::{
    EventType, NewSubscription, Protocol, SubscriptionInfo, encode_event_types,
};
use crate::error::EventError;
use crate::storage::{EventDatabase, Subscription, SubscriptionParams};
use crate::secret::decrypt_utf8;

/// The fixed identity of the one subscription slot.
pub const SUBSCRIPTION_ID: i64 = 1;

#[derive(Clone)]
pub struct SubscriptionStore {
    db: EventDatabase,
    cipher: Arc<dyn CredentialCipher>,
}

impl SubscriptionStore {
    pub fn new(db: EventDatabase, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { db, cipher }
    }

    /// Register the destination.
    ///
    /// Fails with `Capacity` when a subscription already exists.
    #[instrument(skip(self, request), fields(destination = %request.destination))]
    pub async fn create(&self, request: &NewSubscription) -> Result<SubscriptionInfo, EventError> {
        request.validate()?;

        if self.db.count_subscriptions().await? > 0 {
            return Err(capacity_error());
        }

        let credential = self.cipher.encrypt(request.credential.as_bytes())?;
        let event_types = encode_event_types(&request.event_types);

        let inserted = self
            .db
            .insert_subscription_if_vacant(&SubscriptionParams {
                id: SUBSCRIPTION_ID,
                destination: &request.destination,
                event_types: &event_types,
                protocol: request.protocol.as_str(),
                credential: &credential,
            })
            .await?;
        if !inserted {
            // Lost a race with a concurrent create.
            return Err(capacity_error());
        }

        info!(subscription_id = SUBSCRIPTION_ID, "Subscription created");

        self.get(SUBSCRIPTION_ID)
            .await?
            .ok_or_else(|| EventError::NotFound(format!("Subscription {SUBSCRIPTION_ID}")))
    }

    /// Remove the subscription. Its report tasks are left to the janitor.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), EventError> {
        if !self.db.delete_subscription(id).await? {
            return Err(EventError::NotFound(format!("Subscription {id}")));
        }
        info!(subscription_id = id, "Subscription deleted");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<SubscriptionInfo>, EventError> {
        self.db
            .get_subscription(id)
            .await?
            .as_ref()
            .map(to_info)
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<SubscriptionInfo>, EventError> {
        let mut out = Vec::new();
        for id in self.db.list_subscription_ids().await? {
            if let Some(info) = self.get(id).await? {
                out.push(info);
            }
        }
        Ok(out)
    }

    /// Plaintext `X-Auth-Token` of a stored subscription.
    pub fn credential(&self, subscription: &Subscription) -> Result<String, EventError> {
        decrypt_utf8(self.cipher.as_ref(), &subscription.credential)
    }

    /// Re-encrypt every stored credential under `next`.
    ///
    /// Callers switch the store over to `next` afterwards.
    #[instrument(skip_all)]
    pub async fn rotate_credential(&self, next: &dyn CredentialCipher) -> Result<u64, EventError> {
        let mut rotated = 0;
        for id in self.db.list_subscription_ids().await? {
            let Some(sub) = self.db.get_subscription(id).await? else {
                continue;
            };
            let plain = self.cipher.decrypt(&sub.credential)?;
            let sealed = next.encrypt(&plain)?;
            if self.db.update_subscription_credential(id, &sealed).await? {
                rotated += 1;
            }
        }
        info!(count = rotated, "Subscription credentials re-encrypted");
        Ok(rotated)
    }
}

fn capacity_error() -> EventError {
    EventError::Capacity("A subscription already exists; only one is supported".to_string())
}

fn to_info(sub: &Subscription) -> Result<SubscriptionInfo, EventError> {
    let event_types = sub
        .event_type_names()
        .map(str::parse::<EventType>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EventError::Persistence(format!("stored subscription is corrupt: {e}")))?;
    let protocol = sub
        .protocol
        .parse::<Protocol>()
        .map_err(|e| EventError::Persistence(format!("stored subscription is corrupt: {e}")))?;

    Ok(SubscriptionInfo {
        id: sub.id,
        destination: sub.destination.clone(),
        event_types,
        protocol,
        created_at: sub.created_at,
        updated_at: sub.updated_at,
    })
}
