//! Batch decryption that tolerates individual bad entities.

use crate::lock::KeyRing;
use futures::future::join_all;
use keyward_crypto::CryptoService;
use keyward_model::{Decryptable, VaultEntity};
use tracing::warn;

/// Decrypts every entity with the key its organization (or the user)
/// owns. An entity whose key is missing or whose fields fail to decrypt
/// becomes a flagged placeholder instead of failing the batch.
pub async fn decrypt_all<E>(crypto: &dyn CryptoService, entities: &[E], keys: &KeyRing) -> Vec<E::View>
where
    E: VaultEntity + Decryptable,
{
    let pending = entities.iter().map(|entity| async move {
        let Some(key) = keys.key_for(entity.organization_id()) else {
            warn!(
                "[VAULT] No key for organization {:?}; {} {} left encrypted",
                entity.organization_id(),
                E::KIND,
                entity.id()
            );
            return entity.undecryptable();
        };
        match entity.decrypt(crypto, key).await {
            Ok(view) => view,
            Err(e) => {
                warn!("[VAULT] Failed to decrypt {} {}: {}", E::KIND, entity.id(), e);
                entity.undecryptable()
            }
        }
    });
    join_all(pending).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keyward_crypto::{AesCryptoService, SymmetricKeyMaterial};
    use keyward_model::{Encryptable, FolderView};

    #[tokio::test]
    async fn bad_entities_become_placeholders() {
        let crypto = AesCryptoService;
        let key = SymmetricKeyMaterial::generate();
        let other = SymmetricKeyMaterial::generate();

        let good = FolderView::new("Good").encrypt(&crypto, &key).await.unwrap();
        let bad = FolderView::new("Bad").encrypt(&crypto, &other).await.unwrap();

        let views = decrypt_all(&crypto, &[good.clone(), bad.clone()], &KeyRing::new(key)).await;
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].name, "Good");
        assert!(!views[0].decryption_failed);
        assert_eq!(views[1].id, bad.id);
        assert!(views[1].decryption_failed);
        assert!(views[1].revision_date <= Utc::now());
    }
}
