//! Login orchestration
//!
//! One login attempt walks two paths, in order:
//!   1. token login with the stored refresh token, if any;
//!   2. password-unlock of the owner guardian's identity key, then remote
//!      challenge-response.
//!
//! An explicit remote rejection of the token falls through to path 2 exactly
//! once; a transport failure during token login is terminal for the attempt
//! (retrying is the caller's decision). Exhausting both paths yields
//! `Ok(None)` — "login failed", re-prompt if you like — while vault and
//! transport faults stay errors. No retries happen in here.

use tracing::debug;

use crate::envelope;
use crate::error::{Result, VaultError};
use crate::models::{KeyType, TokenPair};
use crate::remote::GuardianService;
use crate::store::VaultStore;

pub struct Authenticator<'a, S: GuardianService + ?Sized> {
    store: &'a VaultStore,
    service: &'a S,
}

impl<'a, S: GuardianService + ?Sized> Authenticator<'a, S> {
    pub fn new(store: &'a VaultStore, service: &'a S) -> Self {
        Self { store, service }
    }

    /// Resolve a session for `email`. `Ok(Some(pair))` on success (the pair is
    /// also persisted), `Ok(None)` when both paths were exhausted.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<TokenPair>> {
        if let Some(stored) = self.stored_tokens(email)? {
            match self
                .service
                .login_with_token(email, &stored.refresh.token)
                .await
            {
                Ok(pair) => {
                    self.store.save_tokens(email, &pair)?;
                    return Ok(Some(pair));
                }
                Err(VaultError::Remote { code, .. }) => {
                    // the token was examined and refused — try the password
                    // path, but never the same token again
                    debug!(%code, "token login rejected, falling back to challenge-response");
                }
                Err(e) => return Err(e),
            }
        }

        // fail fast on a fresh device: no user record means no password path
        let user = self.store.load_user(email)?;
        let sealed_identity = self
            .store
            .load_key(&user.owner_guardian, KeyType::Identity)?;

        let identity_key =
            match envelope::decrypt_off_thread(sealed_identity, password.to_owned()).await {
                Ok(key) => key,
                Err(VaultError::Decryption) => {
                    debug!("password unlock failed");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

        match self
            .service
            .login_with_challenge(&user, identity_key.as_slice())
            .await
        {
            Ok(pair) => {
                self.store.save_tokens(email, &pair)?;
                Ok(Some(pair))
            }
            Err(VaultError::Remote { code, .. }) => {
                debug!(%code, "challenge-response login rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn stored_tokens(&self, email: &str) -> Result<Option<TokenPair>> {
        match self.store.load_tokens(email) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordKind;
    use crate::identity::IdentityKeyPair;
    use crate::models::{AuthToken, GuardianKind, GuardianRecord, UserRecord};
    use crate::remote::{SignatureReceipt, WalletRecord};
    use crate::sealing::SealedNodeKey;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const EMAIL: &str = "ada@example.com";
    const PASSWORD: &str = "correct horse battery staple";

    /// What the mock service answers on each auth path.
    #[derive(Clone, Copy)]
    enum Reply {
        Accept,
        Reject,
        Unreachable,
    }

    struct MockService {
        token_reply: Reply,
        challenge_reply: Reply,
        token_calls: AtomicUsize,
        challenge_calls: AtomicUsize,
    }

    impl MockService {
        fn new(token_reply: Reply, challenge_reply: Reply) -> Self {
            Self {
                token_reply,
                challenge_reply,
                token_calls: AtomicUsize::new(0),
                challenge_calls: AtomicUsize::new(0),
            }
        }

        fn answer(reply: Reply, token_prefix: &str) -> Result<TokenPair> {
            match reply {
                Reply::Accept => Ok(fresh_tokens(token_prefix)),
                Reply::Reject => Err(VaultError::Remote {
                    code: "auth/denied".into(),
                    message: "credentials rejected".into(),
                }),
                Reply::Unreachable => Err(VaultError::Transport("connection refused".into())),
            }
        }
    }

    fn fresh_tokens(prefix: &str) -> TokenPair {
        TokenPair {
            access: AuthToken {
                token: format!("{prefix}-access"),
                expires_at: None,
            },
            refresh: AuthToken {
                token: format!("{prefix}-refresh"),
                expires_at: None,
            },
        }
    }

    #[async_trait]
    impl GuardianService for MockService {
        async fn create_user(&self, _: &str, _: &str) -> Result<UserRecord> {
            unimplemented!("not exercised by auth tests")
        }

        async fn login_with_token(&self, _: &str, _: &str) -> Result<TokenPair> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            Self::answer(self.token_reply, "token-path")
        }

        async fn login_with_challenge(
            &self,
            _: &UserRecord,
            identity_key: &[u8],
        ) -> Result<TokenPair> {
            self.challenge_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(identity_key.len(), 32);
            Self::answer(self.challenge_reply, "challenge-path")
        }

        async fn add_guardian(
            &self,
            _: &str,
            _: &GuardianRecord,
            _: bool,
            _: &TokenPair,
        ) -> Result<UserRecord> {
            unimplemented!("not exercised by auth tests")
        }

        async fn create_wallets(
            &self,
            _: &str,
            _: &[String],
            _: &[SealedNodeKey],
            _: &TokenPair,
        ) -> Result<Vec<WalletRecord>> {
            unimplemented!("not exercised by auth tests")
        }

        async fn sign_message(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &TokenPair,
        ) -> Result<SignatureReceipt> {
            unimplemented!("not exercised by auth tests")
        }

        async fn verify_signature(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &TokenPair,
        ) -> Result<bool> {
            unimplemented!("not exercised by auth tests")
        }

        async fn gridlock_guardians(&self) -> Result<Vec<GuardianRecord>> {
            unimplemented!("not exercised by auth tests")
        }

        async fn start_recovery(&self, _: &str) -> Result<()> {
            unimplemented!("not exercised by auth tests")
        }

        async fn confirm_recovery(&self, _: &str, _: &str, _: &str) -> Result<UserRecord> {
            unimplemented!("not exercised by auth tests")
        }

        async fn transfer_owner(
            &self,
            _: &str,
            _: &GuardianRecord,
            _: &TokenPair,
        ) -> Result<UserRecord> {
            unimplemented!("not exercised by auth tests")
        }
    }

    /// Seed a vault with a user, an owner guardian, and its encrypted
    /// identity key.
    fn seed_vault(store: &VaultStore) {
        let identity = IdentityKeyPair::generate();
        let owner = GuardianRecord {
            node_id: "node-owner".into(),
            name: "Ada's device".into(),
            kind: GuardianKind::Owner,
            public_key: identity.public_b64(),
            active: true,
        };
        store.save_guardian(&owner).unwrap();
        store
            .save_user(&UserRecord {
                email: EMAIL.into(),
                name: "Ada".into(),
                owner_guardian: owner.node_id.clone(),
                node_pool: vec![owner.node_id.clone()],
            })
            .unwrap();
        let sealed = crate::envelope::encrypt(identity.secret_bytes(), PASSWORD).unwrap();
        store
            .save_key(&owner.node_id, KeyType::Identity, &sealed)
            .unwrap();
    }

    #[tokio::test]
    async fn stored_token_path_succeeds_and_persists() {
        let dir = tempdir().unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        seed_vault(&store);
        store.save_tokens(EMAIL, &fresh_tokens("stale")).unwrap();

        let service = MockService::new(Reply::Accept, Reply::Reject);
        let auth = Authenticator::new(&store, &service);
        let pair = auth.login(EMAIL, PASSWORD).await.unwrap().unwrap();

        assert_eq!(pair.access.token, "token-path-access");
        assert_eq!(store.load_tokens(EMAIL).unwrap(), pair);
        assert_eq!(service.challenge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_token_falls_through_once() {
        let dir = tempdir().unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        seed_vault(&store);
        store.save_tokens(EMAIL, &fresh_tokens("stale")).unwrap();

        let service = MockService::new(Reply::Reject, Reply::Accept);
        let auth = Authenticator::new(&store, &service);
        let pair = auth.login(EMAIL, PASSWORD).await.unwrap().unwrap();

        assert_eq!(pair.access.token, "challenge-path-access");
        assert_eq!(service.token_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.challenge_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load_tokens(EMAIL).unwrap(), pair);
    }

    #[tokio::test]
    async fn token_transport_failure_is_terminal() {
        let dir = tempdir().unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        seed_vault(&store);
        store.save_tokens(EMAIL, &fresh_tokens("stale")).unwrap();

        let service = MockService::new(Reply::Unreachable, Reply::Accept);
        let auth = Authenticator::new(&store, &service);
        let err = auth.login(EMAIL, PASSWORD).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(service.challenge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_user_fails_fast_with_not_found() {
        let dir = tempdir().unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        // empty vault: no tokens, no user — the "new device" case

        let service = MockService::new(Reply::Accept, Reply::Accept);
        let auth = Authenticator::new(&store, &service);
        let err = auth.login(EMAIL, PASSWORD).await.unwrap_err();

        assert!(matches!(
            err,
            VaultError::NotFound { kind: RecordKind::User, .. }
        ));
        assert_eq!(service.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_password_is_failed_login_not_error() {
        let dir = tempdir().unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        seed_vault(&store);

        let service = MockService::new(Reply::Reject, Reply::Accept);
        let auth = Authenticator::new(&store, &service);
        let outcome = auth.login(EMAIL, "not the password").await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(service.challenge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn challenge_rejection_exhausts_to_none() {
        let dir = tempdir().unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        seed_vault(&store);

        let service = MockService::new(Reply::Reject, Reply::Reject);
        let auth = Authenticator::new(&store, &service);
        let outcome = auth.login(EMAIL, PASSWORD).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(service.challenge_calls.load(Ordering::SeqCst), 1);
    }
}
