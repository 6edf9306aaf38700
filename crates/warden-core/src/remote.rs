//! Remote guardian service interface
//!
//! The network side of key custody — threshold signing, guardian consensus,
//! recovery — lives behind this trait. Every reply on the wire has the shape
//! `{success, data}` or `{success: false, error: {code, message}}`; a
//! `success: false` reply maps to [`VaultError::Remote`] and is a normal,
//! handled outcome. Transport failures and timeouts map to their own
//! retryable variants and are never retried here.
//!
//! The HTTP client is constructed once per process invocation and passed by
//! reference — no ambient global.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::models::{GuardianRecord, TokenPair, UserRecord};
use crate::sealing::SealedNodeKey;
use crate::store::VaultStore;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub coin_type: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureReceipt {
    pub coin_type: String,
    pub signature: String,
}

/// Operations consumed from the remote guardian service.
#[async_trait]
pub trait GuardianService: Send + Sync {
    async fn create_user(&self, name: &str, email: &str) -> Result<UserRecord>;

    /// Token-based login with a previously issued refresh token.
    async fn login_with_token(&self, email: &str, refresh_token: &str) -> Result<TokenPair>;

    /// Challenge-response login with the decrypted owner-guardian identity key.
    async fn login_with_challenge(&self, user: &UserRecord, identity_key: &[u8])
        -> Result<TokenPair>;

    async fn add_guardian(
        &self,
        email: &str,
        guardian: &GuardianRecord,
        is_owner: bool,
        tokens: &TokenPair,
    ) -> Result<UserRecord>;

    async fn create_wallets(
        &self,
        email: &str,
        coins: &[String],
        sealed_keys: &[SealedNodeKey],
        tokens: &TokenPair,
    ) -> Result<Vec<WalletRecord>>;

    async fn sign_message(
        &self,
        email: &str,
        message: &str,
        coin_type: &str,
        tokens: &TokenPair,
    ) -> Result<SignatureReceipt>;

    async fn verify_signature(
        &self,
        email: &str,
        message: &str,
        signature: &str,
        coin_type: &str,
        tokens: &TokenPair,
    ) -> Result<bool>;

    /// Gridlock-operated guardians available for new node pools.
    async fn gridlock_guardians(&self) -> Result<Vec<GuardianRecord>>;

    async fn start_recovery(&self, email: &str) -> Result<()>;

    /// Confirm recovery with the emailed code and the new device's identity
    /// public key. Returns the superseding user record.
    async fn confirm_recovery(
        &self,
        email: &str,
        code: &str,
        identity_public_key: &str,
    ) -> Result<UserRecord>;

    async fn transfer_owner(
        &self,
        email: &str,
        new_owner: &GuardianRecord,
        tokens: &TokenPair,
    ) -> Result<UserRecord>;
}

// ── Wire envelope ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default = "unknown_code")]
    code: String,
    #[serde(default)]
    message: String,
}

fn unknown_code() -> String {
    "unknown".to_string()
}

impl<T> ApiEnvelope<T> {
    fn into_result(self) -> Result<T> {
        if self.success {
            self.data
                .ok_or_else(|| VaultError::Transport("reply missing data".into()))
        } else {
            Err(self.rejection())
        }
    }

    fn rejection(self) -> VaultError {
        let error = self.error.unwrap_or(ApiErrorBody {
            code: unknown_code(),
            message: "unspecified failure".into(),
        });
        VaultError::Remote {
            code: error.code,
            message: error.message,
        }
    }
}

// ── HTTP implementation ───────────────────────────────────────────────────────

pub struct HttpGuardianService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGuardianService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("warden-cli/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Transport(e.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
        tokens: Option<&TokenPair>,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "guardian service request");
        let mut request = self.client.post(&url).json(body);
        if let Some(tokens) = tokens {
            request = request.bearer_auth(&tokens.access.token);
        }
        let response = request.send().await.map_err(map_reqwest)?;
        let envelope: ApiEnvelope<T> = response.json().await.map_err(map_reqwest)?;
        envelope.into_result()
    }

    /// POST for endpoints whose success reply carries no payload.
    async fn post_no_data(&self, path: &str, body: &Value) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "guardian service request");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest)?;
        let envelope: ApiEnvelope<Value> = response.json().await.map_err(map_reqwest)?;
        if envelope.success {
            // an empty or absent data field is still a success here
            Ok(())
        } else {
            Err(envelope.rejection())
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "guardian service request");
        let response = self.client.get(&url).send().await.map_err(map_reqwest)?;
        let envelope: ApiEnvelope<T> = response.json().await.map_err(map_reqwest)?;
        envelope.into_result()
    }
}

fn map_reqwest(e: reqwest::Error) -> VaultError {
    if e.is_timeout() {
        VaultError::Timeout
    } else {
        VaultError::Transport(e.to_string())
    }
}

#[async_trait]
impl GuardianService for HttpGuardianService {
    async fn create_user(&self, name: &str, email: &str) -> Result<UserRecord> {
        self.post(
            "/api/v1/users",
            &json!({ "name": name, "email": email }),
            None,
        )
        .await
    }

    async fn login_with_token(&self, email: &str, refresh_token: &str) -> Result<TokenPair> {
        self.post(
            "/api/v1/auth/token",
            &json!({ "email": email, "refreshToken": refresh_token }),
            None,
        )
        .await
    }

    async fn login_with_challenge(
        &self,
        user: &UserRecord,
        identity_key: &[u8],
    ) -> Result<TokenPair> {
        self.post(
            "/api/v1/auth/challenge",
            &json!({
                "email": user.email,
                "ownerGuardian": user.owner_guardian,
                "identityKey": B64.encode(identity_key),
            }),
            None,
        )
        .await
    }

    async fn add_guardian(
        &self,
        email: &str,
        guardian: &GuardianRecord,
        is_owner: bool,
        tokens: &TokenPair,
    ) -> Result<UserRecord> {
        self.post(
            "/api/v1/guardians",
            &json!({ "email": email, "guardian": guardian, "isOwner": is_owner }),
            Some(tokens),
        )
        .await
    }

    async fn create_wallets(
        &self,
        email: &str,
        coins: &[String],
        sealed_keys: &[SealedNodeKey],
        tokens: &TokenPair,
    ) -> Result<Vec<WalletRecord>> {
        self.post(
            "/api/v1/wallets",
            &json!({ "email": email, "coins": coins, "sealedKeys": sealed_keys }),
            Some(tokens),
        )
        .await
    }

    async fn sign_message(
        &self,
        email: &str,
        message: &str,
        coin_type: &str,
        tokens: &TokenPair,
    ) -> Result<SignatureReceipt> {
        self.post(
            "/api/v1/sign",
            &json!({ "email": email, "message": message, "coinType": coin_type }),
            Some(tokens),
        )
        .await
    }

    async fn verify_signature(
        &self,
        email: &str,
        message: &str,
        signature: &str,
        coin_type: &str,
        tokens: &TokenPair,
    ) -> Result<bool> {
        self.post(
            "/api/v1/verify",
            &json!({
                "email": email,
                "message": message,
                "signature": signature,
                "coinType": coin_type,
            }),
            Some(tokens),
        )
        .await
    }

    async fn gridlock_guardians(&self) -> Result<Vec<GuardianRecord>> {
        self.get("/api/v1/guardians/gridlock").await
    }

    async fn start_recovery(&self, email: &str) -> Result<()> {
        self.post_no_data("/api/v1/recovery/start", &json!({ "email": email }))
            .await
    }

    async fn confirm_recovery(
        &self,
        email: &str,
        code: &str,
        identity_public_key: &str,
    ) -> Result<UserRecord> {
        self.post(
            "/api/v1/recovery/confirm",
            &json!({ "email": email, "code": code, "identityPublicKey": identity_public_key }),
            None,
        )
        .await
    }

    async fn transfer_owner(
        &self,
        email: &str,
        new_owner: &GuardianRecord,
        tokens: &TokenPair,
    ) -> Result<UserRecord> {
        self.post(
            "/api/v1/owner/transfer",
            &json!({ "email": email, "newOwner": new_owner }),
            Some(tokens),
        )
        .await
    }
}

// ── Guardian-management flows ─────────────────────────────────────────────────

/// Fetch the Gridlock-operated guardian roster and cache each record in the
/// vault, so wallet creation can seal node keys without another round trip.
pub async fn sync_gridlock_guardians<S: GuardianService + ?Sized>(
    store: &VaultStore,
    service: &S,
) -> Result<Vec<GuardianRecord>> {
    let guardians = service.gridlock_guardians().await?;
    for guardian in &guardians {
        store.save_guardian(guardian)?;
    }
    debug!(count = guardians.len(), "gridlock roster cached");
    Ok(guardians)
}

/// Hand the owner role to another guardian. The service validates the
/// transfer first; on success the local owner record is replaced and the
/// superseding user record stored.
pub async fn transfer_ownership<S: GuardianService + ?Sized>(
    store: &VaultStore,
    service: &S,
    email: &str,
    new_owner: &GuardianRecord,
    tokens: &TokenPair,
) -> Result<UserRecord> {
    let user = service.transfer_owner(email, new_owner, tokens).await?;
    store.replace_owner_guardian(new_owner)?;
    store.save_user(&user)?;
    Ok(user)
}
