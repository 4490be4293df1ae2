use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::session::credentials::{CredentialStore, Credentials};
use crate::session::error::{SessionError, extract_detail};
use crate::session::transport::{ApiRequest, ApiResponse, Transport};

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Deserialize)]
struct TokenPair {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

pub struct Session {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    current: RwLock<Option<Credentials>>,
    refresh_gate: Mutex<()>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            store,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Starts from whatever pair the store already holds.
    pub fn restore(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, SessionError> {
        let restored = store.get()?;
        if restored.is_some() {
            debug!("restored persisted credentials");
        }

        Ok(Self {
            transport,
            store,
            current: RwLock::new(restored),
            refresh_gate: Mutex::new(()),
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let request = ApiRequest::post(
            LOGIN_PATH,
            json!({ "email": email, "password": password }),
        );
        let response = self.transport.send(&request, None).await?;
        let response = reject_failures(response)?;

        let pair: TokenPair = decode(response)?;
        let refresh = pair
            .refresh
            .ok_or_else(|| SessionError::Decode("login response has no refresh credential".to_string()))?;
        let credentials = Credentials {
            access: pair.access,
            refresh,
        };

        self.store.set(&credentials)?;
        *self.current.write().await = Some(credentials);
        info!("session started");
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), SessionError> {
        *self.current.write().await = None;
        self.store.clear()?;
        info!("session ended");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Sends `request` with the current access credential. A `401` triggers
    /// at most one refresh and one replay for this request.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let access = self
            .current
            .read()
            .await
            .as_ref()
            .map(|credentials| credentials.access.clone())
            .ok_or(SessionError::Unauthenticated)?;

        let response = self.transport.send(&request, Some(&access)).await?;
        if response.status != 401 {
            return reject_failures(response);
        }
        if request.retried {
            return Err(SessionError::Unauthenticated);
        }

        let fresh = self.refresh_after_expiry(&access).await?;
        let replay = ApiRequest {
            retried: true,
            ..request
        };
        let response = self.transport.send(&replay, Some(&fresh)).await?;
        if response.status == 401 {
            warn!(path = %replay.path, "request still unauthorized after refresh");
            return Err(SessionError::Unauthenticated);
        }
        reject_failures(response)
    }

    /// Sends `request` without any credential.
    pub async fn execute_public(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let response = self.transport.send(&request, None).await?;
        reject_failures(response)
    }

    /// Returns a usable access credential after `stale_access` was refused.
    /// Only one refresh runs at a time; callers queued behind it reuse its
    /// result instead of refreshing again.
    async fn refresh_after_expiry(&self, stale_access: &str) -> Result<String, SessionError> {
        let _gate = self.refresh_gate.lock().await;

        let refresh = match self.current.read().await.as_ref() {
            None => return Err(SessionError::Unauthenticated),
            Some(current) if current.access != stale_access => {
                debug!("credential already refreshed by a concurrent request");
                return Ok(current.access.clone());
            }
            Some(current) => current.refresh.clone(),
        };

        match self.request_refresh(&refresh).await {
            Ok(credentials) => {
                self.store.set(&credentials)?;
                let access = credentials.access.clone();
                *self.current.write().await = Some(credentials);
                info!("access credential refreshed");
                Ok(access)
            }
            Err(err) => {
                warn!(error = %err, "credential refresh failed; ending session");
                *self.current.write().await = None;
                if let Err(clear_err) = self.store.clear() {
                    warn!(error = %clear_err, "failed to clear credential store");
                }
                Err(SessionError::Unauthenticated)
            }
        }
    }

    async fn request_refresh(&self, refresh: &str) -> Result<Credentials, SessionError> {
        let request = ApiRequest::post(REFRESH_PATH, json!({ "refresh": refresh }));
        let response = self.transport.send(&request, None).await?;
        if !response.is_success() {
            return Err(SessionError::Rejected {
                status: response.status,
                detail: extract_detail(&response.body),
            });
        }

        let pair: TokenPair = decode(response)?;
        Ok(Credentials {
            access: pair.access,
            refresh: pair.refresh.unwrap_or_else(|| refresh.to_string()),
        })
    }
}

fn reject_failures(response: ApiResponse) -> Result<ApiResponse, SessionError> {
    match response.status {
        status if (200..300).contains(&status) => Ok(response),
        401 => Err(SessionError::Unauthenticated),
        403 => Err(SessionError::Forbidden(extract_detail(&response.body))),
        status => Err(SessionError::Rejected {
            status,
            detail: extract_detail(&response.body),
        }),
    }
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    response: ApiResponse,
) -> Result<T, SessionError> {
    serde_json::from_value(response.body).map_err(|err| SessionError::Decode(err.to_string()))
}
