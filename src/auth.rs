use crate::config::TokenStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::oauth2;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

const APP_NAME: &str = "gdraft";
const TOKEN_KEY: &str = "gmail_token";

pub type GmailAuthenticator = oauth2::authenticator::Authenticator<
    hyper_rustls::HttpsConnector<hyper::client::HttpConnector>,
>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

/// Token cache kept in the OS keyring instead of `token.json`.
pub struct RingStorage;

impl RingStorage {
    fn entry() -> Result<Entry> {
        Entry::new(APP_NAME, TOKEN_KEY).map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
    }

    fn read(&self) -> Result<TokenData> {
        match Self::entry()?.get_password() {
            Ok(serialized) => {
                serde_json::from_str(&serialized).context("Failed to deserialize cached token")
            }
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }

    pub fn clear(&self) -> Result<()> {
        match Self::entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> Result<()> {
        let data = TokenData {
            tokens: vec![token],
        };
        let serialized = serde_json::to_string(&data).context("Failed to serialize token")?;
        Self::entry()?
            .set_password(&serialized)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.read().ok().and_then(|data| data.tokens.into_iter().next())
    }
}

/// Presents the consent URL: logs it and tries to open a browser.
pub struct BrowserDelegate;

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            info!("Authorize this application by visiting: {}", url);
            if let Err(e) = open::that(url) {
                warn!(error = %e, "Could not open browser, open the URL manually");
            }

            if !need_code {
                return Ok(String::new());
            }

            use tokio::io::AsyncBufReadExt;
            let mut code = String::new();
            tokio::io::BufReader::new(tokio::io::stdin())
                .read_line(&mut code)
                .await
                .map_err(|e| format!("Failed to read authorization code: {}", e))?;
            Ok(code.trim().to_string())
        })
    }
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret> {
        let path = path.as_ref();
        read_application_secret(path)
            .await
            .with_context(|| format!("Failed to read application secret {}", path.display()))
    }

    /// Builds the authenticator and makes sure a valid token is available,
    /// running the consent flow or a refresh when needed.
    pub async fn authenticate<P: AsRef<Path>>(
        secret: ApplicationSecret,
        store: TokenStore,
        token_cache_path: P,
    ) -> Result<GmailAuthenticator> {
        let builder =
            InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
                .flow_delegate(Box::new(BrowserDelegate));

        let builder = match store {
            TokenStore::File => builder.persist_tokens_to_disk(token_cache_path.as_ref()),
            TokenStore::Keyring => builder.with_storage(Box::new(RingStorage)),
        };

        let auth = builder
            .build()
            .await
            .context("Failed to build authenticator")?;

        auth.token(SCOPES).await.context("Failed to obtain access token")?;
        Ok(auth)
    }

    pub fn clear_token<P: AsRef<Path>>(store: TokenStore, token_cache_path: P) -> Result<()> {
        match store {
            TokenStore::File => match std::fs::remove_file(token_cache_path.as_ref()) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e).context("Failed to remove token cache"),
            },
            TokenStore::Keyring => RingStorage.clear(),
        }
    }
}
