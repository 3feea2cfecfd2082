//! Valkey-backed agent directory with optional mTLS via rustls.
//!
//! Records are JSON strings at `fleet:agent:{name}`. Locks are plain keys at
//! `fleet:lock:{name}` set with `NX PX` and a random owner token; renew and
//! release only touch the key while it still holds our token.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use fleet_common::keys::directory;
use fleet_common::{AgentRecord, agent_lock_key, agent_record_key};
use fred::prelude::*;
use fred::types::config::{TlsConfig, TlsConnector, TlsHostMapping};
use fred::types::scan::Scanner;
use fred::types::{Expiration, SetOptions};
use uuid::Uuid;

use crate::application::ports::{AgentDirectory, AgentLock};

const RENEW_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('pexpire', KEYS[1], ARGV[2])
end
return 0
";

const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('del', KEYS[1])
end
return 0
";

/// Certificate files enabling mTLS.
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub ca: String,
    pub client_cert: String,
    pub client_key: String,
}

/// Connection settings for [`ValkeyAgentDirectory::connect`].
#[derive(Debug, Clone, Default)]
pub struct ValkeySettings {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub tls: Option<TlsFiles>,
}

#[derive(Clone)]
pub struct ValkeyAgentDirectory {
    client: Client,
}

fn load_tls(files: &TlsFiles) -> Result<rustls::ClientConfig> {
    let ca_file =
        File::open(&files.ca).with_context(|| format!("failed to open CA cert: {}", files.ca))?;
    let ca_certs = rustls_pemfile::certs(&mut BufReader::new(ca_file))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse CA cert")?;

    let mut root_store = rustls::RootCertStore::empty();
    for cert in ca_certs {
        root_store
            .add(cert)
            .context("failed to add CA cert to root store")?;
    }

    let cert_file = File::open(&files.client_cert)
        .with_context(|| format!("failed to open client cert: {}", files.client_cert))?;
    let client_certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse client cert")?;

    let key_file = File::open(&files.client_key)
        .with_context(|| format!("failed to open client key: {}", files.client_key))?;
    let client_key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("failed to parse client key")?
        .context("no private key found in file")?;

    // Explicit provider: reqwest and the AWS SDK may each enable a different one.
    rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("failed to select TLS protocol versions")?
        .with_root_certificates(root_store)
        .with_client_auth_cert(client_certs, client_key)
        .context("failed to build TLS config with client auth")
}

impl ValkeyAgentDirectory {
    /// Connect and verify the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS files cannot be loaded, the URL is
    /// invalid, or the server does not answer.
    pub async fn connect(settings: &ValkeySettings) -> Result<Self> {
        let mut config = Config::from_url(&settings.url)
            .with_context(|| format!("invalid Valkey URL: {}", settings.url))?;
        if let Some(files) = &settings.tls {
            config.tls = Some(TlsConfig {
                connector: TlsConnector::Rustls(Arc::new(load_tls(files)?).into()),
                hostnames: TlsHostMapping::None,
            });
        }
        if let Some(user) = &settings.user {
            config.username = Some(user.clone());
        }
        if let Some(password) = &settings.password {
            config.password = Some(password.clone());
        }

        let client = Builder::from_config(config)
            .with_connection_config(|conn| {
                conn.connection_timeout = Duration::from_secs(5);
                conn.internal_command_timeout = Duration::from_secs(10);
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 5000, 5))
            .build()?;

        client.init().await.context("failed to connect to Valkey")?;
        client
            .ping::<String>(None)
            .await
            .context("Valkey startup PING failed")?;

        tracing::info!(
            url = %settings.url,
            tls_enabled = settings.tls.is_some(),
            "agent directory connected"
        );
        Ok(Self { client })
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        use futures::stream::TryStreamExt;

        let mut keys = Vec::new();
        let mut stream = self.client.scan(pattern, Some(100), None);

        while let Some(mut page) = stream.try_next().await? {
            if let Some(results) = page.take_results() {
                keys.extend(results.iter().map(|k| k.as_str_lossy().to_string()));
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl AgentDirectory for ValkeyAgentDirectory {
    async fn list(&self) -> Result<Vec<AgentRecord>> {
        let keys = self
            .scan_keys(&format!("{}*", directory::AGENT))
            .await
            .context("failed to scan agent records")?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = self.client.mget(keys.clone()).await?;

        let mut records = Vec::with_capacity(values.len());
        for (key, value) in keys.iter().zip(values) {
            let Some(json) = value.as_str() else {
                continue;
            };
            match serde_json::from_str::<AgentRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping malformed agent record");
                }
            }
        }
        Ok(records)
    }

    async fn get(&self, name: &str) -> Result<Option<AgentRecord>> {
        let raw: Option<String> = self.client.get(agent_record_key(name)).await?;
        raw.map(|json| {
            serde_json::from_str(&json).with_context(|| format!("malformed agent record {name}"))
        })
        .transpose()
    }

    async fn create_or_update(&self, mut record: AgentRecord) -> Result<AgentRecord> {
        record.modified = Some(Utc::now());
        let json = serde_json::to_string(&record)?;
        self.client
            .set::<(), _, _>(agent_record_key(&record.name), json, None, None, false)
            .await
            .with_context(|| format!("failed to store agent record {}", record.name))?;
        Ok(record)
    }

    fn new_lock(&self, name: &str, ttl: Duration) -> Box<dyn AgentLock> {
        Box::new(ValkeyLock {
            client: self.client.clone(),
            key: agent_lock_key(name),
            token: Uuid::new_v4().to_string(),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        })
    }
}

struct ValkeyLock {
    client: Client,
    key: String,
    token: String,
    ttl_ms: i64,
}

#[async_trait]
impl AgentLock for ValkeyLock {
    async fn acquire(&self) -> Result<bool> {
        let reply: Option<String> = self
            .client
            .set(
                &self.key,
                self.token.as_str(),
                Some(Expiration::PX(self.ttl_ms)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .with_context(|| format!("failed to acquire {}", self.key))?;
        Ok(reply.is_some())
    }

    async fn renew(&self) -> Result<bool> {
        let renewed: i64 = self
            .client
            .eval(
                RENEW_SCRIPT,
                self.key.as_str(),
                vec![self.token.clone(), self.ttl_ms.to_string()],
            )
            .await
            .with_context(|| format!("failed to renew {}", self.key))?;
        Ok(renewed == 1)
    }

    async fn release(&self) -> Result<()> {
        let _: i64 = self
            .client
            .eval(RELEASE_SCRIPT, self.key.as_str(), vec![self.token.clone()])
            .await
            .with_context(|| format!("failed to release {}", self.key))?;
        Ok(())
    }
}
