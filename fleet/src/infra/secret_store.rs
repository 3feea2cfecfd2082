//! Parameter Store implementation of [`SecretStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::types::{ParameterStringFilter, ParameterType};
use chrono::{DateTime, Utc};

use crate::application::ports::{Parameter, SecretStore};
use crate::infra::aws::to_utc;

pub struct SsmSecretStore {
    client: Client,
}

impl SsmSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl SecretStore for SsmSecretStore {
    async fn get_parameter(&self, key: &str, decrypt: bool) -> Result<Parameter> {
        let output = self
            .client
            .get_parameter()
            .name(key)
            .with_decryption(decrypt)
            .send()
            .await
            .with_context(|| format!("GetParameter {key}"))?;

        let param = output
            .parameter()
            .with_context(|| format!("GetParameter {key} returned no parameter"))?;
        Ok(Parameter {
            value: param.value().unwrap_or_default().to_string(),
            last_modified: param.last_modified_date().and_then(to_utc),
        })
    }

    async fn put_parameter(&self, key: &str, value: &str, encrypted: bool) -> Result<()> {
        let kind = if encrypted {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };
        self.client
            .put_parameter()
            .name(key)
            .value(value)
            .r#type(kind)
            .overwrite(true)
            .send()
            .await
            .with_context(|| format!("PutParameter {key}"))?;
        Ok(())
    }

    async fn describe_parameter(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let filter = ParameterStringFilter::builder()
            .key("Name")
            .option("Equals")
            .values(key)
            .build()
            .context("invalid parameter filter")?;

        let output = self
            .client
            .describe_parameters()
            .parameter_filters(filter)
            .send()
            .await
            .with_context(|| format!("DescribeParameters {key}"))?;

        Ok(output
            .parameters()
            .iter()
            .find(|p| p.name() == Some(key))
            .and_then(|p| p.last_modified_date())
            .and_then(to_utc))
    }
}
