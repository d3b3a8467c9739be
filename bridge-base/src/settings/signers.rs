use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use ethers::signers::{AwsSigner, LocalWallet, Signer};
use eyre::{eyre, Context, Report};
use once_cell::sync::OnceCell;
use rusoto_core::credential::EnvironmentProvider;
use rusoto_core::{HttpClient, Region};
use rusoto_kms::KmsClient;
use serde::{Deserialize, Deserializer};
use tracing::{info, instrument};

use bridge_ethereum::{ChainSigners, Signers};

/// Region used for `kms_private_key_id` when `aws_region` is not set
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

static KMS_CLIENT: OnceCell<KmsClient> = OnceCell::new();

/// A 32 byte private key given as hex, with or without `0x` prefix
#[derive(Clone)]
pub struct HexKey(String);

impl HexKey {
    /// Validate and wrap a hex encoded key
    pub fn new(key: &str) -> Result<Self, Report> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(eyre!("private key must be 64 hex characters"));
        }
        Ok(Self(key.to_owned()))
    }
}

impl AsRef<str> for HexKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Debug for HexKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("HexKey(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for HexKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        HexKey::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ethereum signer types
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignerConf {
    /// A local hex key
    HexKey {
        /// Hex string of private key
        key: HexKey,
    },
    /// An AWS signer. Note that AWS credentials must be inserted into the env
    /// separately.
    Aws {
        /// The UUID or alias identifying the AWS KMS Key
        id: String,
        /// The AWS region
        region: String,
    },
}

impl SignerConf {
    /// Build one signer per chain, all for the same account
    #[instrument(skip(chain_ids), err)]
    pub async fn build_chain_signers(
        &self,
        chain_ids: impl IntoIterator<Item = u64>,
    ) -> Result<ChainSigners, Report> {
        let mut signers = HashMap::new();
        for chain_id in chain_ids {
            signers.insert(chain_id, self.build(chain_id).await?);
        }
        let signers = ChainSigners::new(signers)?;
        info!(address = ?bridge_core::SignerProvider::address(&signers), "signer ready");
        Ok(signers)
    }

    async fn build(&self, chain_id: u64) -> Result<Signers, Report> {
        Ok(match self {
            SignerConf::HexKey { key } => key
                .as_ref()
                .parse::<LocalWallet>()
                .context("invalid private key")?
                .with_chain_id(chain_id)
                .into(),
            SignerConf::Aws { id, region } => {
                let client = KMS_CLIENT.get_or_try_init(|| {
                    let region = region
                        .parse::<Region>()
                        .with_context(|| format!("invalid AWS region {region}"))?;
                    Ok::<_, Report>(KmsClient::new_with_client(
                        rusoto_core::Client::new_with(
                            EnvironmentProvider::default(),
                            HttpClient::new()?,
                        ),
                        region,
                    ))
                })?;
                AwsSigner::new(client.clone(), id, chain_id).await?.into()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use bridge_core::SignerProvider;

    use super::*;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn hex_keys_accept_optional_prefix() {
        assert_eq!(HexKey::new(KEY).unwrap().as_ref(), KEY);
        assert_eq!(HexKey::new(&format!("0x{KEY}")).unwrap().as_ref(), KEY);
        assert!(HexKey::new("0x1234").is_err());
        assert!(HexKey::new(&KEY.replace('4', "z")).is_err());
    }

    #[test]
    fn signer_conf_from_tagged_json() {
        let conf: SignerConf =
            serde_json::from_str(&format!(r#"{{ "type": "hex_key", "key": "{KEY}" }}"#)).unwrap();
        assert!(matches!(conf, SignerConf::HexKey { .. }));

        let conf: SignerConf =
            serde_json::from_str(r#"{ "type": "aws", "id": "alias/x", "region": "eu-west-1" }"#)
                .unwrap();
        assert!(matches!(conf, SignerConf::Aws { .. }));
    }

    #[tokio::test]
    async fn local_key_signs_for_every_chain() {
        let conf = SignerConf::HexKey {
            key: HexKey::new(KEY).unwrap(),
        };
        let signers = conf.build_chain_signers([1, 5]).await.unwrap();

        let one = signers.signer_for(1).unwrap();
        let five = signers.signer_for(5).unwrap();
        assert_eq!(one.address(), five.address());
        assert_eq!(one.address(), signers.address());
        assert!(signers.signer_for(7).is_err());
    }
}
