use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use sha2::Sha256;
use tracing::{info, instrument, warn};

use crate::config::AzureConfig;
use crate::error::AppError;
use crate::utils::http_client::new_api_client;

type HmacSha256 = Hmac<Sha256>;

pub const SAS_VERSION: &str = "2022-11-02";

/// Lifetime of the account SAS used for our own management calls.
const MANAGEMENT_SAS_MINUTES: i64 = 15;

/// Permission letters of a container SAS, kept in the order Azure expects.
const PERMISSION_ORDER: &str = "racwdl";

/// Builds a canonical permission string from user input. Unknown letters are
/// rejected; duplicates collapse.
pub fn normalize_permissions(requested: &str) -> Result<String, AppError> {
    if let Some(bad) = requested.chars().find(|c| !PERMISSION_ORDER.contains(*c)) {
        return Err(AppError::Validation(format!("Unknown SAS permission '{}'", bad)));
    }
    let normalized: String = PERMISSION_ORDER.chars().filter(|c| requested.contains(*c)).collect();
    if normalized.is_empty() {
        return Err(AppError::Validation("Choose at least one permission".to_string()));
    }
    Ok(normalized)
}

/// Container-scoped SAS and the URL it unlocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSas {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs SAS tokens and calls the Blob REST API for container management.
#[derive(Clone)]
pub struct AzureBlobClient {
    client: Client,
    account_name: String,
    account_key: Vec<u8>,
    endpoint: String,
    sas_max_hours: i64,
}

impl AzureBlobClient {
    pub fn new(config: &AzureConfig) -> Result<Self, AppError> {
        let account_key = STANDARD
            .decode(config.account_key.trim())
            .map_err(|e| AppError::Configuration(format!("AZURE_STORAGE_KEY is not valid base64: {}", e)))?;
        if config.sas_max_hours < 1 {
            return Err(AppError::Configuration("AZURE_SAS_MAX_HOURS must be at least 1".to_string()));
        }
        Ok(Self {
            client: new_api_client(),
            account_name: config.account_name.clone(),
            account_key,
            endpoint: config.blob_endpoint.trim_end_matches('/').to_string(),
            sas_max_hours: config.sas_max_hours,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn sas_max_hours(&self) -> i64 {
        self.sas_max_hours
    }

    fn sign(&self, string_to_sign: &str) -> Result<String, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.account_key)
            .map_err(|e| AppError::Internal(format!("Invalid signing key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Service SAS for one container (`sr=c`), HTTPS only.
    pub fn container_sas(
        &self,
        container: &str,
        permissions: &str,
        valid_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<ContainerSas, AppError> {
        if !(1..=self.sas_max_hours).contains(&valid_hours) {
            return Err(AppError::Validation(format!(
                "Expiry must be between 1 and {} hours",
                self.sas_max_hours
            )));
        }
        let permissions = normalize_permissions(permissions)?;
        let expires_at = now + Duration::hours(valid_hours);
        let expiry = format_sas_time(expires_at);
        let canonical_resource = format!("/blob/{}/{}", self.account_name, container);

        // Fields: sp, st, se, resource, si, sip, spr, sv, sr, snapshot,
        // encryption scope, then the five response header overrides.
        let string_to_sign = [
            permissions.as_str(),
            "",
            expiry.as_str(),
            canonical_resource.as_str(),
            "",
            "",
            "https",
            SAS_VERSION,
            "c",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .join("\n");
        let signature = self.sign(&string_to_sign)?;

        let token = format!(
            "sv={}&sr=c&sp={}&se={}&spr=https&sig={}",
            SAS_VERSION,
            permissions,
            urlencoding::encode(&expiry),
            urlencoding::encode(&signature)
        );
        Ok(ContainerSas {
            url: format!("{}/{}?{}", self.endpoint, container, token),
            token,
            expires_at,
        })
    }

    /// Short-lived account SAS allowing container create and delete.
    pub fn management_sas(&self, now: DateTime<Utc>) -> Result<String, AppError> {
        let expiry = format_sas_time(now + Duration::minutes(MANAGEMENT_SAS_MINUTES));
        // Fields: account, sp, ss, srt, st, se, sip, spr, sv, encryption scope.
        let string_to_sign = format!(
            "{}\ncd\nb\nc\n\n{}\n\nhttps\n{}\n\n",
            self.account_name, expiry, SAS_VERSION
        );
        let signature = self.sign(&string_to_sign)?;
        Ok(format!(
            "sv={}&ss=b&srt=c&sp=cd&se={}&spr=https&sig={}",
            SAS_VERSION,
            urlencoding::encode(&expiry),
            urlencoding::encode(&signature)
        ))
    }

    fn container_url(&self, container: &str) -> Result<String, AppError> {
        Ok(format!(
            "{}/{}?restype=container&{}",
            self.endpoint,
            container,
            self.management_sas(Utc::now())?
        ))
    }

    #[instrument(skip(self))]
    pub async fn create_container(&self, container: &str) -> Result<(), AppError> {
        let response = self
            .client
            .put(self.container_url(container)?)
            .header("x-ms-version", SAS_VERSION)
            .header(CONTENT_LENGTH, "0")
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                info!(container, "azure_container_created");
                Ok(())
            }
            StatusCode::CONFLICT => Err(AppError::Conflict(format!(
                "A container named {} already exists in the storage account",
                container
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::External(format!(
                    "Create container {} failed ({}): {}",
                    container, status, body
                )))
            }
        }
    }

    /// Deletes the remote container. A container that is already gone counts
    /// as deleted.
    #[instrument(skip(self))]
    pub async fn delete_container(&self, container: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(self.container_url(container)?)
            .header("x-ms-version", SAS_VERSION)
            .send()
            .await?;

        match response.status() {
            StatusCode::ACCEPTED => {
                info!(container, "azure_container_deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                warn!(container, "azure_container_already_missing");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::External(format!(
                    "Delete container {} failed ({}): {}",
                    container, status, body
                )))
            }
        }
    }
}

fn format_sas_time(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn config(endpoint: &str) -> AzureConfig {
        AzureConfig {
            account_name: "acme".to_string(),
            account_key: STANDARD.encode(b"super-secret-account-key"),
            blob_endpoint: endpoint.to_string(),
            sas_max_hours: 48,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_permissions() {
        assert_eq!(normalize_permissions("lr").unwrap(), "rl");
        assert_eq!(normalize_permissions("wdrr").unwrap(), "rwd");
        assert!(normalize_permissions("").is_err());
        assert!(normalize_permissions("rx").is_err());
    }

    #[test]
    fn test_container_sas_shape() {
        let client = AzureBlobClient::new(&config("https://acme.blob.core.windows.net")).unwrap();
        let sas = client.container_sas("client-files", "lr", 2, fixed_now()).unwrap();

        assert!(sas.token.starts_with("sv=2022-11-02&sr=c&sp=rl&se=2026-05-01T14%3A00%3A00Z&spr=https&sig="));
        assert_eq!(sas.expires_at, Utc.with_ymd_and_hms(2026, 5, 1, 14, 0, 0).unwrap());
        assert!(sas.url.starts_with("https://acme.blob.core.windows.net/client-files?sv="));
    }

    #[test]
    fn test_container_sas_signature_matches_hmac() {
        let client = AzureBlobClient::new(&config("https://acme.blob.core.windows.net")).unwrap();
        let sas = client.container_sas("docs", "r", 1, fixed_now()).unwrap();

        let expected_input = "r\n\n2026-05-01T13:00:00Z\n/blob/acme/docs\n\n\nhttps\n2022-11-02\nc\n\n\n\n\n\n\n";
        let mut mac = HmacSha256::new_from_slice(b"super-secret-account-key").unwrap();
        mac.update(expected_input.as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert!(sas.token.ends_with(&format!("sig={}", urlencoding::encode(&expected))));
    }

    #[test]
    fn test_container_sas_expiry_bounds() {
        let client = AzureBlobClient::new(&config("https://acme.blob.core.windows.net")).unwrap();
        assert!(client.container_sas("docs", "r", 0, fixed_now()).is_err());
        assert!(client.container_sas("docs", "r", 49, fixed_now()).is_err());
        assert!(client.container_sas("docs", "r", 48, fixed_now()).is_ok());
    }

    #[test]
    fn test_invalid_key_is_configuration_error() {
        let mut bad = config("https://acme.blob.core.windows.net");
        bad.account_key = "not base64!!".to_string();
        assert!(matches!(AzureBlobClient::new(&bad), Err(AppError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_create_container_calls_rest_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/reports")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("restype".into(), "container".into()),
                mockito::Matcher::UrlEncoded("sp".into(), "cd".into()),
                mockito::Matcher::UrlEncoded("srt".into(), "c".into()),
            ]))
            .match_header("x-ms-version", SAS_VERSION)
            .with_status(201)
            .create_async()
            .await;

        let client = AzureBlobClient::new(&config(&server.url())).unwrap();
        client.create_container("reports").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_existing_container_is_conflict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/reports")
            .match_query(mockito::Matcher::Any)
            .with_status(409)
            .create_async()
            .await;

        let client = AzureBlobClient::new(&config(&server.url())).unwrap();
        let result = client.create_container("reports").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_container_is_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/gone")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = AzureBlobClient::new(&config(&server.url())).unwrap();
        assert!(client.delete_container("gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_server_error_is_external() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/broken")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("InternalError")
            .create_async()
            .await;

        let client = AzureBlobClient::new(&config(&server.url())).unwrap();
        assert!(matches!(client.delete_container("broken").await, Err(AppError::External(_))));
    }
}
