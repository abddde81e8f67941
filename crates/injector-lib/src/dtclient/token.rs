use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DtClientError, DynatraceClient, TokenApi};

pub const TOKEN_SCOPE_INSTALLER_DOWNLOAD: &str = "InstallerDownload";
pub const TOKEN_SCOPE_DATA_EXPORT: &str = "DataExport";

const PAAS_TOKEN_NAME: &str = "dynatrace-oneagent-operator-paas-token";

/// Scopes assigned to a token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenScopes(pub Vec<String>);

impl TokenScopes {
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }
}

#[derive(Serialize)]
struct CreateTokenRequest<'a> {
    name: &'a str,
    scopes: Vec<&'a str>,
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct ScopesResponse {
    #[serde(default)]
    scopes: Vec<String>,
}

#[async_trait]
impl TokenApi for DynatraceClient {
    async fn create_paas_token(&self, token: &str) -> Result<String, DtClientError> {
        let request = CreateTokenRequest {
            name: PAAS_TOKEN_NAME,
            scopes: vec![TOKEN_SCOPE_INSTALLER_DOWNLOAD],
        };

        let data = self
            .token_api_request(token, "v1/tokens/createToken", &request)
            .await?;
        let response: TokenResponse = serde_json::from_slice(&data)?;
        Ok(response.token)
    }

    async fn get_token_scopes(&self, token: &str) -> Result<TokenScopes, DtClientError> {
        let data = self
            .token_api_request(token, "v1/tokens/lookup", &LookupRequest { token })
            .await?;
        let response: ScopesResponse = serde_json::from_slice(&data)?;
        Ok(TokenScopes(response.scopes))
    }
}
