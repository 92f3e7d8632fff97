use std::fmt;
use std::sync::RwLock;

use serde_json::Value;

use super::client::{ApiError, EdgeClient};

#[derive(Debug)]
pub enum GatewayError {
    /// No session; every dispatch fails closed until login/resume succeeds.
    NotAuthenticated,
    /// Operation name is outside the allow-list. A programming error at the
    /// call site, not a user-facing condition.
    UnknownOperation(String),
    /// Mapped operation called with missing or mistyped arguments.
    InvalidArguments(String),
    Remote(ApiError),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NotAuthenticated => write!(f, "not authenticated"),
            GatewayError::UnknownOperation(name) => write!(f, "unknown operation: {name}"),
            GatewayError::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            GatewayError::Remote(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<ApiError> for GatewayError {
    fn from(e: ApiError) -> Self {
        GatewayError::Remote(e)
    }
}

/// Closed set of operations the webview may invoke. Resolved at compile
/// time; arbitrary method strings never reach the HTTP layer.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Operation {
    VerifyToken,
    GetAccounts,
    GetZones,
    GetZoneDetails,
    GetDnsRecords,
    CreateDnsRecord,
    UpdateDnsRecord,
    DeleteDnsRecord,
    UpdateSecurityLevel,
    PurgeCache,
    GetWorkersScripts,
    UploadWorkerScript,
    GetPagesProjects,
}

impl Operation {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "verifyToken" => Operation::VerifyToken,
            "getAccounts" => Operation::GetAccounts,
            "getZones" => Operation::GetZones,
            "getZoneDetails" => Operation::GetZoneDetails,
            "getDNSRecords" => Operation::GetDnsRecords,
            "createDNSRecord" => Operation::CreateDnsRecord,
            "updateDNSRecord" => Operation::UpdateDnsRecord,
            "deleteDNSRecord" => Operation::DeleteDnsRecord,
            "updateSecurityLevel" => Operation::UpdateSecurityLevel,
            "purgeCache" => Operation::PurgeCache,
            "getWorkersScripts" => Operation::GetWorkersScripts,
            "uploadWorkerScript" => Operation::UploadWorkerScript,
            "getPagesProjects" => Operation::GetPagesProjects,
            _ => return None,
        })
    }
}

/// The single channel between the webview and the remote API. Holds a
/// configured client only while a session is authenticated; the session
/// manager is the only writer.
pub struct Gateway {
    client: RwLock<Option<EdgeClient>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
        }
    }

    pub fn install(&self, client: EdgeClient) {
        *self.client.write().expect("poisoned gateway lock") = Some(client);
    }

    pub fn unconfigure(&self) {
        *self.client.write().expect("poisoned gateway lock") = None;
    }

    #[cfg(test)]
    pub fn is_configured(&self) -> bool {
        self.client.read().expect("poisoned gateway lock").is_some()
    }

    /// Forward one allow-listed operation. Fails closed without a session,
    /// for every name including valid ones.
    pub async fn dispatch(&self, name: &str, args: Vec<Value>) -> Result<Value, GatewayError> {
        let client = self
            .client
            .read()
            .expect("poisoned gateway lock")
            .clone()
            .ok_or(GatewayError::NotAuthenticated)?;
        let op = Operation::parse(name)
            .ok_or_else(|| GatewayError::UnknownOperation(name.to_string()))?;

        let result = match op {
            Operation::VerifyToken => client.verify_token().await?,
            Operation::GetAccounts => client.get_accounts().await?,
            Operation::GetZones => client.get_zones().await?,
            Operation::GetZoneDetails => client.get_zone_details(arg_str(&args, 0, "zoneId")?).await?,
            Operation::GetDnsRecords => client.get_dns_records(arg_str(&args, 0, "zoneId")?).await?,
            Operation::CreateDnsRecord => {
                client
                    .create_dns_record(arg_str(&args, 0, "zoneId")?, arg_value(&args, 1, "record")?)
                    .await?
            }
            Operation::UpdateDnsRecord => {
                client
                    .update_dns_record(
                        arg_str(&args, 0, "zoneId")?,
                        arg_str(&args, 1, "recordId")?,
                        arg_value(&args, 2, "record")?,
                    )
                    .await?
            }
            Operation::DeleteDnsRecord => {
                client
                    .delete_dns_record(arg_str(&args, 0, "zoneId")?, arg_str(&args, 1, "recordId")?)
                    .await?
            }
            Operation::UpdateSecurityLevel => {
                client
                    .update_security_level(arg_str(&args, 0, "zoneId")?, arg_str(&args, 1, "level")?)
                    .await?
            }
            Operation::PurgeCache => {
                // Absent args keep the full-purge default; present args must
                // be well typed, or a selective purge could silently turn
                // into a full one.
                let purge_everything = match args.get(1) {
                    None => true,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => {
                        return Err(GatewayError::InvalidArguments(
                            "expected boolean `purgeEverything` at position 1".into(),
                        ))
                    }
                };
                let files = match args.get(2) {
                    None => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| {
                            GatewayError::InvalidArguments(
                                "expected string entries in `files` at position 2".into(),
                            )
                        })?,
                    Some(_) => {
                        return Err(GatewayError::InvalidArguments(
                            "expected array `files` at position 2".into(),
                        ))
                    }
                };
                client
                    .purge_cache(arg_str(&args, 0, "zoneId")?, purge_everything, files)
                    .await?
            }
            Operation::GetWorkersScripts => {
                client.get_workers_scripts(arg_str(&args, 0, "accountId")?).await?
            }
            Operation::UploadWorkerScript => {
                client
                    .upload_worker_script(
                        arg_str(&args, 0, "accountId")?,
                        arg_str(&args, 1, "name")?,
                        arg_str(&args, 2, "script")?.to_string(),
                    )
                    .await?
            }
            Operation::GetPagesProjects => {
                client.get_pages_projects(arg_str(&args, 0, "accountId")?).await?
            }
        };
        Ok(result)
    }
}

fn arg_str<'a>(args: &'a [Value], idx: usize, what: &str) -> Result<&'a str, GatewayError> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidArguments(format!("expected string `{what}` at position {idx}")))
}

fn arg_value(args: &[Value], idx: usize, what: &str) -> Result<Value, GatewayError> {
    args.get(idx)
        .cloned()
        .ok_or_else(|| GatewayError::InvalidArguments(format!("expected `{what}` at position {idx}")))
}
