//! aws route53 CLI wrapper

use crate::command::{AWS, args};
use crate::error::{GcpError, Result};
use gantry_core::DnsRecordSpec;
use serde::Deserialize;
use serde_json::{Value, json};

/// Result of a submitted change batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeInfo {
    pub id: String,
    /// PENDING or INSYNC
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeResponse {
    change_info: ChangeInfo,
}

/// Route 53 wants fully qualified names
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Change batch for one record set
pub fn change_batch(action: &str, spec: &DnsRecordSpec, values: &[String]) -> Value {
    let records: Vec<Value> = values.iter().map(|v| json!({ "Value": v })).collect();
    json!({
        "Comment": "managed by gantry",
        "Changes": [{
            "Action": action,
            "ResourceRecordSet": {
                "Name": fqdn(&spec.name),
                "Type": spec.record_type,
                "TTL": spec.ttl,
                "ResourceRecords": records,
            }
        }]
    })
}

/// aws route53 CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct Route53;

impl Route53 {
    pub fn new() -> Self {
        Self
    }

    /// Check that the aws CLI is installed and has credentials
    pub async fn check_auth(&self) -> Result<String> {
        if !AWS.is_installed().await {
            return Err(AWS.not_found());
        }

        let output = AWS
            .run(
                &args(["sts", "get-caller-identity", "--output", "json"]),
                None,
            )
            .await?;
        let identity: Value = serde_json::from_str(&output)?;
        identity["Arn"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GcpError::AuthenticationFailed {
                tool: "aws",
                message: "caller identity has no ARN".to_string(),
            })
    }

    /// Submit a CREATE / UPSERT / DELETE change
    pub async fn change(
        &self,
        action: &str,
        spec: &DnsRecordSpec,
        values: &[String],
    ) -> Result<ChangeInfo> {
        let batch = change_batch(action, spec, values);
        let output = AWS
            .run(
                &args([
                    "route53".to_string(),
                    "change-resource-record-sets".to_string(),
                    format!("--hosted-zone-id={}", spec.hosted_zone),
                    format!("--change-batch={}", batch),
                    "--output".to_string(),
                    "json".to_string(),
                ]),
                None,
            )
            .await?;
        let response: ChangeResponse = serde_json::from_str(&output)?;
        Ok(response.change_info)
    }

    /// Propagation status of a change
    pub async fn get_change(&self, id: &str) -> Result<ChangeInfo> {
        let output = AWS
            .run(
                &args([
                    "route53".to_string(),
                    "get-change".to_string(),
                    format!("--id={}", id),
                    "--output".to_string(),
                    "json".to_string(),
                ]),
                None,
            )
            .await?;
        let response: ChangeResponse = serde_json::from_str(&output)?;
        Ok(response.change_info)
    }

    /// The record set with exactly this name and type, if present
    pub async fn find_record(&self, spec: &DnsRecordSpec) -> Result<Option<Value>> {
        let name = fqdn(&spec.name);
        let output = AWS
            .run(
                &args([
                    "route53".to_string(),
                    "list-resource-record-sets".to_string(),
                    format!("--hosted-zone-id={}", spec.hosted_zone),
                    format!("--start-record-name={}", name),
                    format!("--start-record-type={}", spec.record_type),
                    "--max-items=1".to_string(),
                    "--output".to_string(),
                    "json".to_string(),
                ]),
                None,
            )
            .await?;
        let listing: Value = serde_json::from_str(&output)?;
        Ok(matching_record(&listing, &name, &spec.record_type))
    }
}

/// Pick the record set matching name and type from a listing
pub fn matching_record(listing: &Value, name: &str, record_type: &str) -> Option<Value> {
    listing["ResourceRecordSets"]
        .as_array()?
        .iter()
        .find(|r| {
            r["Name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name))
                && r["Type"].as_str() == Some(record_type)
        })
        .cloned()
}

/// Values of a record set
pub fn record_values(record: &Value) -> Vec<String> {
    record["ResourceRecords"]
        .as_array()
        .map(|rs| {
            rs.iter()
                .filter_map(|r| r["Value"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
