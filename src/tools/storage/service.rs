//! Azure Storage over the REST data plane.
//!
//! Account discovery goes through Resource Graph; containers, blobs, queues
//! and tables are reached on `https://{account}.{service}.core.windows.net`
//! with an AAD token for `https://storage.azure.com`.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use reqwest::header::{AsHeaderName, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;
use validator::ValidationError;

use crate::azure_error::{AzureFailure, AzureResult};
use crate::error::ToolError;
use crate::service::{escape_kql, AzureService};

pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const STORAGE_API_VERSION: &str = "2023-11-03";

/// Content types always treated as binary.
const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/x-zip-compressed",
    "application/gzip",
    "application/x-tar",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
    "image/svg+xml",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "video/mp4",
    "video/mpeg",
    "video/webm",
];

/// Leading bytes of common binary formats.
const MAGIC_BYTES: &[&[u8]] = &[
    b"\x89PNG",
    b"\xff\xd8\xff",
    b"GIF87a",
    b"GIF89a",
    b"PK\x03\x04",
    b"%PDF",
    b"\x1f\x8b",
];

/// How blob bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, schemars::JsonSchema)]
pub enum BlobEncoding {
    /// Detect text vs binary; binary is returned as base64.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "latin-1")]
    Latin1,
    #[serde(rename = "ascii")]
    Ascii,
}

impl BlobEncoding {
    fn label(self) -> &'static str {
        match self {
            BlobEncoding::Auto => "auto",
            BlobEncoding::Utf8 => "utf-8",
            BlobEncoding::Base64 => "base64",
            BlobEncoding::Latin1 => "latin-1",
            BlobEncoding::Ascii => "ascii",
        }
    }

    /// Decode bytes into text for this encoding.
    pub fn decode(self, data: &[u8]) -> Result<String, ToolError> {
        match self {
            BlobEncoding::Base64 => Ok(BASE64.encode(data)),
            BlobEncoding::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
            BlobEncoding::Ascii if !data.is_ascii() => Err(ToolError::tool(
                "Blob content is not valid ascii; use encoding 'base64'",
            )),
            BlobEncoding::Auto | BlobEncoding::Utf8 | BlobEncoding::Ascii => {
                String::from_utf8(data.to_vec()).map_err(|_| {
                    ToolError::tool("Blob content is not valid utf-8; use encoding 'base64'")
                })
            }
        }
    }

    /// Encode caller-supplied text into the bytes to upload.
    pub fn encode(self, content: &str) -> Result<Vec<u8>, ToolError> {
        match self {
            BlobEncoding::Base64 => BASE64.decode(content.trim()).map_err(|err| {
                ToolError::validation_field(format!("Invalid base64 content: {err}"), "content")
            }),
            BlobEncoding::Latin1 => content
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| {
                    ToolError::validation_field("Content is not representable as latin-1", "content")
                }),
            BlobEncoding::Ascii if !content.is_ascii() => Err(ToolError::validation_field(
                "Content is not representable as ascii",
                "content",
            )),
            BlobEncoding::Auto | BlobEncoding::Utf8 | BlobEncoding::Ascii => {
                Ok(content.as_bytes().to_vec())
            }
        }
    }
}

/// Storage account names are 3-24 lowercase letters and digits.
pub fn validate_account_name(name: &str) -> Result<(), ValidationError> {
    let valid = (3..=24).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if valid {
        return Ok(());
    }
    let mut err = ValidationError::new("account_name");
    err.message = Some("must be 3-24 lowercase letters and digits".into());
    Err(err)
}

/// Data-plane URL for `account`, with each segment percent-encoded.
pub fn storage_url(account: &str, service: &str, segments: &[&str]) -> Result<Url, ToolError> {
    validate_account_name(account).map_err(|_| {
        ToolError::validation_field(
            format!("Invalid storage account name '{account}': expected 3-24 lowercase letters and digits"),
            "account_name",
        )
    })?;
    let mut url = Url::parse(&format!("https://{account}.{service}.core.windows.net/"))
        .map_err(|err| ToolError::validation_field(format!("Invalid storage URL: {err}"), "account_name"))?;
    if !segments.is_empty() {
        url.path_segments_mut()
            .map_err(|_| ToolError::tool("Storage URL cannot carry a path"))?
            .clear()
            .extend(segments);
    }
    Ok(url)
}

/// Container followed by the blob's `/`-separated virtual directories.
fn blob_segments<'a>(container: &'a str, blob: &'a str) -> Vec<&'a str> {
    std::iter::once(container).chain(blob.split('/')).collect()
}

fn blob_too_large(max_size_bytes: u64, size: Option<u64>) -> AzureFailure {
    let size = size.map_or_else(|| "unknown".to_string(), |s| s.to_string());
    ToolError::validation_field(
        format!(
            "Blob size ({size} bytes) exceeds maximum ({max_size_bytes} bytes). \
             Use a smaller blob or increase limit."
        ),
        "max_size_bytes",
    )
    .into()
}

/// Collect a response body, stopping as soon as it grows past `max_size_bytes`.
async fn read_limited(response: reqwest::Response, max_size_bytes: u64) -> AzureResult<Vec<u8>> {
    if let Some(size) = response.content_length() {
        if size > max_size_bytes {
            return Err(blob_too_large(max_size_bytes, Some(size)));
        }
    }
    let mut data = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if (data.len() + chunk.len()) as u64 > max_size_bytes {
            return Err(blob_too_large(max_size_bytes, None));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

/// Whether blob bytes should be treated as binary.
pub fn is_binary_content(content_type: Option<&str>, data: &[u8]) -> bool {
    if let Some(content_type) = content_type {
        let base = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if BINARY_CONTENT_TYPES.contains(&base.as_str()) {
            return true;
        }
        if base.starts_with("text/") {
            return false;
        }
    }
    if MAGIC_BYTES.iter().any(|magic| data.starts_with(magic)) {
        return true;
    }
    let head = &data[..data.len().min(1024)];
    match std::str::from_utf8(head) {
        Ok(_) => false,
        // A multi-byte character cut at the 1024 boundary is still text.
        Err(err) => err.error_len().is_some(),
    }
}

// Listing payloads returned by the blob and queue services.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerEnumeration {
    #[serde(default)]
    containers: ContainerList,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerList {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerItem {
    name: String,
    #[serde(default)]
    properties: ItemProperties,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEnumeration {
    #[serde(default)]
    blobs: BlobList,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
    #[serde(default)]
    properties: ItemProperties,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: Option<String>,
    #[serde(rename = "Etag")]
    etag: Option<String>,
    #[serde(rename = "Content-Length")]
    content_length: Option<u64>,
    #[serde(rename = "Content-Type")]
    content_type: Option<String>,
    #[serde(rename = "BlobType")]
    blob_type: Option<String>,
    #[serde(rename = "LeaseStatus")]
    lease_status: Option<String>,
    #[serde(rename = "LeaseState")]
    lease_state: Option<String>,
    #[serde(rename = "PublicAccess")]
    public_access: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueEnumeration {
    #[serde(default)]
    queues: QueueList,
}

#[derive(Debug, Default, Deserialize)]
struct QueueList {
    #[serde(rename = "Queue", default)]
    items: Vec<QueueItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueItem {
    name: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn parse_xml<T: for<'de> Deserialize<'de>>(body: &str) -> AzureResult<T> {
    quick_xml::de::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|err| AzureFailure::Other(format!("Invalid XML listing from storage: {err}")))
}

fn containers_from_xml(body: &str) -> AzureResult<Vec<Value>> {
    let parsed: ContainerEnumeration = parse_xml(body)?;
    Ok(parsed
        .containers
        .items
        .into_iter()
        .map(|c| {
            json!({
                "name": c.name,
                "last_modified": c.properties.last_modified,
                "etag": c.properties.etag,
                "lease_status": c.properties.lease_status,
                "lease_state": c.properties.lease_state,
                "public_access": c.properties.public_access,
                "metadata": c.metadata,
            })
        })
        .collect())
}

fn blobs_from_xml(body: &str, include_metadata: bool) -> AzureResult<Vec<Value>> {
    let parsed: BlobEnumeration = parse_xml(body)?;
    Ok(parsed
        .blobs
        .items
        .into_iter()
        .map(|b| {
            let metadata = if include_metadata {
                b.metadata
            } else {
                HashMap::new()
            };
            json!({
                "name": b.name,
                "size": b.properties.content_length,
                "content_type": b.properties.content_type,
                "last_modified": b.properties.last_modified,
                "etag": b.properties.etag,
                "blob_type": b.properties.blob_type,
                "lease_status": b.properties.lease_status,
                "metadata": metadata,
            })
        })
        .collect())
}

fn queues_from_xml(body: &str) -> AzureResult<Vec<Value>> {
    let parsed: QueueEnumeration = parse_xml(body)?;
    Ok(parsed
        .queues
        .items
        .into_iter()
        .map(|q| json!({ "name": q.name, "metadata": q.metadata }))
        .collect())
}

fn header_str(response: &reqwest::Response, name: impl AsHeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Drop OData annotations from a table entity.
fn clean_entity(entity: Value) -> Value {
    match entity {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !k.starts_with("odata.") && !k.contains("@odata."))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Parameters for a blob upload.
#[derive(Debug)]
pub struct BlobUpload<'a> {
    pub account: &'a str,
    pub container: &'a str,
    pub blob: &'a str,
    pub data: Vec<u8>,
    pub content_type: Option<&'a str>,
    pub overwrite: bool,
}

pub struct StorageService {
    base: AzureService,
}

impl StorageService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    async fn data_plane(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        customize: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> AzureResult<reqwest::Response> {
        self.base
            .send(method, url.as_str(), STORAGE_SCOPE, None, |req| {
                customize(req.query(query).header("x-ms-version", STORAGE_API_VERSION))
            })
            .await
    }

    pub async fn list_accounts(
        &self,
        subscription: &str,
        resource_group: Option<&str>,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query = String::from(
            "resources | where type =~ 'Microsoft.Storage/storageAccounts'",
        );
        if let Some(rg) = resource_group.filter(|rg| !rg.is_empty()) {
            query.push_str(&format!(" | where resourceGroup =~ '{}'", escape_kql(rg)));
        }
        query.push_str(
            " | project id, name, location, resourceGroup, kind, sku = sku.name, \
             accessTier = properties.accessTier, primaryEndpoints = properties.primaryEndpoints, \
             creationTime = properties.creationTime, provisioningState = properties.provisioningState",
        );
        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, 1000)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn get_account(
        &self,
        subscription: &str,
        account: &str,
        resource_group: Option<&str>,
    ) -> AzureResult<Value> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query = format!(
            "resources | where type =~ 'Microsoft.Storage/storageAccounts' | where name =~ '{}'",
            escape_kql(account)
        );
        if let Some(rg) = resource_group.filter(|rg| !rg.is_empty()) {
            query.push_str(&format!(" | where resourceGroup =~ '{}'", escape_kql(rg)));
        }
        query.push_str(
            " | project id, name, location, resourceGroup, kind, sku = sku.name, tags, \
             accessTier = properties.accessTier, primaryEndpoints = properties.primaryEndpoints, \
             primaryLocation = properties.primaryLocation, \
             secondaryLocation = properties.secondaryLocation, \
             creationTime = properties.creationTime, provisioningState = properties.provisioningState, \
             allowBlobPublicAccess = properties.allowBlobPublicAccess, \
             minimumTlsVersion = properties.minimumTlsVersion, \
             supportsHttpsTrafficOnly = properties.supportsHttpsTrafficOnly, \
             networkAcls = properties.networkAcls, encryption = properties.encryption",
        );
        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, 1)
            .await?;
        result["data"]
            .as_array()
            .and_then(|rows| rows.first().cloned())
            .ok_or_else(|| {
                ToolError::not_found(format!("Storage account '{account}' not found")).into()
            })
    }

    pub async fn list_containers(
        &self,
        account: &str,
        prefix: &str,
        max_results: u32,
    ) -> AzureResult<Vec<Value>> {
        let url = storage_url(account, "blob", &[])?;
        let mut query = vec![
            ("comp", "list".to_string()),
            ("include", "metadata".to_string()),
            ("maxresults", max_results.to_string()),
        ];
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        let body = self
            .data_plane(Method::GET, url, &query, |req| req)
            .await?
            .text()
            .await?;
        let mut containers = containers_from_xml(&body)?;
        containers.truncate(max_results as usize);
        Ok(containers)
    }

    pub async fn list_blobs(
        &self,
        account: &str,
        container: &str,
        prefix: &str,
        max_results: u32,
        include_metadata: bool,
    ) -> AzureResult<Vec<Value>> {
        let url = storage_url(account, "blob", &[container])?;
        let mut query = vec![
            ("restype", "container".to_string()),
            ("comp", "list".to_string()),
            ("maxresults", max_results.to_string()),
        ];
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        if include_metadata {
            query.push(("include", "metadata".to_string()));
        }
        let body = self
            .data_plane(Method::GET, url, &query, |req| req)
            .await?
            .text()
            .await?;
        let mut blobs = blobs_from_xml(&body, include_metadata)?;
        blobs.truncate(max_results as usize);
        Ok(blobs)
    }

    /// Download a blob and render it as text or base64.
    pub async fn read_blob(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        encoding: BlobEncoding,
        max_size_bytes: u64,
    ) -> AzureResult<Value> {
        let url = storage_url(account, "blob", &blob_segments(container, blob))?;
        let response = self.data_plane(Method::GET, url, &[], |req| req).await?;
        let content_type = header_str(&response, CONTENT_TYPE);
        let data = read_limited(response, max_size_bytes).await?;
        let size = data.len();

        let effective = match encoding {
            BlobEncoding::Auto if is_binary_content(content_type.as_deref(), &data) => {
                BlobEncoding::Base64
            }
            BlobEncoding::Auto => BlobEncoding::Utf8,
            other => other,
        };
        let fallback_type = if effective == BlobEncoding::Base64 {
            "application/octet-stream"
        } else {
            "text/plain"
        };

        Ok(json!({
            "content": effective.decode(&data)?,
            "encoding": effective.label(),
            "content_type": content_type.unwrap_or_else(|| fallback_type.to_string()),
            "size": size,
        }))
    }

    pub async fn write_blob(&self, upload: BlobUpload<'_>) -> AzureResult<Value> {
        let url = storage_url(
            upload.account,
            "blob",
            &blob_segments(upload.container, upload.blob),
        )?;
        let content_type = upload
            .content_type
            .filter(|c| !c.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        let size = upload.data.len();
        let overwrite = upload.overwrite;
        let header_type = content_type.clone();

        let response = self
            .data_plane(Method::PUT, url, &[], move |req| {
                let req = req
                    .header("x-ms-blob-type", "BlockBlob")
                    .header(CONTENT_TYPE, header_type)
                    .body(upload.data);
                if overwrite {
                    req
                } else {
                    req.header(reqwest::header::IF_NONE_MATCH, "*")
                }
            })
            .await?;

        Ok(json!({
            "blob_name": upload.blob,
            "container": upload.container,
            "account": upload.account,
            "etag": header_str(&response, ETAG),
            "last_modified": header_str(&response, LAST_MODIFIED),
            "size": size,
            "content_type": content_type,
        }))
    }

    /// Delete a blob together with its snapshots.
    pub async fn delete_blob(&self, account: &str, container: &str, blob: &str) -> AzureResult<Value> {
        let url = storage_url(account, "blob", &blob_segments(container, blob))?;
        self.data_plane(Method::DELETE, url, &[], |req| {
            req.header("x-ms-delete-snapshots", "include")
        })
        .await?;
        Ok(json!({
            "deleted": true,
            "blob_name": blob,
            "container": container,
            "account": account,
        }))
    }

    pub async fn list_queues(
        &self,
        account: &str,
        prefix: &str,
        max_results: u32,
    ) -> AzureResult<Vec<Value>> {
        let url = storage_url(account, "queue", &[])?;
        let mut query = vec![
            ("comp", "list".to_string()),
            ("include", "metadata".to_string()),
            ("maxresults", max_results.to_string()),
        ];
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        let body = self
            .data_plane(Method::GET, url, &query, |req| req)
            .await?
            .text()
            .await?;
        let mut queues = queues_from_xml(&body)?;
        queues.truncate(max_results as usize);
        Ok(queues)
    }

    /// Query table entities, following continuation headers up to `max_results`.
    pub async fn query_table(
        &self,
        account: &str,
        table: &str,
        filter: &str,
        select: &str,
        max_results: u32,
    ) -> AzureResult<Vec<Value>> {
        let url = storage_url(account, "table", &[&format!("{table}()")])?;
        let limit = max_results as usize;
        let mut entities = Vec::new();
        let mut continuation: Option<(String, Option<String>)> = None;

        loop {
            let mut query = vec![("$top", max_results.min(1000).to_string())];
            if !filter.is_empty() {
                query.push(("$filter", filter.to_string()));
            }
            if !select.is_empty() {
                let columns: Vec<&str> = select.split(',').map(str::trim).collect();
                query.push(("$select", columns.join(",")));
            }
            if let Some((pk, rk)) = &continuation {
                query.push(("NextPartitionKey", pk.clone()));
                if let Some(rk) = rk {
                    query.push(("NextRowKey", rk.clone()));
                }
            }

            let response = self
                .data_plane(Method::GET, url.clone(), &query, |req| {
                    req.header(reqwest::header::ACCEPT, "application/json;odata=nometadata")
                })
                .await?;
            let next_pk = header_str(&response, "x-ms-continuation-nextpartitionkey");
            let next_rk = header_str(&response, "x-ms-continuation-nextrowkey");
            let page: Value = response.json().await?;
            if let Some(values) = page["value"].as_array() {
                entities.extend(values.iter().cloned().map(clean_entity));
            }

            match next_pk {
                Some(pk) if entities.len() < limit => continuation = Some((pk, next_rk)),
                _ => break,
            }
        }

        entities.truncate(limit);
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure_error::handle_azure_error;
    use std::io::Write;

    #[test]
    fn account_name_cannot_redirect_the_host() {
        let err = storage_url("evil.example#x", "blob", &[]).unwrap_err();
        assert_eq!(err.to_dict()["field"], "account_name");
        assert!(storage_url("MyAccount", "blob", &[]).is_err());
        assert!(storage_url("ab", "blob", &[]).is_err());
        assert_eq!(
            storage_url("acct01", "queue", &[]).unwrap().as_str(),
            "https://acct01.queue.core.windows.net/"
        );
    }

    #[test]
    fn blob_names_are_percent_encoded() {
        let url = storage_url("acct", "blob", &blob_segments("data", "reports/q1#final?.csv"))
            .unwrap();
        assert_eq!(url.host_str(), Some("acct.blob.core.windows.net"));
        assert_eq!(url.path(), "/data/reports/q1%23final%3F.csv");
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);

        let url = storage_url("acct", "blob", &blob_segments("data", "100%.txt")).unwrap();
        assert_eq!(url.path(), "/data/100%25.txt");
    }

    #[test]
    fn table_path_keeps_entity_set_suffix() {
        let url = storage_url("acct", "table", &["orders()"]).unwrap();
        assert_eq!(url.as_str(), "https://acct.table.core.windows.net/orders()");
    }

    #[tokio::test]
    async fn body_without_length_is_still_bounded() {
        let mut server = mockito::Server::new_async().await;
        let _blob = server
            .mock("GET", "/blob")
            .with_chunked_body(|w| w.write_all(&[b'a'; 64]))
            .create_async()
            .await;

        let response = reqwest::get(format!("{}/blob", server.url())).await.unwrap();
        let err = handle_azure_error(read_limited(response, 16).await.unwrap_err(), None);
        assert_eq!(err.to_dict()["field"], "max_size_bytes");

        let response = reqwest::get(format!("{}/blob", server.url())).await.unwrap();
        assert_eq!(read_limited(response, 64).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn declared_length_is_checked_before_reading() {
        let mut server = mockito::Server::new_async().await;
        let _blob = server
            .mock("GET", "/blob")
            .with_body("0123456789")
            .create_async()
            .await;
        let response = reqwest::get(format!("{}/blob", server.url())).await.unwrap();
        let err = handle_azure_error(read_limited(response, 4).await.unwrap_err(), None);
        assert!(err.to_dict()["message"]
            .as_str()
            .unwrap()
            .contains("(10 bytes)"));
    }

    #[test]
    fn binary_detection_uses_content_type_first() {
        assert!(is_binary_content(Some("image/png"), b"hello"));
        assert!(!is_binary_content(Some("text/plain; charset=utf-8"), b"\x89PNG"));
    }

    #[test]
    fn binary_detection_falls_back_to_magic_and_utf8() {
        assert!(is_binary_content(None, b"%PDF-1.7"));
        assert!(is_binary_content(Some("application/json"), &[0xff, 0xfe, 0x00]));
        assert!(!is_binary_content(None, "héllo".as_bytes()));
    }

    #[test]
    fn encodings_round_text() {
        assert_eq!(BlobEncoding::Base64.decode(b"hi").unwrap(), "aGk=");
        assert_eq!(BlobEncoding::Base64.encode("aGk=").unwrap(), b"hi");
        assert_eq!(BlobEncoding::Latin1.decode(&[0xe9]).unwrap(), "é");
        assert_eq!(BlobEncoding::Latin1.encode("é").unwrap(), vec![0xe9]);
        assert!(BlobEncoding::Ascii.decode("é".as_bytes()).is_err());
        assert!(BlobEncoding::Latin1.encode("€").is_err());
    }

    #[test]
    fn container_listing_is_parsed() {
        let xml = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <EnumerationResults ServiceEndpoint=\"https://acct.blob.core.windows.net/\">\
              <Containers>\
                <Container>\
                  <Name>logs</Name>\
                  <Properties>\
                    <Last-Modified>Mon, 01 Jan 2024 00:00:00 GMT</Last-Modified>\
                    <Etag>\"0x1\"</Etag>\
                    <LeaseStatus>unlocked</LeaseStatus>\
                    <LeaseState>available</LeaseState>\
                  </Properties>\
                  <Metadata><owner>ops</owner></Metadata>\
                </Container>\
                <Container><Name>data</Name><Properties/></Container>\
              </Containers>\
              <NextMarker/>\
            </EnumerationResults>";
        let containers = containers_from_xml(xml).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["name"], "logs");
        assert_eq!(containers[0]["lease_state"], "available");
        assert_eq!(containers[0]["metadata"]["owner"], "ops");
        assert_eq!(containers[1]["name"], "data");
    }

    #[test]
    fn blob_listing_is_parsed() {
        let xml = "<EnumerationResults ContainerName=\"logs\">\
              <Blobs>\
                <Blob>\
                  <Name>2024/app.log</Name>\
                  <Properties>\
                    <Content-Length>512</Content-Length>\
                    <Content-Type>text/plain</Content-Type>\
                    <BlobType>BlockBlob</BlobType>\
                  </Properties>\
                  <Metadata><source>app</source></Metadata>\
                </Blob>\
              </Blobs>\
            </EnumerationResults>";
        let blobs = blobs_from_xml(xml, false).unwrap();
        assert_eq!(blobs[0]["name"], "2024/app.log");
        assert_eq!(blobs[0]["size"], 512);
        assert_eq!(blobs[0]["blob_type"], "BlockBlob");
        assert_eq!(blobs[0]["metadata"], json!({}));

        let blobs = blobs_from_xml(xml, true).unwrap();
        assert_eq!(blobs[0]["metadata"]["source"], "app");
    }

    #[test]
    fn empty_listing_is_empty() {
        let blobs = blobs_from_xml("<EnumerationResults><Blobs/></EnumerationResults>", false)
            .unwrap();
        assert!(blobs.is_empty());
        let queues = queues_from_xml("<EnumerationResults></EnumerationResults>").unwrap();
        assert!(queues.is_empty());
    }

    #[test]
    fn table_entities_drop_odata_annotations() {
        let entity = clean_entity(json!({
            "odata.etag": "W/\"1\"",
            "Timestamp@odata.type": "Edm.DateTime",
            "PartitionKey": "pk",
            "RowKey": "rk",
        }));
        assert_eq!(entity, json!({ "PartitionKey": "pk", "RowKey": "rk" }));
    }
}
