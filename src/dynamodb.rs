// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! DynamoDB adapter.
//!
//! Implements [`BatchWriteStore`] over `BatchWriteItem` and
//! [`ReconcileStore`] over `Scan`/`UpdateItem`. Binary attributes arrive on
//! the stream as base64 text and are decoded on the way out.

use crate::reconcile::{KeyFilter, KeyPage, ReconcileStore, SYNC_MARKER_ATTR};
use crate::record::{AttributeValue, Item};
use crate::request::WriteRequest;
use crate::store::{BatchWriteStore, BoxFuture, StoreError, StoreResult};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{self as ddb, DeleteRequest, PutRequest};
use aws_sdk_dynamodb::Client;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

type SdkItem = HashMap<String, ddb::AttributeValue>;

/// A DynamoDB endpoint in one region.
pub struct DynamoStore {
    client: Client,
    region: String,
    key_schemas: Mutex<HashMap<String, Vec<String>>>,
}

impl DynamoStore {
    /// Load credentials from the environment and connect to `region`.
    pub async fn connect(region: impl Into<String>) -> Self {
        let region = region.into();
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .load()
            .await;
        info!(%region, "DynamoDB client configured");
        Self::from_client(Client::new(&sdk_config), region)
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
            key_schemas: Mutex::new(HashMap::new()),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Key attribute names of `table`, described once and cached.
    async fn key_schema(&self, table: &str) -> StoreResult<Vec<String>> {
        let cached = self
            .key_schemas
            .lock()
            .map_err(|_| StoreError::new("key schema cache poisoned"))?
            .get(table)
            .cloned();
        if let Some(names) = cached {
            return Ok(names);
        }

        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| StoreError::new(DisplayErrorContext(e).to_string()))?;
        let names: Vec<String> = output
            .table()
            .map(|t| {
                t.key_schema()
                    .iter()
                    .map(|k| k.attribute_name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        if names.is_empty() {
            return Err(StoreError::new(format!("table {table} has no key schema")));
        }

        debug!(table, keys = ?names, "Described key schema");
        self.key_schemas
            .lock()
            .map_err(|_| StoreError::new("key schema cache poisoned"))?
            .insert(table.to_string(), names.clone());
        Ok(names)
    }
}

impl BatchWriteStore for DynamoStore {
    fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> BoxFuture<'_, Vec<WriteRequest>> {
        let table = table.to_string();
        Box::pin(async move {
            let sdk_requests = requests
                .iter()
                .map(to_sdk_request)
                .collect::<StoreResult<Vec<_>>>()?;

            let output = self
                .client
                .batch_write_item()
                .request_items(table.clone(), sdk_requests)
                .send()
                .await
                .map_err(|e| StoreError::new(DisplayErrorContext(e).to_string()))?;

            output
                .unprocessed_items()
                .and_then(|items| items.get(&table))
                .map(|returned| returned.iter().map(from_sdk_request).collect())
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }
}

impl ReconcileStore for DynamoStore {
    fn scan_keys(
        &self,
        table: &str,
        filter: KeyFilter,
        start: Option<Item>,
    ) -> BoxFuture<'_, KeyPage> {
        let table = table.to_string();
        Box::pin(async move {
            let key_names = self.key_schema(&table).await?;

            let mut scan = self
                .client
                .scan()
                .table_name(&table)
                .set_exclusive_start_key(start.as_ref().map(to_sdk_item).transpose()?);

            let projection: Vec<String> = (0..key_names.len()).map(|i| format!("#k{i}")).collect();
            scan = scan.projection_expression(projection.join(", "));
            for (placeholder, name) in projection.iter().zip(&key_names) {
                scan = scan.expression_attribute_names(placeholder, name);
            }
            if let KeyFilter::MarkerNotEqual(value) = filter {
                scan = scan
                    .filter_expression("#sync <> :marker")
                    .expression_attribute_names("#sync", SYNC_MARKER_ATTR)
                    .expression_attribute_values(
                        ":marker",
                        ddb::AttributeValue::N(value.to_string()),
                    );
            }

            let output = scan
                .send()
                .await
                .map_err(|e| StoreError::new(DisplayErrorContext(e).to_string()))?;

            let keys = output
                .items()
                .iter()
                .map(from_sdk_item)
                .collect::<StoreResult<Vec<_>>>()?;
            let next = output.last_evaluated_key().map(from_sdk_item).transpose()?;
            Ok(KeyPage { keys, next })
        })
    }

    fn set_marker(&self, table: &str, key: Item, value: i64) -> BoxFuture<'_, ()> {
        let table = table.to_string();
        Box::pin(async move {
            self.client
                .update_item()
                .table_name(table)
                .set_key(Some(to_sdk_item(&key)?))
                .update_expression("SET #sync = :marker")
                .expression_attribute_names("#sync", SYNC_MARKER_ATTR)
                .expression_attribute_values(":marker", ddb::AttributeValue::N(value.to_string()))
                .send()
                .await
                .map_err(|e| StoreError::new(DisplayErrorContext(e).to_string()))?;
            Ok(())
        })
    }
}

fn to_sdk_request(request: &WriteRequest) -> StoreResult<ddb::WriteRequest> {
    let builder = ddb::WriteRequest::builder();
    let builder = match request {
        WriteRequest::Put { item } => builder.put_request(
            PutRequest::builder()
                .set_item(Some(to_sdk_item(item)?))
                .build()
                .map_err(|e| StoreError::new(e.to_string()))?,
        ),
        WriteRequest::Delete { key } => builder.delete_request(
            DeleteRequest::builder()
                .set_key(Some(to_sdk_item(key)?))
                .build()
                .map_err(|e| StoreError::new(e.to_string()))?,
        ),
    };
    Ok(builder.build())
}

fn from_sdk_request(request: &ddb::WriteRequest) -> StoreResult<WriteRequest> {
    if let Some(put) = request.put_request() {
        return Ok(WriteRequest::Put {
            item: from_sdk_item(put.item())?,
        });
    }
    if let Some(delete) = request.delete_request() {
        return Ok(WriteRequest::Delete {
            key: from_sdk_item(delete.key())?,
        });
    }
    Err(StoreError::new("unprocessed item is neither put nor delete"))
}

fn to_sdk_item(item: &Item) -> StoreResult<SdkItem> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), to_sdk_value(value)?)))
        .collect()
}

fn from_sdk_item(item: &SdkItem) -> StoreResult<Item> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), from_sdk_value(value)?)))
        .collect()
}

fn decode_blob(text: &str) -> StoreResult<Blob> {
    STANDARD
        .decode(text)
        .map(Blob::new)
        .map_err(|e| StoreError::new(format!("invalid base64 binary attribute: {e}")))
}

/// Convert to the SDK's attribute representation.
pub fn to_sdk_value(value: &AttributeValue) -> StoreResult<ddb::AttributeValue> {
    Ok(match value {
        AttributeValue::S(s) => ddb::AttributeValue::S(s.clone()),
        AttributeValue::N(n) => ddb::AttributeValue::N(n.clone()),
        AttributeValue::B(b) => ddb::AttributeValue::B(decode_blob(b)?),
        AttributeValue::Bool(b) => ddb::AttributeValue::Bool(*b),
        AttributeValue::Null(n) => ddb::AttributeValue::Null(*n),
        AttributeValue::M(m) => ddb::AttributeValue::M(
            m.iter()
                .map(|(k, v)| Ok((k.clone(), to_sdk_value(v)?)))
                .collect::<StoreResult<HashMap<_, _>>>()?,
        ),
        AttributeValue::L(l) => ddb::AttributeValue::L(
            l.iter().map(to_sdk_value).collect::<StoreResult<Vec<_>>>()?,
        ),
        AttributeValue::Ss(ss) => ddb::AttributeValue::Ss(ss.clone()),
        AttributeValue::Ns(ns) => ddb::AttributeValue::Ns(ns.clone()),
        AttributeValue::Bs(bs) => ddb::AttributeValue::Bs(
            bs.iter()
                .map(|b| decode_blob(b))
                .collect::<StoreResult<Vec<_>>>()?,
        ),
    })
}

/// Convert from the SDK's attribute representation.
pub fn from_sdk_value(value: &ddb::AttributeValue) -> StoreResult<AttributeValue> {
    Ok(match value {
        ddb::AttributeValue::S(s) => AttributeValue::S(s.clone()),
        ddb::AttributeValue::N(n) => AttributeValue::N(n.clone()),
        ddb::AttributeValue::B(b) => AttributeValue::B(STANDARD.encode(b.as_ref())),
        ddb::AttributeValue::Bool(b) => AttributeValue::Bool(*b),
        ddb::AttributeValue::Null(n) => AttributeValue::Null(*n),
        ddb::AttributeValue::M(m) => AttributeValue::M(
            m.iter()
                .map(|(k, v)| Ok((k.clone(), from_sdk_value(v)?)))
                .collect::<StoreResult<BTreeMap<_, _>>>()?,
        ),
        ddb::AttributeValue::L(l) => AttributeValue::L(
            l.iter().map(from_sdk_value).collect::<StoreResult<Vec<_>>>()?,
        ),
        ddb::AttributeValue::Ss(ss) => AttributeValue::Ss(ss.clone()),
        ddb::AttributeValue::Ns(ns) => AttributeValue::Ns(ns.clone()),
        ddb::AttributeValue::Bs(bs) => {
            AttributeValue::Bs(bs.iter().map(|b| STANDARD.encode(b.as_ref())).collect())
        }
        other => {
            return Err(StoreError::new(format!(
                "unsupported attribute type: {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion_preserves_nesting() {
        let value = AttributeValue::M(BTreeMap::from([
            ("name".to_string(), AttributeValue::S("widget".into())),
            (
                "tags".to_string(),
                AttributeValue::L(vec![AttributeValue::N("1".into()), AttributeValue::Null(true)]),
            ),
            ("raw".to_string(), AttributeValue::B("aGVsbG8=".into())),
        ]));
        let back = from_sdk_value(&to_sdk_value(&value).unwrap()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(to_sdk_value(&AttributeValue::B("not base64!".into())).is_err());
    }

    #[test]
    fn test_request_conversion() {
        let key = Item::from([("id".to_string(), AttributeValue::S("a".into()))]);
        let delete = WriteRequest::Delete { key: key.clone() };
        let sdk = to_sdk_request(&delete).unwrap();
        assert!(sdk.delete_request().is_some());
        assert_eq!(from_sdk_request(&sdk).unwrap(), delete);
    }
}
