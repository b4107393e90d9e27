//! OSB payloads the filter reads and rewrites.
//!
//! Every message keeps the fields it does not model in a flattened
//! `additional_properties` map, so an untouched payload re-serializes to the
//! same JSON (key order aside).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type AdditionalProperties = Map<String, Value>;

/// Reads an explicit `null` as the empty value. Brokers serialize empty
/// collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindRequest {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "NetworkDataRequest::is_empty"
    )]
    pub network_data: NetworkDataRequest,
    #[serde(flatten)]
    pub additional_properties: AdditionalProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDataRequest {
    #[serde(default)]
    pub network_profile_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: DataRequest,
}

impl NetworkDataRequest {
    pub fn is_empty(&self) -> bool {
        self.network_profile_id.is_empty() && self.data.consumer_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    #[serde(default)]
    pub consumer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindResponse {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Credentials::is_empty"
    )]
    pub credentials: Credentials,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub endpoints: Vec<Endpoint>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "NetworkDataResponse::is_empty"
    )]
    pub network_data: NetworkDataResponse,
    #[serde(flatten)]
    pub additional_properties: AdditionalProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDataResponse {
    #[serde(default)]
    pub network_profile_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: DataResponse,
}

impl NetworkDataResponse {
    /// Matches the wire rule: `network_data` is only sent with a profile or endpoints.
    pub fn is_empty(&self) -> bool {
        self.network_profile_id.is_empty() && self.data.endpoints.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse {
    #[serde(default)]
    pub provider_id: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub endpoints: Vec<Endpoint>,
}

/// Secret material issued by the broker. Opaque to the filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(flatten)]
    pub additional_properties: AdditionalProperties,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.additional_properties.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Traffic for `source` is redirected to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMapping {
    pub source: Endpoint,
    pub target: Endpoint,
}

/// Body of `POST {binding path}/adapt_credentials`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptCredentialsRequest {
    pub credentials: Credentials,
    pub endpoint_mappings: Vec<EndpointMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<Service>,
    #[serde(flatten)]
    pub additional_properties: AdditionalProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub additional_properties: AdditionalProperties,
}
