//! HTTP request bodies.
//!
//! Bodies are first read as loose JSON so a missing field is reported by
//! name (`Missing required fields: a, b`) before typed deserialization runs.

use crate::drawing::{Dimension, Furniture, Grid, Point, Room, Wall, Door, Window};
use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const DEFAULT_INSTANCE_ID: &str = "default";

fn default_instance_id() -> String {
    DEFAULT_INSTANCE_ID.to_string()
}

/// Parse a raw body. An empty body reads as `{}`.
pub fn parse_body(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Fail with the names of every required field that is absent or null.
pub fn require_fields(body: &Value, required: &[&str]) -> Result<(), ApiError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|field| body.get(**field).map_or(true, Value::is_null))
        .map(|field| field.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::MissingFields(missing))
    }
}

/// Check required fields, then deserialize into `T`.
pub fn parse_request<T: DeserializeOwned>(body: Value, required: &[&str]) -> Result<T, ApiError> {
    require_fields(&body, required)?;
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("Invalid request: {e}")))
}

/// A drawing value plus the session it targets.
#[derive(Debug, Deserialize)]
pub struct Targeted<T> {
    #[serde(flatten)]
    pub value: T,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

pub type WallRequest = Targeted<Wall>;
pub type DoorRequest = Targeted<Door>;
pub type WindowRequest = Targeted<Window>;
pub type RoomRequest = Targeted<Room>;
pub type GridRequest = Targeted<Grid>;
pub type DimensionRequest = Targeted<Dimension>;
pub type FurnitureRequest = Targeted<Furniture>;

#[derive(Debug, Deserialize)]
pub struct InstanceRequest {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LayerRequest {
    pub name: String,
    pub color: Option<i32>,
    pub line_type: Option<String>,
    pub line_weight: Option<f64>,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CurrentLayerRequest {
    pub name: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub insertion_point: Point,
    pub text_string: String,
    pub height: Option<f64>,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AreaRequest {
    pub points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertUnitsRequest {
    pub value: f64,
    pub from_unit: String,
    pub to_unit: String,
}

#[derive(Debug, Deserialize)]
pub struct LispRequest {
    pub lisp_code: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

/// Body of `/api/drawing/save` and `/api/lisp/load`.
#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub filepath: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}
