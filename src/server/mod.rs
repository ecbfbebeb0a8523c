//! REST surface: JSON requests in, AutoLISP out to the session registry.

mod origin;
mod requests;

pub use origin::OriginCheckService;
pub use requests::*;

use crate::config::Settings;
use crate::drawing::{Layer, TextNote};
use crate::error::ApiError;
use crate::geometry::{convert_units, is_valid_point, polygon_area, validate_room_points};
use crate::lisp;
use crate::session::{ExecutionResult, SessionRegistry};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const SERVICE_NAME: &str = "AutoCAD MCP Server";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, settings: Arc<Settings>) -> Self {
        Self { registry, settings }
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .settings
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/", get(health_check))
        .route("/api/autocad/connect", post(connect))
        .route("/api/autocad/disconnect", post(disconnect))
        .route("/api/autocad/disconnect_all", post(disconnect_all))
        .route("/api/autocad/connections", get(list_connections))
        .route("/api/autocad/document", get(document_info))
        .route("/api/drawing/wall", post(create_wall))
        .route("/api/drawing/door", post(insert_door))
        .route("/api/drawing/window", post(insert_window))
        .route("/api/drawing/room", post(create_room))
        .route("/api/drawing/save", post(save_drawing))
        .route("/api/layout/grid", post(setup_grid))
        .route("/api/layout/layer", post(create_layer))
        .route("/api/layout/current_layer", post(set_current_layer))
        .route("/api/annotation/text", post(add_text_note))
        .route("/api/annotation/dimension", post(dimension_linear))
        .route("/api/furniture/insert", post(insert_furniture))
        .route("/api/view/zoom_extents", post(zoom_extents))
        .route("/api/view/regen", post(regenerate))
        .route("/api/utils/calculate_area", post(calculate_area))
        .route("/api/utils/convert_units", post(convert_units_handler))
        .route("/api/lisp/execute", post(execute_lisp))
        .route("/api/lisp/load", post(load_lisp))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `{success, message, execution_time}` with the error text as message on
/// failure.
fn drawing_response(result: &ExecutionResult, success_message: &str) -> Value {
    json!({
        "success": result.is_success(),
        "message": if result.is_success() { success_message } else { result.error_message() },
        "execution_time": result.execution_time().as_secs_f64(),
    })
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.len(),
    }))
}

async fn connect(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: InstanceRequest = parse_request(parse_body(&body)?, &[])?;
    let info = state.registry.connect(&req.instance_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Connected to AutoCAD (instance: {})", req.instance_id),
        "instance_id": info.instance_id,
        "connected": info.connected,
    })))
}

async fn disconnect(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: InstanceRequest = parse_request(parse_body(&body)?, &[])?;
    let removed = state.registry.disconnect(&req.instance_id).await;
    Ok(Json(json!({
        "success": removed,
        "message": format!("Disconnected from AutoCAD (instance: {})", req.instance_id),
    })))
}

async fn disconnect_all(State(state): State<AppState>) -> Json<Value> {
    let count = state.registry.disconnect_all().await;
    info!(count, "Disconnected all sessions");
    Json(json!({ "success": true, "count": count }))
}

async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let connections = state.registry.list_connections().await;
    Json(json!({
        "success": true,
        "count": connections.len(),
        "connections": connections,
    }))
}

async fn document_info(
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult {
    let document = state.registry.document_info(&query.instance_id).await?;
    Ok(Json(json!({ "success": true, "document": document })))
}

async fn create_wall(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: WallRequest = parse_request(
        parse_body(&body)?,
        &["start_point", "end_point", "thickness", "height"],
    )?;
    let wall = &req.value;
    if !is_valid_point(&wall.start_point) || !is_valid_point(&wall.end_point) {
        return Err(ApiError::Validation("Wall points must be finite".into()));
    }
    if wall.thickness <= 0.0 {
        return Err(ApiError::Validation("Thickness must be positive".into()));
    }
    if wall.height <= 0.0 {
        return Err(ApiError::Validation("Height must be positive".into()));
    }
    let result = state
        .registry
        .execute(&lisp::create_wall(wall), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Wall created successfully")))
}

async fn insert_door(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: DoorRequest = parse_request(
        parse_body(&body)?,
        &["wall_reference", "position", "width", "height", "swing_direction"],
    )?;
    let min = state.settings.building_code.min_door_width;
    if req.value.width < min {
        return Err(ApiError::Validation(format!(
            "Door width must be at least {min} inches"
        )));
    }
    let result = state
        .registry
        .execute(&lisp::insert_door(&req.value), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Door inserted successfully")))
}

async fn insert_window(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: WindowRequest = parse_request(
        parse_body(&body)?,
        &["wall_reference", "position", "width", "height", "sill_height"],
    )?;
    let min = state.settings.building_code.min_window_width;
    if req.value.width < min {
        return Err(ApiError::Validation(format!(
            "Window width must be at least {min} inches"
        )));
    }
    let result = state
        .registry
        .execute(&lisp::insert_window(&req.value), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Window inserted successfully")))
}

async fn create_room(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: RoomRequest = parse_request(parse_body(&body)?, &["points", "height"])?;
    let room = &req.value;
    if room.points.len() < 3 {
        return Err(ApiError::Validation("Room must have at least 3 points".into()));
    }
    if !validate_room_points(&room.points) {
        return Err(ApiError::Validation("Room points do not form a valid polygon".into()));
    }
    let area = polygon_area(&room.points);
    let min = state.settings.building_code.min_room_area;
    if area < min {
        return Err(ApiError::Validation(format!(
            "Room area must be at least {min} square feet"
        )));
    }
    let result = state
        .registry
        .execute(&lisp::create_room(room), &req.instance_id)
        .await;
    let mut response = drawing_response(&result, "Room created successfully");
    response["area"] = json!(area);
    Ok(Json(response))
}

async fn save_drawing(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: FileRequest = parse_request(parse_body(&body)?, &["filepath"])?;
    let result = state
        .registry
        .save_drawing(&req.filepath, &req.instance_id)
        .await;
    let message = match result.result() {
        Some(Value::String(message)) if result.is_success() => message.clone(),
        _ => result.error_message().to_string(),
    };
    Ok(Json(json!({
        "success": result.is_success(),
        "message": message,
        "filepath": req.filepath,
    })))
}

async fn setup_grid(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: GridRequest = parse_request(
        parse_body(&body)?,
        &["origin_point", "x_spacing", "y_spacing", "x_count", "y_count"],
    )?;
    if req.value.x_spacing <= 0.0 || req.value.y_spacing <= 0.0 {
        return Err(ApiError::Validation("Grid spacing must be positive".into()));
    }
    let result = state
        .registry
        .execute(&lisp::setup_grid(&req.value), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Grid setup completed")))
}

async fn create_layer(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: LayerRequest = parse_request(parse_body(&body)?, &["name"])?;
    let defaults = &state.settings.drawing;
    let layer = Layer {
        name: req.name,
        color: req.color.unwrap_or(defaults.layer_color),
        line_type: req.line_type.unwrap_or_else(|| defaults.line_type.clone()),
        line_weight: req.line_weight.unwrap_or(defaults.line_weight),
    };
    if !(1..=255).contains(&layer.color) {
        return Err(ApiError::Validation("Layer color must be between 1 and 255".into()));
    }
    let result = state
        .registry
        .execute(&lisp::create_layer(&layer), &req.instance_id)
        .await;
    let message = format!(
        "Layer '{}' created successfully",
        lisp::sanitize_layer_name(&layer.name)
    );
    Ok(Json(drawing_response(&result, &message)))
}

async fn set_current_layer(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: CurrentLayerRequest = parse_request(parse_body(&body)?, &["name"])?;
    let result = state
        .registry
        .execute(&lisp::set_current_layer(&req.name), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Current layer set successfully")))
}

async fn add_text_note(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: TextRequest = parse_request(parse_body(&body)?, &["insertion_point", "text_string"])?;
    let note = TextNote {
        insertion_point: req.insertion_point,
        text_string: req.text_string,
        height: req.height.unwrap_or(state.settings.drawing.text_height),
        rotation: req.rotation,
    };
    if note.height <= 0.0 {
        return Err(ApiError::Validation("Text height must be positive".into()));
    }
    let result = state
        .registry
        .execute(&lisp::add_text_note(&note), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Text note added successfully")))
}

async fn dimension_linear(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: DimensionRequest = parse_request(
        parse_body(&body)?,
        &["start_point", "end_point", "offset_distance"],
    )?;
    let result = state
        .registry
        .execute(&lisp::dimension_linear(&req.value), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Linear dimension added successfully")))
}

async fn insert_furniture(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: FurnitureRequest =
        parse_request(parse_body(&body)?, &["insertion_point", "furniture_type"])?;
    if req.value.scale <= 0.0 {
        return Err(ApiError::Validation("Scale must be positive".into()));
    }
    let result = state
        .registry
        .execute(&lisp::insert_furniture(&req.value), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Furniture inserted successfully")))
}

async fn zoom_extents(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: InstanceRequest = parse_request(parse_body(&body)?, &[])?;
    let result = state
        .registry
        .execute(&lisp::zoom_extents(), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Zoomed to extents")))
}

async fn regenerate(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: InstanceRequest = parse_request(parse_body(&body)?, &[])?;
    let result = state
        .registry
        .execute(&lisp::regenerate(), &req.instance_id)
        .await;
    Ok(Json(drawing_response(&result, "Drawing regenerated")))
}

async fn calculate_area(body: Bytes) -> ApiResult {
    let req: AreaRequest = parse_request(parse_body(&body)?, &["points"])?;
    if req.points.len() < 3 {
        return Err(ApiError::Validation(
            "Need at least 3 points to calculate area".into(),
        ));
    }
    Ok(Json(json!({
        "success": true,
        "area": polygon_area(&req.points),
        "units": "square units",
        "point_count": req.points.len(),
    })))
}

async fn convert_units_handler(body: Bytes) -> ApiResult {
    let req: ConvertUnitsRequest =
        parse_request(parse_body(&body)?, &["value", "from_unit", "to_unit"])?;
    let value = convert_units(req.value, &req.from_unit, &req.to_unit)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(Json(json!({
        "success": true,
        "value": value,
        "from_unit": req.from_unit,
        "to_unit": req.to_unit,
    })))
}

async fn execute_lisp(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, ApiError> {
    let req: LispRequest = parse_request(parse_body(&body)?, &["lisp_code"])?;
    let code = lisp::wrap_for_execution(&req.lisp_code);
    Ok(Json(state.registry.execute(&code, &req.instance_id).await))
}

async fn load_lisp(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, ApiError> {
    let req: FileRequest = parse_request(parse_body(&body)?, &["filepath"])?;
    let result = state
        .registry
        .load_lisp_file(&req.filepath, &req.instance_id)
        .await;
    Ok(Json(result))
}
