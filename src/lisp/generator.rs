//! Per-entity AutoLISP generators.
//!
//! Door, window and wall generators call the `c:create-*` routines shipped in
//! the project's `lisp/` folder, which `connect` appends to AutoCAD's support
//! path. The rest emit self-contained procedures built on standard commands.

use super::format::{
    lisp_point_list, lisp_quoted_point, lisp_real, lisp_string, sanitize_layer_name,
};
use crate::drawing::{
    Dimension, Door, DoorType, Furniture, FurnitureType, Grid, Layer, Room, SwingDirection,
    TextNote, Wall, Window, WindowType,
};
use crate::drawing::Point;

/// Door swing angle in degrees.
pub fn swing_angle(direction: SwingDirection) -> i32 {
    match direction {
        SwingDirection::LeftIn => 0,
        SwingDirection::LeftOut => 180,
        SwingDirection::RightIn => 90,
        SwingDirection::RightOut => 270,
    }
}

pub fn door_function(door_type: DoorType) -> &'static str {
    match door_type {
        DoorType::Single => "c:create-door-single",
        DoorType::Double => "c:create-door-double",
        DoorType::Sliding => "c:create-door-sliding",
    }
}

pub fn window_function(window_type: WindowType) -> &'static str {
    match window_type {
        WindowType::Fixed => "c:create-window-fixed",
        WindowType::Casement => "c:create-window-casement",
        WindowType::Sliding => "c:create-window-sliding",
    }
}

pub fn furniture_block(furniture_type: FurnitureType) -> &'static str {
    match furniture_type {
        FurnitureType::Chair => "CHAIR_BLOCK",
        FurnitureType::Table => "TABLE_BLOCK",
        FurnitureType::Bed => "BED_BLOCK",
        FurnitureType::Sofa => "SOFA_BLOCK",
        FurnitureType::Desk => "DESK_BLOCK",
        FurnitureType::Generic => "GENERIC_FURNITURE",
    }
}

fn ref_id_arg(ref_id: Option<&str>) -> String {
    match ref_id {
        Some(id) if !id.is_empty() => lisp_string(id),
        _ => "nil".to_string(),
    }
}

pub fn create_wall(wall: &Wall) -> String {
    format!(
        "(create-architectural-wall {} {} {} {})",
        lisp_quoted_point(&wall.start_point),
        lisp_quoted_point(&wall.end_point),
        lisp_real(wall.thickness),
        lisp_real(wall.height)
    )
}

/// Door with swing and automatic annotation.
pub fn insert_door(door: &Door) -> String {
    format!(
        "(c:create-door {} {} {} {} {} {} {} {})",
        lisp_real(door.position.x),
        lisp_real(door.position.y),
        lisp_real(door.width),
        lisp_real(door.height),
        lisp_real(door.wall_thickness),
        swing_angle(door.swing_direction),
        lisp_string(door.door_type.as_str()),
        ref_id_arg(door.ref_id.as_deref())
    )
}

/// Door through the per-type routine, without swing or wall thickness.
pub fn insert_door_simple(door: &Door) -> String {
    format!(
        "({} {} {} {} {} {})",
        door_function(door.door_type),
        lisp_real(door.position.x),
        lisp_real(door.position.y),
        lisp_real(door.width),
        lisp_real(door.height),
        ref_id_arg(door.ref_id.as_deref())
    )
}

pub fn insert_window(window: &Window) -> String {
    format!(
        "(c:create-window {} {} {} {} {} {} {} {})",
        lisp_real(window.position.x),
        lisp_real(window.position.y),
        lisp_real(window.width),
        lisp_real(window.height),
        lisp_real(window.sill_height),
        lisp_string(window.window_type.as_str()),
        lisp_string(window.glass_type.as_str()),
        ref_id_arg(window.ref_id.as_deref())
    )
}

pub fn insert_window_simple(window: &Window) -> String {
    format!(
        "({} {} {} {} {} {} {})",
        window_function(window.window_type),
        lisp_real(window.position.x),
        lisp_real(window.position.y),
        lisp_real(window.width),
        lisp_real(window.height),
        lisp_real(window.sill_height),
        ref_id_arg(window.ref_id.as_deref())
    )
}

/// Closed polyline through the room's boundary points.
pub fn create_room(room: &Room) -> String {
    format!(
        r#"
(defun create-room (points height)
  ; Room boundary
  (command "._PLINE")
  (foreach pt points
    (command pt)
  )
  (command "C")
  (princ "Room created successfully")
)
(create-room {} {})
"#,
        lisp_point_list(&room.points),
        lisp_real(room.height)
    )
}

pub fn setup_grid(grid: &Grid) -> String {
    format!(
        r#"
(defun setup-grid (origin x-spacing y-spacing x-count y-count / i j x-pos y-pos)
  (setvar "GRIDMODE" 1)
  (setvar "SNAPMODE" 1)
  (setvar "GRIDUNIT" (list x-spacing y-spacing))
  (setvar "SNAPUNIT" (list x-spacing y-spacing))

  (setq i 0)
  (repeat x-count
    (setq x-pos (+ (car origin) (* i x-spacing)))
    (command "._LINE"
             (list x-pos (cadr origin))
             (list x-pos (+ (cadr origin) (* y-count y-spacing)))
             "")
    (setq i (1+ i))
  )

  (setq j 0)
  (repeat y-count
    (setq y-pos (+ (cadr origin) (* j y-spacing)))
    (command "._LINE"
             (list (car origin) y-pos)
             (list (+ (car origin) (* x-count x-spacing)) y-pos)
             "")
    (setq j (1+ j))
  )

  (princ "Grid setup completed")
)
(setup-grid {} {} {} {} {})
"#,
        lisp_quoted_point(&grid.origin_point),
        lisp_real(grid.x_spacing),
        lisp_real(grid.y_spacing),
        grid.x_count,
        grid.y_count
    )
}

/// New layer with color, linetype and lineweight. The name is sanitized.
pub fn create_layer(layer: &Layer) -> String {
    let name = lisp_string(&sanitize_layer_name(&layer.name));
    format!(
        r#"
(defun create-layer (name color linetype lineweight)
  (command "._LAYER" "N" name "C" color name "LT" linetype name "LW" lineweight name "")
  (princ (strcat "Layer " name " created successfully"))
)
(create-layer {} {} {} {})
"#,
        name,
        layer.color,
        lisp_string(&layer.line_type),
        lisp_real(layer.line_weight)
    )
}

pub fn add_text_note(note: &TextNote) -> String {
    format!(
        r#"
(defun add-text-note (pos text height rotation)
  (command "._TEXT" pos height rotation text)
  (princ "Text note added successfully")
)
(add-text-note {} {} {} {})
"#,
        lisp_quoted_point(&note.insertion_point),
        lisp_string(&note.text_string),
        lisp_real(note.height),
        lisp_real(note.rotation)
    )
}

/// Linear dimension whose line sits `offset_distance` to the left of the
/// start->end direction.
pub fn dimension_linear(dimension: &Dimension) -> String {
    format!(
        r#"
(defun dimension-linear (start-pt end-pt offset / dim-line-pt)
  (setq dim-line-pt (polar start-pt (+ (angle start-pt end-pt) (/ pi 2)) offset))
  (command "._DIMLINEAR" start-pt end-pt dim-line-pt)
  (princ "Linear dimension added successfully")
)
(dimension-linear {} {} {})
"#,
        lisp_quoted_point(&dimension.start_point),
        lisp_quoted_point(&dimension.end_point),
        lisp_real(dimension.offset_distance)
    )
}

pub fn insert_furniture(furniture: &Furniture) -> String {
    format!(
        r#"
(defun insert-furniture (pos block-name rotation scale)
  (command "._INSERT" block-name pos scale scale rotation)
  (princ (strcat "Furniture " block-name " inserted successfully"))
)
(insert-furniture {} {} {} {})
"#,
        lisp_quoted_point(&furniture.insertion_point),
        lisp_string(furniture_block(furniture.furniture_type)),
        lisp_real(furniture.rotation),
        lisp_real(furniture.scale)
    )
}

/// Shoelace area computed inside AutoCAD, for display. `geometry::polygon_area`
/// is the in-process counterpart used for validation.
pub fn calculate_area(points: &[Point]) -> String {
    format!(
        r#"
(defun calculate-area (points / area n i j pt1 pt2)
  (setq area 0.0)
  (setq n (length points))
  (setq i 0)
  (repeat n
    (setq j (if (= i (1- n)) 0 (1+ i)))
    (setq pt1 (nth i points))
    (setq pt2 (nth j points))
    (setq area (+ area (- (* (car pt1) (cadr pt2)) (* (car pt2) (cadr pt1)))))
    (setq i (1+ i))
  )
  (setq area (/ (abs area) 2.0))
  (princ (strcat "Area calculated: " (rtos area 2 2) " square units"))
  area
)
(calculate-area {})
"#,
        lisp_point_list(points)
    )
}

pub fn save_drawing(filepath: &str) -> String {
    format!(
        r#"
(defun save-drawing (filepath)
  (command "._SAVEAS" "" filepath)
  (princ (strcat "Drawing saved to: " filepath))
)
(save-drawing {})
"#,
        lisp_string(filepath)
    )
}

pub fn set_current_layer(name: &str) -> String {
    format!(
        "(setvar \"CLAYER\" {})",
        lisp_string(&sanitize_layer_name(name))
    )
}

pub fn zoom_extents() -> String {
    "(command \"._ZOOM\" \"_E\")".to_string()
}

pub fn regenerate() -> String {
    "(command \"._REGEN\")".to_string()
}

/// Frame user-supplied code with a marker comment.
pub fn wrap_for_execution(code: &str) -> String {
    format!("\n; AutoLISP code execution\n{code}\n")
}
