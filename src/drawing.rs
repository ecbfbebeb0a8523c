//! Drawing values passed from the HTTP layer to the AutoLISP generator.
//!
//! These are plain immutable values. Enumerations parse leniently: an
//! unrecognized name degrades to the variant's default (with a warning)
//! instead of failing, and AutoCAD rejects anything truly invalid when the
//! generated code runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A 2D or 3D point. `z` defaults to 0.
///
/// Deserializes from `{"x": .., "y": .., "z": ..}` (missing coordinates are
/// 0) or from an AutoCAD-style array `[x, y]` / `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "PointRepr")]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Coords(Vec<f64>),
    Fields {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        z: f64,
    },
}

impl TryFrom<PointRepr> for Point {
    type Error = String;

    fn try_from(repr: PointRepr) -> Result<Self, Self::Error> {
        match repr {
            PointRepr::Fields { x, y, z } => Ok(Point { x, y, z }),
            PointRepr::Coords(coords) => match coords.as_slice() {
                [x, y] => Ok(Point::new(*x, *y)),
                [x, y, z, ..] => Ok(Point::new_3d(*x, *y, *z)),
                _ => Err(format!(
                    "Invalid AutoCAD point format: expected 2 or 3 coordinates, got {}",
                    coords.len()
                )),
            },
        }
    }
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub const fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_list(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn to_2d_list(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Declares a drawing enumeration with a total, lenient name mapping.
macro_rules! lenient_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "&'static str")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Map a name to a variant; unknown names yield the default.
            pub fn parse_lenient(input: &str) -> Self {
                let normalized = input.trim().to_ascii_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($text => Self::$variant,)+
                    _ => {
                        warn!(
                            value = %input,
                            fallback = Self::$default.as_str(),
                            concat!("Unrecognized ", stringify!($name), ", using default")
                        );
                        Self::$default
                    }
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::parse_lenient(&value)
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

lenient_enum! {
    /// Door swing directions.
    SwingDirection, default = RightIn, {
        LeftIn => "left_in",
        LeftOut => "left_out",
        RightIn => "right_in",
        RightOut => "right_out",
    }
}

lenient_enum! {
    DoorType, default = Single, {
        Single => "single",
        Double => "double",
        Sliding => "sliding",
    }
}

lenient_enum! {
    WindowType, default = Fixed, {
        Fixed => "fixed",
        Casement => "casement",
        Sliding => "sliding",
    }
}

lenient_enum! {
    GlassType, default = Double, {
        Single => "single",
        Double => "double",
        Triple => "triple",
    }
}

lenient_enum! {
    /// Furniture blocks. Anything unrecognized becomes `Generic`.
    FurnitureType, default = Generic, {
        Chair => "chair",
        Table => "table",
        Bed => "bed",
        Sofa => "sofa",
        Desk => "desk",
        Generic => "generic",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub start_point: Point,
    pub end_point: Point,
    pub thickness: f64,
    pub height: f64,
}

fn default_wall_thickness() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Door {
    pub wall_reference: String,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub swing_direction: SwingDirection,
    #[serde(default)]
    pub door_type: DoorType,
    #[serde(default = "default_wall_thickness")]
    pub wall_thickness: f64,
    #[serde(default)]
    pub ref_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub wall_reference: String,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub sill_height: f64,
    #[serde(default)]
    pub window_type: WindowType,
    #[serde(default)]
    pub glass_type: GlassType,
    #[serde(default)]
    pub ref_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub points: Vec<Point>,
    pub height: f64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub origin_point: Point,
    pub x_spacing: f64,
    pub y_spacing: f64,
    pub x_count: u32,
    pub y_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub color: i32,
    pub line_type: String,
    pub line_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNote {
    pub insertion_point: Point,
    pub text_string: String,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub start_point: Point,
    pub end_point: Point,
    pub offset_distance: f64,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Furniture {
    pub insertion_point: Point,
    pub furniture_type: FurnitureType,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}
