//! AutoLISP source generation.
//!
//! Every function here is pure: it maps typed drawing values to AutoLISP text
//! and never touches a session. The text is sent to AutoCAD through
//! `SessionRegistry::execute`.

mod format;
mod generator;

pub use format::{
    lisp_point, lisp_point_list, lisp_quoted_point, lisp_real, lisp_string, sanitize_layer_name,
    unescape_lisp_string, DEFAULT_LAYER_NAME, MAX_LAYER_NAME_LEN,
};
pub use generator::*;
