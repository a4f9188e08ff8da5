//! Response wrapping for frontend compatibility.
//!
//! The renderer expects responses in the format `{success: bool, ...data}`,
//! but the dispatcher returns raw values. This module adds the envelope the
//! preload bridge unwraps on the other side.

use serde_json::{json, Value};

/// Wrap dispatcher results to match the frontend's expected format.
pub fn wrap_response(method: &str, result: Value) -> Value {
    match method {
        // List wrappers
        "list_dats" => {
            json!({
                "success": true,
                "dats": if result.is_null() { json!([]) } else { result }
            })
        }

        // Dict wrappers
        "get_dat" | "create_dat" | "import_dat" => {
            json!({
                "success": true,
                "dat": if result.is_null() { json!({}) } else { result }
            })
        }

        "share_link" => {
            json!({
                "success": true,
                "link": if result.is_null() { json!("") } else { result }
            })
        }

        "get_view_state" => {
            json!({
                "success": true,
                "state": result
            })
        }

        // Bool methods
        "delete_dat" => {
            json!({
                "success": result.as_bool().unwrap_or(false)
            })
        }

        // Passthrough methods (already in correct format)
        "wait_for_change" => result,

        // Default: return as-is (for methods not explicitly handled)
        _ => result,
    }
}
