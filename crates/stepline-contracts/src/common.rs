// Identifier generation
//
// Every entity is keyed by an opaque string. UUID v7 keeps ids
// collision-resistant while sorting by creation time.

use uuid::Uuid;

/// Generate a fresh opaque identifier.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}
