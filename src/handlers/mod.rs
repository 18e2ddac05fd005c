// handlers/mod.rs - resource handlers
//
// Each handler returns `Result<Json<Value>, ApiError>`; data-store faults
// surface as 500 through `ApiError`, malformed ids and bodies as 400.
// Lookups that find nothing answer `{}` (one record) or `[]` (a list).

pub mod albums;
pub mod photos;
pub mod resource;
pub mod status;
pub mod users;

pub use status::{not_found, status};
