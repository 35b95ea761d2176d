pub mod permission;

pub use permission::{get_current_user, CurrentUser};
