mod health;
mod push;
mod settings;
mod visitors;

pub use health::health;
pub use push::get_vapid_key;
pub use settings::{get_cache_info, get_settings, invalidate_cache, patch_settings};
pub use visitors::{create_visitor, list_visitors};
