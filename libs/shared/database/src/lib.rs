pub mod error;
pub mod realtime;
pub mod supabase;

pub use error::StoreError;
pub use realtime::{ChangeFeed, RealtimeListener};
pub use supabase::SupabaseClient;
