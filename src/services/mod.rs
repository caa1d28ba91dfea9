// bookmark-sync services
// Services talk to the outside world: the backend contract and its implementations, the change channel, settings.

pub mod backend;
pub mod memory_backend;
pub mod realtime_channel;
pub mod settings_engine;
pub mod subscription;
pub mod supabase_backend;
