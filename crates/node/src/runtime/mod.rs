pub mod busy_lock;
pub mod cancel;
pub mod tool_trait;
pub mod tools_core;
pub mod turn;
