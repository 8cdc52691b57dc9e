pub mod briefing;
pub mod fallback;
pub mod health;
pub mod heartbeat;
pub mod scheduler;
