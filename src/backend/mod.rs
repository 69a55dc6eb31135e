pub mod assets;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod normalize;
pub mod session;
pub mod state;
pub mod twitch;
pub mod youtube;
