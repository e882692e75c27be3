pub mod providers;
pub mod scheduler;
pub mod youtube;
