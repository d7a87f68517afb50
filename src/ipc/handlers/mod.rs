pub mod attendance;
pub mod core;
pub mod editor;
pub mod hierarchy;
pub mod roles;
pub mod students;
pub mod templates;
