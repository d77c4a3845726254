pub mod api;
pub mod poll;
pub mod prepare;
pub mod session;
pub mod submit;
