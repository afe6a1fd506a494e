pub mod backend;
pub mod helpers;
