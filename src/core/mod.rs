pub mod db;
pub mod errors;
pub mod forms;
pub mod helpers;
pub mod reply;
