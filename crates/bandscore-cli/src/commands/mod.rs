pub mod grade;
pub mod init;
pub mod list_models;
pub mod profile;
pub mod score;
pub mod validate;
