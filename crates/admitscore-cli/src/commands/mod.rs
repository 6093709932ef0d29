pub mod init;
pub mod list_models;
pub mod recommend;
pub mod score;
pub mod validate;
