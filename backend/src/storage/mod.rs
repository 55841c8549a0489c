pub mod publisher;
pub mod s3_service;
pub mod temp_store;

pub use s3_service::S3Service;
pub use temp_store::TempStore;
