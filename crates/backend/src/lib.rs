//! iris-backend: HCP and HCI adapters for the iris client
//!
//! This crate provides the implementations of the ObjectStore trait
//! (using the aws-sdk-s3 crate) and the IndexApi trait (using reqwest).
//! It is the only crate that directly depends on the AWS SDK.

pub mod client;
pub mod hci;
pub mod multipart;

pub use client::S3Client;
pub use hci::HciClient;
pub use multipart::MultipartConfig;
