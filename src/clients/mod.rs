pub mod azure_blob_client;

pub use azure_blob_client::{AzureBlobClient, ContainerSas};
