#[cfg(feature = "aws-storage")]
mod aws;

mod memory;

pub use memory::MemoryObjectStore;

#[cfg(feature = "aws-storage")]
pub use aws::S3ObjectStore;
