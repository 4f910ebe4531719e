pub mod bucket;
pub mod codec;
pub mod directory;

pub use bucket::{bucket_array_size, HashTableBucketPage};
pub use codec::Storable;
pub use directory::{HashTableDirectoryPage, DIRECTORY_ARRAY_SIZE};
