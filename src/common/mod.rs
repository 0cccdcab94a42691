pub mod attachment;
pub mod checksum;
pub mod cleanup;
pub mod keys;
pub mod upload;
