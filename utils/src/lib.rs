pub mod audio;
pub mod g711;
pub mod transcode;
