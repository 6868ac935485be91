pub mod notify;
pub mod registry;
pub mod simulate;
pub mod storage;
pub mod ytdlp;
