pub mod init;
pub mod parse;
pub mod state;
pub mod sync;
