pub mod props_cmd;

pub use props_cmd::PropsCli;
