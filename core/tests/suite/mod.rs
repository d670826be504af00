mod attach;
mod remote_fetch;
mod support;
