pub mod dispatcher;
pub mod ipc;
