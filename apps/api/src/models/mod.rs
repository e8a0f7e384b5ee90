pub mod batch;
pub mod session;
pub mod subject;
