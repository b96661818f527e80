//! Export sessions: the full compile, allocate, walk and emit pipeline.

pub mod export_session;
