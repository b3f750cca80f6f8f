//! Pipeline engine: the dispatch, recheck and welcome workers and the
//! [`Pipeline`] handle that owns them.

mod dispatch;
mod pipeline;
mod recheck;
mod welcome;

pub use pipeline::{Collaborators, Pipeline, Workers};
