pub mod appointment;
pub mod common;
pub mod lab;
pub mod patch;
pub mod prescription;
pub mod profile;
pub mod record;
pub mod report;
pub mod view;

pub use appointment::*;
pub use common::*;
pub use lab::*;
pub use patch::{ChangeSet, Patch};
pub use prescription::*;
pub use profile::*;
pub use record::{IntervalResource, MergeShape, Record};
pub use report::*;
pub use view::{annotation_key, MergedView, Section};
