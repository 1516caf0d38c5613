pub mod config;
pub mod doctor;
pub mod keys;
pub mod lookup;
pub mod pattern;
pub mod textwin;
pub mod types;
pub mod ui;

mod composer;

pub use composer::*;
pub use lookup::{
    AnswerBody, EntityHit, LookupChannel, LookupError, LookupJob, LookupOutcome, RemoteLookup,
};
