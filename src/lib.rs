//! Multi-page job application engine.
//!
//! Given a job URL and an applicant profile, the [`navigator::Navigator`]
//! classifies the landing page, enters the application flow and walks the
//! form pages until it sees a confirmation or gives up with a typed
//! [`types::ApplicationResult`].

pub mod answers;
pub mod brain;
pub mod browser;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod hands;
pub mod navigator;
pub mod payment;
pub mod plan;
pub mod sites;
pub mod stuck;
pub mod types;

pub use navigator::Navigator;
pub use types::{Applicant, ApplicationResult, ApplicationStatus, Profile, ProgressEvent};
