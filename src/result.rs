//! Report extensions that record where an error crossed a module boundary.
//!
//! Deparse failures surface far from the catalog lookup that caused them.
//! `attach_loc` leaves a file:line breadcrumb at each propagation site so
//! the report reads as a path through the code, and `map_into_report`
//! handles the two-step conversion from a plain error type into a
//! `Report` of the enclosing module's error.

use rootcause::Report;
use rootcause::hooks::builtin_hooks::location::Location;

/// Message plus the source location it was attached from.
/// Displays as "message at file:line".
#[derive(Debug, Clone)]
pub struct LocatedAttachment {
    pub message: String,
    pub location: Location,
}

impl core::fmt::Display for LocatedAttachment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} at {}", self.message, self.location)
    }
}

/// Attach a breadcrumb with the caller's location to an existing report.
pub trait ReportExt<C> {
    type Output;

    fn attach_loc(self, message: impl Into<String>) -> Self::Output;
}

impl<C> ReportExt<C> for Report<C> {
    type Output = Report<C>;

    #[track_caller]
    fn attach_loc(self, message: impl Into<String>) -> Report<C> {
        self.attach(LocatedAttachment {
            message: message.into(),
            location: Location::caller(),
        })
    }
}

impl<T, C> ReportExt<C> for Result<T, Report<C>> {
    type Output = Result<T, Report<C>>;

    #[track_caller]
    fn attach_loc(self, message: impl Into<String>) -> Result<T, Report<C>> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.attach(LocatedAttachment {
                message: message.into(),
                location: Location::caller(),
            })),
        }
    }
}

/// Convert `Result<T, E>` into `Result<T, Report<C>>` where `E: Into<C>`,
/// capturing the caller's location.
pub trait MapIntoReport<T, E> {
    fn map_into_report<C>(self) -> Result<T, Report<C>>
    where
        E: Into<C>,
        C: std::error::Error + Send + Sync + 'static;
}

impl<T, E> MapIntoReport<T, E> for Result<T, E> {
    #[track_caller]
    fn map_into_report<C>(self) -> Result<T, Report<C>>
    where
        E: Into<C>,
        C: std::error::Error + Send + Sync + 'static,
    {
        self.map_err(|e| e.into().into())
    }
}
