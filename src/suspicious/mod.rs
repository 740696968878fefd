//! Detection of bot-challenge, rate-limit and access-denied pages.
//!
//! Two tiers: [`light::light_probe`] runs on every stabilization poll and
//! only looks at selectors, the title and leading markup; a hit triggers
//! [`light::confirm_hit`], a marker scan over the full markup that also
//! attributes vendors and cuts an excerpt. Neither tier ever fails.

pub mod detect;
pub mod diagnostics;
pub mod light;
pub mod markers;

pub use detect::{scan_markers, MarkerScan, SuspiciousVerdict, VendorValue};
pub use diagnostics::{should_dump, DiagnosticsQuota, DiagnosticsSink, DumpMeta, DumpRequest};
pub use light::{confirm_hit, light_probe, LightHit, SNIPPET_SCRIPT};
pub use markers::Strength;
