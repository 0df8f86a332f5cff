//! The triage-and-fallback cascade as an explicit state machine.
//!
//! ```text
//!            ┌─ video URL ─────────────────────────▶ Transcript ────────▶ Done
//!            ├─ non-PDF ───────────────────────────▶ StructuredExtract ─▶ Done
//! Start ─────┤
//!            └─ PDF ─▶ Classify ─┬─ digital ───────▶ StructuredExtract ─▶ Done
//!                                └─ scanned ─▶ LocalOcr
//!                                               ├─ ok, cloud + force ─▶ CloudUpgrade ─▶ Done
//!                                               ├─ ok ──────────────────────────────▶ Done
//!                                               ├─ failed, cloud ─────▶ CloudFallback ─▶ Done
//!                                               └─ failed, no cloud ─▶ Failed
//! ```
//!
//! Transitions are pure: [`start`] and [`next`] look only at the event and
//! the [`Policy`], never at files or backends. The orchestrator in
//! [`crate::convert`] performs the work of each stage and feeds the outcome
//! back in until a [`Step::Finish`] comes out.

use crate::format::DocumentFormat;
use crate::pipeline::classify::DocumentKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named extraction stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Classify,
    StructuredExtract,
    LocalOcr,
    /// Cloud pass after a successful local OCR, on explicit request.
    CloudUpgrade,
    /// Cloud pass after local OCR failed.
    CloudFallback,
    /// Caption download for a video URL.
    Transcript,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::StructuredExtract => "structured-extract",
            Stage::LocalOcr => "local-ocr",
            Stage::CloudUpgrade => "cloud-upgrade",
            Stage::CloudFallback => "cloud-fallback",
            Stage::Transcript => "transcript",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator learned from running a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Classified(DocumentKind),
    Succeeded,
    Failed,
}

/// Run-wide switches that shape the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    /// A cloud backend is configured and passed its credential check.
    pub cloud_available: bool,
    /// The caller asked for cloud output even when local OCR works.
    pub force_cloud: bool,
}

/// Why a document produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    UnsupportedFormat,
    StructuredFailed,
    /// Local OCR failed and there is no cloud backend to fall back on.
    NoCloudFallback,
    /// The last branch of the cascade failed too.
    CascadeExhausted,
    /// A video URL yielded no transcript.
    TranscriptUnavailable,
}

/// Terminal outcome of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Write the result produced by this stage.
    Keep(Stage),
    Fail(Failure),
}

/// The next thing the orchestrator must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Run(Stage),
    Finish(Finish),
}

/// First step for a document of the given format.
pub fn start(format: DocumentFormat) -> Step {
    match format {
        f if !f.is_supported() => Step::Finish(Finish::Fail(Failure::UnsupportedFormat)),
        DocumentFormat::WebVideo => Step::Run(Stage::Transcript),
        f if f.needs_triage() => Step::Run(Stage::Classify),
        _ => Step::Run(Stage::StructuredExtract),
    }
}

/// Transition out of `stage` given what happened there.
///
/// An event that does not belong to the stage (e.g. `Succeeded` out of
/// `Classify`) ends the run as exhausted.
pub fn next(stage: Stage, event: Event, policy: Policy) -> Step {
    use Event::*;
    use Stage::*;

    match (stage, event) {
        (Classify, Classified(DocumentKind::Digital)) => Step::Run(StructuredExtract),
        (Classify, Classified(DocumentKind::Scanned)) => Step::Run(LocalOcr),

        (StructuredExtract, Succeeded) => Step::Finish(Finish::Keep(StructuredExtract)),
        (StructuredExtract, Failed) => Step::Finish(Finish::Fail(Failure::StructuredFailed)),

        (LocalOcr, Succeeded) if policy.cloud_available && policy.force_cloud => {
            Step::Run(CloudUpgrade)
        }
        (LocalOcr, Succeeded) => Step::Finish(Finish::Keep(LocalOcr)),
        (LocalOcr, Failed) if policy.cloud_available => Step::Run(CloudFallback),
        (LocalOcr, Failed) => Step::Finish(Finish::Fail(Failure::NoCloudFallback)),

        (CloudUpgrade, Succeeded) => Step::Finish(Finish::Keep(CloudUpgrade)),
        // The local result is still in hand.
        (CloudUpgrade, Failed) => Step::Finish(Finish::Keep(LocalOcr)),

        (CloudFallback, Succeeded) => Step::Finish(Finish::Keep(CloudFallback)),
        (CloudFallback, Failed) => Step::Finish(Finish::Fail(Failure::CascadeExhausted)),

        (Transcript, Succeeded) => Step::Finish(Finish::Keep(Transcript)),
        (Transcript, Failed) => Step::Finish(Finish::Fail(Failure::TranscriptUnavailable)),

        _ => Step::Finish(Finish::Fail(Failure::CascadeExhausted)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL_ONLY: Policy = Policy {
        cloud_available: false,
        force_cloud: false,
    };
    const CLOUD: Policy = Policy {
        cloud_available: true,
        force_cloud: false,
    };
    const CLOUD_FORCED: Policy = Policy {
        cloud_available: true,
        force_cloud: true,
    };

    #[test]
    fn start_routes_by_format() {
        assert_eq!(start(DocumentFormat::Pdf), Step::Run(Stage::Classify));
        assert_eq!(start(DocumentFormat::WordProcessor), Step::Run(Stage::StructuredExtract));
        assert_eq!(start(DocumentFormat::Audio), Step::Run(Stage::StructuredExtract));
        assert_eq!(start(DocumentFormat::WebVideo), Step::Run(Stage::Transcript));
        assert_eq!(
            start(DocumentFormat::Unsupported),
            Step::Finish(Finish::Fail(Failure::UnsupportedFormat))
        );
    }

    #[test]
    fn digital_pdf_goes_to_structured() {
        assert_eq!(
            next(Stage::Classify, Event::Classified(DocumentKind::Digital), CLOUD_FORCED),
            Step::Run(Stage::StructuredExtract)
        );
    }

    #[test]
    fn scanned_pdf_always_tries_local_first() {
        for policy in [LOCAL_ONLY, CLOUD, CLOUD_FORCED] {
            assert_eq!(
                next(Stage::Classify, Event::Classified(DocumentKind::Scanned), policy),
                Step::Run(Stage::LocalOcr)
            );
        }
    }

    #[test]
    fn structured_is_terminal() {
        assert_eq!(
            next(Stage::StructuredExtract, Event::Succeeded, CLOUD),
            Step::Finish(Finish::Keep(Stage::StructuredExtract))
        );
        assert_eq!(
            next(Stage::StructuredExtract, Event::Failed, CLOUD),
            Step::Finish(Finish::Fail(Failure::StructuredFailed))
        );
    }

    #[test]
    fn local_success_is_final_unless_forced() {
        assert_eq!(
            next(Stage::LocalOcr, Event::Succeeded, LOCAL_ONLY),
            Step::Finish(Finish::Keep(Stage::LocalOcr))
        );
        assert_eq!(
            next(Stage::LocalOcr, Event::Succeeded, CLOUD),
            Step::Finish(Finish::Keep(Stage::LocalOcr))
        );
        assert_eq!(
            next(Stage::LocalOcr, Event::Succeeded, CLOUD_FORCED),
            Step::Run(Stage::CloudUpgrade)
        );
    }

    #[test]
    fn force_without_cloud_has_no_effect() {
        let forced_no_cloud = Policy {
            cloud_available: false,
            force_cloud: true,
        };
        assert_eq!(
            next(Stage::LocalOcr, Event::Succeeded, forced_no_cloud),
            Step::Finish(Finish::Keep(Stage::LocalOcr))
        );
    }

    #[test]
    fn local_failure_falls_back_to_cloud_when_available() {
        assert_eq!(
            next(Stage::LocalOcr, Event::Failed, CLOUD),
            Step::Run(Stage::CloudFallback)
        );
        assert_eq!(
            next(Stage::LocalOcr, Event::Failed, LOCAL_ONLY),
            Step::Finish(Finish::Fail(Failure::NoCloudFallback))
        );
    }

    #[test]
    fn failed_upgrade_keeps_local_result() {
        assert_eq!(
            next(Stage::CloudUpgrade, Event::Succeeded, CLOUD_FORCED),
            Step::Finish(Finish::Keep(Stage::CloudUpgrade))
        );
        assert_eq!(
            next(Stage::CloudUpgrade, Event::Failed, CLOUD_FORCED),
            Step::Finish(Finish::Keep(Stage::LocalOcr))
        );
    }

    #[test]
    fn failed_fallback_exhausts_cascade() {
        assert_eq!(
            next(Stage::CloudFallback, Event::Succeeded, CLOUD),
            Step::Finish(Finish::Keep(Stage::CloudFallback))
        );
        assert_eq!(
            next(Stage::CloudFallback, Event::Failed, CLOUD),
            Step::Finish(Finish::Fail(Failure::CascadeExhausted))
        );
    }

    #[test]
    fn transcript_never_touches_ocr_or_cloud() {
        for policy in [LOCAL_ONLY, CLOUD_FORCED] {
            assert_eq!(
                next(Stage::Transcript, Event::Succeeded, policy),
                Step::Finish(Finish::Keep(Stage::Transcript))
            );
            assert_eq!(
                next(Stage::Transcript, Event::Failed, policy),
                Step::Finish(Finish::Fail(Failure::TranscriptUnavailable))
            );
        }
    }

    #[test]
    fn foreign_events_end_the_run() {
        assert_eq!(
            next(Stage::Classify, Event::Succeeded, CLOUD),
            Step::Finish(Finish::Fail(Failure::CascadeExhausted))
        );
        assert_eq!(
            next(Stage::LocalOcr, Event::Classified(DocumentKind::Digital), CLOUD),
            Step::Finish(Finish::Fail(Failure::CascadeExhausted))
        );
    }

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Stage::CloudFallback.to_string(), "cloud-fallback");
        assert_eq!(
            serde_json::to_string(&Stage::StructuredExtract).unwrap(),
            "\"structured-extract\""
        );
    }
}
