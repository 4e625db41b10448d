//! Onboarding steps and the progress resolver.
//!
//! Pure functions over a profile snapshot; no I/O. The session controller
//! asks this module which step is current and whether a requested
//! navigation is allowed.

use serde::{Deserialize, Serialize};

/// Ordered onboarding steps. Declaration order is the navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnboardingStep {
    Auth,
    EmailVerification,
    Terms,
    Kyc,
    SourceOfFunds,
    PhoneVerification,
    SafeSetup,
    CardOrder,
    Dashboard,
}

/// All steps in navigation order.
pub const STEP_ORDER: [OnboardingStep; 9] = [
    OnboardingStep::Auth,
    OnboardingStep::EmailVerification,
    OnboardingStep::Terms,
    OnboardingStep::Kyc,
    OnboardingStep::SourceOfFunds,
    OnboardingStep::PhoneVerification,
    OnboardingStep::SafeSetup,
    OnboardingStep::CardOrder,
    OnboardingStep::Dashboard,
];

impl OnboardingStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::EmailVerification => "email-verification",
            Self::Terms => "terms",
            Self::Kyc => "kyc",
            Self::SourceOfFunds => "source-of-funds",
            Self::PhoneVerification => "phone-verification",
            Self::SafeSetup => "safe-setup",
            Self::CardOrder => "card-order",
            Self::Dashboard => "dashboard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        STEP_ORDER
            .iter()
            .copied()
            .find(|step| step.as_str() == value.trim())
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KYC review state as reported by the card issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KycStatus {
    NotStarted,
    DocumentsRequested,
    Pending,
    Processing,
    Approved,
    ResubmissionRequested,
    Rejected,
    RequiresAction,
}

impl KycStatus {
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "notStarted",
            Self::DocumentsRequested => "documentsRequested",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Approved => "approved",
            Self::ResubmissionRequested => "resubmissionRequested",
            Self::Rejected => "rejected",
            Self::RequiresAction => "requiresAction",
        }
    }
}

/// Remote user-state snapshot. Replaced wholesale on each refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub kyc_status: KycStatus,
    #[serde(default)]
    pub is_phone_validated: bool,
    #[serde(default)]
    pub terms_accepted: bool,
    #[serde(default)]
    pub is_source_of_funds_answered: bool,
    #[serde(default)]
    pub safe_address: Option<String>,
    #[serde(default)]
    pub safe_configured: bool,
    #[serde(default)]
    pub has_card: bool,
}

/// Whether the prerequisite a step gates on is satisfied by `profile`.
///
/// Auth, email verification, and the dashboard carry no gating predicate
/// of their own: holding a profile at all means authentication (and the
/// email verification embedded in it) already happened.
fn requirement_met(profile: &Profile, step: OnboardingStep) -> bool {
    match step {
        OnboardingStep::Auth | OnboardingStep::EmailVerification | OnboardingStep::Dashboard => {
            true
        }
        OnboardingStep::Terms => profile.terms_accepted,
        OnboardingStep::Kyc => profile.kyc_status.is_approved(),
        OnboardingStep::SourceOfFunds => profile.is_source_of_funds_answered,
        OnboardingStep::PhoneVerification => profile.is_phone_validated,
        OnboardingStep::SafeSetup => profile.safe_configured,
        OnboardingStep::CardOrder => profile.has_card,
    }
}

/// The earliest step whose prerequisite is unmet; `dashboard` when all are
/// satisfied, `auth` when no profile is loaded.
pub fn determine_current_step(profile: Option<&Profile>) -> OnboardingStep {
    let Some(profile) = profile else {
        return OnboardingStep::Auth;
    };

    STEP_ORDER
        .iter()
        .copied()
        .find(|step| !requirement_met(profile, *step))
        .unwrap_or(OnboardingStep::Dashboard)
}

/// Whether `target` is reachable: every step strictly before it must be
/// satisfied. Backward navigation to passed steps is therefore always
/// allowed, and `auth` is reachable unconditionally (logout redirects).
pub fn can_navigate_to(profile: Option<&Profile>, target: OnboardingStep) -> bool {
    if target == OnboardingStep::Auth {
        return true;
    }
    let Some(profile) = profile else {
        return false;
    };

    STEP_ORDER
        .iter()
        .copied()
        .take_while(|step| *step < target)
        .all(|step| requirement_met(profile, step))
}
