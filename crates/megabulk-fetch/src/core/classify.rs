use std::time::Duration;

use crate::data::Tier;
use crate::error::{Error, ProviderError, TransportError};

/// How a failed exchange reflects on the proxy that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Timeout or connection trouble; worth another try after a pause.
    Transient,
    /// The provider throttled this exit address.
    RateLimited,
    /// The proxy is unusable.
    Hard,
    /// Not the proxy's fault.
    Local,
    /// The provider refuses this item whichever proxy asks; the file cannot be fetched.
    Item,
}

/// What to do with a proxy after use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub tier: Tier,
    pub cooldown: Option<Duration>,
    pub count_failure: bool,
}

pub fn classify(err: &Error) -> FailureClass {
    match err {
        Error::Provider(e) => classify_provider(e),
        Error::Transport(e) => classify_transport(e),
        Error::TransferTimeout(_) | Error::IncompleteTransfer { .. } => FailureClass::Transient,
        _ => FailureClass::Local,
    }
}

fn classify_provider(err: &ProviderError) -> FailureClass {
    match err {
        ProviderError::Timeout | ProviderError::Network(_) => FailureClass::Transient,
        ProviderError::RateLimited | ProviderError::Status(509) => FailureClass::RateLimited,
        ProviderError::Status(code) if *code >= 500 => FailureClass::Transient,
        // "try again", "temporarily unavailable"
        ProviderError::Api(-3 | -18) => FailureClass::Transient,
        // not found, access denied, blocked
        ProviderError::Api(-9 | -11 | -16) => FailureClass::Item,
        ProviderError::Status(_) | ProviderError::Api(_) | ProviderError::Malformed(_) => FailureClass::Hard,
    }
}

fn classify_transport(err: &TransportError) -> FailureClass {
    match err {
        TransportError::Timeout | TransportError::Connect(_) | TransportError::Body(_) => FailureClass::Transient,
        TransportError::Status(509) => FailureClass::RateLimited,
        TransportError::Status(code) if *code >= 500 => FailureClass::Transient,
        TransportError::Status(_) => FailureClass::Hard,
    }
}

/// Where a proxy goes after an exchange ending in `class`, or after success when `None`.
pub fn verdict(class: Option<FailureClass>, cooldown: Duration, rate_limit_cooldown: Duration) -> Verdict {
    match class {
        None | Some(FailureClass::Local | FailureClass::Item) => Verdict {
            tier: Tier::Working,
            cooldown: None,
            count_failure: false,
        },
        Some(FailureClass::Transient) => Verdict {
            tier: Tier::Base,
            cooldown: Some(cooldown),
            count_failure: true,
        },
        Some(FailureClass::RateLimited) => Verdict {
            tier: Tier::Base,
            cooldown: Some(rate_limit_cooldown),
            count_failure: false,
        },
        Some(FailureClass::Hard) => Verdict {
            tier: Tier::Broken,
            cooldown: None,
            count_failure: true,
        },
    }
}
