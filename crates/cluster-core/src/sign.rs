//! Advisory sign display timing
//!
//! A recognised sign is shown for a fixed interval. Seeing the same sign
//! again before the interval ends pushes the deadline out; a different sign
//! replaces the current one and restarts the interval. Only expiry returns
//! the display to idle.

use std::time::Duration;

use tokio::time::Instant;

use crate::state::SignType;

/// How long a sign stays visible after the last matching event
pub const DEFAULT_HIDE_AFTER: Duration = Duration::from_millis(6000);

/// A recognised advisory sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sign {
    pub kind: SignType,
    /// Text shown on the sign (limit digits, or the upper-case type name)
    pub value: String,
}

impl Sign {
    /// Interpret a `sign` field token.
    ///
    /// Integers are speed limits; `stop`, `crosswalk` and `yield` (exact,
    /// lower-case) are the named signs. Anything else is not a sign.
    pub fn parse(token: &str) -> Option<Self> {
        if let Ok(limit) = token.parse::<i32>() {
            return Some(Self::speed_limit(limit));
        }

        let kind = match token {
            "stop" => SignType::Stop,
            "crosswalk" => SignType::Crosswalk,
            "yield" => SignType::Yield,
            _ => return None,
        };

        Some(Self {
            kind,
            value: kind.as_str().to_string(),
        })
    }

    pub fn speed_limit(limit: i32) -> Self {
        Self {
            kind: SignType::SpeedLimit,
            value: limit.to_string(),
        }
    }

    /// The limit, if this is a speed limit sign
    pub fn limit(&self) -> Option<i32> {
        match self.kind {
            SignType::SpeedLimit => self.value.parse().ok(),
            _ => None,
        }
    }
}

/// What a sign event did to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignTransition {
    /// Display was idle and now shows the sign
    Shown,
    /// Same sign already shown; only the deadline moved
    Prolonged,
    /// A different sign took over the display
    Replaced,
}

/// Current sign display state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SignDisplayState {
    #[default]
    Idle,
    Showing { sign: Sign, expires_at: Instant },
}

impl SignDisplayState {
    /// Feed a recognised sign event received at `now`
    pub fn on_sign(&mut self, sign: Sign, now: Instant, hide_after: Duration) -> SignTransition {
        let expires_at = now + hide_after;

        let transition = match self {
            SignDisplayState::Idle => SignTransition::Shown,
            SignDisplayState::Showing { sign: current, .. } if *current == sign => {
                SignTransition::Prolonged
            }
            SignDisplayState::Showing { .. } => SignTransition::Replaced,
        };

        *self = SignDisplayState::Showing { sign, expires_at };
        transition
    }

    /// Deadline of the pending hide, if a sign is showing
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            SignDisplayState::Idle => None,
            SignDisplayState::Showing { expires_at, .. } => Some(*expires_at),
        }
    }

    /// Return to idle if the deadline has passed at `now`.
    ///
    /// Returns `true` when the display went idle.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                *self = SignDisplayState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> Option<&Sign> {
        match self {
            SignDisplayState::Idle => None,
            SignDisplayState::Showing { sign, .. } => Some(sign),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SignDisplayState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speed_limit() {
        let sign = Sign::parse("80").unwrap();
        assert_eq!(sign.kind, SignType::SpeedLimit);
        assert_eq!(sign.value, "80");
        assert_eq!(sign.limit(), Some(80));

        // normalised through the integer
        assert_eq!(Sign::parse("080").unwrap().value, "80");
    }

    #[test]
    fn test_parse_named_signs() {
        assert_eq!(
            Sign::parse("stop"),
            Some(Sign {
                kind: SignType::Stop,
                value: "STOP".into()
            })
        );
        assert_eq!(Sign::parse("crosswalk").unwrap().value, "CROSSWALK");
        assert_eq!(Sign::parse("yield").unwrap().kind, SignType::Yield);
        assert_eq!(Sign::parse("yield").unwrap().limit(), None);
    }

    #[test]
    fn test_parse_unknown_tokens() {
        assert_eq!(Sign::parse("STOP"), None);
        assert_eq!(Sign::parse("unknown"), None);
        assert_eq!(Sign::parse("8O"), None);
    }

    #[test]
    fn test_transitions() {
        let t0 = Instant::now();
        let mut state = SignDisplayState::default();
        assert!(state.is_idle());

        let shown = state.on_sign(Sign::speed_limit(80), t0, DEFAULT_HIDE_AFTER);
        assert_eq!(shown, SignTransition::Shown);
        assert_eq!(state.deadline(), Some(t0 + DEFAULT_HIDE_AFTER));

        let t1 = t0 + Duration::from_secs(2);
        let again = state.on_sign(Sign::speed_limit(80), t1, DEFAULT_HIDE_AFTER);
        assert_eq!(again, SignTransition::Prolonged);
        assert_eq!(state.deadline(), Some(t1 + DEFAULT_HIDE_AFTER));

        let stop = Sign::parse("stop").unwrap();
        let replaced = state.on_sign(stop.clone(), t1, DEFAULT_HIDE_AFTER);
        assert_eq!(replaced, SignTransition::Replaced);
        assert_eq!(state.current(), Some(&stop));
    }

    #[test]
    fn test_expire_only_after_deadline() {
        let t0 = Instant::now();
        let mut state = SignDisplayState::default();
        state.on_sign(Sign::speed_limit(50), t0, DEFAULT_HIDE_AFTER);

        assert!(!state.expire(t0 + Duration::from_millis(5999)));
        assert!(state.expire(t0 + DEFAULT_HIDE_AFTER));
        assert!(state.is_idle());
        assert!(!state.expire(t0 + Duration::from_secs(60)));
    }
}
