// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authorization and error bookkeeping of a session.
//!
//! A permanent rejection (bad credentials, banned client id) marks the
//! session unauthorized. An unauthorized session does not reconnect; each
//! [`ConnectionState::on_reconnect`] call counts a failed cycle instead, and
//! once the threshold is reached the counter resets and the session becomes
//! eligible again.

use std::fmt;
use std::time::Duration;

use rumqttc::ConnectReturnCode;

/// Errors after which the disconnect counter wraps to zero.
pub const ERROR_COUNTER_WRAP: u32 = 1000;

/// Result code of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectCode {
    /// `0`: connection accepted.
    Accepted,
    /// `1`: unsupported protocol version.
    BadProtocol,
    /// `2`: client id rejected.
    BadClientId,
    /// `3`: broker unavailable.
    ServerUnavailable,
    /// `4`: bad username or password.
    BadCredentials,
    /// `5`: client not authorized.
    NotAuthorized,
    /// `-1`: no answer within the connect timeout.
    Timeout,
    /// Any other code.
    Other(i32),
}

impl ConnectCode {
    /// Maps a numeric result code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Accepted,
            1 => Self::BadProtocol,
            2 => Self::BadClientId,
            3 => Self::ServerUnavailable,
            4 => Self::BadCredentials,
            5 => Self::NotAuthorized,
            -1 => Self::Timeout,
            other => Self::Other(other),
        }
    }

    /// Numeric result code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Accepted => 0,
            Self::BadProtocol => 1,
            Self::BadClientId => 2,
            Self::ServerUnavailable => 3,
            Self::BadCredentials => 4,
            Self::NotAuthorized => 5,
            Self::Timeout => -1,
            Self::Other(code) => code,
        }
    }

    /// Returns `true` for rejections that retrying cannot fix.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::BadProtocol | Self::BadClientId | Self::BadCredentials | Self::NotAuthorized
        )
    }

    /// Short description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Accepted => "connection successful",
            Self::BadProtocol => "incorrect protocol version",
            Self::BadClientId => "invalid client identifier",
            Self::ServerUnavailable => "server unavailable",
            Self::BadCredentials => "bad username or password",
            Self::NotAuthorized => "not authorized",
            Self::Timeout => "connection timeout",
            Self::Other(_) => "unknown connection error",
        }
    }
}

impl From<ConnectReturnCode> for ConnectCode {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::Success => Self::Accepted,
            ConnectReturnCode::RefusedProtocolVersion => Self::BadProtocol,
            ConnectReturnCode::BadClientId => Self::BadClientId,
            ConnectReturnCode::ServiceUnavailable => Self::ServerUnavailable,
            ConnectReturnCode::BadUserNamePassword => Self::BadCredentials,
            ConnectReturnCode::NotAuthorized => Self::NotAuthorized,
        }
    }
}

impl fmt::Display for ConnectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// What the session does after a connect result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Subscribe to every device topic.
    Subscribe,
    /// Stop the session.
    Stop,
    /// Keep the network loop retrying.
    Retry,
}

/// What [`ConnectionState::on_reconnect`] asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Restart the network loop.
    Restart,
    /// Stay stopped; the failed cycle was counted.
    StayStopped,
}

/// Authorization flag and error counter of one session.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    authorized: bool,
    consecutive_errors: u32,
    client_id: String,
    last_code: Option<ConnectCode>,
    threshold: u32,
    backoff: Duration,
}

impl ConnectionState {
    /// Creates an authorized state with no errors.
    #[must_use]
    pub fn new(client_id: impl Into<String>, threshold: u32, backoff: Duration) -> Self {
        Self {
            authorized: true,
            consecutive_errors: 0,
            client_id: client_id.into(),
            last_code: None,
            threshold: threshold.max(1),
            backoff,
        }
    }

    /// Whether reconnecting is allowed.
    #[must_use]
    pub fn authorized(&self) -> bool {
        self.authorized
    }

    /// Errors counted since the last reset.
    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// MQTT client id of the session.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Result of the most recent connection attempt.
    #[must_use]
    pub fn last_code(&self) -> Option<ConnectCode> {
        self.last_code
    }

    /// Marks the session authorized again and clears the counter.
    pub fn reset(&mut self) {
        self.authorized = true;
        self.consecutive_errors = 0;
    }

    /// Applies a connect result.
    pub fn on_connect(&mut self, code: ConnectCode) -> ConnectOutcome {
        self.last_code = Some(code);
        match code {
            ConnectCode::Accepted => ConnectOutcome::Subscribe,
            code if code.is_permanent() => {
                self.authorized = false;
                ConnectOutcome::Stop
            }
            _ => ConnectOutcome::Retry,
        }
    }

    /// Applies a disconnect and returns how long to wait before the network
    /// loop may reconnect.
    ///
    /// A zero `reason` is a requested disconnect and needs no wait.
    pub fn on_disconnect(&mut self, reason: i32) -> Option<Duration> {
        if reason == 0 {
            return None;
        }
        self.consecutive_errors += 1;
        if self.consecutive_errors % ERROR_COUNTER_WRAP == 0 {
            self.consecutive_errors = 0;
        }
        Some(self.backoff)
    }

    /// Decides a reconnect request.
    ///
    /// Unauthorized sessions count the request as a failed cycle; the cycle
    /// that reaches the threshold resets the counter and restores
    /// authorization, so the following request restarts the loop.
    pub fn on_reconnect(&mut self) -> ReconnectAction {
        if self.authorized {
            return ReconnectAction::Restart;
        }
        self.consecutive_errors += 1;
        if self.consecutive_errors >= self.threshold {
            self.reset();
        }
        ReconnectAction::StayStopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ConnectionState {
        ConnectionState::new("client", 10, Duration::from_secs(15))
    }

    #[test]
    fn codes_roundtrip() {
        for code in [-1, 0, 1, 2, 3, 4, 5, 7] {
            assert_eq!(ConnectCode::from_code(code).code(), code);
        }
        assert_eq!(ConnectCode::from_code(7), ConnectCode::Other(7));
    }

    #[test]
    fn permanent_codes() {
        for code in [1, 2, 4, 5] {
            assert!(ConnectCode::from_code(code).is_permanent(), "{code}");
        }
        for code in [-1, 0, 3, 6] {
            assert!(!ConnectCode::from_code(code).is_permanent(), "{code}");
        }
    }

    #[test]
    fn maps_library_codes() {
        assert_eq!(
            ConnectCode::from(ConnectReturnCode::BadUserNamePassword),
            ConnectCode::BadCredentials
        );
        assert_eq!(ConnectCode::from(ConnectReturnCode::Success), ConnectCode::Accepted);
        assert_eq!(
            ConnectCode::from(ConnectReturnCode::ServiceUnavailable).to_string(),
            "server unavailable (3)"
        );
    }

    #[test]
    fn permanent_rejection_unauthorizes() {
        let mut state = state();
        assert_eq!(state.on_connect(ConnectCode::Accepted), ConnectOutcome::Subscribe);
        assert_eq!(state.on_connect(ConnectCode::ServerUnavailable), ConnectOutcome::Retry);
        assert_eq!(state.on_connect(ConnectCode::Timeout), ConnectOutcome::Retry);
        assert!(state.authorized());

        assert_eq!(state.on_connect(ConnectCode::BadCredentials), ConnectOutcome::Stop);
        assert!(!state.authorized());
        assert_eq!(state.last_code(), Some(ConnectCode::BadCredentials));
    }

    #[test]
    fn reconnect_self_heals_on_tenth_call() {
        let mut state = state();
        state.on_connect(ConnectCode::NotAuthorized);

        for call in 1..10 {
            assert_eq!(state.on_reconnect(), ReconnectAction::StayStopped);
            assert!(!state.authorized(), "call {call}");
            assert_eq!(state.consecutive_errors(), call);
        }

        assert_eq!(state.on_reconnect(), ReconnectAction::StayStopped);
        assert!(state.authorized());
        assert_eq!(state.consecutive_errors(), 0);
        assert_eq!(state.on_reconnect(), ReconnectAction::Restart);
    }

    #[test]
    fn authorized_reconnect_restarts() {
        let mut state = state();
        assert_eq!(state.on_reconnect(), ReconnectAction::Restart);
        assert_eq!(state.consecutive_errors(), 0);
    }

    #[test]
    fn disconnect_backoff() {
        let mut state = state();
        assert_eq!(state.on_disconnect(0), None);
        assert_eq!(state.consecutive_errors(), 0);

        assert_eq!(state.on_disconnect(7), Some(Duration::from_secs(15)));
        assert_eq!(state.consecutive_errors(), 1);
    }

    #[test]
    fn error_counter_wraps() {
        let mut state = state();
        for _ in 0..999 {
            state.on_disconnect(1);
        }
        assert_eq!(state.consecutive_errors(), 999);
        state.on_disconnect(1);
        assert_eq!(state.consecutive_errors(), 0);
        state.on_disconnect(1);
        assert_eq!(state.consecutive_errors(), 1);
    }
}
